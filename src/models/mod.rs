// Core models
pub mod category;
pub mod disposition;
pub mod estimation;
pub mod purchase_requisition;
pub mod stock;
pub mod used_part;
pub mod work_order;

pub use category::Category;
pub use disposition::{DispositionAction, PartDisposition};
pub use estimation::{EstimationAttempt, EstimationLedger, EstimationStatus, FinalizeOutcome};
pub use purchase_requisition::{
    NewPurchaseRequisition, PurchaseRequisition, RequestType, RequisitionLine, RequisitionStatus,
};
pub use stock::{
    LedgerReference, NewStockItem, PostingKey, PostingKind, StockItem, StockStatus,
    StockTransaction, TransactionType,
};
pub use used_part::{UsedPart, UsedPartEvent, UsedPartEventKind, UsedPartStatus};
pub use work_order::{
    Assignment, CostTotals, CostUpdate, NewWorkOrder, PartRequisitionItem, PartSource, WorkOrder,
    WorkOrderPriority, WorkOrderStatus,
};
