use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::Validate;

use super::work_order::{validate_non_negative_decimal, validate_positive_decimal};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequisitionStatus {
    Draft,
    PendingApproval,
    Approved,
    AwaitingGoods,
    Received,
    Cancelled,
}

impl RequisitionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequisitionStatus::Received | RequisitionStatus::Cancelled)
    }

    /// Statuses from which a requisition may move to `next`.
    pub fn can_transition_to(self, next: RequisitionStatus) -> bool {
        use RequisitionStatus::*;
        match (self, next) {
            (Draft, PendingApproval) => true,
            (PendingApproval, Approved) | (PendingApproval, Draft) => true,
            (Approved, AwaitingGoods) | (Approved, Received) => true,
            (AwaitingGoods, Received) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Line items may only change before approval.
    pub fn is_editable(self) -> bool {
        matches!(self, RequisitionStatus::Draft | RequisitionStatus::PendingApproval)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestType {
    #[default]
    Product,
    Service,
    Equipment,
    Asset,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RequisitionLine {
    /// Stock item to receive into; lines without one are not posted to the ledger.
    pub stock_item_id: Option<Uuid>,
    #[validate(length(min = 1, message = "description must not be empty"))]
    pub description: String,
    #[validate(custom = "validate_positive_decimal")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    pub unit_price: Decimal,
    pub expected_date: Option<NaiveDate>,
}

impl RequisitionLine {
    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequisition {
    pub id: Uuid,
    pub requisition_number: String,
    pub status: RequisitionStatus,
    pub request_type: RequestType,
    pub lines: Vec<RequisitionLine>,
    pub supplier: Option<String>,
    pub approver: Option<String>,
    pub approved_at: Option<NaiveDateTime>,
    pub received_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    /// Work order the parts are being bought for, if any.
    pub work_order_id: Option<Uuid>,
}

impl PurchaseRequisition {
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(RequisitionLine::line_total).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPurchaseRequisition {
    #[serde(default)]
    pub request_type: RequestType,
    /// Validated line by line by the service.
    pub lines: Vec<RequisitionLine>,
    #[validate(length(min = 1, message = "supplier must not be empty"))]
    pub supplier: Option<String>,
    pub work_order_id: Option<Uuid>,
}
