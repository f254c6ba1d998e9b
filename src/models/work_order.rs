use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::disposition::PartDisposition;
use super::estimation::EstimationLedger;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    AwaitingParts,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkOrderStatus::Completed | WorkOrderStatus::Cancelled)
    }

    /// Statuses that require an assignment to be in place.
    pub fn requires_assignment(self) -> bool {
        matches!(
            self,
            WorkOrderStatus::InProgress | WorkOrderStatus::AwaitingParts | WorkOrderStatus::Completed
        )
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
pub enum WorkOrderPriority {
    #[default]
    Normal,
    Urgent,
    Emergency,
}

/// Who carries out the repair: in-house technicians or an outside contractor, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assignment {
    Technicians {
        primary: Uuid,
        #[serde(default)]
        assistants: Vec<Uuid>,
    },
    Contractor {
        name: String,
    },
}

impl Assignment {
    pub fn primary_technician(&self) -> Option<Uuid> {
        match self {
            Assignment::Technicians { primary, .. } => Some(*primary),
            Assignment::Contractor { .. } => None,
        }
    }

    pub fn contractor_name(&self) -> Option<&str> {
        match self {
            Assignment::Technicians { .. } => None,
            Assignment::Contractor { name } => Some(name),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartSource {
    InternalStock,
    ExternalSupplier,
}

/// One part line requested on a work order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_part_source", skip_on_field_errors = false))]
pub struct PartRequisitionItem {
    /// Stock item the part is drawn from; `None` for an ad-hoc purchase.
    pub stock_item_id: Option<Uuid>,
    #[validate(length(min = 1, message = "part name must not be empty"))]
    pub name: String,
    pub code: Option<String>,
    #[validate(custom = "validate_positive_decimal")]
    pub quantity: Decimal,
    #[validate(length(min = 1, message = "unit must not be empty"))]
    pub unit: String,
    #[validate(custom = "validate_non_negative_decimal")]
    pub unit_price: Decimal,
    pub source: PartSource,
    pub supplier_name: Option<String>,
    pub purchase_date: Option<NaiveDate>,
}

impl PartRequisitionItem {
    pub fn internal(stock_item_id: Uuid, name: &str, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            stock_item_id: Some(stock_item_id),
            name: name.to_string(),
            code: None,
            quantity,
            unit: "pcs".to_string(),
            unit_price,
            source: PartSource::InternalStock,
            supplier_name: None,
            purchase_date: None,
        }
    }

    pub fn external(
        name: &str,
        quantity: Decimal,
        unit_price: Decimal,
        supplier_name: &str,
        purchase_date: NaiveDate,
    ) -> Self {
        Self {
            stock_item_id: None,
            name: name.to_string(),
            code: None,
            quantity,
            unit: "pcs".to_string(),
            unit_price,
            source: PartSource::ExternalSupplier,
            supplier_name: Some(supplier_name.to_string()),
            purchase_date: Some(purchase_date),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.quantity * self.unit_price
    }

    /// True when the line draws from a tracked internal stock item.
    pub fn consumes_internal_stock(&self) -> bool {
        self.source == PartSource::InternalStock && self.stock_item_id.is_some()
    }
}

fn validate_part_source(item: &PartRequisitionItem) -> Result<(), ValidationError> {
    match item.source {
        PartSource::ExternalSupplier => {
            let has_supplier = item
                .supplier_name
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !has_supplier {
                let mut err = ValidationError::new("supplier_name");
                err.message = Some("external parts require a supplier name".into());
                return Err(err);
            }
            if item.purchase_date.is_none() {
                let mut err = ValidationError::new("purchase_date");
                err.message = Some("external parts require a purchase date".into());
                return Err(err);
            }
        }
        PartSource::InternalStock => {
            if item.stock_item_id.is_none() {
                let mut err = ValidationError::new("stock_item_id");
                err.message = Some("internal stock parts require a stock item".into());
                return Err(err);
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("positive");
        err.message = Some("must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Labor and parts costs of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTotals {
    pub parts_subtotal: Decimal,
    pub labor_cost: Decimal,
    pub labor_tax: Decimal,
    pub parts_tax: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub order_number: String,
    pub vehicle_id: Uuid,
    pub status: WorkOrderStatus,
    pub priority: WorkOrderPriority,
    pub created_at: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub repair_started_at: Option<NaiveDateTime>,
    pub repair_ended_at: Option<NaiveDateTime>,
    pub assignment: Option<Assignment>,
    pub problem_description: String,
    pub category: Option<String>,
    pub parts: Vec<PartRequisitionItem>,
    pub labor_cost: Decimal,
    pub labor_taxed: bool,
    pub labor_tax_rate: Decimal,
    pub parts_tax: Decimal,
    pub result: Option<String>,
    pub estimation: EstimationLedger,
    /// Dispositions applied at completion, kept for audit.
    #[serde(default)]
    pub removed_parts: Vec<PartDisposition>,
}

impl WorkOrder {
    /// Sum of quantities requested under `part_name` across all lines.
    pub fn requisitioned_quantity(&self, part_name: &str) -> Decimal {
        self.parts
            .iter()
            .filter(|p| p.name == part_name)
            .map(|p| p.quantity)
            .sum()
    }

    /// Stock item the named part was consumed from, if any line drew it from internal stock.
    pub fn internal_stock_item_for(&self, part_name: &str) -> Option<Uuid> {
        self.parts
            .iter()
            .filter(|p| p.name == part_name && p.source == PartSource::InternalStock)
            .find_map(|p| p.stock_item_id)
    }

    pub fn totals(&self) -> CostTotals {
        let parts_subtotal: Decimal = self.parts.iter().map(PartRequisitionItem::line_total).sum();
        let labor_tax = if self.labor_taxed {
            (self.labor_cost * self.labor_tax_rate).round_dp(2)
        } else {
            Decimal::ZERO
        };
        CostTotals {
            parts_subtotal,
            labor_cost: self.labor_cost,
            labor_tax,
            parts_tax: self.parts_tax,
            grand_total: parts_subtotal + self.labor_cost + labor_tax + self.parts_tax,
        }
    }
}

/// Input for opening a work order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewWorkOrder {
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub priority: WorkOrderPriority,
    #[validate(length(min = 1, message = "problem description must not be empty"))]
    pub problem_description: String,
    pub category: Option<String>,
    /// Validated line by line by the service.
    #[serde(default)]
    pub parts: Vec<PartRequisitionItem>,
    /// Planned start; the creation time is used when absent.
    pub estimated_start: Option<NaiveDateTime>,
    #[validate(custom = "validate_non_negative_decimal")]
    pub estimated_hours: Decimal,
    pub estimation_note: Option<String>,
    #[validate(custom = "validate_non_negative_decimal")]
    #[serde(default)]
    pub labor_cost: Decimal,
    #[serde(default)]
    pub labor_taxed: bool,
    #[validate(custom = "validate_non_negative_decimal")]
    #[serde(default)]
    pub labor_tax_rate: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    #[serde(default)]
    pub parts_tax: Decimal,
}

/// Cost fields that may be edited after creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Validate)]
pub struct CostUpdate {
    #[validate(custom = "validate_non_negative_decimal")]
    pub labor_cost: Decimal,
    pub labor_taxed: bool,
    #[validate(custom = "validate_non_negative_decimal")]
    pub labor_tax_rate: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    pub parts_tax: Decimal,
}
