use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsedPartStatus {
    Pending,
    PartiallyDisposed,
    Closed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsedPartEventKind {
    Reinstalled,
    Sold,
    Scrapped,
    ReturnedToSupplier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedPartEvent {
    pub kind: UsedPartEventKind,
    pub quantity: Decimal,
    pub occurred_at: NaiveDateTime,
    pub note: Option<String>,
}

/// A part removed from a vehicle and kept for individual follow-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedPart {
    pub id: Uuid,
    pub part_name: String,
    /// Stock item the part originally came from, when known.
    pub origin_stock_item_id: Option<Uuid>,
    pub origin_work_order_id: Uuid,
    pub removed_at: NaiveDateTime,
    pub initial_quantity: Decimal,
    pub unit: String,
    pub status: UsedPartStatus,
    pub events: Vec<UsedPartEvent>,
    pub notes: Option<String>,
}

impl UsedPart {
    pub fn disposed_quantity(&self) -> Decimal {
        self.events.iter().map(|e| e.quantity).sum()
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.initial_quantity - self.disposed_quantity()
    }

    pub(crate) fn refresh_status(&mut self) {
        self.status = if self.events.is_empty() {
            UsedPartStatus::Pending
        } else if self.remaining_quantity() <= Decimal::ZERO {
            UsedPartStatus::Closed
        } else {
            UsedPartStatus::PartiallyDisposed
        };
    }
}
