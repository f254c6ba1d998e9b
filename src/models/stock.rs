use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::Validate;

use super::work_order::validate_non_negative_decimal;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    Normal,
    Overstock,
}

impl StockStatus {
    /// Derives the stock level band from the on-hand quantity and thresholds.
    pub fn derive(quantity: Decimal, minimum: Decimal, maximum: Option<Decimal>) -> Self {
        if quantity <= Decimal::ZERO {
            StockStatus::OutOfStock
        } else if quantity <= minimum {
            StockStatus::Low
        } else if maximum.map_or(false, |max| quantity > max) {
            StockStatus::Overstock
        } else {
            StockStatus::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub quantity_on_hand: Decimal,
    pub minimum_threshold: Decimal,
    pub maximum_threshold: Option<Decimal>,
    pub status: StockStatus,
    pub is_fungible_used_item: bool,
    pub is_revolving_part: bool,
    pub updated_at: NaiveDateTime,
}

impl StockItem {
    pub(crate) fn apply_delta(&mut self, delta: Decimal, at: NaiveDateTime) {
        self.quantity_on_hand += delta;
        self.status = StockStatus::derive(
            self.quantity_on_hand,
            self.minimum_threshold,
            self.maximum_threshold,
        );
        self.updated_at = at;
    }

    pub fn needs_reorder(&self) -> bool {
        matches!(self.status, StockStatus::OutOfStock | StockStatus::Low)
    }
}

/// Input for registering a stock item with its opening balance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewStockItem {
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub code: String,
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    #[validate(length(min = 1, message = "unit must not be empty"))]
    pub unit: String,
    #[validate(custom = "validate_non_negative_decimal")]
    pub opening_quantity: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    pub unit_price: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    pub minimum_threshold: Decimal,
    pub maximum_threshold: Option<Decimal>,
    #[serde(default)]
    pub is_fungible_used_item: bool,
    #[serde(default)]
    pub is_revolving_part: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Receipt,
    Withdrawal,
}

/// Document a stock movement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LedgerReference {
    WorkOrder(Uuid),
    Requisition(Uuid),
    OpeningBalance(Uuid),
}

impl fmt::Display for LedgerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerReference::WorkOrder(id) => write!(f, "work_order:{}", id),
            LedgerReference::Requisition(id) => write!(f, "requisition:{}", id),
            LedgerReference::OpeningBalance(id) => write!(f, "opening_balance:{}", id),
        }
    }
}

/// Why a movement was posted. Part of the uniqueness key, so two different
/// reasons against the same document and item never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostingKind {
    Opening,
    Withdrawal,
    RequisitionReceipt { line: usize },
    FungibleMerge { part_name: String },
    MainStockReturn { part_name: String },
}

impl PostingKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            PostingKind::Withdrawal => TransactionType::Withdrawal,
            _ => TransactionType::Receipt,
        }
    }
}

/// Uniqueness key of a posting: at most one transaction exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingKey {
    pub reference: LedgerReference,
    pub stock_item_id: Uuid,
    pub kind: PostingKind,
}

/// Append-only record of one stock movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub stock_item_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed: receipts are positive, withdrawals negative.
    pub quantity: Decimal,
    pub occurred_at: NaiveDateTime,
    pub actor: String,
    pub note: Option<String>,
    pub reference: LedgerReference,
    pub unit_price: Decimal,
    pub posting_kind: PostingKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), dec!(5), None, StockStatus::OutOfStock)]
    #[case(dec!(-2), dec!(5), None, StockStatus::OutOfStock)]
    #[case(dec!(5), dec!(5), None, StockStatus::Low)]
    #[case(dec!(6), dec!(5), None, StockStatus::Normal)]
    #[case(dec!(6), dec!(5), Some(dec!(10)), StockStatus::Normal)]
    #[case(dec!(10), dec!(5), Some(dec!(10)), StockStatus::Normal)]
    #[case(dec!(11), dec!(5), Some(dec!(10)), StockStatus::Overstock)]
    fn derives_stock_status(
        #[case] quantity: Decimal,
        #[case] minimum: Decimal,
        #[case] maximum: Option<Decimal>,
        #[case] expected: StockStatus,
    ) {
        assert_eq!(StockStatus::derive(quantity, minimum, maximum), expected);
    }

    #[test]
    fn withdrawal_is_the_only_negative_kind() {
        assert_eq!(PostingKind::Withdrawal.transaction_type(), TransactionType::Withdrawal);
        assert_eq!(
            PostingKind::RequisitionReceipt { line: 0 }.transaction_type(),
            TransactionType::Receipt
        );
    }
}
