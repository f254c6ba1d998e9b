use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happens to a part removed from a vehicle during repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispositionAction {
    /// Keep the part as an individually tracked used part.
    TrackIndividually,
    /// Receive the part into a shared fungible stock item.
    MergeIntoFungibleStock { target_stock_item_id: Uuid },
    /// Put the part back on the shelf it was drawn from.
    ReturnToMainStock,
    Dispose,
}

impl DispositionAction {
    /// Actions whose quantity is bounded by what the work order requisitioned.
    pub fn is_bounded_by_requisition(&self) -> bool {
        matches!(
            self,
            DispositionAction::TrackIndividually | DispositionAction::ReturnToMainStock
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDisposition {
    pub part_name: String,
    pub quantity: Decimal,
    #[serde(flatten)]
    pub action: DispositionAction,
    pub notes: Option<String>,
}

impl PartDisposition {
    pub fn new(part_name: &str, quantity: Decimal, action: DispositionAction) -> Self {
        Self {
            part_name: part_name.to_string(),
            quantity,
            action,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_is_flattened_into_the_disposition() {
        let target = Uuid::new_v4();
        let disposition = PartDisposition::new(
            "Brake pad",
            dec!(2),
            DispositionAction::MergeIntoFungibleStock {
                target_stock_item_id: target,
            },
        );
        let json = serde_json::to_value(&disposition).unwrap();
        assert_eq!(json["action"], "merge_into_fungible_stock");
        assert_eq!(json["target_stock_item_id"], target.to_string());

        let back: PartDisposition = serde_json::from_value(json).unwrap();
        assert_eq!(back, disposition);
    }
}
