use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{RequisitionStatus, UsedPartEventKind, WorkOrderStatus};

/// Domain events emitted by the core after a change has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Work-order events
    WorkOrderCreated {
        work_order_id: Uuid,
        order_number: String,
    },
    WorkOrderStatusChanged {
        work_order_id: Uuid,
        old_status: WorkOrderStatus,
        new_status: WorkOrderStatus,
    },
    WorkOrderDeleted {
        work_order_id: Uuid,
        order_number: String,
    },

    // Estimation events
    EstimationRevised {
        work_order_id: Uuid,
        sequence: u32,
    },
    EstimationSuperseded {
        work_order_id: Uuid,
        failed_sequence: u32,
        new_sequence: u32,
    },
    EstimationFinalized {
        work_order_id: Uuid,
        completed_sequence: u32,
    },

    // Inventory events
    StockPosted {
        stock_item_id: Uuid,
        transaction_id: Uuid,
        quantity: Decimal,
        quantity_on_hand: Decimal,
    },
    LowStock {
        stock_item_id: Uuid,
        quantity_on_hand: Decimal,
        minimum_threshold: Decimal,
    },
    UsedPartRecorded {
        used_part_id: Uuid,
        work_order_id: Uuid,
    },
    UsedPartEventRecorded {
        used_part_id: Uuid,
        kind: UsedPartEventKind,
        quantity: Decimal,
    },

    // Procurement events
    RequisitionCreated {
        requisition_id: Uuid,
        requisition_number: String,
    },
    RequisitionStatusChanged {
        requisition_id: Uuid,
        old_status: RequisitionStatus,
        new_status: RequisitionStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkOrderCreated { .. } => "work_order_created",
            Event::WorkOrderStatusChanged { .. } => "work_order_status_changed",
            Event::WorkOrderDeleted { .. } => "work_order_deleted",
            Event::EstimationRevised { .. } => "estimation_revised",
            Event::EstimationSuperseded { .. } => "estimation_superseded",
            Event::EstimationFinalized { .. } => "estimation_finalized",
            Event::StockPosted { .. } => "stock_posted",
            Event::LowStock { .. } => "low_stock",
            Event::UsedPartRecorded { .. } => "used_part_recorded",
            Event::UsedPartEventRecorded { .. } => "used_part_event_recorded",
            Event::RequisitionCreated { .. } => "requisition_created",
            Event::RequisitionStatusChanged { .. } => "requisition_status_changed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and wraps its sending half.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting. A full or closed channel drops the event.
    pub fn publish(&self, event: Event) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = event.name(), "Event channel full, dropping event");
                metrics::counter!("fleet_repair.events.dropped", 1);
            }
            Err(TrySendError::Closed(event)) => {
                warn!(event = event.name(), "Event channel closed, dropping event");
                metrics::counter!("fleet_repair.events.dropped", 1);
            }
        }
    }
}

/// Fan-out helper used by services that may run without a host channel.
pub(crate) fn publish(sender: &Option<EventSender>, event: Event) {
    if let Some(sender) = sender {
        sender.publish(event);
    }
}

/// Drains the channel until every sender is dropped, logging each event.
/// Returns how many events were processed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) -> usize {
    info!("Starting event processing loop");
    let mut processed = 0;

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStock {
                stock_item_id,
                quantity_on_hand,
                minimum_threshold,
            } => {
                warn!(
                    "Stock item {} at {} is at or below minimum {}",
                    stock_item_id, quantity_on_hand, minimum_threshold
                );
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other));
                info!(event = other.name(), "Received event: {}", payload);
            }
        }
        processed += 1;
    }

    info!(processed, "Event processing loop finished");
    processed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn processes_until_senders_drop() {
        let (sender, rx) = EventSender::channel(8);
        let id = Uuid::new_v4();
        sender.publish(Event::WorkOrderDeleted {
            work_order_id: id,
            order_number: "WO-2025-00002".into(),
        });
        sender
            .send(Event::EstimationRevised {
                work_order_id: id,
                sequence: 1,
            })
            .await
            .unwrap();
        drop(sender);

        assert_eq!(process_events(rx).await, 2);
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (sender, mut rx) = EventSender::channel(1);
        let id = Uuid::new_v4();
        for sequence in 1..=3 {
            sender.publish(Event::EstimationRevised {
                work_order_id: id,
                sequence,
            });
        }
        drop(sender);

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            Event::EstimationRevised {
                work_order_id: id,
                sequence: 1
            }
        );
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(Event::WorkOrderStatusChanged {
            work_order_id: Uuid::nil(),
            old_status: WorkOrderStatus::Pending,
            new_status: WorkOrderStatus::InProgress,
        })
        .unwrap();
        assert_eq!(json["type"], "work_order_status_changed");
        assert_eq!(json["new_status"], "in_progress");
    }
}
