use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::collaborators::Clock;
use crate::errors::ServiceError;
use crate::events::{self, Event, EventSender};
use crate::models::{
    DispositionAction, LedgerReference, PartDisposition, PostingKey, PostingKind, UsedPart,
    UsedPartEvent, UsedPartEventKind, UsedPartStatus, WorkOrder,
};
use crate::services::inventory::{InventoryLedger, PostingReport, PostingRequest};

/// What one resolution pass produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispositionReport {
    pub used_parts: Vec<UsedPart>,
    pub postings: PostingReport,
    pub disposed: Vec<String>,
}

/// Classifies parts removed during a repair into tracked used parts, stock
/// receipts, or nothing at all.
pub struct DispositionResolver {
    inventory: Arc<InventoryLedger>,
    used_parts: DashMap<Uuid, UsedPart>,
    /// `(work order, part name)` → used part, so a replayed completion reuses the record.
    by_origin: DashMap<(Uuid, String), Uuid>,
    clock: Arc<dyn Clock>,
    event_sender: Option<EventSender>,
}

impl DispositionResolver {
    pub fn new(
        inventory: Arc<InventoryLedger>,
        clock: Arc<dyn Clock>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            inventory,
            used_parts: DashMap::new(),
            by_origin: DashMap::new(),
            clock,
            event_sender,
        }
    }

    /// Checks a disposition set against the work order without writing anything.
    pub fn validate(
        &self,
        work_order: &WorkOrder,
        dispositions: &[PartDisposition],
    ) -> Result<(), ServiceError> {
        let mut seen = HashSet::new();
        for disposition in dispositions {
            let name = disposition.part_name.as_str();
            if !seen.insert(name) {
                return Err(ServiceError::ValidationError(format!(
                    "part_name: '{}' appears more than once",
                    name
                )));
            }
            if disposition.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "quantity: removed quantity of '{}' must be greater than zero",
                    name
                )));
            }

            let requisitioned = work_order.requisitioned_quantity(name);
            if disposition.action.is_bounded_by_requisition() && disposition.quantity > requisitioned {
                return Err(ServiceError::ValidationError(format!(
                    "quantity: {} of '{}' exceeds the {} requisitioned on {}",
                    disposition.quantity, name, requisitioned, work_order.order_number
                )));
            }

            match &disposition.action {
                DispositionAction::ReturnToMainStock => {
                    if work_order.internal_stock_item_for(name).is_none() {
                        return Err(ServiceError::ValidationError(format!(
                            "action: '{}' was not drawn from internal stock and cannot be returned to it",
                            name
                        )));
                    }
                }
                DispositionAction::MergeIntoFungibleStock {
                    target_stock_item_id,
                } => {
                    let target = self.inventory.get_stock_item(*target_stock_item_id).map_err(|_| {
                        ServiceError::ValidationError(format!(
                            "target_stock_item_id: stock item {} does not exist",
                            target_stock_item_id
                        ))
                    })?;
                    if !target.is_fungible_used_item {
                        return Err(ServiceError::ValidationError(format!(
                            "target_stock_item_id: {} ({}) is not a fungible used-item stock",
                            target.code, target.id
                        )));
                    }
                }
                DispositionAction::TrackIndividually | DispositionAction::Dispose => {}
            }
        }
        Ok(())
    }

    /// Validates, then applies every disposition. Safe to repeat: used parts and
    /// receipts already recorded for this work order are reused.
    #[instrument(skip(self, work_order, dispositions), fields(work_order_id = %work_order.id))]
    pub fn resolve(
        &self,
        work_order: &WorkOrder,
        dispositions: &[PartDisposition],
    ) -> Result<DispositionReport, ServiceError> {
        self.validate(work_order, dispositions)?;

        let removed_at = work_order.repair_ended_at.unwrap_or_else(|| self.clock.now());
        let reference = LedgerReference::WorkOrder(work_order.id);
        let mut report = DispositionReport::default();

        for disposition in dispositions {
            let name = disposition.part_name.as_str();
            match &disposition.action {
                DispositionAction::TrackIndividually => {
                    report
                        .used_parts
                        .push(self.track(work_order, disposition, removed_at)?);
                }
                DispositionAction::MergeIntoFungibleStock {
                    target_stock_item_id,
                } => {
                    // Used parts enter fungible stock at no cost.
                    let request = PostingRequest {
                        key: PostingKey {
                            reference,
                            stock_item_id: *target_stock_item_id,
                            kind: PostingKind::FungibleMerge {
                                part_name: name.to_string(),
                            },
                        },
                        quantity: disposition.quantity,
                        unit_price: Decimal::ZERO,
                        note: Some(format!("removed on {}: {}", work_order.order_number, name)),
                    };
                    self.inventory.record(&mut report.postings, request, name);
                }
                DispositionAction::ReturnToMainStock => {
                    // Checked by validate.
                    let Some(stock_item_id) = work_order.internal_stock_item_for(name) else {
                        continue;
                    };
                    let unit_price = work_order
                        .parts
                        .iter()
                        .find(|p| p.name == name && p.consumes_internal_stock())
                        .map(|p| p.unit_price)
                        .unwrap_or_default();
                    let request = PostingRequest {
                        key: PostingKey {
                            reference,
                            stock_item_id,
                            kind: PostingKind::MainStockReturn {
                                part_name: name.to_string(),
                            },
                        },
                        quantity: disposition.quantity,
                        unit_price,
                        note: Some(format!("returned from {}: {}", work_order.order_number, name)),
                    };
                    self.inventory.record(&mut report.postings, request, name);
                }
                DispositionAction::Dispose => report.disposed.push(name.to_string()),
            }
        }

        info!(
            used_parts = report.used_parts.len(),
            receipts = report.postings.posted.len(),
            disposed = report.disposed.len(),
            "Removed parts resolved"
        );
        Ok(report)
    }

    fn track(
        &self,
        work_order: &WorkOrder,
        disposition: &PartDisposition,
        removed_at: NaiveDateTime,
    ) -> Result<UsedPart, ServiceError> {
        let origin = (work_order.id, disposition.part_name.clone());
        match self.by_origin.entry(origin) {
            Entry::Occupied(existing) => self.get_used_part(*existing.get()),
            Entry::Vacant(vacant) => {
                let unit = work_order
                    .parts
                    .iter()
                    .find(|p| p.name == disposition.part_name)
                    .map(|p| p.unit.clone())
                    .unwrap_or_else(|| "pcs".to_string());
                let used_part = UsedPart {
                    id: Uuid::new_v4(),
                    part_name: disposition.part_name.clone(),
                    origin_stock_item_id: work_order.internal_stock_item_for(&disposition.part_name),
                    origin_work_order_id: work_order.id,
                    removed_at,
                    initial_quantity: disposition.quantity,
                    unit,
                    status: UsedPartStatus::Pending,
                    events: Vec::new(),
                    notes: disposition.notes.clone(),
                };
                self.used_parts.insert(used_part.id, used_part.clone());
                vacant.insert(used_part.id);

                metrics::counter!("fleet_repair.used_parts.recorded", 1);
                events::publish(
                    &self.event_sender,
                    Event::UsedPartRecorded {
                        used_part_id: used_part.id,
                        work_order_id: work_order.id,
                    },
                );
                Ok(used_part)
            }
        }
    }

    /// Appends a follow-up event to a tracked used part.
    #[instrument(skip(self, note))]
    pub fn record_used_part_event(
        &self,
        used_part_id: Uuid,
        kind: UsedPartEventKind,
        quantity: Decimal,
        note: Option<String>,
    ) -> Result<UsedPart, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "quantity: must be greater than zero".to_string(),
            ));
        }
        let mut part = self
            .used_parts
            .get_mut(&used_part_id)
            .ok_or_else(|| ServiceError::not_found("used part", used_part_id))?;

        if part.status == UsedPartStatus::Closed {
            return Err(ServiceError::PreconditionFailed(format!(
                "used part {} is closed",
                used_part_id
            )));
        }
        let remaining = part.remaining_quantity();
        if quantity > remaining {
            return Err(ServiceError::ValidationError(format!(
                "quantity: {} exceeds the {} remaining on used part {}",
                quantity, remaining, used_part_id
            )));
        }

        part.events.push(UsedPartEvent {
            kind,
            quantity,
            occurred_at: self.clock.now(),
            note,
        });
        part.refresh_status();
        let updated = part.clone();
        drop(part);

        info!(status = %updated.status, remaining = %updated.remaining_quantity(), "Used part event recorded");
        events::publish(
            &self.event_sender,
            Event::UsedPartEventRecorded {
                used_part_id,
                kind,
                quantity,
            },
        );
        Ok(updated)
    }

    pub fn get_used_part(&self, id: Uuid) -> Result<UsedPart, ServiceError> {
        self.used_parts
            .get(&id)
            .map(|part| part.clone())
            .ok_or_else(|| ServiceError::not_found("used part", id))
    }

    pub fn used_parts_for(&self, work_order_id: Uuid) -> Vec<UsedPart> {
        let mut parts: Vec<UsedPart> = self
            .used_parts
            .iter()
            .filter(|p| p.origin_work_order_id == work_order_id)
            .map(|p| p.clone())
            .collect();
        parts.sort_by(|a, b| a.part_name.cmp(&b.part_name));
        parts
    }
}
