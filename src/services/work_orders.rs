use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDateTime};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::collaborators::{Clock, ConfirmationGate, TechnicianDirectory};
use crate::errors::ServiceError;
use crate::events::{self, Event, EventSender};
use crate::models::{
    Assignment, CostTotals, CostUpdate, EstimationAttempt, NewWorkOrder, PartDisposition,
    PartRequisitionItem, WorkOrder, WorkOrderStatus,
};
use crate::services::categories::CategoryRegistry;
use crate::services::dispositions::{DispositionReport, DispositionResolver};
use crate::services::estimation::EstimationPlanner;
use crate::services::inventory::{InventoryLedger, LineWarning, PostingReport};
use crate::services::numbering::SequenceAllocator;

/// Result of a status change, including the downstream completion effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub work_order: WorkOrder,
    pub previous_status: WorkOrderStatus,
    /// False when the order was already in the requested status.
    pub changed: bool,
    pub withdrawals: PostingReport,
    pub dispositions: Option<DispositionReport>,
}

impl TransitionOutcome {
    /// Per-line ledger problems raised while completing. The transition itself succeeded.
    pub fn warnings(&self) -> Vec<LineWarning> {
        let mut warnings = self.withdrawals.warnings.clone();
        if let Some(dispositions) = &self.dispositions {
            warnings.extend(dispositions.postings.warnings.iter().cloned());
        }
        warnings
    }
}

/// Service for managing work orders
pub struct WorkOrderService {
    orders: DashMap<Uuid, WorkOrder>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    numbers: Arc<SequenceAllocator>,
    prefix: String,
    planner: EstimationPlanner,
    inventory: Arc<InventoryLedger>,
    dispositions: Arc<DispositionResolver>,
    categories: Arc<CategoryRegistry>,
    clock: Arc<dyn Clock>,
    technicians: Arc<dyn TechnicianDirectory>,
    confirmation: Arc<dyn ConfirmationGate>,
    event_sender: Option<EventSender>,
}

impl WorkOrderService {
    /// Creates a new work order service instance
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        numbers: Arc<SequenceAllocator>,
        prefix: &str,
        planner: EstimationPlanner,
        inventory: Arc<InventoryLedger>,
        dispositions: Arc<DispositionResolver>,
        categories: Arc<CategoryRegistry>,
        clock: Arc<dyn Clock>,
        technicians: Arc<dyn TechnicianDirectory>,
        confirmation: Arc<dyn ConfirmationGate>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            orders: DashMap::new(),
            locks: DashMap::new(),
            numbers,
            prefix: prefix.to_string(),
            planner,
            inventory,
            dispositions,
            categories,
            clock,
            technicians,
            confirmation,
            event_sender,
        }
    }

    /// Opens a work order in `Pending` with estimation attempt #1.
    #[instrument(skip(self, new_order), fields(vehicle_id = %new_order.vehicle_id))]
    pub fn create(&self, new_order: NewWorkOrder) -> Result<WorkOrder, ServiceError> {
        new_order.validate()?;
        validate_parts(&new_order.parts)?;
        if let Some(code) = &new_order.category {
            if !self.categories.contains(code) {
                return Err(ServiceError::ValidationError(format!(
                    "category: unknown category '{}'",
                    code
                )));
            }
        }

        let now = self.clock.now();
        let estimation = self.planner.start_estimation(
            new_order.estimated_start,
            new_order.estimated_hours,
            new_order.estimation_note,
        )?;
        let order_number = self.numbers.next(&self.prefix, now.year()).to_string();

        let work_order = WorkOrder {
            id: Uuid::new_v4(),
            order_number,
            vehicle_id: new_order.vehicle_id,
            status: WorkOrderStatus::Pending,
            priority: new_order.priority,
            created_at: now,
            approved_at: None,
            repair_started_at: None,
            repair_ended_at: None,
            assignment: None,
            problem_description: new_order.problem_description,
            category: new_order.category,
            parts: new_order.parts,
            labor_cost: new_order.labor_cost,
            labor_taxed: new_order.labor_taxed,
            labor_tax_rate: new_order.labor_tax_rate,
            parts_tax: new_order.parts_tax,
            result: None,
            estimation,
            removed_parts: Vec::new(),
        };
        self.orders.insert(work_order.id, work_order.clone());

        metrics::counter!("fleet_repair.work_orders.created", 1);
        info!(
            work_order_id = %work_order.id,
            order_number = %work_order.order_number,
            "Work order created"
        );
        events::publish(
            &self.event_sender,
            Event::WorkOrderCreated {
                work_order_id: work_order.id,
                order_number: work_order.order_number.clone(),
            },
        );
        Ok(work_order)
    }

    pub fn get(&self, id: Uuid) -> Result<WorkOrder, ServiceError> {
        self.orders
            .get(&id)
            .map(|order| order.clone())
            .ok_or_else(|| ServiceError::not_found("work order", id))
    }

    /// Work orders ordered by number, optionally filtered by status.
    pub fn list(&self, status: Option<WorkOrderStatus>) -> Vec<WorkOrder> {
        let mut orders: Vec<WorkOrder> = self
            .orders
            .iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        orders
    }

    pub fn totals(&self, id: Uuid) -> Result<CostTotals, ServiceError> {
        Ok(self.get(id)?.totals())
    }

    #[instrument(skip(self, assistants))]
    pub fn assign_technicians(
        &self,
        id: Uuid,
        primary: Uuid,
        assistants: Vec<Uuid>,
    ) -> Result<WorkOrder, ServiceError> {
        for technician in std::iter::once(&primary).chain(assistants.iter()) {
            if !self.technicians.exists(*technician) {
                return Err(ServiceError::not_found("technician", technician));
            }
        }
        if assistants.contains(&primary) {
            return Err(ServiceError::ValidationError(
                "assistants: the primary technician cannot also be an assistant".to_string(),
            ));
        }
        let mut unique = Vec::with_capacity(assistants.len());
        for assistant in assistants {
            if !unique.contains(&assistant) {
                unique.push(assistant);
            }
        }

        self.mutate(id, |order| {
            ensure_not_terminal(order, "reassign")?;
            order.assignment = Some(Assignment::Technicians {
                primary,
                assistants: unique,
            });
            info!(order_number = %order.order_number, "Technicians assigned");
            Ok(order.clone())
        })
    }

    #[instrument(skip(self))]
    pub fn assign_contractor(&self, id: Uuid, name: &str) -> Result<WorkOrder, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "contractor_name: must not be empty".to_string(),
            ));
        }
        self.mutate(id, |order| {
            ensure_not_terminal(order, "reassign")?;
            order.assignment = Some(Assignment::Contractor {
                name: name.to_string(),
            });
            info!(order_number = %order.order_number, "Contractor assigned");
            Ok(order.clone())
        })
    }

    /// Stamps the approval time. Approving twice keeps the first stamp.
    #[instrument(skip(self))]
    pub fn approve(&self, id: Uuid) -> Result<WorkOrder, ServiceError> {
        let now = self.clock.now();
        self.mutate(id, |order| {
            if order.status == WorkOrderStatus::Cancelled {
                return Err(ServiceError::PreconditionFailed(format!(
                    "work order {} is cancelled and cannot be approved",
                    order.order_number
                )));
            }
            if order.approved_at.is_none() {
                order.approved_at = Some(now);
                info!(order_number = %order.order_number, "Work order approved");
            }
            Ok(order.clone())
        })
    }

    /// Replaces the requested parts while the order is still open.
    #[instrument(skip(self, parts))]
    pub fn update_parts(
        &self,
        id: Uuid,
        parts: Vec<PartRequisitionItem>,
    ) -> Result<WorkOrder, ServiceError> {
        validate_parts(&parts)?;
        self.mutate(id, |order| {
            ensure_not_terminal(order, "change the parts of")?;
            order.parts = parts;
            info!(order_number = %order.order_number, lines = order.parts.len(), "Parts updated");
            Ok(order.clone())
        })
    }

    #[instrument(skip(self, result))]
    pub fn record_result(&self, id: Uuid, result: &str) -> Result<WorkOrder, ServiceError> {
        self.mutate(id, |order| {
            if order.status == WorkOrderStatus::Cancelled {
                return Err(ServiceError::PreconditionFailed(format!(
                    "work order {} is cancelled",
                    order.order_number
                )));
            }
            order.result = Some(result.to_string());
            Ok(order.clone())
        })
    }

    #[instrument(skip(self))]
    pub fn update_costs(&self, id: Uuid, costs: CostUpdate) -> Result<WorkOrder, ServiceError> {
        costs.validate()?;
        self.mutate(id, |order| {
            if order.status == WorkOrderStatus::Cancelled {
                return Err(ServiceError::PreconditionFailed(format!(
                    "work order {} is cancelled",
                    order.order_number
                )));
            }
            order.labor_cost = costs.labor_cost;
            order.labor_taxed = costs.labor_taxed;
            order.labor_tax_rate = costs.labor_tax_rate;
            order.parts_tax = costs.parts_tax;
            Ok(order.clone())
        })
    }

    /// Revises the active estimate in place.
    #[instrument(skip(self))]
    pub fn reestimate(
        &self,
        id: Uuid,
        new_start: NaiveDateTime,
        new_hours: Decimal,
    ) -> Result<WorkOrder, ServiceError> {
        let (order, sequence) = self.mutate(id, |order| {
            ensure_not_terminal(order, "re-estimate")?;
            let attempt = self.planner.reestimate(order, new_start, new_hours)?;
            Ok((order.clone(), attempt.sequence))
        })?;
        events::publish(
            &self.event_sender,
            Event::EstimationRevised {
                work_order_id: id,
                sequence,
            },
        );
        Ok(order)
    }

    /// Fails the active estimate and opens the next attempt.
    #[instrument(skip(self, reasoning))]
    pub fn record_missed_deadline(
        &self,
        id: Uuid,
        reason: &str,
        new_start: NaiveDateTime,
        new_hours: Decimal,
        reasoning: Option<String>,
    ) -> Result<(WorkOrder, EstimationAttempt), ServiceError> {
        let (order, failed_sequence, attempt) = self.mutate(id, |order| {
            ensure_not_terminal(order, "re-estimate")?;
            let (failed, attempt) =
                self.planner
                    .record_missed_deadline(order, reason, new_start, new_hours, reasoning)?;
            Ok((order.clone(), failed, attempt))
        })?;
        events::publish(
            &self.event_sender,
            Event::EstimationSuperseded {
                work_order_id: id,
                failed_sequence,
                new_sequence: attempt.sequence,
            },
        );
        Ok((order, attempt))
    }

    /// Sets the removed-part dispositions.
    ///
    /// Before completion the set is validated and stored; completion applies it.
    /// After completion new parts are validated and applied at once, and parts
    /// already resolved cannot be changed.
    #[instrument(skip(self, dispositions))]
    pub fn resolve_dispositions(
        &self,
        id: Uuid,
        dispositions: Vec<PartDisposition>,
    ) -> Result<(WorkOrder, Option<DispositionReport>), ServiceError> {
        self.mutate(id, |order| match order.status {
            WorkOrderStatus::Cancelled => Err(ServiceError::PreconditionFailed(format!(
                "work order {} is cancelled",
                order.order_number
            ))),
            WorkOrderStatus::Completed => {
                let mut combined = order.removed_parts.clone();
                for disposition in dispositions {
                    match combined.iter().find(|d| d.part_name == disposition.part_name) {
                        Some(existing) if *existing == disposition => {}
                        Some(_) => {
                            return Err(ServiceError::PreconditionFailed(format!(
                                "'{}' was already resolved on {}",
                                disposition.part_name, order.order_number
                            )))
                        }
                        None => combined.push(disposition),
                    }
                }
                let report = self.dispositions.resolve(order, &combined)?;
                order.removed_parts = combined;
                Ok((order.clone(), Some(report)))
            }
            _ => {
                self.dispositions.validate(order, &dispositions)?;
                order.removed_parts = dispositions;
                Ok((order.clone(), None))
            }
        })
    }

    /// Moves the work order to `target`, enforcing every guard before any change.
    ///
    /// Entering `Completed` stamps repair end, finalizes the estimation, posts
    /// withdrawals and applies the stored dispositions. Requesting `Completed`
    /// again replays those effects; each is idempotent.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        id: Uuid,
        target: WorkOrderStatus,
    ) -> Result<TransitionOutcome, ServiceError> {
        let outcome = self.mutate(id, |order| {
            let previous = order.status;
            if let Err(e) = self.check_guards(order, target) {
                error!(
                    order_number = %order.order_number,
                    from = %previous,
                    to = %target,
                    "Transition rejected: {}",
                    e
                );
                metrics::counter!("fleet_repair.work_orders.rejected_transitions", 1);
                return Err(e);
            }

            let now = self.clock.now();
            let mut withdrawals = PostingReport::default();
            let mut dispositions = None;

            match target {
                WorkOrderStatus::InProgress => {
                    order.repair_started_at.get_or_insert(now);
                }
                WorkOrderStatus::Completed => {
                    order.repair_ended_at.get_or_insert(now);
                    let finalized = self.planner.finalize(order);
                    withdrawals = self.inventory.post_withdrawals(order);
                    dispositions = Some(self.dispositions.resolve(order, &order.removed_parts)?);
                    if !finalized.already_final {
                        events::publish(
                            &self.event_sender,
                            Event::EstimationFinalized {
                                work_order_id: order.id,
                                completed_sequence: finalized.completed_sequence,
                            },
                        );
                    }
                }
                _ => {}
            }
            order.status = target;

            Ok(TransitionOutcome {
                work_order: order.clone(),
                previous_status: previous,
                changed: previous != target,
                withdrawals,
                dispositions,
            })
        })?;

        if outcome.changed {
            metrics::counter!("fleet_repair.work_orders.transitions", 1);
            info!(
                order_number = %outcome.work_order.order_number,
                from = %outcome.previous_status,
                to = %target,
                "Work order status changed"
            );
            events::publish(
                &self.event_sender,
                Event::WorkOrderStatusChanged {
                    work_order_id: id,
                    old_status: outcome.previous_status,
                    new_status: target,
                },
            );
        }
        let warnings = outcome.warnings();
        if !warnings.is_empty() {
            warn!(
                order_number = %outcome.work_order.order_number,
                count = warnings.len(),
                "Completion finished with ledger warnings"
            );
        }
        Ok(outcome)
    }

    fn check_guards(&self, order: &WorkOrder, target: WorkOrderStatus) -> Result<(), ServiceError> {
        let current = order.status;
        if current == WorkOrderStatus::Cancelled {
            return Err(ServiceError::PreconditionFailed(format!(
                "work order {} is cancelled; cancellation is irreversible",
                order.order_number
            )));
        }
        if current == WorkOrderStatus::Completed && target != WorkOrderStatus::Completed {
            return Err(ServiceError::PreconditionFailed(format!(
                "work order {} is completed and cannot move to {}",
                order.order_number, target
            )));
        }
        if target == WorkOrderStatus::Pending && current != WorkOrderStatus::Pending {
            return Err(ServiceError::PreconditionFailed(format!(
                "work order {} cannot return to pending",
                order.order_number
            )));
        }
        if target.requires_assignment() && order.assignment.is_none() {
            return Err(ServiceError::PreconditionFailed(format!(
                "work order {} needs a primary technician or contractor before moving to {}",
                order.order_number, target
            )));
        }
        if matches!(
            target,
            WorkOrderStatus::AwaitingParts | WorkOrderStatus::Completed
        ) && order.repair_started_at.is_none()
        {
            return Err(ServiceError::PreconditionFailed(format!(
                "work order {} has no repair start; move it to in_progress before {}",
                order.order_number, target
            )));
        }
        if target == WorkOrderStatus::Completed {
            self.dispositions.validate(order, &order.removed_parts)?;
        }
        if target == WorkOrderStatus::Cancelled {
            let label = format!("cancel work order {}", order.order_number);
            if !self.confirmation.confirm(&label) {
                return Err(ServiceError::PreconditionFailed(format!(
                    "cancellation of {} was not confirmed",
                    order.order_number
                )));
            }
        }
        Ok(())
    }

    /// Removes a work order after confirmation. Its number is never reissued.
    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<WorkOrder, ServiceError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let order_number = self.get(id)?.order_number;
        let label = format!("delete work order {}", order_number);
        if !self.confirmation.confirm(&label) {
            return Err(ServiceError::PreconditionFailed(format!(
                "deletion of {} was not confirmed",
                order_number
            )));
        }
        let (_, removed) = self
            .orders
            .remove(&id)
            .ok_or_else(|| ServiceError::not_found("work order", id))?;
        self.locks.remove(&id);

        metrics::counter!("fleet_repair.work_orders.deleted", 1);
        info!(order_number = %removed.order_number, "Work order deleted");
        events::publish(
            &self.event_sender,
            Event::WorkOrderDeleted {
                work_order_id: id,
                order_number: removed.order_number.clone(),
            },
        );
        Ok(removed)
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `change` on a copy of the order under its lock and stores the copy
    /// only when `change` succeeds.
    fn mutate<T>(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut WorkOrder) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut order = self.get(id)?;
        let result = change(&mut order)?;
        self.orders.insert(id, order);
        Ok(result)
    }
}

fn ensure_not_terminal(order: &WorkOrder, action: &str) -> Result<(), ServiceError> {
    if order.status.is_terminal() {
        return Err(ServiceError::PreconditionFailed(format!(
            "cannot {} work order {} in status {}",
            action, order.order_number, order.status
        )));
    }
    Ok(())
}

fn validate_parts(parts: &[PartRequisitionItem]) -> Result<(), ServiceError> {
    for (index, part) in parts.iter().enumerate() {
        part.validate().map_err(|e| match ServiceError::from(e) {
            ServiceError::ValidationError(msg) => {
                ServiceError::ValidationError(format!("parts[{}] ({}): {}", index, part.name, msg))
            }
            other => other,
        })?;
    }
    Ok(())
}
