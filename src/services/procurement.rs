use std::sync::{Arc, Mutex};

use chrono::Datelike;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::collaborators::{Clock, ConfirmationGate};
use crate::errors::ServiceError;
use crate::events::{self, Event, EventSender};
use crate::models::{
    NewPurchaseRequisition, PurchaseRequisition, RequisitionLine, RequisitionStatus,
};
use crate::services::inventory::{InventoryLedger, PostingReport};
use crate::services::numbering::SequenceAllocator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequisitionTransition {
    pub requisition: PurchaseRequisition,
    pub previous_status: RequisitionStatus,
    /// Ledger receipts, present only when the requisition entered `Received`.
    pub receipts: Option<PostingReport>,
}

/// Purchase requisitions: drafting, approval and goods receipt.
pub struct ProcurementService {
    requisitions: DashMap<Uuid, PurchaseRequisition>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    numbers: Arc<SequenceAllocator>,
    prefix: String,
    inventory: Arc<InventoryLedger>,
    clock: Arc<dyn Clock>,
    confirmation: Arc<dyn ConfirmationGate>,
    event_sender: Option<EventSender>,
}

impl ProcurementService {
    pub fn new(
        numbers: Arc<SequenceAllocator>,
        prefix: &str,
        inventory: Arc<InventoryLedger>,
        clock: Arc<dyn Clock>,
        confirmation: Arc<dyn ConfirmationGate>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            requisitions: DashMap::new(),
            locks: DashMap::new(),
            numbers,
            prefix: prefix.to_string(),
            inventory,
            clock,
            confirmation,
            event_sender,
        }
    }

    #[instrument(skip(self, new_requisition))]
    pub fn create(
        &self,
        new_requisition: NewPurchaseRequisition,
    ) -> Result<PurchaseRequisition, ServiceError> {
        new_requisition.validate()?;
        self.validate_lines(&new_requisition.lines)?;

        let now = self.clock.now();
        let requisition = PurchaseRequisition {
            id: Uuid::new_v4(),
            requisition_number: self.numbers.next(&self.prefix, now.year()).to_string(),
            status: RequisitionStatus::Draft,
            request_type: new_requisition.request_type,
            lines: new_requisition.lines,
            supplier: new_requisition.supplier,
            approver: None,
            approved_at: None,
            received_at: None,
            created_at: now,
            work_order_id: new_requisition.work_order_id,
        };
        self.requisitions.insert(requisition.id, requisition.clone());

        info!(
            requisition_number = %requisition.requisition_number,
            total = %requisition.total(),
            "Purchase requisition created"
        );
        events::publish(
            &self.event_sender,
            Event::RequisitionCreated {
                requisition_id: requisition.id,
                requisition_number: requisition.requisition_number.clone(),
            },
        );
        Ok(requisition)
    }

    pub fn get(&self, id: Uuid) -> Result<PurchaseRequisition, ServiceError> {
        self.requisitions
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| ServiceError::not_found("purchase requisition", id))
    }

    pub fn list(&self, status: Option<RequisitionStatus>) -> Vec<PurchaseRequisition> {
        let mut all: Vec<PurchaseRequisition> = self
            .requisitions
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.clone())
            .collect();
        all.sort_by(|a, b| a.requisition_number.cmp(&b.requisition_number));
        all
    }

    /// Replaces the line items while the requisition is still a draft or awaiting approval.
    #[instrument(skip(self, lines))]
    pub fn update_lines(
        &self,
        id: Uuid,
        lines: Vec<RequisitionLine>,
    ) -> Result<PurchaseRequisition, ServiceError> {
        self.validate_lines(&lines)?;
        self.mutate(id, |requisition| {
            if !requisition.status.is_editable() {
                return Err(ServiceError::PreconditionFailed(format!(
                    "requisition {} is {} and its lines can no longer change",
                    requisition.requisition_number, requisition.status
                )));
            }
            requisition.lines = lines;
            Ok(requisition.clone())
        })
    }

    /// Approves a pending requisition on behalf of `approver`.
    #[instrument(skip(self))]
    pub fn approve(&self, id: Uuid, approver: &str) -> Result<RequisitionTransition, ServiceError> {
        self.apply_transition(id, RequisitionStatus::Approved, Some(approver))
    }

    /// Moves the requisition to `target`. Entering `Received` posts ledger receipts.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        id: Uuid,
        target: RequisitionStatus,
    ) -> Result<RequisitionTransition, ServiceError> {
        self.apply_transition(id, target, None)
    }

    fn apply_transition(
        &self,
        id: Uuid,
        target: RequisitionStatus,
        approver: Option<&str>,
    ) -> Result<RequisitionTransition, ServiceError> {
        let outcome = self.mutate(id, |requisition| {
            let previous = requisition.status;
            if let Err(e) = self.check_guards(requisition, target, approver) {
                error!(
                    requisition_number = %requisition.requisition_number,
                    from = %previous,
                    to = %target,
                    "Requisition transition rejected: {}",
                    e
                );
                return Err(e);
            }

            let now = self.clock.now();
            let mut receipts = None;
            match target {
                RequisitionStatus::Approved => {
                    requisition.approver = approver.map(|a| a.trim().to_string());
                    requisition.approved_at = Some(now);
                }
                RequisitionStatus::Received => {
                    requisition.received_at = Some(now);
                    receipts = Some(self.inventory.post_receipt(requisition));
                }
                RequisitionStatus::Draft => {
                    requisition.approver = None;
                    requisition.approved_at = None;
                }
                _ => {}
            }
            requisition.status = target;

            Ok(RequisitionTransition {
                requisition: requisition.clone(),
                previous_status: previous,
                receipts,
            })
        })?;

        metrics::counter!("fleet_repair.requisitions.transitions", 1);
        info!(
            requisition_number = %outcome.requisition.requisition_number,
            from = %outcome.previous_status,
            to = %target,
            "Requisition status changed"
        );
        events::publish(
            &self.event_sender,
            Event::RequisitionStatusChanged {
                requisition_id: id,
                old_status: outcome.previous_status,
                new_status: target,
            },
        );
        Ok(outcome)
    }

    fn check_guards(
        &self,
        requisition: &PurchaseRequisition,
        target: RequisitionStatus,
        approver: Option<&str>,
    ) -> Result<(), ServiceError> {
        let current = requisition.status;
        if !current.can_transition_to(target) {
            return Err(ServiceError::PreconditionFailed(format!(
                "requisition {} cannot move from {} to {}",
                requisition.requisition_number, current, target
            )));
        }
        match target {
            RequisitionStatus::PendingApproval if requisition.lines.is_empty() => {
                Err(ServiceError::PreconditionFailed(format!(
                    "requisition {} has no lines to submit",
                    requisition.requisition_number
                )))
            }
            RequisitionStatus::Approved
                if approver.map(|a| a.trim().is_empty()).unwrap_or(true) =>
            {
                Err(ServiceError::PreconditionFailed(format!(
                    "requisition {} needs an approver",
                    requisition.requisition_number
                )))
            }
            RequisitionStatus::Cancelled => {
                let label = format!("cancel requisition {}", requisition.requisition_number);
                if self.confirmation.confirm(&label) {
                    Ok(())
                } else {
                    Err(ServiceError::PreconditionFailed(format!(
                        "cancellation of {} was not confirmed",
                        requisition.requisition_number
                    )))
                }
            }
            _ => Ok(()),
        }
    }

    /// Removes a draft or cancelled requisition after confirmation.
    #[instrument(skip(self))]
    pub fn delete(&self, id: Uuid) -> Result<PurchaseRequisition, ServiceError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let requisition = self.get(id)?;
        if !matches!(
            requisition.status,
            RequisitionStatus::Draft | RequisitionStatus::Cancelled
        ) {
            return Err(ServiceError::PreconditionFailed(format!(
                "requisition {} is {}; only drafts and cancelled requisitions can be deleted",
                requisition.requisition_number, requisition.status
            )));
        }
        let label = format!("delete requisition {}", requisition.requisition_number);
        if !self.confirmation.confirm(&label) {
            return Err(ServiceError::PreconditionFailed(format!(
                "deletion of {} was not confirmed",
                requisition.requisition_number
            )));
        }
        self.requisitions.remove(&id);
        self.locks.remove(&id);
        info!(requisition_number = %requisition.requisition_number, "Requisition deleted");
        Ok(requisition)
    }

    /// Stock references are resolved at receipt time; unknown items are skipped there.
    fn validate_lines(&self, lines: &[RequisitionLine]) -> Result<(), ServiceError> {
        for (index, line) in lines.iter().enumerate() {
            line.validate().map_err(|e| match ServiceError::from(e) {
                ServiceError::ValidationError(msg) => {
                    ServiceError::ValidationError(format!("lines[{}]: {}", index, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn mutate<T>(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut PurchaseRequisition) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut requisition = self.get(id)?;
        let result = change(&mut requisition)?;
        self.requisitions.insert(id, requisition);
        Ok(result)
    }
}
