use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::collaborators::{Clock, HolidaySource};
use crate::errors::ServiceError;
use crate::models::{EstimationAttempt, EstimationLedger, FinalizeOutcome, WorkOrder};
use crate::services::calendar;

/// Builds and maintains the estimation attempts of work orders, deriving every
/// estimated end from the business calendar.
#[derive(Clone)]
pub struct EstimationPlanner {
    clock: Arc<dyn Clock>,
    holidays: Arc<dyn HolidaySource>,
}

impl EstimationPlanner {
    pub fn new(clock: Arc<dyn Clock>, holidays: Arc<dyn HolidaySource>) -> Self {
        Self { clock, holidays }
    }

    /// Finish instant for `hours` of work starting at `start`.
    pub fn finish_for(&self, start: NaiveDateTime, hours: Decimal) -> NaiveDateTime {
        let hours = hours.to_f64().unwrap_or(0.0);
        calendar::compute_finish(start, hours, &self.holidays.holidays())
    }

    /// Opens the ledger with attempt #1. Used when a work order is created.
    pub fn start_estimation(
        &self,
        start: Option<NaiveDateTime>,
        hours: Decimal,
        reasoning: Option<String>,
    ) -> Result<EstimationLedger, ServiceError> {
        ensure_hours_in_range(hours)?;
        let now = self.clock.now();
        let start = start.unwrap_or(now);
        let end = self.finish_for(start, hours);
        Ok(EstimationLedger::open(now, start, end, hours, reasoning))
    }

    /// Revises the active attempt in place with a new start and hours.
    #[instrument(skip(self, work_order), fields(work_order_id = %work_order.id))]
    pub fn reestimate(
        &self,
        work_order: &mut WorkOrder,
        new_start: NaiveDateTime,
        new_hours: Decimal,
    ) -> Result<EstimationAttempt, ServiceError> {
        ensure_hours_in_range(new_hours)?;
        let end = self.finish_for(new_start, new_hours);
        let attempt = work_order
            .estimation
            .revise_active(new_start, end, new_hours)
            .map_err(|e| {
                warn!(order_number = %work_order.order_number, "Re-estimation rejected: {}", e);
                e
            })?
            .clone();

        info!(
            sequence = attempt.sequence,
            estimated_end = %attempt.estimated_end,
            "Estimation revised"
        );
        Ok(attempt)
    }

    /// Fails the active attempt with `reason` and opens the next one.
    #[instrument(skip(self, work_order, reasoning), fields(work_order_id = %work_order.id))]
    pub fn record_missed_deadline(
        &self,
        work_order: &mut WorkOrder,
        reason: &str,
        new_start: NaiveDateTime,
        new_hours: Decimal,
        reasoning: Option<String>,
    ) -> Result<(u32, EstimationAttempt), ServiceError> {
        ensure_hours_in_range(new_hours)?;
        if reason.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "a failure reason is required when a deadline is missed".to_string(),
            ));
        }
        let failed_sequence = work_order
            .estimation
            .active()
            .map(|a| a.sequence)
            .ok_or_else(|| {
                ServiceError::PreconditionFailed(format!(
                    "work order {} has no active estimation attempt",
                    work_order.order_number
                ))
            })?;

        let end = self.finish_for(new_start, new_hours);
        let attempt = work_order
            .estimation
            .supersede_active(
                reason.to_string(),
                self.clock.now(),
                new_start,
                end,
                new_hours,
                reasoning,
            )?
            .clone();

        info!(
            failed_sequence,
            new_sequence = attempt.sequence,
            "Missed deadline recorded"
        );
        Ok((failed_sequence, attempt))
    }

    /// Closes out the ledger at completion. Repeated calls change nothing.
    #[instrument(skip(self, work_order), fields(work_order_id = %work_order.id))]
    pub fn finalize(&self, work_order: &mut WorkOrder) -> FinalizeOutcome {
        let outcome = work_order.estimation.finalize();
        if !outcome.already_final {
            info!(
                completed_sequence = outcome.completed_sequence,
                newly_failed = outcome.newly_failed,
                "Estimation finalized"
            );
        }
        outcome
    }
}

/// Upper bound on a single estimate, roughly fifty years of full working days.
pub const MAX_ESTIMATED_HOURS: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

fn ensure_hours_in_range(hours: Decimal) -> Result<(), ServiceError> {
    if hours < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "estimated hours must not be negative, got {}",
            hours
        )));
    }
    if hours > MAX_ESTIMATED_HOURS {
        return Err(ServiceError::ValidationError(format!(
            "estimated_hours: must be at most {}, got {}",
            MAX_ESTIMATED_HOURS, hours
        )));
    }
    Ok(())
}
