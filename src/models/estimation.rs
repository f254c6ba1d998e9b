use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EstimationStatus {
    Active,
    Completed,
    Failed,
}

/// One versioned prediction of when a repair starts and finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationAttempt {
    pub sequence: u32,
    pub created_at: NaiveDateTime,
    pub estimated_start: NaiveDateTime,
    pub estimated_end: NaiveDateTime,
    pub estimated_hours: Decimal,
    pub status: EstimationStatus,
    pub failure_reason: Option<String>,
    pub reasoning: Option<String>,
}

/// Ordered, never-empty list of estimation attempts for one work order.
///
/// At most one attempt is `Active`; sequence numbers only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EstimationAttempt>", into = "Vec<EstimationAttempt>")]
pub struct EstimationLedger {
    attempts: Vec<EstimationAttempt>,
}

/// Result of closing out the ledger when a work order completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub completed_sequence: u32,
    pub newly_failed: usize,
    pub already_final: bool,
}

impl EstimationLedger {
    /// Opens the ledger with attempt #1 in `Active` status.
    pub fn open(
        created_at: NaiveDateTime,
        estimated_start: NaiveDateTime,
        estimated_end: NaiveDateTime,
        estimated_hours: Decimal,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            attempts: vec![EstimationAttempt {
                sequence: 1,
                created_at,
                estimated_start,
                estimated_end,
                estimated_hours,
                status: EstimationStatus::Active,
                failure_reason: None,
                reasoning,
            }],
        }
    }

    pub fn attempts(&self) -> &[EstimationAttempt] {
        &self.attempts
    }

    pub fn active(&self) -> Option<&EstimationAttempt> {
        self.attempts
            .iter()
            .find(|a| a.status == EstimationStatus::Active)
    }

    pub fn completed(&self) -> Option<&EstimationAttempt> {
        self.attempts
            .iter()
            .find(|a| a.status == EstimationStatus::Completed)
    }

    /// Attempt with the highest sequence number.
    pub fn latest(&self) -> &EstimationAttempt {
        // Non-empty by construction; index 0 always exists.
        self.attempts
            .iter()
            .max_by_key(|a| a.sequence)
            .unwrap_or(&self.attempts[0])
    }

    /// Edits the open attempt in place. No new sequence number is issued.
    pub fn revise_active(
        &mut self,
        estimated_start: NaiveDateTime,
        estimated_end: NaiveDateTime,
        estimated_hours: Decimal,
    ) -> Result<&EstimationAttempt, ServiceError> {
        let active = self
            .attempts
            .iter_mut()
            .find(|a| a.status == EstimationStatus::Active)
            .ok_or_else(|| {
                ServiceError::PreconditionFailed(
                    "no active estimation attempt to revise".to_string(),
                )
            })?;
        active.estimated_start = estimated_start;
        active.estimated_end = estimated_end;
        active.estimated_hours = estimated_hours;
        Ok(active)
    }

    /// Fails the active attempt and opens the next sequence number.
    pub fn supersede_active(
        &mut self,
        failure_reason: String,
        created_at: NaiveDateTime,
        estimated_start: NaiveDateTime,
        estimated_end: NaiveDateTime,
        estimated_hours: Decimal,
        reasoning: Option<String>,
    ) -> Result<&EstimationAttempt, ServiceError> {
        let next_sequence = self.latest().sequence + 1;
        let active = self
            .attempts
            .iter_mut()
            .find(|a| a.status == EstimationStatus::Active)
            .ok_or_else(|| {
                ServiceError::PreconditionFailed(
                    "no active estimation attempt to supersede".to_string(),
                )
            })?;
        active.status = EstimationStatus::Failed;
        active.failure_reason = Some(failure_reason);

        self.attempts.push(EstimationAttempt {
            sequence: next_sequence,
            created_at,
            estimated_start,
            estimated_end,
            estimated_hours,
            status: EstimationStatus::Active,
            failure_reason: None,
            reasoning,
        });
        Ok(self.latest())
    }

    /// Marks the winning attempt `Completed` and every other attempt `Failed`.
    ///
    /// The winner is an attempt already `Completed` if one exists, else the
    /// `Active` attempt, else the highest sequence. Safe to call repeatedly.
    pub fn finalize(&mut self) -> FinalizeOutcome {
        let already_final = self.completed().is_some();
        let winner = self
            .completed()
            .or_else(|| self.active())
            .map(|a| a.sequence)
            .unwrap_or_else(|| self.latest().sequence);

        let mut newly_failed = 0;
        for attempt in self.attempts.iter_mut() {
            if attempt.sequence == winner {
                attempt.status = EstimationStatus::Completed;
            } else if attempt.status != EstimationStatus::Failed {
                attempt.status = EstimationStatus::Failed;
                if attempt.failure_reason.is_none() {
                    attempt.failure_reason =
                        Some(format!("superseded by attempt #{} at completion", winner));
                }
                newly_failed += 1;
            }
        }

        FinalizeOutcome {
            completed_sequence: winner,
            newly_failed,
            already_final,
        }
    }
}

impl TryFrom<Vec<EstimationAttempt>> for EstimationLedger {
    type Error = String;

    fn try_from(attempts: Vec<EstimationAttempt>) -> Result<Self, Self::Error> {
        if attempts.is_empty() {
            return Err("estimation ledger must contain at least one attempt".to_string());
        }
        let active = attempts
            .iter()
            .filter(|a| a.status == EstimationStatus::Active)
            .count();
        if active > 1 {
            return Err(format!(
                "estimation ledger has {} active attempts; at most one allowed",
                active
            ));
        }
        let completed = attempts
            .iter()
            .filter(|a| a.status == EstimationStatus::Completed)
            .count();
        if completed > 1 {
            return Err(format!(
                "estimation ledger has {} completed attempts; at most one allowed",
                completed
            ));
        }
        if completed == 1 && active == 1 {
            return Err(
                "estimation ledger cannot hold a completed and an active attempt".to_string(),
            );
        }
        let mut sequences: Vec<u32> = attempts.iter().map(|a| a.sequence).collect();
        sequences.sort_unstable();
        sequences.dedup();
        if sequences.len() != attempts.len() || sequences.first() == Some(&0) {
            return Err("estimation attempt sequences must be unique and 1-based".to_string());
        }
        Ok(Self { attempts })
    }
}

impl From<EstimationLedger> for Vec<EstimationAttempt> {
    fn from(ledger: EstimationLedger) -> Self {
        ledger.attempts
    }
}
