//! Capabilities the core consumes from its host: a clock, a holiday calendar,
//! a technician directory and a human confirmation gate.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use dashmap::DashSet;
use uuid::Uuid;

/// Source of the current shop-local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Provides the set of non-working dates.
pub trait HolidaySource: Send + Sync {
    fn holidays(&self) -> BTreeSet<NaiveDate>;
}

#[derive(Debug, Default, Clone)]
pub struct StaticHolidays(BTreeSet<NaiveDate>);

impl StaticHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self(dates.into_iter().collect())
    }
}

impl HolidaySource for StaticHolidays {
    fn holidays(&self) -> BTreeSet<NaiveDate> {
        self.0.clone()
    }
}

/// Lookup of technicians known to the host.
pub trait TechnicianDirectory: Send + Sync {
    fn exists(&self, technician_id: Uuid) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryTechnicianDirectory {
    technicians: DashSet<Uuid>,
}

impl InMemoryTechnicianDirectory {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let technicians = DashSet::new();
        for id in ids {
            technicians.insert(id);
        }
        Self { technicians }
    }

    pub fn register(&self, technician_id: Uuid) {
        self.technicians.insert(technician_id);
    }
}

impl TechnicianDirectory for InMemoryTechnicianDirectory {
    fn exists(&self, technician_id: Uuid) -> bool {
        self.technicians.contains(&technician_id)
    }
}

/// Human confirmation for destructive actions (cancel, delete).
///
/// Any `Fn(&str) -> bool` closure works as a gate.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, action_label: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, action_label: &str) -> bool {
        self(action_label)
    }
}

/// Gate for unattended contexts: every action is confirmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _action_label: &str) -> bool {
        true
    }
}

/// Bundle of host capabilities handed to [`AppServices::build`].
///
/// [`AppServices::build`]: crate::services::AppServices::build
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub holidays: Arc<dyn HolidaySource>,
    pub technicians: Arc<dyn TechnicianDirectory>,
    pub confirmation: Arc<dyn ConfirmationGate>,
}

impl Collaborators {
    pub fn new(
        clock: Arc<dyn Clock>,
        holidays: Arc<dyn HolidaySource>,
        technicians: Arc<dyn TechnicianDirectory>,
        confirmation: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            clock,
            holidays,
            technicians,
            confirmation,
        }
    }
}
