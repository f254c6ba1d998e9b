//! Fleet Repair core library
//!
//! Tracks vehicle repair work orders through their lifecycle, estimates finish
//! times against the shop's business calendar, and keeps an idempotent parts
//! ledger in step with work-order completion and purchase receipts.
//!
//! Hosts build everything through [`services::AppServices::build`], passing the
//! capabilities in [`collaborators::Collaborators`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;

pub mod prelude {
    pub use crate::collaborators::*;
    pub use crate::config::{init_tracing, load_config, AppConfig, AppConfigError};
    pub use crate::errors::ServiceError;
    pub use crate::events::{process_events, Event, EventSender};
    pub use crate::models::*;
    pub use crate::services::calendar::compute_finish;
    pub use crate::services::dispositions::DispositionReport;
    pub use crate::services::inventory::{LineWarning, PostingReport};
    pub use crate::services::numbering::{DocumentNumber, SequenceAllocator};
    pub use crate::services::procurement::RequisitionTransition;
    pub use crate::services::work_orders::TransitionOutcome;
    pub use crate::services::AppServices;
}
