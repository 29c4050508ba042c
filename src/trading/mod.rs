//! Trading logic: reconciliation, sync cycles, scheduling.

mod config;
mod reconciler;
mod scheduler;
mod sync;

pub use config::SyncConfig;
pub use reconciler::{reconcile, DUST_THRESHOLD};
pub use scheduler::{cycle_span, log_outcome, Scheduler, TriggerOutcome, TriggerSource};
pub use sync::{CycleReport, InstructionResult, SkipReason, SyncOrchestrator, SyncOutcome};
