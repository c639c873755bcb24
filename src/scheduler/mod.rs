//! Evolution Scheduler
//!
//! Owns the queue of evolution tasks bound to the 24-hour execution
//! cycle, enforces the priority-preemption rule against host foreground
//! work, and persists every state transition synchronously.

mod queue;
mod state;

pub use queue::{
    can_transition, current_cycle_id, derive_priority, EvolutionScheduler, FixedForeground,
    ForegroundProbe, SchedulerError,
};
pub use state::{load_state, save_state, SchedulerState};
