//! Actions on run directories.
//!
//! Currently one action: reclaiming space held by files that are unchanged
//! since the previous run. See [`reclaim`].

pub mod reclaim;

pub use reclaim::{
    execute, plan, BatchReclaimResult, PlanDecision, PlanEntry, ReclaimConfig, ReclaimError,
    ReclaimOutcome, ReclaimPlan, ReclaimProgressCallback, CONFIRMATION_TOKEN,
};
