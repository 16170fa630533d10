// jobs/mod.rs — Background jobs and their run-status bookkeeping.

pub mod refresh;

pub use refresh::{
    get_run_status, run_refresh_cycle, run_refresh_loop, RunOutcome, RunStatus, REFRESH_JOB_NAME,
};
