//! Agent binary internals: CLI, supervisor, recoverable routines, and the
//! per-workload services.

pub mod cli;
pub mod configure;
pub mod daemon;
pub mod recovery;
pub mod services;
