//! Process-handle abstraction.
//!
//! Workload services only ever see [`ProcessHandle`]s, so tests can hand them
//! a deterministic process table. The real implementation snapshots the
//! `sysinfo` process list; lookups on a handle can still fail when the
//! snapshot raced with process exit and a field was unavailable.

use std::sync::Arc;
use sysinfo::{ProcessesToUpdate, System, Users};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("listing host processes failed: {0}")]
    Listing(String),

    #[error("process {pid}: {field} unavailable")]
    FieldUnavailable { pid: u32, field: &'static str },
}

/// A single observed process.
pub trait ProcessHandle: Send + Sync {
    fn pid(&self) -> u32;
    fn name(&self) -> Result<String, ProcessError>;
    fn username(&self) -> Result<String, ProcessError>;
    fn cmdline(&self) -> Result<Vec<String>, ProcessError>;
    fn environ(&self) -> Result<Vec<String>, ProcessError>;
}

/// Enumerates the host process table.
pub trait ProcessLister: Send + Sync {
    fn list_processes(&self) -> Result<Vec<Arc<dyn ProcessHandle>>, ProcessError>;
}

/// Point-in-time copy of one process row.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: Option<String>,
    pub username: Option<String>,
    pub cmdline: Option<Vec<String>>,
    pub environ: Option<Vec<String>>,
}

impl ProcessHandle for ProcessSnapshot {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> Result<String, ProcessError> {
        self.name.clone().ok_or(ProcessError::FieldUnavailable {
            pid: self.pid,
            field: "name",
        })
    }

    fn username(&self) -> Result<String, ProcessError> {
        self.username.clone().ok_or(ProcessError::FieldUnavailable {
            pid: self.pid,
            field: "username",
        })
    }

    fn cmdline(&self) -> Result<Vec<String>, ProcessError> {
        self.cmdline.clone().ok_or(ProcessError::FieldUnavailable {
            pid: self.pid,
            field: "cmdline",
        })
    }

    fn environ(&self) -> Result<Vec<String>, ProcessError> {
        self.environ.clone().ok_or(ProcessError::FieldUnavailable {
            pid: self.pid,
            field: "environ",
        })
    }
}

/// `sysinfo`-backed lister.
#[derive(Debug, Default)]
pub struct SystemProcessLister;

impl ProcessLister for SystemProcessLister {
    fn list_processes(&self) -> Result<Vec<Arc<dyn ProcessHandle>>, ProcessError> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let users = Users::new_with_refreshed_list();

        let mut handles: Vec<Arc<dyn ProcessHandle>> = Vec::new();
        for (pid, process) in system.processes() {
            let username = process
                .user_id()
                .and_then(|uid| users.get_user_by_id(uid))
                .map(|u| u.name().to_string());
            let snapshot = ProcessSnapshot {
                pid: pid.as_u32(),
                name: Some(process.name().to_string_lossy().into_owned()),
                username,
                cmdline: Some(
                    process
                        .cmd()
                        .iter()
                        .map(|s| s.to_string_lossy().into_owned())
                        .collect(),
                ),
                environ: Some(
                    process
                        .environ()
                        .iter()
                        .map(|s| s.to_string_lossy().into_owned())
                        .collect(),
                ),
            };
            handles.push(Arc::new(snapshot));
        }
        Ok(handles)
    }
}
