use std::env;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysinfo::System;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// Who ran the report, where, and against what.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunIdentity {
    pub hostname: String,
    pub user: String,
    pub target: String,
}

pub fn collect_run_identity(target: &str) -> RunIdentity {
    RunIdentity {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        user: current_user(),
        target: target.to_string(),
    }
}

fn current_user() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .find_map(|key| env::var(key).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now_timestamp() -> String {
    format_timestamp(Local::now())
}
