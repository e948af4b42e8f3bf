//! Host metadata reported next to the timeline.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub kernel: String,
    pub test_time: String,
}

impl HostInfo {
    pub fn detect() -> Self {
        let hostname = std::fs::read_to_string("/proc/sys/kernel/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let kernel = std::fs::read_to_string("/proc/version")
            .ok()
            .and_then(|v| kernel_version(&v).map(ToString::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            hostname,
            kernel,
            test_time: format_timestamp(OffsetDateTime::now_utc()),
        }
    }
}

/// Third token of a `Linux version <release> ...` banner.
pub fn kernel_version(banner: &str) -> Option<&str> {
    banner.split_whitespace().nth(2)
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day]_[hour]:[minute]:[second]"))
        .unwrap_or_default()
}
