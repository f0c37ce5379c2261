use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::WindowSize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    #[serde(default)]
    pub number: u32,
    /// Process type from the Procfile, e.g. `web` or `worker`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: String,
}

impl Process {
    /// Width of the widest process type, for aligning log prefixes
    pub fn name_width(processes: &[Process]) -> usize {
        processes.iter().map(|p| p.kind.len()).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessCreateOpts {
    pub command: String,
    #[serde(rename = "plan_id", skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessResizeOpts {
    pub height: u16,
    pub width: u16,
}

impl From<WindowSize> for ProcessResizeOpts {
    fn from(size: WindowSize) -> Self {
        Self {
            height: size.rows,
            width: size.cols,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Options shared by all log streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStreamOpts {
    /// Keep the stream open for new lines
    pub follow: bool,
    /// Only the last N lines of history
    pub tail: Option<u32>,
    /// Only lines logged after this instant
    pub since: Option<DateTime<Utc>>,
}

impl LogStreamOpts {
    pub fn follow() -> Self {
        Self {
            follow: true,
            ..Self::default()
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if self.follow {
            query.push(("follow", "true".to_string()));
        }
        if let Some(tail) = self.tail.filter(|&t| t > 0) {
            query.push(("tail", tail.to_string()));
        }
        if let Some(since) = self.since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        query
    }
}
