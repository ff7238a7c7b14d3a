//! Construction-time issue reporting.
//!
//! The construction phase never fails by error or panic. Every invalid
//! configuration item is reported here as a timestamped record and the item
//! is skipped, so one bad team or binding cannot abort loading its siblings.
//! Callers treat a `None` return from a construct function as "issue already
//! reported, skip this item".
//!
//! Records render as a human-readable summary or serialize as JSON lines
//! for tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of configuration asset an issue is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// The floor itself (top-level configuration).
    Floor,
    /// A team / worker pool.
    Team,
    /// A managed object source or binding.
    ManagedObject,
    /// An administrator source or binding.
    Administrator,
    /// An office scope.
    Office,
    /// A unit of work.
    Work,
    /// A function within a work.
    Function,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetType::Floor => "FLOOR",
            AssetType::Team => "TEAM",
            AssetType::ManagedObject => "MANAGED_OBJECT",
            AssetType::Administrator => "ADMINISTRATOR",
            AssetType::Office => "OFFICE",
            AssetType::Work => "WORK",
            AssetType::Function => "FUNCTION",
        };
        write!(f, "{}", s)
    }
}

/// One reported configuration issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// When the issue was reported.
    pub ts: DateTime<Utc>,
    /// Asset kind the issue is scoped to.
    pub asset_type: AssetType,
    /// Name of the offending asset (team name, bound name, work name).
    pub asset_name: String,
    /// What is wrong and, where possible, how to fix it.
    pub message: String,
    /// Underlying cause reported by pluggable source code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Sink collecting every issue reported during one construction run.
#[derive(Debug, Default)]
pub struct Issues {
    records: Vec<Issue>,
}

impl Issues {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an issue against a named asset.
    pub fn add_issue(
        &mut self,
        asset_type: AssetType,
        asset_name: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.records.push(Issue {
            ts: Utc::now(),
            asset_type,
            asset_name: asset_name.into(),
            message: message.into(),
            cause: None,
        });
    }

    /// Report an issue carrying the causing error from source code.
    pub fn add_issue_with_cause(
        &mut self,
        asset_type: AssetType,
        asset_name: impl Into<String>,
        message: impl Into<String>,
        cause: &anyhow::Error,
    ) {
        self.records.push(Issue {
            ts: Utc::now(),
            asset_type,
            asset_name: asset_name.into(),
            message: message.into(),
            cause: Some(format!("{:#}", cause)),
        });
    }

    /// Whether any issue has been reported.
    pub fn has_issues(&self) -> bool {
        !self.records.is_empty()
    }

    /// Number of reported issues.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All reported records, in report order.
    pub fn records(&self) -> &[Issue] {
        &self.records
    }

    /// Issues reported against one asset name.
    pub fn for_asset(&self, asset_name: &str) -> Vec<&Issue> {
        self.records
            .iter()
            .filter(|r| r.asset_name == asset_name)
            .collect()
    }

    /// Render a human-readable summary, one line per issue.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&format!(
                "  {} {}: {}",
                record.asset_type, record.asset_name, record.message
            ));
            if let Some(cause) = &record.cause {
                out.push_str(&format!(" (cause: {})", cause));
            }
            out.push('\n');
        }
        out
    }

    /// Serialize all records as newline-delimited JSON.
    pub fn to_json_lines(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            // Issue contains only serializable fields, so this cannot fail.
            if let Ok(line) = serde_json::to_string(record) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}
