use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One line of a suite report, appended when a probe settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ReportEntry {
    pub status: TestStatus,
    pub name: String,
    /// Payload the probe resolved with.
    #[ts(type = "any")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    /// Display form of the rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured data carried by the rejection, if any.
    #[ts(type = "any")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ReportEntry {
    pub fn passed(name: impl Into<String>, results: serde_json::Value) -> Self {
        Self {
            status: TestStatus::Passed,
            name: name.into(),
            results: Some(results),
            message: None,
            details: None,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            status: TestStatus::Failed,
            name: name.into(),
            results: None,
            message: Some(message.into()),
            details,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

/// Ordered list of entries, in probe execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(transparent)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|entry| entry.is_failed())
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

/// Envelope written by the command line runner.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub passed: bool,
    pub report: Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_entry_serializes_without_empty_fields() {
        let entry = ReportEntry::failed("Camera", "Timed out", None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "failed", "name": "Camera", "message": "Timed out"})
        );
    }

    #[test]
    fn report_is_a_plain_list() {
        let mut report = Report::default();
        report.push(ReportEntry::passed("Mic", serde_json::json!({"rms": 0.1})));
        report.push(ReportEntry::failed("Nat", "no srflx", None));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.is_array());
        assert_eq!(report.failed_count(), 1);
    }
}
