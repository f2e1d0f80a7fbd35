//! PASS / FAIL decisions over comparison reports
//!
//! Incompatibilities always fail. CI mode additionally fails on any drift:
//! tables added or removed, or schemas that changed while staying compatible.
//! Outside CI mode drift is only reported as warnings.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::report::{CompareFilesReport, CompareReport};

/// Exit code for an invocation the tool could not make sense of
pub const EXIT_INVALID_INPUT: i32 = 2;

/// Final outcome of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Process exit code: 0 on PASS, 1 on FAIL
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Pass => 0,
            Verdict::Fail => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// A verdict with the reasons behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    /// Conditions that caused a FAIL
    pub failures: Vec<String>,
    /// Conditions reported without affecting the verdict
    pub warnings: Vec<String>,
}

impl Decision {
    fn from_findings(failures: Vec<String>, warnings: Vec<String>) -> Self {
        let verdict = if failures.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            verdict,
            failures,
            warnings,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Emit the findings and the verdict as log events
    pub fn log(&self) {
        for failure in &self.failures {
            error!("{}", failure);
        }
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        info!("Verdict: {}", self.verdict);
    }
}

/// Turns reports into decisions
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictPolicy {
    pub ci_mode: bool,
}

impl VerdictPolicy {
    pub fn new(ci_mode: bool) -> Self {
        Self { ci_mode }
    }

    /// Decide on a generation comparison
    pub fn evaluate(&self, report: &CompareReport) -> Decision {
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        if report.incompatibilities_total > 0 {
            failures.push(format!(
                "Incompatibilities: {} (key: {}, value: {}, envelope: {})",
                report.incompatibilities_total,
                report.key_incompatibilities_total,
                report.value_incompatibilities_total,
                report.envelope_incompatibilities_total
            ));
        }

        let mut drift = Vec::new();
        if !report.removed_tables.is_empty() {
            drift.push(format!(
                "Tables removed between CURRENT and NEXT: {}",
                join(&report.removed_tables)
            ));
        }
        if !report.added_tables.is_empty() {
            drift.push(format!(
                "Tables added between CURRENT and NEXT: {}",
                join(&report.added_tables)
            ));
        }
        if report.has_schema_changes_without_table_changes() {
            drift.push(format!(
                "Schema changes detected in {} table(s): {}",
                report.total_tables_with_changes,
                join(&report.tables_with_changes)
            ));
        } else if report.has_any_schema_changes {
            warnings.push(format!(
                "Schema changes detected in {} table(s): {}",
                report.total_tables_with_changes,
                join(&report.tables_with_changes)
            ));
        }

        if self.ci_mode {
            failures.extend(drift);
        } else {
            warnings.extend(drift);
        }

        Decision::from_findings(failures, warnings)
    }

    /// Decide on a file-to-file comparison
    pub fn evaluate_files(&self, report: &CompareFilesReport) -> Decision {
        let mut failures = Vec::new();
        let mut warnings = Vec::new();

        if !report.is_compatible {
            failures.push(format!(
                "Schemas are NOT compatible ({}): {} incompatibilities",
                report.compatibility_level, report.incompatibilities_total
            ));
        }

        if report.has_schema_changes {
            let message = if report.is_compatible {
                "Schemas are compatible but different".to_string()
            } else {
                "Schema changes detected between files".to_string()
            };
            if self.ci_mode {
                failures.push(format!("{} (CI mode)", message));
            } else {
                warnings.push(message);
            }
        }

        Decision::from_findings(failures, warnings)
    }
}

fn join<'a>(identifiers: impl IntoIterator<Item = &'a String>) -> String {
    identifiers
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
