//! Diagnostics sink
//!
//! Collects line-numbered warnings and errors during a run and forwards each
//! one to the `log` facade. The end-of-run summary counts messages by
//! severity and deduplicates the lines they point at.

use crate::msr::types::InputLine;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One reported message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: InputLine,
    pub message: String,
}

/// Accumulated diagnostics of one conversion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, line: InputLine, message: impl Into<String>) {
        let message = message.into();
        log::info!("line {}: {}", line, message);
        self.push(Severity::Info, line, message);
    }

    pub fn warning(&mut self, line: InputLine, message: impl Into<String>) {
        let message = message.into();
        log::warn!("line {}: {}", line, message);
        self.push(Severity::Warning, line, message);
    }

    pub fn error(&mut self, line: InputLine, message: impl Into<String>) {
        let message = message.into();
        log::error!("line {}: {}", line, message);
        self.push(Severity::Error, line, message);
    }

    fn push(&mut self, severity: Severity, line: InputLine, message: String) {
        self.entries.push(Diagnostic {
            severity,
            line,
            message,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count_by_severity(Severity::Error) > 0
    }

    /// Distinct input lines that produced at least one message of `severity`
    pub fn lines_with(&self, severity: Severity) -> Vec<InputLine> {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.line)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// One-paragraph report for the end of a run
    pub fn summary(&self) -> String {
        let warnings = self.lines_with(Severity::Warning);
        let errors = self.lines_with(Severity::Error);
        let mut summary = format!(
            "{} warning(s), {} error(s)",
            self.count_by_severity(Severity::Warning),
            self.count_by_severity(Severity::Error)
        );
        if !warnings.is_empty() {
            summary.push_str(&format!("\nwarnings on lines: {}", join_lines(&warnings)));
        }
        if !errors.is_empty() {
            summary.push_str(&format!("\nerrors on lines: {}", join_lines(&errors)));
        }
        summary
    }
}

fn join_lines(lines: &[InputLine]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_deduplicates_lines() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warning(12, "redundant clef");
        diagnostics.warning(12, "redundant key");
        diagnostics.warning(3, "voice overflow");
        diagnostics.error(40, "unmatched repeat end");
        diagnostics.info(1, "part created");

        assert_eq!(diagnostics.count_by_severity(Severity::Warning), 3);
        assert_eq!(diagnostics.lines_with(Severity::Warning), vec![3, 12]);
        assert!(diagnostics.has_errors());

        let summary = diagnostics.summary();
        assert!(summary.starts_with("3 warning(s), 1 error(s)"));
        assert!(summary.contains("warnings on lines: 3, 12"));
        assert!(summary.contains("errors on lines: 40"));
    }
}
