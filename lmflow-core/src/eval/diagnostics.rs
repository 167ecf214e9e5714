//! Run diagnostics
//!
//! Collects the messages a run reports to its user, mirrors each one to
//! `tracing`, and summarizes warnings and errors at the end of the run.

use std::fmt;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single diagnostic message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.push(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{}", message);
        self.push(Severity::Error, message);
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn messages(&self, severity: Severity) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |d| d.severity == severity)
            .map(|d| d.message.as_str())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages(severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    /// Warning and error summary
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for (severity, singular, plural) in [
            (Severity::Warning, "warning", "warnings"),
            (Severity::Error, "error", "errors"),
        ] {
            let count = self.count(severity);
            if count == 0 {
                lines.push(format!("No {}.", plural));
                continue;
            }
            lines.push(format!("{} {}:", count, pluralize(count, singular, plural)));
            lines.extend(self.messages(severity).map(|m| format!("  {}", m)));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

pub(crate) fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.summary(), "No warnings.\nNo errors.");
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_summary_lists_messages() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.info("Loaded 3 test cases");
        diagnostics.warning("Case a failed");
        diagnostics.error("Cannot open models.yaml");
        diagnostics.error("Run aborted");

        assert_eq!(
            diagnostics.summary(),
            "1 warning:\n  Case a failed\n2 errors:\n  Cannot open models.yaml\n  Run aborted"
        );
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.count(Severity::Info), 1);
        assert_eq!(diagnostics.entries().len(), 4);
    }
}
