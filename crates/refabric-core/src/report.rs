//! Accumulating validation reports
//!
//! The validator and transformer record findings instead of failing, so a
//! caller can decide pass/fail policy while still surfacing warnings.

use serde::Serialize;

/// Severity of a finding. Errors block deployment; warnings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A single finding, anchored to the activity it concerns when known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    pub message: String,
}

impl ValidationFinding {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            activity: None,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            activity: None,
            message: message.into(),
        }
    }

    pub fn for_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }
}

impl std::fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };
        match &self.activity {
            Some(activity) => write!(f, "{severity} [{activity}]: {}", self.message),
            None => write!(f, "{severity}: {}", self.message),
        }
    }
}

/// Findings accumulated for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub pipeline: String,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            findings: Vec::new(),
        }
    }

    pub fn push(&mut self, finding: ValidationFinding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = ValidationFinding>) {
        self.findings.extend(findings);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.findings.is_empty() {
            return write!(f, "pipeline `{}`: clean", self.pipeline);
        }
        writeln!(
            f,
            "pipeline `{}`: {} finding(s)",
            self.pipeline,
            self.findings.len()
        )?;
        for finding in &self.findings {
            writeln!(f, "  {finding}")?;
        }
        Ok(())
    }
}
