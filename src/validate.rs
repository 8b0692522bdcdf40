//! Bank health checks: broken references, malformed directives, dependency
//! cycles, missing core files and orphans.

use serde::{Deserialize, Serialize};

use crate::bank::MemoryBank;
use crate::document::DocumentStore;
use crate::links::{Link, LinkKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    BrokenLink,
    BrokenTransclusion,
    MissingSection,
    MalformedDirective,
    DependencyCycle,
    MissingRequiredDocument,
    OrphanDocument,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::BrokenLink => "broken_link",
            IssueCode::BrokenTransclusion => "broken_transclusion",
            IssueCode::MissingSection => "missing_section",
            IssueCode::MalformedDirective => "malformed_directive",
            IssueCode::DependencyCycle => "dependency_cycle",
            IssueCode::MissingRequiredDocument => "missing_required_document",
            IssueCode::OrphanDocument => "orphan_document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub document: String,
    /// 1-based line, when the issue points at a specific reference
    pub line: Option<usize>,
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when no error-severity issue was found.
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn with_code(&self, code: IssueCode) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.code == code)
    }

    fn push(
        &mut self,
        document: &str,
        line: Option<usize>,
        code: IssueCode,
        severity: Severity,
        message: String,
    ) {
        self.issues.push(ValidationIssue {
            document: document.to_string(),
            line,
            code,
            severity,
            message,
        });
    }
}

pub fn validate(bank: &MemoryBank) -> ValidationReport {
    let mut report = ValidationReport::default();
    let documents = bank.documents();

    for document in documents.iter() {
        let Some(parsed) = bank.parsed_links(&document.name) else {
            continue;
        };

        for link in parsed.all() {
            check_reference(&mut report, bank, link);
        }

        for warning in &parsed.warnings {
            report.push(
                &document.name,
                Some(warning.line),
                IssueCode::MalformedDirective,
                Severity::Warning,
                warning.message.clone(),
            );
        }
    }

    for cycle in bank.graph().detect_cycles() {
        let Some(first) = cycle.first() else {
            continue;
        };
        let mut path = cycle.clone();
        path.push(first.clone());
        report.push(
            first,
            None,
            IssueCode::DependencyCycle,
            Severity::Error,
            format!("dependency cycle: {}", path.join(" -> ")),
        );
    }

    for required in &bank.config().validation.required_documents {
        if !documents.contains(required) {
            report.push(
                required,
                None,
                IssueCode::MissingRequiredDocument,
                Severity::Warning,
                format!("core document {} is missing", required),
            );
        }
    }

    for orphan in bank.graph().stats().orphans {
        if documents.contains(&orphan) {
            report.push(
                &orphan,
                None,
                IssueCode::OrphanDocument,
                Severity::Info,
                format!("{} neither references nor is referenced by another document", orphan),
            );
        }
    }

    tracing::debug!(
        "Validation finished: {} errors, {} warnings",
        report.count(Severity::Error),
        report.count(Severity::Warning)
    );
    report
}

fn check_reference(report: &mut ValidationReport, bank: &MemoryBank, link: &Link) {
    let transclusion = link.kind == LinkKind::Transclusion;
    let Some(target) = bank.documents().get(&link.target) else {
        let (code, severity, what) = if transclusion {
            (IssueCode::BrokenTransclusion, Severity::Error, "includes")
        } else {
            (IssueCode::BrokenLink, Severity::Warning, "links to")
        };
        report.push(
            &link.source,
            Some(link.line),
            code,
            severity,
            format!("{} {} missing document {}", link.source, what, link.target),
        );
        return;
    };

    if let Some(section) = &link.target_section {
        if target.section(section).is_none() {
            let severity = if transclusion {
                Severity::Error
            } else {
                Severity::Warning
            };
            report.push(
                &link.source,
                Some(link.line),
                IssueCode::MissingSection,
                severity,
                format!("section '{}' not found in {}", section, link.target),
            );
        }
    }
}
