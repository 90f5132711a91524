//! Intake report types for structured document screening results.
//!
//! The report is displayed by `langspan inspect`, and attached to
//! [`LangspanError::IntakeRejected`](crate::error::LangspanError) when a
//! document is refused.

use std::fmt;

use serde::Serialize;

use super::DocumentKind;

/// The result of screening one document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IntakeReport {
    /// Detected document kind, `None` when unsupported.
    pub kind: Option<DocumentKind>,

    /// Size of the document in bytes.
    pub byte_len: u64,

    /// Lowercase hex SHA-256 of the document bytes.
    pub fingerprint: String,

    /// Page count, when the document could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,

    /// All issues found during screening.
    pub issues: Vec<IntakeIssue>,
}

impl IntakeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: IntakeIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns true if there are no errors or warnings.
    pub fn is_ok_strict(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

impl fmt::Display for IntakeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            Some(kind) => kind.to_string(),
            None => "unsupported".to_string(),
        };
        writeln!(f, "Document: {} ({} bytes)", kind, self.byte_len)?;
        writeln!(f, "SHA-256:  {}", self.fingerprint)?;
        if let Some(pages) = self.pages {
            writeln!(f, "Pages:    {}", pages)?;
        }
        writeln!(f)?;

        if self.issues.is_empty() {
            return writeln!(f, "Intake passed: no issues found");
        }

        writeln!(
            f,
            "Intake completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single intake issue (error or warning).
#[derive(Clone, Debug, Serialize)]
pub struct IntakeIssue {
    pub severity: Severity,

    /// A stable code for the issue type.
    pub code: IssueCode,

    /// A human-readable description of the issue.
    pub message: String,

    /// Where in the document the issue was found.
    pub context: IssueContext,
}

impl IntakeIssue {
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for IntakeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

/// The severity of an intake issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Processing can continue but results may be degraded.
    Warning,
    /// The document is refused.
    Error,
}

/// A stable code identifying the type of intake issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    // File-level issues
    /// Neither a PDF nor text.
    UnsupportedFileType,
    /// Zero bytes.
    EmptyDocument,
    /// Larger than the configured limit.
    DocumentTooLarge,
    /// Text that is not valid UTF-8; decoded lossily.
    InvalidUtf8,

    // PDF structure issues
    /// lopdf could not parse the file.
    PdfUnreadable,
    /// The document is encrypted.
    PdfEncrypted,
    /// The page tree is empty.
    PdfNoPages,

    // Active content
    /// A JavaScript action or name tree is present.
    EmbeddedJavaScript,
    /// The document carries file attachments.
    EmbeddedFiles,
}

/// Where an intake issue was found.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum IssueContext {
    Document,
    /// A PDF indirect object.
    Object { id: u32, generation: u16 },
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Document => write!(f, "document"),
            IssueContext::Object { id, generation } => write!(f, "object {} {}", id, generation),
        }
    }
}
