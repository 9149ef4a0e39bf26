use std::fmt::Write as _;
use std::path::PathBuf;

use mdpdf_config::SeverityLevel;
use serde_json::json;

use crate::LintFinding;

/// Output flavours for lint reports.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LintFormat {
    #[default]
    Plain,
    Json,
}

/// Aggregated result of linting one or more files.
#[derive(Clone, Debug, Default)]
pub struct LintReport {
    pub files: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub findings: Vec<LintFinding>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl LintReport {
    pub(crate) fn finish(&mut self) {
        self.findings.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.line.cmp(&b.line))
                .then_with(|| a.rule.cmp(&b.rule))
        });
        let (errors, warnings) =
            self.findings
                .iter()
                .fold((0usize, 0usize), |mut acc, finding| {
                    match finding.severity {
                        SeverityLevel::Error => acc.0 += 1,
                        SeverityLevel::Warning => acc.1 += 1,
                        SeverityLevel::Ignore => {}
                    }
                    acc
                });
        self.error_count = errors;
        self.warning_count = warnings;
    }

    /// True when no error-level finding was produced and every file was read.
    pub fn passed(&self) -> bool {
        self.error_count == 0 && self.missing.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn render(&self, format: LintFormat) -> String {
        match format {
            LintFormat::Plain => self.render_plain(),
            LintFormat::Json => self.render_json(),
        }
    }

    fn render_plain(&self) -> String {
        let mut out = String::new();
        for path in &self.missing {
            let _ = writeln!(out, "Error: File not found: {}", path.display());
        }
        for path in &self.files {
            let findings: Vec<&LintFinding> = self
                .findings
                .iter()
                .filter(|finding| &finding.path == path)
                .collect();
            if findings.is_empty() {
                let _ = writeln!(out, "✔️ {}: No linting errors", path.display());
                continue;
            }

            let errors = findings
                .iter()
                .filter(|f| f.severity == SeverityLevel::Error)
                .count();
            let _ = writeln!(out, "\n❌ Markdown linting errors in {}:", path.display());
            for finding in &findings {
                match finding.severity {
                    SeverityLevel::Warning => {
                        let _ = writeln!(
                            out,
                            "  Line {} (warning): {}",
                            finding.line, finding.message
                        );
                    }
                    _ => {
                        let _ = writeln!(out, "  Line {}: {}", finding.line, finding.message);
                    }
                }
            }
            let warnings = findings.len() - errors;
            if warnings > 0 {
                let _ = writeln!(
                    out,
                    "\nFound {errors} error(s) and {warnings} warning(s)."
                );
            } else {
                let _ = writeln!(out, "\nFound {errors} error(s).");
            }
        }
        out
    }

    fn render_json(&self) -> String {
        let payload = json!({
            "files": self.files,
            "missing": self.missing,
            "error_count": self.error_count,
            "warning_count": self.warning_count,
            "findings": self
                .findings
                .iter()
                .map(|finding| {
                    json!({
                        "rule": finding.rule.as_str(),
                        "path": finding.path,
                        "line": finding.line,
                        "severity": finding.severity.as_str(),
                        "message": finding.message,
                    })
                })
                .collect::<Vec<_>>(),
        });
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    }
}
