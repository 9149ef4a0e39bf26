//! Markdown checks that catch constructs Pandoc's LaTeX path renders badly:
//! lists and tables glued to the preceding paragraph, bold text standing in
//! for headings, and non-ASCII glyphs inside code blocks.

mod report;
mod rules;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use mdpdf_config::{LintRule, LintSettings, SeverityLevel};
use thiserror::Error;

pub use report::{LintFormat, LintReport};

use rules::{executor_for, Document, RuleExecutor};

/// Single rule violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintFinding {
    pub rule: LintRule,
    pub path: PathBuf,
    pub line: usize,
    pub message: String,
    pub severity: SeverityLevel,
}

#[derive(Debug, Error)]
pub enum LintError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

struct ActiveRule {
    rule: LintRule,
    severity: SeverityLevel,
    executor: RuleExecutor,
}

/// Lint engine bound to a resolved rule set.
pub struct Linter<'a> {
    settings: &'a LintSettings,
    rules: Vec<ActiveRule>,
    /// Directory that ignore globs are relative to.
    root: Option<&'a Path>,
}

impl<'a> Linter<'a> {
    pub fn new(settings: &'a LintSettings) -> Self {
        let rules = settings
            .rules
            .iter()
            .filter_map(|rule| {
                let severity = settings.severity_for(*rule);
                if severity == SeverityLevel::Ignore {
                    return None;
                }
                Some(ActiveRule {
                    rule: *rule,
                    severity,
                    executor: executor_for(*rule),
                })
            })
            .collect();
        Linter {
            settings,
            rules,
            root: None,
        }
    }

    /// Match ignore globs against paths relative to `root`.
    pub fn with_root(mut self, root: &'a Path) -> Self {
        self.root = Some(root);
        self
    }

    /// Run every active rule over `contents`, reporting findings against `path`.
    pub fn check_str(&self, path: &Path, contents: &str) -> Vec<LintFinding> {
        let document = Document::new(contents);
        let relative = self.relative_to_root(path);
        let mut findings = Vec::new();
        for active in &self.rules {
            if self.settings.is_ignored(&relative, active.rule) {
                continue;
            }
            for finding in (active.executor)(&document) {
                findings.push(LintFinding {
                    rule: active.rule,
                    path: path.to_path_buf(),
                    line: finding.line,
                    message: finding.message,
                    severity: active.severity,
                });
            }
        }
        findings.sort_by(|a, b| a.line.cmp(&b.line).then_with(|| a.rule.cmp(&b.rule)));
        findings
    }

    /// Lint each file in `paths` once. Missing files are recorded on the
    /// report rather than aborting the run.
    pub fn check_paths(&self, paths: &[PathBuf]) -> Result<LintReport, LintError> {
        let mut report = LintReport::default();
        let mut seen = HashSet::new();
        for path in paths {
            if !seen.insert(path) {
                continue;
            }
            let contents = match fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    report.missing.push(path.clone());
                    continue;
                }
                Err(source) => {
                    return Err(LintError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            };
            report.files.push(path.clone());
            report.findings.extend(self.check_str(path, &contents));
        }
        report.finish();
        Ok(report)
    }

    fn relative_to_root<'p>(&self, path: &'p Path) -> Cow<'p, Path> {
        let Some(root) = self.root else {
            return Cow::Owned(normalize(path));
        };
        let joined = root.join(path);
        let absolute = fs::canonicalize(&joined).unwrap_or_else(|_| normalize(&joined));
        match absolute.strip_prefix(root) {
            Ok(relative) => Cow::Owned(relative.to_path_buf()),
            Err(_) => Cow::Borrowed(path),
        }
    }
}

/// Drop `.` components and fold `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use globset::Glob;
    use mdpdf_config::{ConfigSource, ConfigSourceKind, LintIgnore, LintIgnoreRules, LintMode};

    fn settings(rules: &[LintRule]) -> LintSettings {
        LintSettings {
            mode: LintMode::Builtin,
            interpreter: None,
            rules: rules.to_vec(),
            severity: HashMap::new(),
            severity_wildcard: None,
            ignore: Vec::new(),
        }
    }

    #[test]
    fn ignored_severity_disables_rule() {
        let mut settings = settings(&[LintRule::ListSpacing, LintRule::TableSpacing]);
        settings
            .severity
            .insert(LintRule::ListSpacing, SeverityLevel::Ignore);

        let linter = Linter::new(&settings);
        let findings = linter.check_str(Path::new("doc.md"), "Text\n- item\nMore\n| a |\n");

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, LintRule::TableSpacing);
    }

    #[test]
    fn findings_sorted_by_line_then_rule() {
        let settings = settings(LintRule::ALL);
        let linter = Linter::new(&settings);
        let findings = linter.check_str(
            Path::new("doc.md"),
            "**Plan**\nSteps follow\n- step\n```\n→\n```\nText\n| x |\n",
        );

        let order: Vec<(usize, LintRule)> = findings.iter().map(|f| (f.line, f.rule)).collect();
        assert_eq!(
            order,
            vec![
                (1, LintRule::BoldHeading),
                (3, LintRule::ListSpacing),
                (5, LintRule::CodeUnicode),
                (8, LintRule::TableSpacing),
            ]
        );
    }

    fn ignoring_drafts() -> LintSettings {
        let mut settings = settings(&[LintRule::ListSpacing]);
        settings.ignore.push(LintIgnore {
            pattern: "drafts/**".into(),
            matcher: Glob::new("drafts/**").expect("glob").compile_matcher(),
            rules: LintIgnoreRules::All,
            origin: ConfigSource {
                kind: ConfigSourceKind::Local,
                path: None,
                base_dir: PathBuf::from("/repo"),
            },
        });
        settings
    }

    #[test]
    fn ignore_globs_match_paths_under_the_root() {
        let settings = ignoring_drafts();
        let linter = Linter::new(&settings).with_root(Path::new("/repo"));
        let glued = "Intro\n- item\n";

        assert!(linter
            .check_str(Path::new("/repo/drafts/plan.md"), glued)
            .is_empty());
        assert!(linter
            .check_str(Path::new("./drafts/plan.md"), glued)
            .is_empty());
        let kept = linter.check_str(Path::new("/elsewhere/drafts/plan.md"), glued);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, PathBuf::from("/elsewhere/drafts/plan.md"));
    }

    #[test]
    fn leading_dot_segment_does_not_defeat_ignores_without_root() {
        let settings = ignoring_drafts();
        let linter = Linter::new(&settings);

        assert!(linter
            .check_str(Path::new("./drafts/plan.md"), "Intro\n- item\n")
            .is_empty());
    }
}
