use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use mdpdf_config::{LintMode, LintRule, LintSettings, SeverityLevel};
use mdpdf_lint::{LintFormat, Linter};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn all_rules() -> LintSettings {
    LintSettings {
        mode: LintMode::Builtin,
        interpreter: None,
        rules: LintRule::ALL.to_vec(),
        severity: HashMap::new(),
        severity_wildcard: None,
        ignore: Vec::new(),
    }
}

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

#[test]
fn clean_document_passes() {
    let temp = TempDir::new().expect("tempdir");
    let clean = write(
        &temp,
        "clean.md",
        "# Design\n\nIntro.\n\n- one\n- two\n\n| a | b |\n|---|---|\n",
    );

    let settings = all_rules();
    let report = Linter::new(&settings)
        .check_paths(&[clean.clone()])
        .expect("lint");

    assert!(report.passed());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.render(LintFormat::Plain),
        format!("✔️ {}: No linting errors\n", clean.display())
    );
}

#[test]
fn plain_output_lists_each_error() {
    let temp = TempDir::new().expect("tempdir");
    let doc = write(&temp, "design.md", "Overview\n- item\n");

    let settings = all_rules();
    let report = Linter::new(&settings).check_paths(&[doc.clone()]).expect("lint");

    assert!(!report.passed());
    assert_eq!(report.error_count, 1);
    assert_eq!(
        report.render(LintFormat::Plain),
        format!(
            "\n❌ Markdown linting errors in {}:\n  Line 2: Missing blank line before list (line 2). \
             Add a blank line before: - item\n\nFound 1 error(s).\n",
            doc.display()
        )
    );
}

#[test]
fn warnings_do_not_fail_the_report() {
    let temp = TempDir::new().expect("tempdir");
    let doc = write(&temp, "notes.md", "**Summary**\nShort text.\n");

    let mut settings = all_rules();
    settings
        .severity
        .insert(LintRule::BoldHeading, SeverityLevel::Warning);
    let report = Linter::new(&settings).check_paths(&[doc]).expect("lint");

    assert!(report.passed());
    assert_eq!(report.warning_count, 1);
    assert!(report
        .render(LintFormat::Plain)
        .contains("Line 1 (warning): Bold text used as header"));
}

#[test]
fn missing_files_fail_without_aborting() {
    let temp = TempDir::new().expect("tempdir");
    let present = write(&temp, "present.md", "# Fine\n");
    let absent = temp.path().join("absent.md");

    let settings = all_rules();
    let report = Linter::new(&settings)
        .check_paths(&[absent.clone(), present.clone()])
        .expect("lint");

    assert_eq!(report.missing, vec![absent.clone()]);
    assert_eq!(report.files, vec![present]);
    assert!(!report.passed());
    assert!(report
        .render(LintFormat::Plain)
        .starts_with(&format!("Error: File not found: {}", absent.display())));
}

#[test]
fn json_output_carries_rule_ids() {
    let temp = TempDir::new().expect("tempdir");
    let doc = write(&temp, "code.md", "Text\n\n```\n└── leaf\n```\n");

    let settings = all_rules();
    let report = Linter::new(&settings).check_paths(&[doc]).expect("lint");
    let value: serde_json::Value =
        serde_json::from_str(&report.render(LintFormat::Json)).expect("valid json");

    assert_eq!(value["error_count"], 1);
    assert_eq!(value["findings"][0]["rule"], "code-unicode");
    assert_eq!(value["findings"][0]["line"], 4);
    assert_eq!(value["findings"][0]["severity"], "error");
}

#[test]
fn repeated_paths_are_linted_once() {
    let temp = TempDir::new().expect("tempdir");
    let doc = write(&temp, "design.md", "Overview\n- item\n");
    let absent = temp.path().join("absent.md");

    let settings = all_rules();
    let report = Linter::new(&settings)
        .check_paths(&[doc.clone(), absent.clone(), doc.clone(), absent.clone()])
        .expect("lint");

    assert_eq!(report.files, vec![doc]);
    assert_eq!(report.missing, vec![absent]);
    assert_eq!(report.error_count, 1);
    assert_eq!(
        report
            .render(LintFormat::Plain)
            .matches("Markdown linting errors in")
            .count(),
        1
    );
}
