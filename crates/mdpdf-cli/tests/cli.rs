use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use mdpdf_test_support::{setup_file, write_templates};
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn no_arguments_prints_usage() {
    let temp = TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("mdpdf").expect("binary");
    cmd.current_dir(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn lint_subcommand_reports_findings() {
    let temp = TempDir::new().expect("tempdir");
    setup_file(temp.path(), "docs/guide.md", "Steps\n- first\n- second\n");
    setup_file(temp.path(), "docs/clean.md", "# Clean\n\nNothing to see.\n");

    let mut cmd = Command::cargo_bin("mdpdf").expect("binary");
    cmd.current_dir(temp.path())
        .args(["lint", "docs/guide.md", "docs/clean.md"])
        .assert()
        .code(1)
        .stdout(
            predicate::str::contains("Missing blank line before list (line 2)")
                .and(predicate::str::contains("✔️ docs/clean.md: No linting errors")),
        );
}

#[test]
fn lint_reports_missing_files() {
    let temp = TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("mdpdf").expect("binary");
    cmd.current_dir(temp.path())
        .args(["lint", "absent.md"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Error: File not found: absent.md"));
}

#[test]
fn invalid_config_is_a_generic_failure() {
    let temp = TempDir::new().expect("tempdir");
    setup_file(temp.path(), "design.md", "# Design\n");
    setup_file(temp.path(), ".mdpdf.toml", "[converter]\nengine = \"\"\n");

    let mut cmd = Command::cargo_bin("mdpdf").expect("binary");
    cmd.current_dir(temp.path())
        .arg("design.md")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("mdpdf error"));
}

#[cfg(unix)]
mod unix {
    use super::*;
    use mdpdf_test_support::write_executable;

    const FAKE_PANDOC: &str = r#"#!/bin/sh
echo "$@" >> "$MDPDF_TEST_LOG"
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
printf '%%PDF-1.4\n' > "$out"
"#;

    struct Project {
        temp: TempDir,
        bin: PathBuf,
        log: PathBuf,
    }

    impl Project {
        fn new() -> Self {
            let temp = TempDir::new().expect("tempdir");
            let bin = temp.path().join("bin");
            write_executable(&bin, "pandoc", FAKE_PANDOC);
            write_executable(&bin, "pdflatex", "#!/bin/sh\nexit 0\n");
            let log = temp.path().join("pandoc.log");
            Project { temp, bin, log }
        }

        fn root(&self) -> &Path {
            self.temp.path()
        }

        fn mdpdf(&self) -> Command {
            let mut cmd = Command::cargo_bin("mdpdf").expect("binary");
            cmd.current_dir(self.root())
                .env("PATH", &self.bin)
                .env("MDPDF_TEST_LOG", &self.log)
                .env_remove("RUST_LOG");
            cmd
        }

        fn converter_calls(&self) -> Vec<String> {
            fs::read_to_string(&self.log)
                .map(|log| log.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn builds_design_document() {
        let project = Project::new();
        write_templates(project.root(), true);
        setup_file(project.root(), "design.md", "# Design\n\nBody.\n");

        project
            .mdpdf()
            .arg("design.md")
            .assert()
            .success()
            .stdout(predicate::str::contains("design.pdf"));

        let calls = project.converter_calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert!(call.starts_with("design.md -o design.pdf --from markdown --template "));
        assert!(call.contains("_templates/eisvogel-3.2.0/eisvogel.latex"));
        assert!(call.contains("--metadata-file "));
        assert!(call.contains("_templates/pdf-defaults.yaml"));
        assert!(call.ends_with("--pdf-engine=pdflatex"));
        assert!(project.root().join("design.pdf").is_file());
    }

    #[test]
    fn build_subcommand_matches_positional_form() {
        let project = Project::new();
        write_templates(project.root(), true);
        setup_file(project.root(), "notes.txt", "plain text\n");

        project.mdpdf().args(["build", "notes.txt"]).assert().success();

        assert!(project.root().join("notes.txt.pdf").is_file());
        assert_eq!(project.converter_calls().len(), 1);
    }

    #[test]
    fn missing_input_fails_without_converting() {
        let project = Project::new();
        write_templates(project.root(), true);

        project
            .mdpdf()
            .arg("missing.md")
            .assert()
            .failure()
            .stderr(predicate::str::contains("input file not found"));

        assert!(project.converter_calls().is_empty());
        assert!(!project.root().join("missing.pdf").exists());
    }

    #[test]
    fn failing_lint_helper_prevents_pdf() {
        let project = Project::new();
        write_templates(project.root(), true);
        write_executable(
            project.root(),
            "_templates/lint-markdown.py",
            "#!/bin/sh\necho \"lint failed for $1\"\nexit 1\n",
        );
        setup_file(project.root(), "design.md", "# Design\n");

        project
            .mdpdf()
            .arg("design.md")
            .assert()
            .code(4)
            .stdout(predicate::str::contains("lint failed for design.md"));

        assert!(project.converter_calls().is_empty());
        assert!(!project.root().join("design.pdf").exists());
    }

    #[test]
    fn missing_defaults_file_fails_before_conversion() {
        let project = Project::new();
        setup_file(
            project.root(),
            "_templates/eisvogel-3.2.0/eisvogel.latex",
            "% template\n",
        );
        setup_file(project.root(), "design.md", "# Design\n");

        project
            .mdpdf()
            .arg("design.md")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("defaults file not found"));

        assert!(project.converter_calls().is_empty());
    }

    #[test]
    fn missing_engine_prints_installation_plan() {
        let project = Project::new();
        fs::remove_file(project.bin.join("pdflatex")).expect("remove engine");
        write_templates(project.root(), true);
        setup_file(project.root(), "design.md", "# Design\n");

        project
            .mdpdf()
            .arg("design.md")
            .assert()
            .code(7)
            .stderr(
                predicate::str::contains("install TeX packages")
                    .and(predicate::str::contains("mdpdf build --install")),
            );

        assert!(project.converter_calls().is_empty());
    }

    #[test]
    fn config_override_selects_engine() {
        let project = Project::new();
        write_executable(&project.bin, "xelatex", "#!/bin/sh\nexit 0\n");
        write_templates(project.root(), true);
        setup_file(project.root(), "design.md", "# Design\n");
        let override_path = setup_file(
            project.root(),
            "ci/mdpdf.toml",
            "[converter]\nengine = \"xelatex\"\n",
        );

        project
            .mdpdf()
            .arg("--config")
            .arg(&override_path)
            .arg("design.md")
            .assert()
            .success();

        let calls = project.converter_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].ends_with("--pdf-engine=xelatex"));
    }

    #[test]
    fn doctor_reports_readiness_as_json() {
        let project = Project::new();
        write_templates(project.root(), true);

        let output = project
            .mdpdf()
            .args(["doctor", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let value: serde_json::Value =
            serde_json::from_slice(&output).expect("doctor emits json");
        assert_eq!(value["ready"], true);
        assert_eq!(value["checks"]["engine"]["found"], true);
        assert_eq!(value["checks"]["lint_helper"]["found"], false);
    }

    #[test]
    fn setup_dry_run_lists_plan_without_running_it() {
        let project = Project::new();
        fs::remove_file(project.bin.join("pdflatex")).expect("remove engine");

        project
            .mdpdf()
            .args(["setup", "--dry-run"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("template: would download")
                    .and(predicate::str::contains("1. install package manager (elevated)")),
            );

        assert!(!project.root().join("_templates").exists());
    }
}
