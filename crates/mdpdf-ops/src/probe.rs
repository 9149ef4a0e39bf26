//! Environment readiness checks.
//!
//! The orchestrator never assumes a tool is installed: it asks an
//! [`EnvironmentProbe`] first and decides whether to bootstrap from the
//! answer. Tests substitute a probe with a fixed view of the world.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// Answers "where would this program be executed from".
pub trait EnvironmentProbe {
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Probe backed by `PATH` plus extra directories appended after it.
#[derive(Clone, Debug)]
pub struct SystemProbe {
    search_path: Vec<PathBuf>,
}

impl SystemProbe {
    pub fn from_env(extra_dirs: &[PathBuf]) -> Self {
        Self::with_path(env::var_os("PATH"), extra_dirs)
    }

    pub fn with_path(path: Option<OsString>, extra_dirs: &[PathBuf]) -> Self {
        let mut search_path: Vec<PathBuf> = path
            .map(|value| env::split_paths(&value).collect())
            .unwrap_or_default();
        search_path.extend(extra_dirs.iter().cloned());
        SystemProbe { search_path }
    }
}

impl EnvironmentProbe for SystemProbe {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            return is_executable(candidate).then(|| candidate.to_path_buf());
        }

        self.search_path
            .iter()
            .map(|dir| dir.join(program))
            .find(|path| is_executable(path))
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Whether a tool or file was found, and where.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presence {
    Found(PathBuf),
    Missing,
}

impl Presence {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Presence::Found(path),
            None => Presence::Missing,
        }
    }

    pub fn from_file(path: &Path) -> Self {
        if path.is_file() {
            Presence::Found(path.to_path_buf())
        } else {
            Presence::Missing
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Presence::Found(_))
    }

    fn to_json(&self) -> Value {
        match self {
            Presence::Found(path) => json!({ "found": true, "path": path }),
            Presence::Missing => json!({ "found": false }),
        }
    }
}

/// Snapshot of every external prerequisite the build touches.
#[derive(Clone, Debug)]
pub struct ReadinessReport {
    pub converter: Presence,
    pub engine: Presence,
    pub package_manager: Presence,
    pub tex_package_manager: Presence,
    pub template: Presence,
    pub defaults_file: Presence,
    pub lint_helper: Presence,
}

impl ReadinessReport {
    /// True when a build could run without bootstrapping anything.
    pub fn is_ready(&self) -> bool {
        self.converter.is_found()
            && self.engine.is_found()
            && self.template.is_found()
            && self.defaults_file.is_found()
    }

    fn entries(&self) -> [(&'static str, &Presence, bool); 7] {
        [
            ("converter", &self.converter, true),
            ("engine", &self.engine, true),
            ("template", &self.template, true),
            ("defaults file", &self.defaults_file, true),
            ("lint helper", &self.lint_helper, false),
            ("package manager", &self.package_manager, false),
            ("tex package manager", &self.tex_package_manager, false),
        ]
    }

    pub fn render_plain(&self) -> String {
        let mut lines = Vec::new();
        for (label, presence, required) in self.entries() {
            let line = match presence {
                Presence::Found(path) => format!("✔️ {label}: {}", path.display()),
                Presence::Missing if required => format!("❌ {label}: missing"),
                Presence::Missing => format!("ℹ️  {label}: not found"),
            };
            lines.push(line);
        }
        lines.push(if self.is_ready() {
            "ready to build".to_string()
        } else {
            "not ready: run `mdpdf setup` to install missing prerequisites".to_string()
        });
        lines.join("\n")
    }

    pub fn to_json(&self) -> Value {
        let mut entries = serde_json::Map::new();
        for (label, presence, _) in self.entries() {
            entries.insert(label.replace(' ', "_"), presence.to_json());
        }
        json!({ "ready": self.is_ready(), "checks": entries })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn locates_executables_in_path_order() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        touch(&first.path().join("pandoc"), 0o644);
        touch(&second.path().join("pandoc"), 0o755);

        let joined = env::join_paths([first.path(), second.path()]).unwrap();
        let probe = SystemProbe::with_path(Some(joined), &[]);

        assert_eq!(probe.locate("pandoc"), Some(second.path().join("pandoc")));
        assert_eq!(probe.locate("pdflatex"), None);
    }

    #[test]
    fn extra_dirs_are_searched_after_path() {
        let texbin = tempdir().unwrap();
        touch(&texbin.path().join("pdflatex"), 0o755);

        let probe = SystemProbe::with_path(None, &[texbin.path().to_path_buf()]);
        assert_eq!(
            probe.locate("pdflatex"),
            Some(texbin.path().join("pdflatex"))
        );
    }

    #[test]
    fn explicit_paths_bypass_search() {
        let dir = tempdir().unwrap();
        let tool = dir.path().join("tool");
        touch(&tool, 0o755);

        let probe = SystemProbe::with_path(None, &[]);
        assert_eq!(probe.locate(tool.to_str().unwrap()), Some(tool));
    }
}
