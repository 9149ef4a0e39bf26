//! Shared test harness utilities for mdpdf crates: in-memory stand-ins for the
//! probe, runner and fetcher seams plus fixture helpers.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use flate2::write::GzEncoder;
use flate2::Compression;
use mdpdf_config::{Config, LoadOptions};
use mdpdf_ops::{
    ArchiveFetcher, CommandRunner, EnvironmentProbe, Invocation, RunStatus, TemplateError,
};

pub const TEMPLATE_DIR: &str = "eisvogel-3.2.0";

/// Load configuration as if `mdpdf` ran inside `dir`.
pub fn test_config(dir: &Path) -> Config {
    Config::load(LoadOptions::default().with_working_dir(dir)).expect("load config")
}

/// Write `contents` to `dir/name`, creating parent directories.
pub fn setup_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(&path, contents).expect("write file");
    path
}

/// Write an executable shell script to `dir/name`.
#[cfg(unix)]
pub fn write_executable(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = setup_file(dir, name, script);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// Lay out a `_templates` directory with the defaults file and, optionally,
/// an unpacked template release. Returns the template path when written.
pub fn write_templates(dir: &Path, with_template: bool) -> Option<PathBuf> {
    setup_file(dir, "_templates/pdf-defaults.yaml", "papersize: a4\n");
    with_template.then(|| {
        setup_file(
            dir,
            &format!("_templates/{TEMPLATE_DIR}/eisvogel.latex"),
            "% eisvogel\n",
        )
    })
}

/// Gzip-compressed tarball holding `entries` as regular files.
pub fn template_tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Probe answering from a fixed table. Clones share the table, so a test can
/// make a tool "appear" after an installation step.
#[derive(Clone, Debug, Default)]
pub struct StaticProbe {
    tools: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, program: &str, path: impl Into<PathBuf>) -> Self {
        self.insert(program, path);
        self
    }

    pub fn insert(&self, program: &str, path: impl Into<PathBuf>) {
        lock(&self.tools).insert(program.to_string(), path.into());
    }
}

impl EnvironmentProbe for StaticProbe {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        lock(&self.tools).get(program).cloned()
    }
}

type Effect = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct RunnerState {
    calls: Vec<Invocation>,
    exit_codes: HashMap<String, i32>,
    unlaunchable: HashSet<String>,
    effects: HashMap<String, Vec<Effect>>,
}

/// Runner that records invocations instead of spawning processes.
///
/// Programs are matched by file name, so `/abs/path/lint-markdown.py` and
/// `lint-markdown.py` share a script. Unscripted programs exit 0.
#[derive(Clone, Default)]
pub struct RecordingRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_with(self, program: &str, code: i32) -> Self {
        lock(&self.state)
            .exit_codes
            .insert(program.to_string(), code);
        self
    }

    pub fn fail_to_launch(self, program: &str) -> Self {
        lock(&self.state).unlaunchable.insert(program.to_string());
        self
    }

    /// Run `effect` each time `program` is invoked successfully.
    pub fn with_effect(self, program: &str, effect: impl Fn() + Send + Sync + 'static) -> Self {
        lock(&self.state)
            .effects
            .entry(program.to_string())
            .or_default()
            .push(Arc::new(effect));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        lock(&self.state).calls.clone()
    }

    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|invocation| program_key(invocation) == program)
            .collect()
    }
}

fn program_key(invocation: &Invocation) -> String {
    Path::new(&invocation.program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| invocation.program_name())
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<RunStatus> {
        let key = program_key(invocation);
        let (code, effects) = {
            let mut state = lock(&self.state);
            state.calls.push(invocation.clone());
            if state.unlaunchable.contains(&key) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{key}: command not found"),
                ));
            }
            let code = state.exit_codes.get(&key).copied().unwrap_or(0);
            let effects = state.effects.get(&key).cloned().unwrap_or_default();
            (code, effects)
        };
        if code == 0 {
            for effect in effects {
                effect();
            }
        }
        Ok(RunStatus::exited(code))
    }
}

/// Fetcher returning canned bytes or a canned failure, recording each URL.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    archive: Option<Vec<u8>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn serving(archive: Vec<u8>) -> Self {
        FakeFetcher {
            archive: Some(archive),
            requests: Arc::default(),
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

impl ArchiveFetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TemplateError> {
        lock(&self.requests).push(url.to_string());
        self.archive
            .clone()
            .ok_or_else(|| TemplateError::Unavailable {
                url: url.to_string(),
                reason: "network disabled in tests".to_string(),
            })
    }
}
