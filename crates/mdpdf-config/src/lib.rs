//! Configuration loader for mdpdf.
//!
//! Settings come from up to four layers, lowest precedence first: built-in
//! defaults, `.mdpdf.toml` at the git root, `.mdpdf.toml` in the working
//! directory, and an explicit `--config` file. Relative paths resolve against
//! the directory of the layer that set them.

mod layers;
mod resolve;

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use globset::GlobMatcher;
use thiserror::Error;

pub const DEFAULT_BASE_DIR: &str = "_templates";
pub const DEFAULT_DEFAULTS_FILE: &str = "pdf-defaults.yaml";
pub const DEFAULT_LINT_HELPER: &str = "lint-markdown.py";
pub const DEFAULT_TEMPLATE_FILE: &str = "eisvogel.latex";
pub const DEFAULT_TEMPLATE_ARCHIVE_URL: &str =
    "https://github.com/Wandmalfarbe/pandoc-latex-template/releases/download/v3.2.0/Eisvogel-3.2.0.tar.gz";
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Complete configuration resolved from defaults and on-disk overrides.
#[derive(Clone, Debug)]
pub struct Config {
    pub paths: PathSettings,
    pub template: TemplateSettings,
    pub converter: ConverterSettings,
    pub lint: LintSettings,
    pub bootstrap: BootstrapSettings,
    pub sources: ConfigSources,
}

/// Locations of the static build inputs.
#[derive(Clone, Debug)]
pub struct PathSettings {
    /// Directory holding the template tree, defaults file and lint helper.
    pub base_dir: PathBuf,
    pub defaults_file: PathBuf,
    pub lint_helper: PathBuf,
}

/// Template lookup and download settings.
#[derive(Clone, Debug)]
pub struct TemplateSettings {
    pub file_name: String,
    pub archive_url: String,
    pub download_timeout: Duration,
}

/// Converter invocation settings.
#[derive(Clone, Debug)]
pub struct ConverterSettings {
    pub program: String,
    pub input_format: String,
    pub engine: String,
    pub extra_args: Vec<String>,
    /// Directories probed for the engine in addition to `PATH`.
    pub engine_search_paths: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LintSettings {
    pub mode: LintMode,
    /// Program used to run the external helper; `None` executes it directly.
    pub interpreter: Option<String>,
    pub rules: Vec<LintRule>,
    pub severity: HashMap<LintRule, SeverityLevel>,
    pub severity_wildcard: Option<SeverityLevel>,
    pub ignore: Vec<LintIgnore>,
}

impl LintSettings {
    /// Effective severity for `rule`: explicit entry, then `"*"`, then error.
    pub fn severity_for(&self, rule: LintRule) -> SeverityLevel {
        match self.severity.get(&rule) {
            Some(level) => *level,
            None => self.severity_wildcard.unwrap_or(SeverityLevel::Error),
        }
    }

    pub fn is_ignored(&self, path: &Path, rule: LintRule) -> bool {
        self.ignore
            .iter()
            .filter(|entry| entry.rules.contains(rule))
            .any(|entry| entry.matcher.is_match(path))
    }
}

/// Commands that install the PDF engine when it is missing.
#[derive(Clone, Debug)]
pub struct BootstrapSettings {
    pub package_manager: String,
    pub package_manager_install: Vec<String>,
    pub tex_distribution_install: Vec<String>,
    pub tex_package_manager: String,
    pub tex_packages: Vec<String>,
    /// Prefix for privileged steps, usually `sudo`.
    pub elevation_command: Option<String>,
}

/// Declares a config keyword enum together with its TOML spelling.
macro_rules! keywords {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|item| item.as_str() == value)
                    .ok_or(())
            }
        }
    };
}

keywords! {
    /// How the build validates the document before conversion.
    LintMode {
        External => "external",
        Builtin => "builtin",
        Off => "off",
    }
}

keywords! {
    /// Built-in lint rules.
    LintRule {
        ListSpacing => "list-spacing",
        TableSpacing => "table-spacing",
        BoldHeading => "bold-heading",
        CodeUnicode => "code-unicode",
    }
}

keywords! {
    SeverityLevel {
        Error => "error",
        Warning => "warning",
        Ignore => "ignore",
    }
}

/// Paths matching `pattern` skip the listed rules.
#[derive(Clone, Debug)]
pub struct LintIgnore {
    pub pattern: String,
    pub matcher: GlobMatcher,
    pub rules: LintIgnoreRules,
    pub origin: ConfigSource,
}

#[derive(Clone, Debug)]
pub enum LintIgnoreRules {
    All,
    Specific(Vec<LintRule>),
}

impl LintIgnoreRules {
    pub fn contains(&self, rule: LintRule) -> bool {
        match self {
            LintIgnoreRules::All => true,
            LintIgnoreRules::Specific(rules) => rules.contains(&rule),
        }
    }
}

/// Working directory plus every layer that contributed, in merge order.
#[derive(Clone, Debug)]
pub struct ConfigSources {
    pub working_directory: PathBuf,
    pub layers: Vec<ConfigSource>,
}

/// One configuration layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    pub kind: ConfigSourceKind,
    pub path: Option<PathBuf>,
    /// Directory that relative paths in this layer resolve against.
    pub base_dir: PathBuf,
}

impl ConfigSource {
    fn defaults(base_dir: PathBuf) -> Self {
        ConfigSource {
            kind: ConfigSourceKind::Default,
            path: None,
            base_dir,
        }
    }

    fn file(kind: ConfigSourceKind, path: PathBuf) -> Self {
        let base_dir = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        ConfigSource {
            kind,
            path: Some(path),
            base_dir,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} {}", self.kind, path.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Layer kinds, lowest precedence first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigSourceKind {
    Default,
    GitRoot,
    Local,
    Override,
}

impl fmt::Display for ConfigSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigSourceKind::Default => "built-in defaults",
            ConfigSourceKind::GitRoot => "repository config",
            ConfigSourceKind::Local => "working-directory config",
            ConfigSourceKind::Override => "--config file",
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub override_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_override_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot use working directory {}: {source}", attempted.display())]
    WorkingDirectory {
        attempted: PathBuf,
        source: io::Error,
    },
    #[error("config file {} passed with --config does not exist", path.display())]
    OverrideNotFound { path: PathBuf },
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration:\n{0}")]
    Validation(ConfigValidationErrors),
}

/// Every problem found while resolving the merged layers.
#[derive(Debug)]
pub struct ConfigValidationErrors(pub Vec<ConfigValidationError>);

impl ConfigValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ConfigValidationError> {
        self.0.iter()
    }
}

impl fmt::Display for ConfigValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.0.iter().map(|err| format!("  * {err}")).collect();
        f.write_str(&lines.join("\n"))
    }
}

#[derive(Clone, Debug)]
pub struct ConfigValidationError {
    /// Dotted key, e.g. `lint.rules`.
    pub field: &'static str,
    pub message: String,
    /// Layer that supplied the offending value, if any.
    pub origin: Option<ConfigSource>,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        match &self.origin {
            Some(origin) => write!(f, " (from {origin})"),
            None => Ok(()),
        }
    }
}

impl Config {
    /// Merge every layer that applies to `options` and validate the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let working_directory = layers::working_dir(options.working_dir)?;
        let explicit = options
            .override_path
            .map(|path| layers::absolute(&path, &working_directory));
        if let Some(path) = explicit.as_ref().filter(|path| !path.exists()) {
            return Err(ConfigError::OverrideNotFound { path: path.clone() });
        }

        let defaults = ConfigSource::defaults(working_directory.clone());
        let mut merged = layers::defaults(&defaults);
        let mut applied = vec![defaults];
        for source in layers::discover(&working_directory, explicit) {
            merged.merge(layers::read(&source)?);
            applied.push(source);
        }

        merged
            .resolve(ConfigSources {
                working_directory,
                layers: applied,
            })
            .map_err(ConfigError::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip_through_their_spelling() {
        for rule in LintRule::ALL {
            assert_eq!(rule.as_str().parse::<LintRule>(), Ok(*rule));
        }
        assert_eq!("warning".parse::<SeverityLevel>(), Ok(SeverityLevel::Warning));
        assert!("strict".parse::<LintMode>().is_err());
    }

    #[test]
    fn validation_errors_name_field_and_layer() {
        let err = ConfigValidationError {
            field: "lint.mode",
            message: "unknown lint mode 'strict'".into(),
            origin: Some(ConfigSource::file(
                ConfigSourceKind::Local,
                PathBuf::from("/repo/.mdpdf.toml"),
            )),
        };
        assert_eq!(
            err.to_string(),
            "lint.mode: unknown lint mode 'strict' (from working-directory config /repo/.mdpdf.toml)"
        );
    }
}
