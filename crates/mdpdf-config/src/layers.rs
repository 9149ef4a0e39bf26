//! Layer discovery, the TOML schema, and per-layer merging.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    ConfigError, ConfigSource, ConfigSourceKind, LintMode, LintRule, DEFAULT_BASE_DIR,
    DEFAULT_DEFAULTS_FILE, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_LINT_HELPER,
    DEFAULT_TEMPLATE_ARCHIVE_URL, DEFAULT_TEMPLATE_FILE,
};

const CONFIG_FILE_NAME: &str = ".mdpdf.toml";

const HOMEBREW_INSTALL: &str = "script=$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh) && /bin/bash -c \"$script\"";

const DEFAULT_TEX_PACKAGES: &[&str] = &[
    "adjustbox",
    "babel-german",
    "background",
    "bidi",
    "collectbox",
    "csquotes",
    "everypage",
    "filehook",
    "footmisc",
    "footnotebackref",
    "framed",
    "fvextra",
    "letltxmacro",
    "ly1",
    "mdframed",
    "mweights",
    "needspace",
    "pagecolor",
    "sourcecodepro",
    "sourcesanspro",
    "titling",
    "ucharcat",
    "ulem",
    "unicode-math",
    "upquote",
    "xecjk",
    "xurl",
    "zref",
];

pub(crate) fn working_dir(requested: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    let attempted = requested.unwrap_or_else(|| PathBuf::from("."));
    fs::canonicalize(&attempted)
        .map_err(|source| ConfigError::WorkingDirectory { attempted, source })
}

pub(crate) fn absolute(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Config files that apply to `working_dir`, lowest precedence first.
///
/// A file is read once even when it is both the repository config and the
/// local config, or is also passed explicitly.
pub(crate) fn discover(working_dir: &Path, explicit: Option<PathBuf>) -> Vec<ConfigSource> {
    let local = working_dir.join(CONFIG_FILE_NAME);
    let repository = working_dir
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(|root| root.join(CONFIG_FILE_NAME))
        .filter(|path| *path != local);

    let mut found: Vec<ConfigSource> = [
        (ConfigSourceKind::GitRoot, repository),
        (ConfigSourceKind::Local, Some(local)),
    ]
    .into_iter()
    .filter_map(|(kind, path)| Some(kind).zip(path))
    .filter(|(_, path)| path.is_file() && explicit.as_ref() != Some(path))
    .map(|(kind, path)| ConfigSource::file(kind, path))
    .collect();

    found.extend(explicit.map(|path| ConfigSource::file(ConfigSourceKind::Override, path)));
    found
}

pub(crate) fn read(source: &ConfigSource) -> Result<PartialConfig, ConfigError> {
    let Some(path) = source.path.as_deref() else {
        return Ok(PartialConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    let raw: RawConfig = toml::from_str(&text).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        source: err,
    })?;
    Ok(raw.stamp(source))
}

/// The built-in layer, expressed in the same schema as a config file.
pub(crate) fn defaults(source: &ConfigSource) -> PartialConfig {
    RawConfig {
        paths: Some(RawPaths {
            base_dir: Some(DEFAULT_BASE_DIR.into()),
            defaults_file: Some(DEFAULT_DEFAULTS_FILE.into()),
            lint_helper: Some(DEFAULT_LINT_HELPER.into()),
        }),
        template: Some(RawTemplate {
            file_name: Some(DEFAULT_TEMPLATE_FILE.into()),
            archive_url: Some(DEFAULT_TEMPLATE_ARCHIVE_URL.into()),
            download_timeout_secs: Some(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
        }),
        converter: Some(RawConverter {
            program: Some("pandoc".into()),
            input_format: Some("markdown".into()),
            engine: Some("pdflatex".into()),
            extra_args: Some(Vec::new()),
            engine_search_paths: Some(vec![PathBuf::from("/Library/TeX/texbin")]),
        }),
        lint: Some(RawLint {
            mode: Some(LintMode::External.to_string()),
            interpreter: None,
            rules: Some(LintRule::ALL.iter().map(LintRule::to_string).collect()),
            severity: HashMap::new(),
            ignore: Vec::new(),
        }),
        bootstrap: Some(RawBootstrap {
            package_manager: Some("brew".into()),
            package_manager_install: Some(owned(&["/bin/bash", "-c", HOMEBREW_INSTALL])),
            tex_distribution_install: Some(owned(&["brew", "install", "--cask", "basictex"])),
            tex_package_manager: Some("tlmgr".into()),
            tex_packages: Some(owned(DEFAULT_TEX_PACKAGES)),
            elevation_command: Some("sudo".into()),
        }),
    }
    .stamp(source)
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// A value together with the layer that set it.
#[derive(Clone, Debug)]
pub(crate) struct Layered<T> {
    pub(crate) value: T,
    pub(crate) origin: ConfigSource,
}

fn stamp<T>(value: Option<T>, origin: &ConfigSource) -> Option<Layered<T>> {
    value.map(|value| Layered {
        value,
        origin: origin.clone(),
    })
}

/// Replace each listed field of `$lower` that `$upper` sets.
macro_rules! overlay {
    ($lower:ident <- $upper:ident: $($field:ident),+) => {
        $( $lower.$field = $upper.$field.or($lower.$field.take()); )+
    };
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PartialConfig {
    pub(crate) paths: PathsPartial,
    pub(crate) template: TemplatePartial,
    pub(crate) converter: ConverterPartial,
    pub(crate) lint: LintPartial,
    pub(crate) bootstrap: BootstrapPartial,
}

impl PartialConfig {
    /// Apply `upper` on top of `self`; scalar keys replace, tables accumulate.
    pub(crate) fn merge(&mut self, upper: PartialConfig) {
        let PartialConfig {
            paths,
            template,
            converter,
            lint,
            bootstrap,
        } = upper;

        let lower = &mut self.paths;
        overlay!(lower <- paths: base_dir, defaults_file, lint_helper);

        let lower = &mut self.template;
        overlay!(lower <- template: file_name, archive_url, download_timeout_secs);

        let lower = &mut self.converter;
        overlay!(lower <- converter: program, input_format, engine, extra_args, engine_search_paths);

        let lower = &mut self.lint;
        overlay!(lower <- lint: mode, interpreter, rules);
        lower.severity.extend(lint.severity);
        lower.ignore.extend(lint.ignore);

        let lower = &mut self.bootstrap;
        overlay!(
            lower <- bootstrap:
            package_manager,
            package_manager_install,
            tex_distribution_install,
            tex_package_manager,
            tex_packages,
            elevation_command
        );
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PathsPartial {
    pub(crate) base_dir: Option<Layered<PathBuf>>,
    pub(crate) defaults_file: Option<Layered<PathBuf>>,
    pub(crate) lint_helper: Option<Layered<PathBuf>>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TemplatePartial {
    pub(crate) file_name: Option<Layered<String>>,
    pub(crate) archive_url: Option<Layered<String>>,
    pub(crate) download_timeout_secs: Option<Layered<u64>>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ConverterPartial {
    pub(crate) program: Option<Layered<String>>,
    pub(crate) input_format: Option<Layered<String>>,
    pub(crate) engine: Option<Layered<String>>,
    pub(crate) extra_args: Option<Layered<Vec<String>>>,
    pub(crate) engine_search_paths: Option<Layered<Vec<PathBuf>>>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct LintPartial {
    pub(crate) mode: Option<Layered<String>>,
    pub(crate) interpreter: Option<Layered<String>>,
    pub(crate) rules: Option<Layered<Vec<String>>>,
    pub(crate) severity: HashMap<String, Layered<String>>,
    pub(crate) ignore: Vec<Layered<IgnorePartial>>,
}

#[derive(Clone, Debug)]
pub(crate) struct IgnorePartial {
    pub(crate) path: String,
    pub(crate) rules: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct BootstrapPartial {
    pub(crate) package_manager: Option<Layered<String>>,
    pub(crate) package_manager_install: Option<Layered<Vec<String>>>,
    pub(crate) tex_distribution_install: Option<Layered<Vec<String>>>,
    pub(crate) tex_package_manager: Option<Layered<String>>,
    pub(crate) tex_packages: Option<Layered<Vec<String>>>,
    pub(crate) elevation_command: Option<Layered<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    paths: Option<RawPaths>,
    template: Option<RawTemplate>,
    converter: Option<RawConverter>,
    lint: Option<RawLint>,
    bootstrap: Option<RawBootstrap>,
}

impl RawConfig {
    fn stamp(self, origin: &ConfigSource) -> PartialConfig {
        PartialConfig {
            paths: self
                .paths
                .map(|raw| PathsPartial {
                    base_dir: stamp(raw.base_dir, origin),
                    defaults_file: stamp(raw.defaults_file, origin),
                    lint_helper: stamp(raw.lint_helper, origin),
                })
                .unwrap_or_default(),
            template: self
                .template
                .map(|raw| TemplatePartial {
                    file_name: stamp(raw.file_name, origin),
                    archive_url: stamp(raw.archive_url, origin),
                    download_timeout_secs: stamp(raw.download_timeout_secs, origin),
                })
                .unwrap_or_default(),
            converter: self
                .converter
                .map(|raw| ConverterPartial {
                    program: stamp(raw.program, origin),
                    input_format: stamp(raw.input_format, origin),
                    engine: stamp(raw.engine, origin),
                    extra_args: stamp(raw.extra_args, origin),
                    engine_search_paths: stamp(raw.engine_search_paths, origin),
                })
                .unwrap_or_default(),
            lint: self
                .lint
                .map(|raw| raw.stamp(origin))
                .unwrap_or_default(),
            bootstrap: self
                .bootstrap
                .map(|raw| BootstrapPartial {
                    package_manager: stamp(raw.package_manager, origin),
                    package_manager_install: stamp(raw.package_manager_install, origin),
                    tex_distribution_install: stamp(raw.tex_distribution_install, origin),
                    tex_package_manager: stamp(raw.tex_package_manager, origin),
                    tex_packages: stamp(raw.tex_packages, origin),
                    elevation_command: stamp(raw.elevation_command, origin),
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    base_dir: Option<PathBuf>,
    defaults_file: Option<PathBuf>,
    lint_helper: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    file_name: Option<String>,
    archive_url: Option<String>,
    download_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConverter {
    program: Option<String>,
    input_format: Option<String>,
    engine: Option<String>,
    extra_args: Option<Vec<String>>,
    engine_search_paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLint {
    mode: Option<String>,
    interpreter: Option<String>,
    rules: Option<Vec<String>>,
    #[serde(default)]
    severity: HashMap<String, String>,
    #[serde(default)]
    ignore: Vec<RawIgnore>,
}

impl RawLint {
    fn stamp(self, origin: &ConfigSource) -> LintPartial {
        LintPartial {
            mode: stamp(self.mode, origin),
            interpreter: stamp(self.interpreter, origin),
            rules: stamp(self.rules, origin),
            severity: self
                .severity
                .into_iter()
                .map(|(rule, level)| {
                    let level = Layered {
                        value: level,
                        origin: origin.clone(),
                    };
                    (rule, level)
                })
                .collect(),
            ignore: self
                .ignore
                .into_iter()
                .map(|entry| Layered {
                    value: IgnorePartial {
                        path: entry.path,
                        rules: entry.rules,
                    },
                    origin: origin.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIgnore {
    path: String,
    #[serde(default)]
    rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBootstrap {
    package_manager: Option<String>,
    package_manager_install: Option<Vec<String>>,
    tex_distribution_install: Option<Vec<String>>,
    tex_package_manager: Option<String>,
    tex_packages: Option<Vec<String>>,
    elevation_command: Option<String>,
}
