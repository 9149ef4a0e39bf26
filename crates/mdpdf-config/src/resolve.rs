//! Turns the merged layers into typed settings, collecting every problem.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::Glob;

use crate::layers::{
    absolute, BootstrapPartial, ConverterPartial, IgnorePartial, Layered, LintPartial,
    PartialConfig, PathsPartial, TemplatePartial,
};
use crate::{
    BootstrapSettings, Config, ConfigSource, ConfigSources, ConfigValidationError,
    ConfigValidationErrors, ConverterSettings, LintIgnore, LintIgnoreRules, LintMode, LintRule,
    LintSettings, PathSettings, SeverityLevel, TemplateSettings, DEFAULT_BASE_DIR,
    DEFAULT_DEFAULTS_FILE, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_LINT_HELPER,
    DEFAULT_TEMPLATE_ARCHIVE_URL, DEFAULT_TEMPLATE_FILE,
};

impl PartialConfig {
    pub(crate) fn resolve(self, sources: ConfigSources) -> Result<Config, ConfigValidationErrors> {
        let mut issues = Issues::default();
        let paths = resolve_paths(self.paths, &sources.working_directory);
        let template = resolve_template(self.template, &mut issues);
        let converter = resolve_converter(self.converter, &mut issues);
        let lint = resolve_lint(self.lint, &mut issues);
        let bootstrap = resolve_bootstrap(self.bootstrap, &mut issues);

        if !issues.0.is_empty() {
            return Err(ConfigValidationErrors(issues.0));
        }
        Ok(Config {
            paths,
            template,
            converter,
            lint,
            bootstrap,
            sources,
        })
    }
}

#[derive(Default)]
struct Issues(Vec<ConfigValidationError>);

impl Issues {
    fn report(
        &mut self,
        field: &'static str,
        origin: Option<&ConfigSource>,
        message: impl Into<String>,
    ) {
        self.0.push(ConfigValidationError {
            field,
            message: message.into(),
            origin: origin.cloned(),
        });
    }

    /// A string that must not be blank; blank values fall back after reporting.
    fn text(&mut self, field: &'static str, value: Option<Layered<String>>, fallback: &str) -> String {
        match value {
            Some(text) if text.value.trim().is_empty() => {
                self.report(field, Some(&text.origin), "must not be empty");
                fallback.to_string()
            }
            Some(text) => text.value,
            None => fallback.to_string(),
        }
    }

    /// A command line whose first element names the program.
    fn argv(&mut self, field: &'static str, value: Option<Layered<Vec<String>>>) -> Vec<String> {
        match value {
            Some(argv) if argv.value.first().is_some_and(|program| !program.trim().is_empty()) => {
                argv.value
            }
            Some(argv) => {
                self.report(
                    field,
                    Some(&argv.origin),
                    "must list a program followed by its arguments",
                );
                Vec::new()
            }
            None => {
                self.report(field, None, "is required");
                Vec::new()
            }
        }
    }
}

fn non_blank(value: Option<Layered<String>>) -> Option<String> {
    value
        .map(|text| text.value)
        .filter(|text| !text.trim().is_empty())
}

fn spellings<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `base_dir` resolves against its own layer; the files inside it resolve
/// against the final `base_dir`.
fn resolve_paths(partial: PathsPartial, working_dir: &Path) -> PathSettings {
    let base_dir = match partial.base_dir {
        Some(dir) => absolute(&dir.value, &dir.origin.base_dir),
        None => working_dir.join(DEFAULT_BASE_DIR),
    };
    let inside = |file: Option<Layered<PathBuf>>, fallback: &str| {
        let name = file.map_or_else(|| PathBuf::from(fallback), |file| file.value);
        absolute(&name, &base_dir)
    };
    let defaults_file = inside(partial.defaults_file, DEFAULT_DEFAULTS_FILE);
    let lint_helper = inside(partial.lint_helper, DEFAULT_LINT_HELPER);

    PathSettings {
        base_dir,
        defaults_file,
        lint_helper,
    }
}

fn resolve_template(partial: TemplatePartial, issues: &mut Issues) -> TemplateSettings {
    let file_name = issues.text(
        "template.file_name",
        partial.file_name,
        DEFAULT_TEMPLATE_FILE,
    );
    if file_name.contains(['/', '\\']) {
        issues.report(
            "template.file_name",
            None,
            format!("'{file_name}' must be a bare file name"),
        );
    }

    let archive_url = match partial.archive_url {
        Some(url) => {
            if !(url.value.starts_with("https://") || url.value.starts_with("http://")) {
                issues.report(
                    "template.archive_url",
                    Some(&url.origin),
                    format!("archive url must use http or https, got '{}'", url.value),
                );
            }
            url.value
        }
        None => DEFAULT_TEMPLATE_ARCHIVE_URL.to_string(),
    };

    let timeout_secs = match partial.download_timeout_secs {
        Some(secs) if secs.value == 0 => {
            issues.report(
                "template.download_timeout_secs",
                Some(&secs.origin),
                "must be greater than 0",
            );
            DEFAULT_DOWNLOAD_TIMEOUT_SECS
        }
        Some(secs) => secs.value,
        None => DEFAULT_DOWNLOAD_TIMEOUT_SECS,
    };

    TemplateSettings {
        file_name,
        archive_url,
        download_timeout: Duration::from_secs(timeout_secs),
    }
}

fn resolve_converter(partial: ConverterPartial, issues: &mut Issues) -> ConverterSettings {
    let engine_search_paths = match partial.engine_search_paths {
        Some(dirs) => dirs
            .value
            .iter()
            .map(|dir| absolute(dir, &dirs.origin.base_dir))
            .collect(),
        None => Vec::new(),
    };

    ConverterSettings {
        program: issues.text("converter.program", partial.program, "pandoc"),
        input_format: issues.text("converter.input_format", partial.input_format, "markdown"),
        engine: issues.text("converter.engine", partial.engine, "pdflatex"),
        extra_args: partial
            .extra_args
            .map(|args| args.value)
            .unwrap_or_default(),
        engine_search_paths,
    }
}

fn resolve_lint(partial: LintPartial, issues: &mut Issues) -> LintSettings {
    let mode = match partial.mode {
        Some(mode) => match mode.value.parse::<LintMode>() {
            Ok(parsed) => parsed,
            Err(()) => {
                issues.report(
                    "lint.mode",
                    Some(&mode.origin),
                    format!(
                        "unknown lint mode '{}', expected one of {}",
                        mode.value,
                        spellings(LintMode::ALL)
                    ),
                );
                LintMode::External
            }
        },
        None => LintMode::External,
    };
    let rules = lint_rules(partial.rules, issues);
    let (severity, severity_wildcard) = severity_overrides(partial.severity, issues);
    let ignore = partial
        .ignore
        .into_iter()
        .filter_map(|entry| ignore_entry(entry, issues))
        .collect();

    LintSettings {
        mode,
        interpreter: non_blank(partial.interpreter),
        rules,
        severity,
        severity_wildcard,
        ignore,
    }
}

fn lint_rules(names: Option<Layered<Vec<String>>>, issues: &mut Issues) -> Vec<LintRule> {
    let Some(names) = names else {
        return LintRule::ALL.to_vec();
    };
    let mut rules: Vec<LintRule> = Vec::with_capacity(names.value.len());
    for name in &names.value {
        match name.parse::<LintRule>() {
            Ok(rule) if rules.contains(&rule) => issues.report(
                "lint.rules",
                Some(&names.origin),
                format!("duplicate lint rule '{rule}'"),
            ),
            Ok(rule) => rules.push(rule),
            Err(()) => issues.report(
                "lint.rules",
                Some(&names.origin),
                format!(
                    "unknown lint rule '{name}', expected one of {}",
                    spellings(LintRule::ALL)
                ),
            ),
        }
    }
    rules
}

/// Per-rule overrides plus the `"*"` entry, if any.
fn severity_overrides(
    entries: HashMap<String, Layered<String>>,
    issues: &mut Issues,
) -> (HashMap<LintRule, SeverityLevel>, Option<SeverityLevel>) {
    let mut by_rule = HashMap::new();
    let mut wildcard = None;
    for (key, level) in entries {
        let Ok(parsed) = level.value.parse::<SeverityLevel>() else {
            issues.report(
                "lint.severity",
                Some(&level.origin),
                format!(
                    "'{key}' has invalid severity '{}', expected one of {}",
                    level.value,
                    spellings(SeverityLevel::ALL)
                ),
            );
            continue;
        };
        if key == "*" {
            wildcard = Some(parsed);
        } else if let Ok(rule) = key.parse::<LintRule>() {
            by_rule.insert(rule, parsed);
        } else {
            issues.report(
                "lint.severity",
                Some(&level.origin),
                format!("unknown lint rule '{key}'"),
            );
        }
    }
    (by_rule, wildcard)
}

fn ignore_entry(entry: Layered<IgnorePartial>, issues: &mut Issues) -> Option<LintIgnore> {
    let Layered {
        value: IgnorePartial {
            path: pattern,
            rules: names,
        },
        origin,
    } = entry;

    let matcher = match Glob::new(&pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(err) => {
            issues.report(
                "lint.ignore",
                Some(&origin),
                format!("invalid glob pattern '{pattern}': {err}"),
            );
            return None;
        }
    };
    if names.is_empty() {
        issues.report(
            "lint.ignore",
            Some(&origin),
            format!("entry for '{pattern}' lists no rules"),
        );
        return None;
    }

    let mut every_rule = false;
    let mut rules = Vec::new();
    for name in &names {
        if name == "*" {
            every_rule = true;
        } else if let Ok(rule) = name.parse::<LintRule>() {
            rules.push(rule);
        } else {
            issues.report(
                "lint.ignore",
                Some(&origin),
                format!("unknown lint rule '{name}' in entry for '{pattern}'"),
            );
        }
    }

    let rules = match (every_rule, rules.is_empty()) {
        (true, _) => LintIgnoreRules::All,
        (false, true) => return None,
        (false, false) => LintIgnoreRules::Specific(rules),
    };
    Some(LintIgnore {
        pattern,
        matcher,
        rules,
        origin,
    })
}

fn resolve_bootstrap(partial: BootstrapPartial, issues: &mut Issues) -> BootstrapSettings {
    BootstrapSettings {
        package_manager: issues.text("bootstrap.package_manager", partial.package_manager, "brew"),
        package_manager_install: issues.argv(
            "bootstrap.package_manager_install",
            partial.package_manager_install,
        ),
        tex_distribution_install: issues.argv(
            "bootstrap.tex_distribution_install",
            partial.tex_distribution_install,
        ),
        tex_package_manager: issues.text(
            "bootstrap.tex_package_manager",
            partial.tex_package_manager,
            "tlmgr",
        ),
        tex_packages: partial
            .tex_packages
            .map(|packages| packages.value)
            .unwrap_or_default(),
        elevation_command: non_blank(partial.elevation_command),
    }
}
