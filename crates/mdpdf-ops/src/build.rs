use std::ffi::OsString;
use std::path::{Path, PathBuf};

use mdpdf_config::LintMode;
use mdpdf_lint::{LintFormat, Linter};
use tracing::{debug, info, warn};

use crate::bootstrap::ElevationPolicy;
use crate::error::{OperationError, OperationResult};
use crate::probe::is_executable;
use crate::runner::Invocation;
use crate::template::{discover_template, ensure_template};
use crate::Operations;

/// Inputs to a single document build.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub elevation: ElevationPolicy,
}

impl BuildOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        BuildOptions {
            input: input.into(),
            elevation: ElevationPolicy::Deny,
        }
    }

    pub fn with_elevation(mut self, elevation: ElevationPolicy) -> Self {
        self.elevation = elevation;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOutcome {
    pub output: PathBuf,
    pub template: PathBuf,
    /// Value passed to the converter's `--pdf-engine` flag.
    pub engine: String,
}

/// Output path for `input`: a trailing `.md` becomes `.pdf`, anything else
/// gets `.pdf` appended.
pub fn output_path_for(input: &Path) -> PathBuf {
    if let Some(stem) = input.to_str().and_then(|text| text.strip_suffix(".md")) {
        return PathBuf::from(format!("{stem}.pdf"));
    }
    let mut output = input.as_os_str().to_os_string();
    output.push(".pdf");
    PathBuf::from(output)
}

/// The engine is passed by name when `PATH` resolves it and by absolute path
/// when it was only found in one of the extra search directories.
pub(crate) fn engine_argument(engine: &str, located: &Path, search_paths: &[PathBuf]) -> String {
    if Path::new(engine).components().count() > 1 {
        return engine.to_string();
    }
    let in_extra_dir = located
        .parent()
        .map(|dir| search_paths.iter().any(|extra| extra == dir))
        .unwrap_or(false);
    if in_extra_dir {
        located.display().to_string()
    } else {
        engine.to_string()
    }
}

impl Operations {
    /// Convert one Markdown document to PDF.
    pub fn build(&self, options: BuildOptions) -> OperationResult<BuildOutcome> {
        let input = options.input;
        if input.as_os_str().is_empty() {
            return Err(OperationError::Usage(
                "an input Markdown file is required".to_string(),
            ));
        }

        let config = &self.config;
        let output = output_path_for(&input);
        let template = discover_template(&config.paths.base_dir, &config.template.file_name);
        debug!(
            input = %input.display(),
            output = %output.display(),
            template = ?template,
            "resolved build paths"
        );

        if !input.is_file() {
            return Err(OperationError::InputNotFound { path: input });
        }
        if !config.paths.defaults_file.is_file() {
            return Err(OperationError::DefaultsNotFound {
                path: config.paths.defaults_file.clone(),
            });
        }

        self.lint_gate(&input)?;

        let template = match template {
            Some(path) => path,
            None => self.ensure_template()?.path,
        };

        let engine_path = match self.probe.locate(&config.converter.engine) {
            Some(path) => path,
            None => {
                warn!(engine = %config.converter.engine, "PDF engine not found, installing");
                self.install_engine(options.elevation)?.engine
            }
        };
        let engine = engine_argument(
            &config.converter.engine,
            &engine_path,
            &config.converter.engine_search_paths,
        );

        let mut pdf_engine = OsString::from("--pdf-engine=");
        pdf_engine.push(&engine);
        let invocation = Invocation::new(&config.converter.program)
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .arg("--from")
            .arg(&config.converter.input_format)
            .arg("--template")
            .arg(&template)
            .arg("--metadata-file")
            .arg(&config.paths.defaults_file)
            .arg(pdf_engine)
            .args(&config.converter.extra_args);

        info!(command = %invocation, "converting");
        let status = self
            .runner
            .run(&invocation)
            .map_err(|source| OperationError::ConverterLaunch {
                program: config.converter.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(OperationError::ConversionFailed {
                program: config.converter.program.clone(),
                code: status.code,
            });
        }

        info!(output = %output.display(), "PDF written");
        Ok(BuildOutcome {
            output,
            template,
            engine,
        })
    }

    fn lint_gate(&self, input: &Path) -> OperationResult<()> {
        let settings = &self.config.lint;
        match settings.mode {
            LintMode::Off => {
                debug!("lint gate disabled");
                Ok(())
            }
            LintMode::Builtin => {
                let report = Linter::new(settings)
                    .with_root(&self.config.sources.working_directory)
                    .check_paths(&[input.to_path_buf()])?;
                if report.passed() {
                    if report.warning_count > 0 {
                        warn!(
                            warnings = report.warning_count,
                            "{}",
                            report.render(LintFormat::Plain).trim()
                        );
                    }
                    return Ok(());
                }
                Err(OperationError::LintFindings {
                    input: input.to_path_buf(),
                    errors: report.error_count,
                    rendered: report.render(LintFormat::Plain),
                })
            }
            LintMode::External => {
                let helper = &self.config.paths.lint_helper;
                if !helper.is_file() {
                    warn!(helper = %helper.display(), "lint helper not found, skipping lint");
                    return Ok(());
                }

                let invocation = match &settings.interpreter {
                    Some(interpreter) => Invocation::new(interpreter).arg(helper),
                    None if !is_executable(helper) => {
                        return Err(OperationError::LintHelperNotExecutable {
                            helper: helper.clone(),
                        })
                    }
                    None => Invocation::new(helper),
                }
                .arg(input);
                info!(command = %invocation, "linting");

                let status =
                    self.runner
                        .run(&invocation)
                        .map_err(|source| OperationError::LintLaunch {
                            helper: helper.clone(),
                            source,
                        })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(OperationError::LintRejected {
                        helper: helper.clone(),
                        input: input.to_path_buf(),
                    })
                }
            }
        }
    }
}
