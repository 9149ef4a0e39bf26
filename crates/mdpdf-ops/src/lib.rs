//! Build orchestration for mdpdf: environment probing, template and engine
//! bootstrap, the lint gate and the converter invocation.

mod bootstrap;
mod build;
mod error;
mod probe;
mod runner;
mod template;

use std::path::PathBuf;

use mdpdf_config::Config;
use mdpdf_lint::{LintFormat, LintReport, Linter};
use tracing::info;

pub use bootstrap::{ElevationPolicy, InstallOutcome, InstallPlan, InstallStep};
pub use build::{output_path_for, BuildOptions, BuildOutcome};
pub use error::{ExitCode, OperationError, OperationResult};
pub use probe::{EnvironmentProbe, Presence, ReadinessReport, SystemProbe};
pub use runner::{CommandRunner, Invocation, RunStatus, SystemRunner};
pub use template::{
    compare_versioned, discover_template, unpack_into, ArchiveFetcher, HttpFetcher,
    TemplateError, TemplateOutcome,
};

/// Options for linting documents with the built-in rules.
#[derive(Clone, Debug, Default)]
pub struct LintOptions {
    pub paths: Vec<PathBuf>,
    pub format: LintFormat,
}

/// Aggregated lint output plus the process exit code it implies.
#[derive(Clone, Debug)]
pub struct LintOutcome {
    pub report: LintReport,
    pub rendered: String,
    pub exit_code: i32,
}

/// Operation layer wiring configuration to the environment seams.
pub struct Operations {
    config: Config,
    probe: Box<dyn EnvironmentProbe>,
    runner: Box<dyn CommandRunner>,
    fetcher: Box<dyn ArchiveFetcher>,
}

impl Operations {
    /// Operations backed by the real `PATH`, child processes and HTTP.
    pub fn new(config: Config) -> Self {
        let probe = SystemProbe::from_env(&config.converter.engine_search_paths);
        let fetcher = HttpFetcher::new(config.template.download_timeout);
        Self::with_components(config, probe, SystemRunner, fetcher)
    }

    pub fn with_components(
        config: Config,
        probe: impl EnvironmentProbe + 'static,
        runner: impl CommandRunner + 'static,
        fetcher: impl ArchiveFetcher + 'static,
    ) -> Self {
        Self {
            config,
            probe: Box::new(probe),
            runner: Box::new(runner),
            fetcher: Box::new(fetcher),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Report which prerequisites are present. Never mutates anything.
    pub fn probe(&self) -> ReadinessReport {
        let config = &self.config;
        let locate = |program: &str| Presence::from_option(self.probe.locate(program));
        ReadinessReport {
            converter: locate(&config.converter.program),
            engine: locate(&config.converter.engine),
            package_manager: locate(&config.bootstrap.package_manager),
            tex_package_manager: locate(&config.bootstrap.tex_package_manager),
            template: Presence::from_option(discover_template(
                &config.paths.base_dir,
                &config.template.file_name,
            )),
            defaults_file: Presence::from_file(&config.paths.defaults_file),
            lint_helper: Presence::from_file(&config.paths.lint_helper),
        }
    }

    /// Locate the template, downloading and unpacking the release archive
    /// when it is missing.
    pub fn ensure_template(&self) -> OperationResult<TemplateOutcome> {
        let outcome = template::ensure_template(
            &self.config.paths.base_dir,
            &self.config.template,
            self.fetcher.as_ref(),
        )?;
        Ok(outcome)
    }

    /// Steps that would install the PDF engine on this machine.
    pub fn plan_engine_install(&self) -> InstallPlan {
        InstallPlan::for_environment(&self.config.bootstrap, self.probe.as_ref())
    }

    /// Install the PDF engine unless it is already present.
    ///
    /// Under [`ElevationPolicy::Deny`] a plan with elevated steps is returned
    /// inside [`OperationError::RequiresElevation`] without running anything.
    pub fn install_engine(&self, policy: ElevationPolicy) -> OperationResult<InstallOutcome> {
        let engine = &self.config.converter.engine;
        if let Some(path) = self.probe.locate(engine) {
            return Ok(InstallOutcome {
                engine: path,
                executed: Vec::new(),
            });
        }

        let plan = self.plan_engine_install();
        if policy == ElevationPolicy::Deny && plan.requires_elevation() {
            return Err(OperationError::RequiresElevation {
                engine: engine.clone(),
                plan,
            });
        }

        let executed = plan.execute(self.runner.as_ref(), self.probe.as_ref())?;
        match self.probe.locate(engine) {
            Some(path) => {
                info!(engine = %path.display(), "PDF engine installed");
                Ok(InstallOutcome {
                    engine: path,
                    executed,
                })
            }
            None => Err(OperationError::EngineUnavailable {
                engine: engine.clone(),
            }),
        }
    }

    /// Lint documents with the built-in rules.
    pub fn lint(&self, options: LintOptions) -> OperationResult<LintOutcome> {
        let report = Linter::new(&self.config.lint)
            .with_root(&self.config.sources.working_directory)
            .check_paths(&options.paths)?;
        let rendered = report.render(options.format);
        let exit_code = report.exit_code();
        Ok(LintOutcome {
            report,
            rendered,
            exit_code,
        })
    }
}
