//! PDF engine installation plan.

use std::fmt;
use std::io;
use std::path::PathBuf;

use mdpdf_config::BootstrapSettings;
use tracing::info;

use crate::error::{OperationError, OperationResult};
use crate::probe::EnvironmentProbe;
use crate::runner::{CommandRunner, Invocation};

/// Whether installation steps that need elevated privileges may run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ElevationPolicy {
    /// Refuse to run elevated steps; the caller receives the plan instead.
    #[default]
    Deny,
    /// Run elevated steps attached to the terminal so they can prompt.
    Interactive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallStep {
    pub label: String,
    pub argv: Vec<String>,
    /// The step may prompt for credentials or escalate privileges.
    pub elevated: bool,
    /// Index into `argv` of a program installed by an earlier step; it is
    /// looked up again just before the step runs.
    pub deferred_program: Option<usize>,
}

impl InstallStep {
    fn new(label: &str, argv: Vec<String>) -> Self {
        InstallStep {
            label: label.to_string(),
            argv,
            elevated: true,
            deferred_program: None,
        }
    }

    /// Copy of this step with the deferred program replaced by the path the
    /// probe reports now. Unresolved programs keep their bare name.
    pub fn resolve(&self, probe: &dyn EnvironmentProbe) -> InstallStep {
        let mut step = self.clone();
        if let Some(index) = step.deferred_program.take() {
            if let Some(slot) = step.argv.get_mut(index) {
                if let Some(path) = probe.locate(slot) {
                    *slot = path.to_string_lossy().into_owned();
                }
            }
        }
        step
    }

    pub fn invocation(&self) -> Option<Invocation> {
        let (program, args) = self.argv.split_first()?;
        Some(
            Invocation::new(program)
                .args(args)
                .interactive(self.elevated),
        )
    }

    pub fn command_line(&self) -> String {
        self.invocation()
            .map(|invocation| invocation.to_string())
            .unwrap_or_default()
    }
}

/// Ordered steps that bring the PDF engine onto the machine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallPlan {
    pub steps: Vec<InstallStep>,
}

impl InstallPlan {
    /// Build the plan for the current machine. The package manager install is
    /// only included when the package manager cannot be found.
    pub fn for_environment(settings: &BootstrapSettings, probe: &dyn EnvironmentProbe) -> Self {
        let mut steps = Vec::new();

        if probe.locate(&settings.package_manager).is_none() {
            steps.push(InstallStep::new(
                "install package manager",
                settings.package_manager_install.clone(),
            ));
        }

        steps.push(InstallStep::new(
            "install TeX distribution",
            settings.tex_distribution_install.clone(),
        ));

        // The TeX package manager usually lands outside `PATH`, so it is
        // resolved when the step runs rather than now.
        let tlmgr = |label: &str, tail: Vec<String>| -> InstallStep {
            let prefix: Vec<String> = settings.elevation_command.iter().cloned().collect();
            let mut argv = prefix.clone();
            argv.push(settings.tex_package_manager.clone());
            argv.extend(tail);
            InstallStep {
                deferred_program: Some(prefix.len()),
                ..InstallStep::new(label, argv)
            }
        };
        steps.push(tlmgr(
            "update TeX package manager",
            vec!["update".into(), "--self".into()],
        ));

        let mut packages = vec!["install".to_string()];
        packages.extend(settings.tex_packages.iter().cloned());
        steps.push(tlmgr("install TeX packages", packages));

        InstallPlan { steps }
    }

    pub fn requires_elevation(&self) -> bool {
        self.steps.iter().any(|step| step.elevated)
    }

    /// Execute every step in order, stopping at the first failure. Returns
    /// the steps as they actually ran.
    pub fn execute(
        &self,
        runner: &dyn CommandRunner,
        probe: &dyn EnvironmentProbe,
    ) -> OperationResult<Vec<InstallStep>> {
        let mut executed = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step = step.resolve(probe);
            let invocation = step.invocation().ok_or_else(|| OperationError::InstallLaunch {
                step: step.label.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            })?;

            info!(step = %step.label, command = %invocation, "running installation step");
            let status = runner
                .run(&invocation)
                .map_err(|source| OperationError::InstallLaunch {
                    step: step.label.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(OperationError::InstallFailed {
                    step: step.label.clone(),
                    code: status.code,
                });
            }
            executed.push(step);
        }
        Ok(executed)
    }
}

impl fmt::Display for InstallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            let marker = if step.elevated { " (elevated)" } else { "" };
            writeln!(f, "{}. {}{marker}", index + 1, step.label)?;
            writeln!(f, "   {}", step.command_line())?;
        }
        Ok(())
    }
}

/// Result of an engine installation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallOutcome {
    pub engine: PathBuf,
    /// Steps that were executed; empty when the engine was already present.
    pub executed: Vec<InstallStep>,
}
