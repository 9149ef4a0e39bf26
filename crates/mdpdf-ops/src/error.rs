use std::io;
use std::path::PathBuf;

use mdpdf_lint::LintError;
use thiserror::Error;

use crate::bootstrap::InstallPlan;
use crate::template::TemplateError;

/// Process exit codes. Only zero versus non-zero is a stable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    Usage = 2,
    Precondition = 3,
    Lint = 4,
    Template = 5,
    Environment = 6,
    RequiresElevation = 7,
    Conversion = 8,
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("defaults file not found: {}", path.display())]
    DefaultsNotFound { path: PathBuf },

    #[error("lint helper {} reported errors in {}", helper.display(), input.display())]
    LintRejected { helper: PathBuf, input: PathBuf },

    #[error("built-in lint reported {errors} error(s) in {}", input.display())]
    LintFindings {
        input: PathBuf,
        errors: usize,
        rendered: String,
    },

    #[error("failed to launch lint helper {}: {source}", helper.display())]
    LintLaunch { helper: PathBuf, source: io::Error },

    #[error(
        "lint helper {} is not executable; mark it executable or set lint.interpreter",
        helper.display()
    )]
    LintHelperNotExecutable { helper: PathBuf },

    #[error(transparent)]
    Lint(#[from] LintError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("installation step '{step}' failed{}", describe_code(*code))]
    InstallFailed { step: String, code: Option<i32> },

    #[error("failed to launch installation step '{step}': {source}")]
    InstallLaunch { step: String, source: io::Error },

    #[error("{engine} is still unavailable after installation")]
    EngineUnavailable { engine: String },

    #[error("{engine} is missing and installing it requires elevated privileges")]
    RequiresElevation { engine: String, plan: InstallPlan },

    #[error("{program} exited with a failure status{}", describe_code(*code))]
    ConversionFailed { program: String, code: Option<i32> },

    #[error("failed to launch {program}: {source}")]
    ConverterLaunch { program: String, source: io::Error },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {code})"),
        None => " (terminated by signal)".to_string(),
    }
}

impl OperationError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Usage(_) => ExitCode::Usage,
            Self::InputNotFound { .. } | Self::DefaultsNotFound { .. } => ExitCode::Precondition,
            Self::LintRejected { .. }
            | Self::LintFindings { .. }
            | Self::LintLaunch { .. }
            | Self::LintHelperNotExecutable { .. }
            | Self::Lint(_) => ExitCode::Lint,
            Self::Template(_) => ExitCode::Template,
            Self::InstallFailed { .. }
            | Self::InstallLaunch { .. }
            | Self::EngineUnavailable { .. } => ExitCode::Environment,
            Self::RequiresElevation { .. } => ExitCode::RequiresElevation,
            Self::ConversionFailed { .. } | Self::ConverterLaunch { .. } => ExitCode::Conversion,
        }
    }
}

pub type OperationResult<T> = Result<T, OperationError>;
