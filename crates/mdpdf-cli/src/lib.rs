mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use mdpdf_config::{Config, LoadOptions};
use mdpdf_lint::LintFormat;
use mdpdf_ops::{
    BuildOptions, BuildOutcome, ElevationPolicy, ExitCode, LintOptions, LintOutcome,
    OperationError, Operations, Presence,
};

use logging::{init_cli_logger, Verbosity};

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_cli_logger(cli.verbosity());

    if cli.command.is_none() && cli.input.is_none() {
        eprintln!("{}", Cli::command().render_usage());
        return Ok(ExitCode::Usage as i32);
    }

    let mut options = LoadOptions::default();
    if let Some(path) = cli.config {
        options = options.with_override_path(path);
    }
    let config = Config::load(options)?;
    let ops = Operations::new(config);

    match (cli.command, cli.input) {
        (Some(Command::Build(args)), _) => handle_build(&ops, args),
        (Some(Command::Lint(args)), _) => handle_lint(&ops, args),
        (Some(Command::Doctor(args)), _) => handle_doctor(&ops, args),
        (Some(Command::Setup(args)), _) => handle_setup(&ops, args),
        (None, input) => handle_build(
            &ops,
            BuildArgs {
                input: input.unwrap_or_default(),
                install: false,
            },
        ),
    }
}

fn handle_build(ops: &Operations, args: BuildArgs) -> Result<i32> {
    let BuildArgs { input, install } = args;
    let elevation = if install {
        ElevationPolicy::Interactive
    } else {
        ElevationPolicy::Deny
    };

    match ops.build(BuildOptions::new(input).with_elevation(elevation)) {
        Ok(BuildOutcome { output, .. }) => {
            println!("✔️ PDF created: {}", output.display());
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err, "mdpdf build --install")),
    }
}

fn handle_lint(ops: &Operations, args: LintArgs) -> Result<i32> {
    let LintArgs { files, format } = args;
    let format = match format.unwrap_or(FormatValue::Plain) {
        FormatValue::Plain => LintFormat::Plain,
        FormatValue::Json => LintFormat::Json,
    };

    let LintOutcome {
        rendered,
        exit_code,
        ..
    } = ops.lint(LintOptions {
        paths: files,
        format,
    })?;

    emit(&rendered)?;
    Ok(exit_code)
}

fn handle_doctor(ops: &Operations, args: DoctorArgs) -> Result<i32> {
    let report = ops.probe();
    match args.format.unwrap_or(FormatValue::Plain) {
        FormatValue::Plain => emit(&report.render_plain())?,
        FormatValue::Json => emit(&serde_json::to_string_pretty(&report.to_json())?)?,
    }
    Ok(if report.is_ready() {
        ExitCode::Success as i32
    } else {
        ExitCode::Failure as i32
    })
}

fn handle_setup(ops: &Operations, args: SetupArgs) -> Result<i32> {
    let SetupArgs {
        allow_elevation,
        dry_run,
    } = args;

    if dry_run {
        let report = ops.probe();
        match &report.template {
            Presence::Found(path) => println!("template: present at {}", path.display()),
            Presence::Missing => println!(
                "template: would download {}",
                ops.config().template.archive_url
            ),
        }
        match &report.engine {
            Presence::Found(path) => println!("engine: present at {}", path.display()),
            Presence::Missing => {
                println!("engine: missing, installation plan:");
                print!("{}", ops.plan_engine_install());
            }
        }
        return Ok(0);
    }

    match ops.ensure_template() {
        Ok(outcome) if outcome.downloaded => {
            println!("✔️ template installed: {}", outcome.path.display())
        }
        Ok(outcome) => println!("✔️ template present: {}", outcome.path.display()),
        Err(err) => return Ok(report_failure(&err, "mdpdf setup --allow-elevation")),
    }

    let policy = if allow_elevation {
        ElevationPolicy::Interactive
    } else {
        ElevationPolicy::Deny
    };
    match ops.install_engine(policy) {
        Ok(outcome) if outcome.executed.is_empty() => {
            println!("✔️ engine present: {}", outcome.engine.display());
            Ok(0)
        }
        Ok(outcome) => {
            println!("✔️ engine installed: {}", outcome.engine.display());
            Ok(0)
        }
        Err(err) => Ok(report_failure(&err, "mdpdf setup --allow-elevation")),
    }
}

/// Print a failed operation and return its exit code.
fn report_failure(err: &OperationError, elevated_rerun: &str) -> i32 {
    match err {
        OperationError::LintFindings { rendered, .. } => {
            print!("{rendered}");
            eprintln!("❌ {err}");
        }
        OperationError::RequiresElevation { plan, .. } => {
            eprintln!("❌ {err}");
            eprintln!("The following steps would run:");
            eprint!("{plan}");
            eprintln!("Rerun with `{elevated_rerun}` to install interactively.");
        }
        _ => eprintln!("❌ {err}"),
    }
    err.exit_code() as i32
}

fn emit(content: &str) -> Result<()> {
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Convert Markdown design documents to styled PDFs",
    propagate_version = true,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Markdown document to convert (shorthand for `mdpdf build <FILE>`)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,
    /// Use this config file instead of discovering `.mdpdf.toml`
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Show debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Convert a Markdown document to PDF
    Build(BuildArgs),
    /// Check Markdown files with the built-in rules
    Lint(LintArgs),
    /// Report which prerequisites are installed
    Doctor(DoctorArgs),
    /// Install the template and the PDF engine
    Setup(SetupArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Markdown document to convert
    #[arg(value_name = "FILE")]
    input: PathBuf,
    /// Allow the interactive, elevated PDF engine installation
    #[arg(long)]
    install: bool,
}

#[derive(Args)]
struct LintArgs {
    /// Markdown files to check
    #[arg(value_name = "FILE", required = true, action = ArgAction::Append)]
    files: Vec<PathBuf>,
    /// Select lint output format
    #[arg(long, value_enum)]
    format: Option<FormatValue>,
}

#[derive(Args)]
struct DoctorArgs {
    /// Select report format
    #[arg(long, value_enum)]
    format: Option<FormatValue>,
}

#[derive(Args)]
struct SetupArgs {
    /// Permit installation steps that prompt for elevated privileges
    #[arg(long = "allow-elevation")]
    allow_elevation: bool,
    /// Print what would be installed without changing anything
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatValue {
    Plain,
    Json,
}
