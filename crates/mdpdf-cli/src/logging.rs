use std::io::{self, IsTerminal};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATES: &[&str] = &["mdpdf_cli", "mdpdf_config", "mdpdf_lint", "mdpdf_ops"];

/// How chatty progress logging on stderr should be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

fn default_directives(verbosity: Verbosity) -> String {
    let level = match verbosity {
        Verbosity::Quiet => return "warn".to_string(),
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    };
    let mut directives = vec!["warn".to_string()];
    directives.extend(CRATES.iter().map(|krate| format!("{krate}={level}")));
    directives.join(",")
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init_cli_logger(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
