//! Kestrel - closure conversion driver
//!
//! Lowers the lambdas and method references of a resolved compilation unit
//! and optionally runs the result on the reference evaluator.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;

/// Kestrel closure conversion
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(author, version, about = "Lower Kestrel lambdas and method references to adapter types")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lower every closure site of a compilation unit
    Lower(commands::lower::LowerArgs),

    /// Lower a compilation unit and evaluate a static method
    Run(commands::run::RunArgs),

    /// Explain an error code
    Explain(commands::explain::ExplainArgs),
}

/// `RUST_LOG` wins; otherwise `-v` selects info, `-vv` debug, `-vvv` trace.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Colors only when `stream` itself is a terminal; piping stdout must not
/// strip them from stderr.
fn color_enabled(no_color: bool, quiet: bool, stream: atty::Stream, is_tty: impl Fn(atty::Stream) -> bool) -> bool {
    !no_color && !quiet && is_tty(stream)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // Diagnostics and the lowering summary go to stderr, explanations to stdout.
    let (no_color, quiet) = (cli.no_color, cli.quiet);
    let color_on = move |stream: atty::Stream| color_enabled(no_color, quiet, stream, atty::is);

    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Lower(args) => {
            commands::lower::run(args, cli.format, color_on(atty::Stream::Stderr), cli.quiet)
        }
        Commands::Run(args) => commands::run::run(args, cli.format, color_on(atty::Stream::Stderr)),
        Commands::Explain(args) => commands::explain::run(args, cli.format, color_on(atty::Stream::Stdout)),
    }
}
