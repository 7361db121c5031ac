//! Stackforge CLI — dependency-ordered cloud assemblies.

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "stackforge",
    version,
    about = "Dependency-ordered cloud assemblies — validate, order, synthesize"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: stackforge::cli::Commands,
}

fn init_logging(verbose: u8) {
    // RUST_LOG wins over -v.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("stackforge={}", level))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = stackforge::cli::dispatch(cli.command) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
