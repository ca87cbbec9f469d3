use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tilefilter", version)]
struct Cli {
    /// Log pipeline decisions to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded host session and print where every node ended up.
    Replay(ReplayArgs),
    /// Print the default reconciler options as JSON.
    Defaults,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Input scenario JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Reconciler options JSON; overrides the options embedded in the scenario.
    #[arg(long)]
    opts: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Replay(args) => cmd_replay(args),
        Command::Defaults => print_json(&tilefilter::ReconcilerOpts::default()),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let scenario = tilefilter::Scenario::from_path(&args.in_path)
        .with_context(|| format!("load scenario '{}'", args.in_path.display()))?;
    let report = match &args.opts {
        Some(path) => {
            let opts = tilefilter::ReconcilerOpts::from_path(path)
                .with_context(|| format!("load options '{}'", path.display()))?;
            scenario.run_with(opts)
        }
        None => scenario.run(),
    }
    .with_context(|| "replay scenario")?;
    print_json(&report)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).with_context(|| "write JSON")?;
    writeln!(out).with_context(|| "write JSON")?;
    Ok(())
}
