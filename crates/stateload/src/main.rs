//! `stateload`: restore a UAE state file.
//!
//! Without real hardware underneath, the loader runs against a simulated
//! machine built from a model preset or a JSON description, and reports
//! where the restored program would resume.

mod console;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use machine_amiga::{AmigaModel, MachineConfig, SimMachine};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stateload", version, about = "Restore a UAE state file")]
struct Cli {
    /// UAE state file (`.uss`).
    snapshot: Option<PathBuf>,

    /// Machine preset: a500, a500plus, a600, a1200, a3000 or a4000.
    #[arg(long, default_value = "a1200", value_parser = AmigaModel::from_name)]
    model: AmigaModel,

    /// JSON machine description; overrides `--model`.
    #[arg(long)]
    machine: Option<PathBuf>,

    /// Answer the RETURN prompt without reading the terminal.
    #[arg(short, long)]
    yes: bool,

    /// Log every staged chunk and relocation.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = usage(&e, &mut io::stdout().lock());
            return ExitCode::SUCCESS;
        }
    };
    console::init(cli.verbose);

    let Some(path) = cli.snapshot.as_deref() else {
        info!("Syntax: stateload <statefile.uss>.");
        return ExitCode::SUCCESS;
    };
    if let Err(e) = run(&cli, path) {
        error!("{e:#}");
    }
    // The exit status never reflects the outcome; the messages do.
    ExitCode::SUCCESS
}

/// Argument errors, `--help` and `--version` all go to stdout like every
/// other message.
fn usage(e: &clap::Error, out: &mut impl Write) -> io::Result<()> {
    write!(out, "{e}")?;
    out.flush()
}

fn machine(cli: &Cli) -> Result<SimMachine> {
    let config = match &cli.machine {
        Some(path) => MachineConfig::load(path)
            .with_context(|| format!("Couldn't load machine '{}'", path.display()))?,
        None => MachineConfig::preset(cli.model),
    };
    let machine = SimMachine::new(config)?;
    Ok(if cli.yes {
        machine.with_keys(*b"\n")
    } else {
        machine.with_stdin_keys()
    })
}

fn run(cli: &Cli, path: &Path) -> Result<()> {
    let mut host = machine(cli)?;
    let file = File::open(path).with_context(|| format!("Couldn't open '{}'", path.display()))?;

    let Some(resumed) = stateload::run(BufReader::new(file), &mut host) else {
        return Ok(());
    };
    let ctx = resumed.context;
    let ssp = if ctx.supervisor() { ctx.a[7] } else { ctx.isp };
    info!(
        "Resumed at PC={:08x} SR={:04x} SSP={:08x}.",
        ctx.pc, ctx.sr, ssp
    );
    info!("Replay wrote {} bus events.", host.replay_trace().len());
    Ok(())
}
