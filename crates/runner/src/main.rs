use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use harness::{HarnessConfig, Registry, Runner};
use sim::{SimConfig, SimMachine};

#[derive(Parser, Debug)]
#[command(name = "hvprobe", version, about = "Probe privileged x86 behavior with self-restoring test cases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List the registered cases.
    List,
    /// Run the suite, or one case, on the simulated machine.
    Run {
        /// Name of a single case to run.
        #[arg(long)]
        case: Option<String>,
        /// Override the number of work-pool pages.
        #[arg(long)]
        work_pages: Option<u32>,
        /// JSON harness configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the suite report as JSON here.
        #[arg(long)]
        json: Option<PathBuf>,
        /// Print what the test UART received.
        #[arg(long)]
        show_serial: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    let Some(path) = path else { return Ok(HarnessConfig::default()) };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    HarnessConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let registry = Registry::builtin()?;
    match cli.cmd {
        Cmd::List => {
            for case in registry.iter() {
                println!("{}\n    {}", case.name, case.description);
            }
        }
        Cmd::Run { case, work_pages, config, json, show_serial } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(pages) = work_pages {
                config.work_pool_pages = pages;
            }
            log::debug!("harness config {}", serde_json::to_string(&config)?);

            let mut machine = SimMachine::boot(&SimConfig::default())?;
            let suite = Runner::new(&mut machine, &config)?.run_all(&registry, case.as_deref())?;
            suite.print_summary();
            if let Some(path) = json {
                suite.write_json(&path).with_context(|| format!("writing {}", path.display()))?;
            }
            if show_serial {
                let port = harness::cases::rep_outs::TEST_PORT;
                let out = machine.serial_output(port.base());
                println!("{port}: {}", String::from_utf8_lossy(&out));
            }
            for fault in machine.faults() {
                log::warn!("machine recorded {} fault: {}", fault.op, fault.exception);
            }
            if suite.failures() > 0 {
                bail!("{} of {} cases failed", suite.failures(), suite.cases.len());
            }
        }
    }
    Ok(())
}
