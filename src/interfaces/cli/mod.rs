//! Command-line interface of the `evcont` binary.

use std::path::PathBuf;

use anyhow;
use clap::Parser;

use crate::interfaces::input::EvcontInput;
use crate::interfaces::InputHandle;
use crate::io::format::{evcont_error, evcont_output};
use crate::io::read_evcont_yaml;


const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted `EVCont` heading to the `evcont-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    evcont_output!("╭──────────────────────────────────────────────────────────────╮");
    evcont_output!("│                                                              │");
    evcont_output!("│   EVCont: eigenvector continuation across nuclear geometries │");
    evcont_output!("│                                                              │");
    evcont_output!("│{version:>61} │");
    evcont_output!("╰──────────────────────────────────────────────────────────────╯");
    evcont_output!("");
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML input file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to an output file receiving the main `EVCont` output. If absent, the output is only
    /// written to the console.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Increases the verbosity of console logging. May be given more than once.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Runs the `evcont` binary on the input file named on the command line.
///
/// Failures are logged to the `evcont-output` logger before being returned.
pub fn run(cli: &Cli) -> Result<(), anyhow::Error> {
    log_heading();
    let input: EvcontInput = read_evcont_yaml(&cli.config).map_err(|err| {
        evcont_error!("Unable to parse the input file `{}`:", cli.config.display());
        evcont_error!("  {err:#}");
        err
    })?;
    input.handle()
}
