use std::path::Path;
use std::process;

use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use evcont::interfaces::cli::{run, Cli};

/// Sets up console logging at a level given by `verbose`, and routes the `evcont-output` target
/// to the console and optionally to `output`.
fn init_logging(verbose: u8, output: Option<&Path>) -> Result<(), anyhow::Error> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l:<5})} {t} - {m}{n}")))
        .build();

    let mut config_builder = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut output_logger = Logger::builder().appender("stdout").additive(false);
    if let Some(path) = output {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(path)?;
        config_builder = config_builder.appender(Appender::builder().build("output", Box::new(file)));
        output_logger = output_logger.appender("output");
    }
    let config = config_builder
        .logger(output_logger.build("evcont-output", LevelFilter::Info))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| format_err!(err))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.verbose, cli.output.as_deref()) {
        eprintln!("Unable to set up logging: {err}");
        process::exit(1);
    }
    if run(&cli).is_err() {
        process::exit(1);
    }
}
