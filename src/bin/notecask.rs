//! notecask CLI Binary
//!
//! Command-line interface for directory-backed notebooks.

use anyhow::Context;
use clap::Parser;
use notecask::config::ConfigLoader;
use notecask::logging::init_logging;
use notecask::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    let context = match start(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error initializing notecask: {:#}", e);
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn start(cli: &Cli) -> anyhow::Result<CliContext> {
    let config = ConfigLoader::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading configuration from {}", path.display()),
        None => "loading configuration".to_string(),
    })?;

    let mut logging = cli.logging_config(&config.logging);
    if logging.output.contains("file") && logging.file.is_none() {
        let path = notecask::logging::resolve_log_file_path(None, None, Some(&cli.notebook))
            .or_else(|_| notecask::logging::resolve_log_file_path(None, None, None))
            .context("resolving log file path")?;
        logging.file = Some(path);
    }
    init_logging(Some(&logging)).context("initializing logging")?;

    let preferences_path = notecask::config::Preferences::default_path().ok();
    let context = CliContext::with_config(cli.notebook.clone(), config, preferences_path);

    // First Ctrl-C cancels a running backup or restore; otherwise exit.
    let interrupt = context.interrupt();
    ctrlc::set_handler(move || {
        if interrupt.request() {
            eprintln!("\nCanceling...");
        } else {
            process::exit(130);
        }
    })
    .context("installing Ctrl-C handler")?;

    Ok(context)
}
