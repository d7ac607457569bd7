//! irr-walker - IRR / Whois Prefix Resolver
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use irr_walker::client::Client;
use irr_walker::config::{self, CliArgs, ResolveConfig};
use irr_walker::output;
use std::io::Write;
use std::process::ExitCode;
use tracing::{debug, error};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.debug)?;

    let config = ResolveConfig::from_args(args).context("Invalid configuration")?;

    let mut client = Client::new(config.client_options());
    let options = config.query_options();

    match config.forced_endpoint() {
        Some(endpoint) => client.query_endpoint(endpoint, &config.objects, &options),
        None => client.query(&config.host, &config.objects, &options),
    }
    .with_context(|| format!("Failed to query '{}'", config.host))?;

    debug!(
        host = %config.host,
        objects = config.objects.len(),
        workers = config.worker_count,
        "Resolving"
    );

    let resolution = client.perform().context("Resolution failed")?;

    let text = output::render(&resolution, config.format).context("Failed to render result")?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .context("Failed to write result")?;

    Ok(())
}

/// Logs go to stderr so stdout carries only the rendered result
fn setup_logging(debug: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config::log_filter(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(debug)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
