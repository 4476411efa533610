//! Command-line client for the Finger protocol

use std::{fs::File, io::Write, process::ExitCode, sync::Mutex};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = finger::Cli::parse();

    // Set up our logging
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(args.verbosity()),
    );
    if let Some(log_path) = &args.log_file {
        let log_file = File::create(log_path).context("Unable to create log file")?;
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(log_file))
                    .with_filter(args.file_verbosity()),
            )
            .init();
    } else {
        registry.init();
    }

    if !args.has_target() {
        finger::Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    match run(&args).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!("{e:?}");
            eprintln!("Error: {e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: &finger::Cli) -> anyhow::Result<()> {
    let query = args.query();
    let response = finger::Client::with_timeout(args.timeout)
        .query(&query, args.host.as_deref(), args.port)
        .await
        .with_context(|| format!("Finger query {query:?} failed"))?;

    // The body is opaque text; print it exactly as received
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(response.body().as_bytes())?;
    if !response.body().is_empty() && !response.body().ends_with(['\r', '\n']) {
        writeln!(stdout)?;
    }
    stdout.flush()?;

    Ok(())
}
