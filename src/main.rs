use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use video_grabber_lib::cli::{Cli, Commands};
use video_grabber_lib::console::{render_report, terminal_emitter, ConsoleOperator};
use video_grabber_lib::downloader::tools::ToolManager;
use video_grabber_lib::downloader::{AcquisitionChain, DownloadError, ProgressEmitter};

const EXIT_EXHAUSTED: u8 = 1;
const EXIT_FATAL: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("failed to initialise logging: {}", e);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if matches!(e.downcast_ref::<DownloadError>(), Some(DownloadError::Cancelled)) {
                // A prompt may still hold stdin on a blocking thread, which
                // runtime shutdown would wait on.
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            }
            error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = cli.to_config();
    config.validate()?;

    match &cli.command {
        Some(Commands::Tools) => {
            let manager = ToolManager::new(config.tools.clone());
            for tool in manager.get_all_tools().await {
                match (&tool.path, &tool.version) {
                    (Some(path), version) => println!(
                        "{:<8} {} ({})",
                        tool.name,
                        version.as_deref().unwrap_or("unknown version"),
                        path
                    ),
                    (None, _) => println!("{:<8} not found - {}", tool.name, tool.tool_type.install_hint()),
                }
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Update) => {
            ToolManager::new(config.tools.clone()).install_ytdlp().await?;
            println!("yt-dlp updated");
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    let input = match cli.input() {
        Some(input) => input,
        None => ConsoleOperator::ask("Video page URL or search query: ")
            .await
            .filter(|s| !s.is_empty())
            .context("no URL or search query given")?,
    };

    let operator = Arc::new(ConsoleOperator);
    let mut config = config;
    if !cli.skip_tool_check {
        config.tools = ToolManager::new(config.tools.clone())
            .ensure_tools(operator.as_ref())
            .await?;
    }

    let emitter = if cli.quiet || cli.json {
        ProgressEmitter::silent()
    } else {
        terminal_emitter()
    };
    let dest_dir = config.download_dir.clone();
    let chain = AcquisitionChain::from_config(config, operator, emitter)?
        .with_extract_order(cli.order.into());

    let report = tokio::select! {
        report = chain.run(&input) => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!(
                "Interrupted; any partial file in {} should not be trusted",
                dest_dir.display()
            );
            bail!(DownloadError::Cancelled);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_report(&report));
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_EXHAUSTED)
    })
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(verbose),
        )
        .try_init()?;
    Ok(())
}
