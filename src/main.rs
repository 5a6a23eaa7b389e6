use anyhow::Context;
use clap::Parser;
use ffmpeg_relay::remux::RemuxPipeline;
use tokio_util::sync::CancellationToken;

mod config;
mod dump;

use config::{Action, Args, RunConfig};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("avtools", level)
        .filter_module("ffmpeg_relay", level)
        .parse_default_env()
        .init();
}

fn execute(action: Action, cancel: &CancellationToken) -> anyhow::Result<()> {
    match action {
        Action::Dump(config) => dump::dump(&config, cancel),
        Action::Parse(config) => dump::parse(&config, cancel),
        Action::Remux(config) => {
            let sources = config.inputs.join(", ");
            let mut pipeline = RemuxPipeline::open(&config)
                .with_context(|| format!("remux {} -> {}", sources, config.output))?;
            let summary = pipeline.run(cancel)?;
            log::info!(
                "remuxed {} streams from {} sources: {} packets written, {} skipped{}",
                summary.streams_mapped,
                summary.sources_relayed,
                summary.packets_written,
                summary.packets_skipped,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            Ok(())
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = RunConfig::try_from(args)?;
    ffmpeg_relay::init()?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let mut worker = tokio::task::spawn_blocking(move || execute(config.action, &cancel_clone));

    tokio::select! {
        result = &mut worker => result.context("pipeline task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("ctrl+c received, stopping");
            cancel.cancel();
            worker.await.context("pipeline task panicked")?
        },
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
