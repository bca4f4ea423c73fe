//! Assembles one short from the configured inputs and publishes it.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hookreel_media::{FfmpegRunner, FfprobeProber};
use hookreel_storage::R2Client;
use hookreel_worker::{exit_code, AssemblyPipeline, PipelineConfig, RunSummary, WorkerError};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hookreel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting hookreel");

    let result = run().await;
    match &result {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                video_url = %summary.publication.video_url,
                duration = summary.render.duration,
                "Short published"
            );
            println!("{}", summary.publication.video_url);
        }
        Err(e) => error!("{:#}", e),
    }

    std::process::exit(exit_code(&result));
}

async fn run() -> anyhow::Result<RunSummary> {
    let config = PipelineConfig::from_env()?;
    info!("Pipeline config: {:?}", config);

    let store = R2Client::from_env().await.map_err(WorkerError::from)?;

    let mut engine = FfmpegRunner::new();
    if let Some(limit) = config.render_timeout {
        engine = engine.with_timeout(limit.as_secs());
    }

    let pipeline = AssemblyPipeline::new(config, FfprobeProber, engine, store);
    let summary = pipeline.run().await?;
    Ok(summary)
}
