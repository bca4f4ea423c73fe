//! The assembly run: probe, gate, build, render, thumbnail, publish.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::Instrument;

use hookreel_media::{
    choose_text, DurationGate, FilterGraphBuilder, GateDecision, MediaAsset, MediaProber,
    RenderEngine, Thumbnail, ThumbnailSynthesizer,
};
use hookreel_models::{PublicationRecord, PublicationSummary, ResourceKind};
use hookreel_storage::ObjectStore;

use crate::config::PipelineConfig;
use crate::error::{Stage, WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::metrics;
use crate::publication::PublicationLedger;
use crate::publisher::Publisher;

/// The rendered short.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResult {
    pub path: PathBuf,
    /// Probed duration of the output
    pub duration: f64,
    /// Duration the graph was expected to produce
    pub expected_duration: f64,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub gate: GateDecision,
    /// Main clip duration before any slow motion
    pub original_main_duration: f64,
    pub render: RenderResult,
    pub thumbnail: Thumbnail,
    pub publication: PublicationSummary,
    pub records: Vec<PublicationRecord>,
}

/// One end-to-end assembly run over injected probe, render and storage seams.
pub struct AssemblyPipeline<P, R, S> {
    config: PipelineConfig,
    prober: P,
    engine: R,
    publisher: Publisher<S>,
    logger: RunLogger,
}

impl<P, R, S> AssemblyPipeline<P, R, S>
where
    P: MediaProber,
    R: RenderEngine,
    S: ObjectStore,
{
    pub fn new(config: PipelineConfig, prober: P, engine: R, store: S) -> Self {
        let publisher = Publisher::new(store, config.publish.clone());
        Self {
            config,
            prober,
            engine,
            publisher,
            logger: RunLogger::new(),
        }
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &R {
        &self.engine
    }

    pub fn store(&self) -> &S {
        self.publisher.store()
    }

    /// Execute the run. Any error is fatal and names the stage it stopped at.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        let span = self.logger.create_span();
        let result = self.execute().instrument(span).await;

        match &result {
            Ok(summary) => {
                metrics::record_run("success");
                self.logger
                    .log_completion(&format!("published {}", summary.publication.video_url));
            }
            Err(e) => {
                metrics::record_run(e.stage().as_str());
                self.logger.log_error(e.stage(), &e.to_string());
            }
        }
        result
    }

    async fn execute(&self) -> WorkerResult<RunSummary> {
        let config = &self.config;
        let work = &config.work_dir;
        config.validate()?;
        self.logger.log_start(&format!(
            "main={} hook={} music={}",
            config.inputs.main.display(),
            config.inputs.hook.display(),
            config.inputs.music.display()
        ));

        tokio::fs::create_dir_all(work.root()).await.map_err(|e| {
            WorkerError::config_error(format!(
                "work directory {}: {}",
                work.root().display(),
                e
            ))
        })?;

        self.logger.log_stage(Stage::Probe, "Probing inputs");
        let main = self.probe(&config.inputs.main, Stage::Probe).await?;
        let hook = self.probe(&config.inputs.hook, Stage::Probe).await?;
        let music = self.probe(&config.inputs.music, Stage::Probe).await?;

        FilterGraphBuilder::validate_inputs(&main, &hook, &music)
            .map_err(WorkerError::at(Stage::InputValidation))?;

        self.logger.log_stage(Stage::DurationGate, "Checking main clip duration");
        let gate = DurationGate::from_config(&config.assembly);
        let started = Instant::now();
        let gated = gate
            .apply(main, &work.slowmo(), &config.encoding, &self.prober, &self.engine)
            .await
            .map_err(WorkerError::at(Stage::DurationGate))?;
        if let GateDecision::SlowMotion { .. } = gated.decision {
            metrics::record_slowmo_applied();
            metrics::record_render_duration("slowmo", started.elapsed().as_secs_f64());
        }

        self.logger.log_stage(Stage::GraphBuild, "Building filter graph");
        let assembly = FilterGraphBuilder::new(config.assembly.clone())
            .build(&gated.asset, &hook, &music)
            .map_err(WorkerError::at(Stage::GraphBuild))?;

        self.logger.log_stage(Stage::Render, "Rendering short");
        let output_path = work.output();
        let cmd = assembly.to_command(&output_path, &config.encoding);
        let started = Instant::now();
        self.engine
            .render_expecting(&cmd, assembly.expected_duration())
            .await
            .map_err(WorkerError::at(Stage::Render))?;
        metrics::record_render_duration("assembly", started.elapsed().as_secs_f64());

        let output = self.probe(&output_path, Stage::Render).await?;
        let render = RenderResult {
            path: output_path.clone(),
            duration: output.duration(),
            expected_duration: assembly.expected_duration(),
        };

        self.logger.log_stage(Stage::Thumbnail, "Synthesizing thumbnail");
        let thumbnail = self.thumbnail(&output).await?;

        self.logger.log_stage(Stage::Publish, "Publishing artifacts");
        let mut ledger = PublicationLedger::in_work_dir(work);

        let mut video_job = self.publisher.job(&output_path, ResourceKind::Video);
        let video = self.publisher.publish(&mut video_job).await?;
        ledger.record(video);

        let mut image_job = self.publisher.job(&thumbnail.path, ResourceKind::Image);
        let image = self.publisher.publish(&mut image_job).await?;
        ledger.record(image);

        let publication = ledger.finish(Utc::now()).await?;

        Ok(RunSummary {
            run_id: self.logger.run_id().to_string(),
            gate: gated.decision,
            original_main_duration: gated.original_duration,
            render,
            thumbnail,
            publication,
            records: ledger.records().to_vec(),
        })
    }

    async fn probe(&self, path: &std::path::Path, stage: Stage) -> WorkerResult<MediaAsset> {
        self.prober.probe(path).await.map_err(WorkerError::at(stage))
    }

    async fn thumbnail(&self, video: &MediaAsset) -> WorkerResult<Thumbnail> {
        let work = &self.config.work_dir;
        let text = choose_text(self.config.thumbnail_text.as_deref());
        let synthesizer = ThumbnailSynthesizer::new(self.config.thumbnail.clone());

        let started = Instant::now();
        let thumbnail = synthesizer
            .synthesize(&self.engine, video, &text, &work.frame(), &work.thumbnail())
            .await
            .map_err(WorkerError::at(Stage::Thumbnail))?;
        metrics::record_render_duration("thumbnail", started.elapsed().as_secs_f64());

        if thumbnail.fallback {
            metrics::record_thumbnail_fallback();
            self.logger
                .log_warning(Stage::Thumbnail, "Frame compositing failed, used placeholder");
        }
        Ok(thumbnail)
    }
}
