//! End-to-end runs over stub probe, render and storage seams.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use hookreel_media::{
    FfmpegCommand, GateDecision, MediaAsset, MediaError, MediaProber, MediaResult, RenderEngine,
    VideoStreamInfo,
};
use hookreel_models::ResourceKind;
use hookreel_storage::{ObjectStore, StorageError, StorageResult, StoredObject, UploadRequest};
use hookreel_worker::{
    exit_code, AssemblyPipeline, InputPaths, PipelineConfig, RetryPolicy, WorkDir, WorkerError,
};

type Registry = Arc<Mutex<HashMap<PathBuf, MediaAsset>>>;

#[derive(Clone)]
struct StubProber {
    registry: Registry,
}

#[async_trait]
impl MediaProber for StubProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaAsset> {
        self.registry
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
    }
}

/// Writes plausible outputs and registers what a real encoder would produce.
struct StubEngine {
    registry: Registry,
    commands: Mutex<Vec<FfmpegCommand>>,
}

impl StubEngine {
    fn commands(&self) -> Vec<FfmpegCommand> {
        self.commands.lock().unwrap().clone()
    }

    fn duration_of(&self, path: &Path) -> f64 {
        self.registry
            .lock()
            .unwrap()
            .get(path)
            .map(MediaAsset::duration)
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl RenderEngine for StubEngine {
    async fn render(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.commands.lock().unwrap().push(cmd.clone());
        let output = cmd.output().to_path_buf();

        if output.extension().and_then(|e| e.to_str()) == Some("jpg") {
            RgbImage::from_pixel(540, 960, Rgb([90, 120, 150]))
                .save_with_format(&output, ImageFormat::Jpeg)?;
            return Ok(());
        }

        let graph = cmd.filter_complex_graph().unwrap_or_default();
        let inputs: Vec<f64> = cmd
            .inputs()
            .iter()
            .map(|input| self.duration_of(&input.path))
            .collect();

        let duration = if let Some(rest) = graph.split_once("setpts=").map(|(_, r)| r) {
            let factor: f64 = rest
                .split_once("*PTS")
                .and_then(|(f, _)| f.parse().ok())
                .unwrap_or(1.0);
            inputs[0] * factor
        } else if graph.contains("concat") {
            inputs[0] + inputs[1]
        } else {
            inputs.first().copied().unwrap_or(0.0)
        };

        std::fs::write(&output, vec![0u8; 2048])?;
        self.registry
            .lock()
            .unwrap()
            .insert(output.clone(), clip(&output, duration, 1080, 1920, true));
        Ok(())
    }
}

/// Publishes everything, or fails every call whose content type starts with `fail`.
struct StubStore {
    fail: Option<&'static str>,
    calls: Mutex<Vec<UploadRequest>>,
}

#[async_trait]
impl ObjectStore for StubStore {
    async fn upload(&self, request: &UploadRequest) -> StorageResult<StoredObject> {
        self.calls.lock().unwrap().push(request.clone());
        if self
            .fail
            .is_some_and(|prefix| request.content_type.starts_with(prefix))
        {
            return Err(StorageError::upload_failed("service unavailable"));
        }
        let size = std::fs::metadata(&request.path)?.len();
        Ok(StoredObject {
            key: request.key.clone(),
            url: format!("https://cdn.example.com/{}", request.key),
            size,
        })
    }
}

fn clip(path: &Path, duration: f64, width: u32, height: u32, audio: bool) -> MediaAsset {
    MediaAsset::new(
        path,
        duration,
        Some(VideoStreamInfo {
            width,
            height,
            fps: 30.0,
            codec: "h264".to_string(),
        }),
        audio,
    )
}

fn music(path: &Path, duration: f64) -> MediaAsset {
    MediaAsset::new(path, duration, None, true)
}

struct Scenario {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
    registry: Registry,
}

impl Scenario {
    fn new(main_duration: f64, main_audio: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputPaths {
            main: dir.path().join("raw_input.mp4"),
            hook: dir.path().join("hook.mp4"),
            music: dir.path().join("bg_music.mp3"),
        };

        let mut registry = HashMap::new();
        registry.insert(
            inputs.main.clone(),
            clip(&inputs.main, main_duration, 1920, 1080, main_audio),
        );
        registry.insert(inputs.hook.clone(), clip(&inputs.hook, 3.0, 720, 1280, true));
        registry.insert(inputs.music.clone(), music(&inputs.music, 60.0));

        let mut config = PipelineConfig {
            inputs,
            work_dir: WorkDir::new(dir.path().join("work")),
            thumbnail_text: Some("WAIT FOR IT".to_string()),
            ..Default::default()
        };
        config.publish.retry = RetryPolicy::default().with_base_delay(Duration::from_millis(1));
        config.publish.attempt_timeout = None;

        Self {
            _dir: dir,
            config,
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    fn pipeline(&self, fail_uploads: bool) -> AssemblyPipeline<StubProber, StubEngine, StubStore> {
        self.pipeline_failing(fail_uploads.then_some(""))
    }

    fn pipeline_failing(
        &self,
        fail: Option<&'static str>,
    ) -> AssemblyPipeline<StubProber, StubEngine, StubStore> {
        AssemblyPipeline::new(
            self.config.clone(),
            StubProber {
                registry: self.registry.clone(),
            },
            StubEngine {
                registry: self.registry.clone(),
                commands: Mutex::new(Vec::new()),
            },
            StubStore {
                fail,
                calls: Mutex::new(Vec::new()),
            },
        )
    }
}

#[tokio::test]
async fn test_long_main_clip_is_published() {
    let scenario = Scenario::new(20.0, true);
    let pipeline = scenario.pipeline(false);

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.gate, GateDecision::PassThrough);
    assert!((summary.render.duration - 23.0).abs() < 0.5);
    assert!((summary.render.expected_duration - 23.0).abs() < 0.5);

    // assembly render + thumbnail frame extraction
    let commands = pipeline.engine().commands();
    assert_eq!(commands.len(), 2);
    let graph = commands[0].filter_complex_graph().unwrap();
    assert!(graph.contains("concat=n=2:v=1:a=1"));
    assert!(!graph.contains("setpts"));

    let work = &scenario.config.work_dir;
    assert!(work.thumbnail().exists());
    assert!(!summary.thumbnail.fallback);
    assert_eq!(summary.thumbnail.spec.text, "WAIT FOR IT");

    let link = std::fs::read_to_string(work.link()).unwrap();
    assert!(link.starts_with("https://"));
    assert_eq!(link, summary.publication.video_url);
    assert!(summary.publication.thumbnail_url.is_some());
    assert!(work.results().exists());

    let uploads = pipeline.store().calls.lock().unwrap().clone();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].path, work.output());
    assert_eq!(uploads[0].content_type, ResourceKind::Video.content_type());
    assert_eq!(uploads[1].path, work.thumbnail());
}

#[tokio::test]
async fn test_short_main_clip_is_slowed_first() {
    let scenario = Scenario::new(5.0, true);
    let pipeline = scenario.pipeline(false);

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.gate, GateDecision::SlowMotion { factor: 2.0 });
    assert_eq!(summary.original_main_duration, 5.0);
    assert!((summary.render.duration - 13.0).abs() < 0.5);

    let commands = pipeline.engine().commands();
    let slowmo = &commands[0];
    assert_eq!(slowmo.output(), scenario.config.work_dir.slowmo());
    let graph = slowmo.filter_complex_graph().unwrap();
    assert!(graph.contains("setpts=2.0000*PTS"));
    assert!(graph.contains("atempo=0.5000"));
    assert!(!graph.contains("scale"));
    assert!(!graph.contains("crop"));

    // assembly consumes the stretched intermediate, not the original
    let assembly = &commands[1];
    assert_eq!(assembly.inputs()[0].path, scenario.config.work_dir.slowmo());
}

#[tokio::test]
async fn test_main_without_audio_fails_before_rendering() {
    let scenario = Scenario::new(20.0, false);
    let pipeline = scenario.pipeline(false);

    let result = pipeline.run().await;
    let err = result.as_ref().unwrap_err();
    let message = err.to_string();

    assert!(message.contains("audio"), "{message}");
    assert!(message.contains("main"), "{message}");
    assert!(message.starts_with("input validation failed"));
    assert_eq!(exit_code(&result), 1);

    assert!(pipeline.engine().commands().is_empty());
    assert!(pipeline.store().calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_slowmo_factor_fails_at_configuration() {
    let mut scenario = Scenario::new(5.0, true);
    scenario.config.assembly.slowmo_factor = 0.0;
    let pipeline = scenario.pipeline(false);

    let result = pipeline.run().await;
    assert_eq!(exit_code(&result), 1);

    let err = result.unwrap_err();
    assert!(matches!(err, WorkerError::Config(_)), "{err:?}");
    assert!(err.to_string().starts_with("configuration failed"));
    assert!(err.to_string().contains("slowmo_factor"));

    assert!(pipeline.engine().commands().is_empty());
    assert!(pipeline.store().calls.lock().unwrap().is_empty());
    assert!(!scenario.config.work_dir.root().exists());
}

#[tokio::test]
async fn test_unreachable_storage_exhausts_retries() {
    let scenario = Scenario::new(20.0, true);
    let pipeline = scenario.pipeline(true);

    let result = pipeline.run().await;
    assert_eq!(exit_code(&result), 1);

    match result {
        Err(WorkerError::UploadExhausted { kind, attempts, .. }) => {
            assert_eq!(kind, ResourceKind::Video);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhausted upload, got {other:?}"),
    }

    assert_eq!(pipeline.store().calls.lock().unwrap().len(), 3);
    assert!(!scenario.config.work_dir.link().exists());
    assert!(!scenario.config.work_dir.results().exists());
    // rendering and thumbnail already happened
    assert!(scenario.config.work_dir.thumbnail().exists());
}

#[tokio::test]
async fn test_failed_thumbnail_upload_leaves_no_link() {
    let scenario = Scenario::new(20.0, true);
    let pipeline = scenario.pipeline_failing(Some("image/"));

    let result = pipeline.run().await;
    assert_eq!(exit_code(&result), 1);

    match result {
        Err(WorkerError::UploadExhausted { kind, attempts, .. }) => {
            assert_eq!(kind, ResourceKind::Image);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected exhausted upload, got {other:?}"),
    }

    // the video went up once, the thumbnail was tried three times
    let uploads = pipeline.store().calls.lock().unwrap().clone();
    assert_eq!(uploads.len(), 4);
    assert_eq!(uploads[0].content_type, ResourceKind::Video.content_type());

    let work = &scenario.config.work_dir;
    assert!(!work.link().exists());
    assert!(!work.results().exists());
}

#[tokio::test]
async fn test_missing_input_is_probe_failure() {
    let scenario = Scenario::new(20.0, true);
    scenario
        .registry
        .lock()
        .unwrap()
        .remove(&scenario.config.inputs.hook);
    let pipeline = scenario.pipeline(false);

    let err = pipeline.run().await.unwrap_err();
    assert!(err.to_string().starts_with("probe failed"));
    assert!(err.to_string().contains("hook.mp4"));
}

#[tokio::test]
#[ignore = "requires ffmpeg, ffprobe and generated fixtures"]
async fn test_real_ffmpeg_assembly() {
    use hookreel_media::{FfmpegRunner, FfprobeProber};

    let dir = tempfile::tempdir().unwrap();
    let run = |args: &[&str]| {
        let status = std::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success());
    };

    let main = dir.path().join("raw_input.mp4");
    let hook = dir.path().join("hook.mp4");
    let bed = dir.path().join("bg_music.mp3");
    run(&[
        "-f", "lavfi", "-i", "testsrc=size=1280x720:rate=25:duration=5",
        "-f", "lavfi", "-i", "sine=frequency=440:duration=5",
        "-shortest", main.to_str().unwrap(),
    ]);
    run(&[
        "-f", "lavfi", "-i", "testsrc=size=720x1280:rate=30:duration=2",
        "-f", "lavfi", "-i", "sine=frequency=880:duration=2",
        "-shortest", hook.to_str().unwrap(),
    ]);
    run(&["-f", "lavfi", "-i", "sine=frequency=220:duration=30", bed.to_str().unwrap()]);

    let config = PipelineConfig {
        inputs: InputPaths {
            main,
            hook,
            music: bed,
        },
        work_dir: WorkDir::new(dir.path().join("work")),
        ..Default::default()
    };
    let store = StubStore {
        fail: None,
        calls: Mutex::new(Vec::new()),
    };
    let pipeline = AssemblyPipeline::new(config, FfprobeProber, FfmpegRunner::new(), store);

    let summary = pipeline.run().await.unwrap();
    assert_eq!(summary.gate, GateDecision::SlowMotion { factor: 2.0 });
    assert!((summary.render.duration - 12.0).abs() < 1.0);
}
