//! Pipeline configuration.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hookreel_media::{TextTreatment, ThumbnailConfig};
use hookreel_models::{AssemblyConfig, EncodingConfig};
use hookreel_storage::DEFAULT_CHUNK_SIZE;

use crate::error::{WorkerError, WorkerResult};
use crate::retry::RetryPolicy;

pub const SLOWMO_FILE: &str = "slowmo.mp4";
pub const OUTPUT_FILE: &str = "final_short.mp4";
pub const FRAME_FILE: &str = "frame.jpg";
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";
pub const LINK_FILE: &str = "link.txt";
pub const RESULTS_FILE: &str = "results.json";

/// The three run inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub main: PathBuf,
    pub hook: PathBuf,
    pub music: PathBuf,
}

impl Default for InputPaths {
    fn default() -> Self {
        Self {
            main: PathBuf::from("raw_input.mp4"),
            hook: PathBuf::from("hook.mp4"),
            music: PathBuf::from("bg_music.mp3"),
        }
    }
}

/// Directory holding intermediates and outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slowmo(&self) -> PathBuf {
        self.root.join(SLOWMO_FILE)
    }

    pub fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_FILE)
    }

    pub fn frame(&self) -> PathBuf {
        self.root.join(FRAME_FILE)
    }

    pub fn thumbnail(&self) -> PathBuf {
        self.root.join(THUMBNAIL_FILE)
    }

    pub fn link(&self) -> PathBuf {
        self.root.join(LINK_FILE)
    }

    pub fn results(&self) -> PathBuf {
        self.root.join(RESULTS_FILE)
    }
}

impl Default for WorkDir {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Upload settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    /// Object key prefix
    pub key_prefix: String,
    /// Multipart chunk size for videos
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Upper bound on a single upload attempt
    pub attempt_timeout: Option<Duration>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            key_prefix: "shorts".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            attempt_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Everything a run needs apart from storage credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    pub work_dir: WorkDir,
    pub assembly: AssemblyConfig,
    pub encoding: EncodingConfig,
    pub thumbnail: ThumbnailConfig,
    /// Thumbnail text; a random phrase when unset
    pub thumbnail_text: Option<String>,
    pub publish: PublishConfig,
    /// Upper bound on each FFmpeg render
    pub render_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: InputPaths::default(),
            work_dir: WorkDir::default(),
            assembly: AssemblyConfig::default(),
            encoding: EncodingConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            thumbnail_text: None,
            publish: PublishConfig::default(),
            render_timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from any variable source.
    ///
    /// Unset or blank variables keep their defaults; values that do not parse
    /// are configuration errors rather than silently ignored.
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let mut config = Self::default();

        if let Some(v) = vars.get("HOOKREEL_MAIN_INPUT") {
            config.inputs.main = PathBuf::from(v);
        }
        if let Some(v) = vars.get("HOOKREEL_HOOK_INPUT") {
            config.inputs.hook = PathBuf::from(v);
        }
        if let Some(v) = vars.get("HOOKREEL_MUSIC_INPUT") {
            config.inputs.music = PathBuf::from(v);
        }
        if let Some(v) = vars.get("HOOKREEL_WORK_DIR") {
            config.work_dir = WorkDir::new(v);
        }

        let assembly = &mut config.assembly;
        vars.set(&mut assembly.duration_threshold_s, "HOOKREEL_DURATION_THRESHOLD_S")?;
        vars.set(&mut assembly.slowmo_factor, "HOOKREEL_SLOWMO_FACTOR")?;
        vars.set(&mut assembly.aspect_policy, "HOOKREEL_ASPECT_POLICY")?;
        vars.set(&mut assembly.enhance_main, "HOOKREEL_ENHANCE_MAIN")?;
        vars.set(&mut assembly.denoise_strength, "HOOKREEL_DENOISE_STRENGTH")?;
        vars.set(&mut assembly.loudness_profile, "HOOKREEL_LOUDNESS_PROFILE")?;
        vars.set(&mut assembly.music_gain, "HOOKREEL_MUSIC_GAIN")?;
        vars.set(&mut assembly.mix_duration_policy, "HOOKREEL_MIX_DURATION")?;

        vars.set(&mut config.encoding.crf, "HOOKREEL_CRF")?;
        if let Some(v) = vars.get("HOOKREEL_PRESET") {
            config.encoding.preset = v;
        }

        config.thumbnail_text = vars.get("HOOKREEL_THUMBNAIL_TEXT");
        vars.set(&mut config.thumbnail.fraction, "HOOKREEL_THUMBNAIL_FRACTION")?;
        if let Some(v) = vars.get("HOOKREEL_FONT_PATH") {
            config.thumbnail.font_path = PathBuf::from(v);
        }
        vars.set(&mut config.thumbnail.font_size, "HOOKREEL_FONT_SIZE")?;
        vars.set::<TextTreatment>(&mut config.thumbnail.treatment, "HOOKREEL_TEXT_TREATMENT")?;

        let publish = &mut config.publish;
        if let Some(v) = vars.get("HOOKREEL_KEY_PREFIX") {
            publish.key_prefix = v;
        }
        vars.set(&mut publish.chunk_size, "HOOKREEL_UPLOAD_CHUNK_SIZE")?;
        if let Some(n) = vars.parse::<u32>("HOOKREEL_UPLOAD_MAX_ATTEMPTS")? {
            publish.retry = publish.retry.with_max_attempts(n);
        }
        if let Some(ms) = vars.parse::<u64>("HOOKREEL_UPLOAD_BASE_DELAY_MS")? {
            publish.retry = publish.retry.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = vars.parse::<u64>("HOOKREEL_UPLOAD_TIMEOUT_SECS")? {
            publish.attempt_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = vars.parse::<u64>("HOOKREEL_RENDER_TIMEOUT_SECS")? {
            config.render_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> WorkerResult<()> {
        self.assembly.validate()?;
        self.encoding.validate()?;
        if !(0.0..=1.0).contains(&self.thumbnail.fraction) {
            return Err(WorkerError::config_error(format!(
                "thumbnail fraction must be within 0..=1, got {}",
                self.thumbnail.fraction
            )));
        }
        if self.thumbnail.font_size <= 0.0 {
            return Err(WorkerError::config_error(format!(
                "font size must be positive, got {}",
                self.thumbnail.font_size
            )));
        }
        if self.publish.chunk_size == 0 {
            return Err(WorkerError::config_error("upload chunk size must be positive"));
        }
        Ok(())
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, name: &str) -> WorkerResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    WorkerError::config_error(format!("invalid {}={:?}: {}", name, raw, e))
                })
            })
            .transpose()
    }

    fn set<T>(&self, slot: &mut T, name: &str) -> WorkerResult<()>
    where
        T: FromStr,
        T::Err: Display,
    {
        if let Some(value) = self.parse(name)? {
            *slot = value;
        }
        Ok(())
    }
}
