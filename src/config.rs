use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on concurrent language model requests.
pub const MAX_WORKERS: usize = 4096;
pub const MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paging: PagingConfig,
    pub llm: LlmConfig,
    pub narration: NarrationConfig,
}

/// Knobs for `chunk_to_pages`. Every threshold here is policy, not protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Word count the balancer packs raw pages towards.
    pub target_words: usize,
    /// Units above `target_words * oversize_ratio` are hard-split.
    pub oversize_ratio: f64,
    pub min_chunk_words: usize,
    /// Units above this many words go to the smart splitter.
    pub max_chunk_words: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    /// Share of the unit's non-whitespace characters a split must keep.
    pub min_coverage: f64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            target_words: 1000,
            oversize_ratio: 1.5,
            min_chunk_words: 300,
            max_chunk_words: 500,
            workers: 128,
            max_attempts: 3,
            retry_backoff_ms: 500,
            request_timeout_secs: 180,
            min_coverage: 0.8,
        }
    }
}

impl PagingConfig {
    pub fn oversize_threshold(&self) -> usize {
        (self.target_words as f64 * self.oversize_ratio).floor() as usize
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_words == 0 {
            return Err(Error::Config("paging.target_words must be positive".into()));
        }
        if self.oversize_ratio < 1.0 {
            return Err(Error::Config("paging.oversize_ratio must be at least 1.0".into()));
        }
        if self.min_chunk_words == 0 || self.min_chunk_words > self.max_chunk_words {
            return Err(Error::Config(format!(
                "paging chunk bounds {}..{} are invalid",
                self.min_chunk_words, self.max_chunk_words
            )));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            let reason = format!("paging.workers must be within 1..={MAX_WORKERS}");
            return Err(Error::Config(reason));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS {
            let reason = format!("paging.max_attempts must be within 1..={MAX_ATTEMPTS}");
            return Err(Error::Config(reason));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("paging.request_timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(Error::Config("paging.min_coverage must be within 0.0..=1.0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub voice: String,
    pub voice_speed: f32,
    pub voice_pitch: f32,
    pub sample_rate: u32,
    pub output_format: AudioFormat,
    pub quality: f32,
    pub workers: usize,
    pub assets_dir: PathBuf,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            voice: "en".to_string(),
            voice_speed: 1.0,
            voice_pitch: 1.0,
            sample_rate: 22050,
            output_format: AudioFormat::Wav,
            quality: 0.7,
            workers: num_cpus::get(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Vorbis,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Vorbis => "ogg",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "vorbis" | "ogg" => Ok(AudioFormat::Vorbis),
            other => Err(Error::Config(format!("unknown audio format '{}'", other))),
        }
    }
}

impl Config {
    /// Reads a JSON settings file if given, then layers the OpenAI
    /// environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| Error::ReadInput {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            if !base.trim().is_empty() {
                self.llm.api_base = base;
            }
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
