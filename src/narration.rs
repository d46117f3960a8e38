use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command as ProcessCommand, Stdio};

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::book::Page;
use crate::config::{AudioFormat, NarrationConfig};
use crate::error::{Error, Result};
use crate::pool::progress_bar;

/// Turns page text (often markdown) into something a speech engine reads
/// cleanly.
pub struct NarrationCleaner {
    cleanup_regex: Vec<(Regex, &'static str)>,
    abbreviations: Vec<(Regex, &'static str)>,
}

impl NarrationCleaner {
    pub fn new() -> Self {
        let cleanup_patterns = [
            // Markdown images and links
            (r"!\[[^\]]*\]\([^)]*\)", ""),
            (r"\[([^\]]+)\]\([^)]*\)", "$1"),
            // Heading and list markers
            (r"(?m)^[ \t]*#{1,6}[ \t]*", ""),
            (r"(?m)^[ \t]*(?:[-*+]|\d+\.)[ \t]+", ""),
            (r"\*{1,3}|_{2,}|`+", ""),
            // Remove HTML tags and entities
            (r"<[^>]+>", " "),
            (r"&[a-zA-Z0-9#]+;", " "),
            // Remove page numbers
            (r"\b[Pp]age\s+\d+\b", ""),
            // Fix quotation marks
            (r"[“”]", "\""),
            (r"[‘’]", "'"),
            // Normalize dashes
            (r"[–—]", " - "),
            (r"\.{3,}", "..."),
            // Normalize whitespace
            (r"\s+", " "),
            (r"\s+([,.!?;:])", "$1"),
        ];

        let abbreviations = [
            ("Mr.", "Mister"),
            ("Mrs.", "Missus"),
            ("Dr.", "Doctor"),
            ("Prof.", "Professor"),
            ("St.", "Saint"),
            ("vs.", "versus"),
            ("etc.", "etcetera"),
            ("i.e.", "that is"),
            ("e.g.", "for example"),
        ];

        Self {
            cleanup_regex: cleanup_patterns
                .into_iter()
                .map(|(pattern, replacement)| {
                    (Regex::new(pattern).expect("cleanup pattern is valid"), replacement)
                })
                .collect(),
            abbreviations: abbreviations
                .into_iter()
                .map(|(abbrev, expansion)| {
                    let pattern = format!(r"\b{}", regex::escape(abbrev));
                    (Regex::new(&pattern).expect("abbreviation pattern is valid"), expansion)
                })
                .collect(),
        }
    }

    pub fn clean(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for (regex, replacement) in &self.cleanup_regex {
            cleaned = regex.replace_all(&cleaned, *replacement).into_owned();
        }
        for (regex, expansion) in &self.abbreviations {
            cleaned = regex.replace_all(&cleaned, *expansion).into_owned();
        }
        cleaned.trim().to_string()
    }
}

impl Default for NarrationCleaner {
    fn default() -> Self {
        Self::new()
    }
}

/// Speech engines we know how to drive, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsCommand {
    EspeakNg,
    Espeak,
    /// Festival's `text2wave` front end.
    Festival,
}

impl TtsCommand {
    fn program(&self) -> &'static str {
        match self {
            TtsCommand::EspeakNg => "espeak-ng",
            TtsCommand::Espeak => "espeak",
            TtsCommand::Festival => "text2wave",
        }
    }

    pub fn detect() -> Result<Self> {
        [TtsCommand::EspeakNg, TtsCommand::Espeak, TtsCommand::Festival]
            .into_iter()
            .find(|command| is_installed(command.program()))
            .ok_or(Error::NoTtsEngine)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub file_name: String,
    pub duration_secs: Option<f64>,
}

pub struct SpeechEngine {
    config: NarrationConfig,
    command: TtsCommand,
    cleaner: NarrationCleaner,
}

impl SpeechEngine {
    pub fn new(config: NarrationConfig) -> Result<Self> {
        let command = TtsCommand::detect()?;
        log::info!("Using {} for speech synthesis", command.program());
        Self::with_command(config, command)
    }

    pub fn with_command(config: NarrationConfig, command: TtsCommand) -> Result<Self> {
        fs::create_dir_all(&config.assets_dir)?;
        Ok(Self {
            config,
            command,
            cleaner: NarrationCleaner::new(),
        })
    }

    pub fn assets_dir(&self) -> &Path {
        &self.config.assets_dir
    }

    /// Synthesizes `text` into the assets directory and returns the asset
    /// file name. Identical text and voice settings reuse the cached WAV.
    pub fn synthesize(&self, text: &str) -> Result<Audio> {
        let spoken = self.cleaner.clean(text);
        let key = cache_key(&spoken, &self.config);
        let wav_path = self.config.assets_dir.join(format!("{}.wav", key));

        if wav_path.exists() {
            log::debug!("Audio cache hit for {}", key);
        } else {
            self.render_wav(&spoken, &wav_path)?;
        }
        let duration_secs = match wav_duration(&wav_path) {
            Ok(duration) => Some(duration),
            Err(e) => {
                log::warn!("Could not read duration of {}: {}", wav_path.display(), e);
                None
            }
        };

        let file_name = match self.config.output_format {
            AudioFormat::Wav => format!("{}.wav", key),
            format => {
                let file_name = format!("{}.{}", key, format.extension());
                let encoded = self.config.assets_dir.join(&file_name);
                if !encoded.exists() {
                    self.encode(&wav_path, &encoded)?;
                }
                file_name
            }
        };

        Ok(Audio {
            file_name,
            duration_secs,
        })
    }

    fn render_wav(&self, text: &str, wav_path: &Path) -> Result<()> {
        // Write next to the target and rename, so parallel workers never
        // observe a half-written cache entry.
        let temp = tempfile::NamedTempFile::new_in(&self.config.assets_dir)?;

        match self.command {
            TtsCommand::EspeakNg | TtsCommand::Espeak => {
                let output = ProcessCommand::new(self.command.program())
                    .arg("-v")
                    .arg(&self.config.voice)
                    .arg("-s")
                    .arg(format!("{}", (self.config.voice_speed * 175.0) as u32))
                    .arg("-p")
                    .arg(format!("{}", (self.config.voice_pitch * 50.0) as u32))
                    .arg("-a")
                    .arg("100")
                    .arg("--stdout")
                    .arg(text)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .output()?;
                check_status(self.command.program(), &output.status)?;
                fs::write(temp.path(), &output.stdout)?;
            }
            TtsCommand::Festival => {
                let mut child = ProcessCommand::new("text2wave")
                    .arg("-o")
                    .arg(temp.path())
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                if let Some(stdin) = child.stdin.as_mut() {
                    stdin.write_all(text.as_bytes())?;
                }
                let status = child.wait()?;
                check_status("text2wave", &status)?;
            }
        }

        temp.persist(wav_path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn encode(&self, wav_path: &Path, output_path: &Path) -> Result<()> {
        let quality = self.config.quality.clamp(0.0, 1.0);
        let mut cmd = match self.config.output_format {
            AudioFormat::Wav => return Ok(()),
            AudioFormat::Mp3 => match find_tool(&["lame", "ffmpeg"]) {
                Some("lame") => {
                    let mut cmd = ProcessCommand::new("lame");
                    cmd.arg("-V")
                        .arg(format!("{}", (9.0 - quality * 9.0) as u32))
                        .arg("--resample")
                        .arg(format!("{}", self.config.sample_rate as f32 / 1000.0))
                        .arg(wav_path)
                        .arg(output_path);
                    cmd
                }
                Some(_) => {
                    let mut cmd = ProcessCommand::new("ffmpeg");
                    cmd.arg("-i")
                        .arg(wav_path)
                        .arg("-vn")
                        .arg("-ar")
                        .arg(self.config.sample_rate.to_string())
                        .arg("-ac")
                        .arg("2")
                        .arg("-b:a")
                        .arg("192k")
                        .arg("-y")
                        .arg(output_path);
                    cmd
                }
                None => {
                    return Err(Error::NoEncoder {
                        format: "MP3",
                        hint: "lame or ffmpeg",
                    })
                }
            },
            AudioFormat::Vorbis => match find_tool(&["oggenc", "ffmpeg"]) {
                Some("oggenc") => {
                    let mut cmd = ProcessCommand::new("oggenc");
                    cmd.arg("-q")
                        .arg(format!("{}", (quality * 10.0) as u32))
                        .arg("-o")
                        .arg(output_path)
                        .arg(wav_path);
                    cmd
                }
                Some(_) => {
                    let mut cmd = ProcessCommand::new("ffmpeg");
                    cmd.arg("-i")
                        .arg(wav_path)
                        .arg("-c:a")
                        .arg("libvorbis")
                        .arg("-q:a")
                        .arg(format!("{}", (quality * 10.0) as u32))
                        .arg("-y")
                        .arg(output_path);
                    cmd
                }
                None => {
                    return Err(Error::NoEncoder {
                        format: "Vorbis",
                        hint: "vorbis-tools or ffmpeg",
                    })
                }
            },
        };

        let output = cmd.stdout(Stdio::null()).stderr(Stdio::piped()).output()?;
        check_status(&cmd.get_program().to_string_lossy(), &output.status)
    }
}

/// Narrates every page in parallel, attaching audio file names and
/// durations. Stops at the first failure.
pub fn narrate_pages(pages: &mut [Page], engine: &SpeechEngine) -> Result<()> {
    let progress = progress_bar(pages.len(), "Generating audio");

    pages
        .par_iter_mut()
        .progress_with(progress)
        .try_for_each(|page| -> Result<()> {
            let audio = engine.synthesize(page.narration_text())?;
            log::debug!("Page {} narrated to {}", page.index, audio.file_name);
            page.audio = Some(audio.file_name);
            page.duration_secs = audio.duration_secs;
            Ok(())
        })?;

    log::info!("All audio files are ready.");
    Ok(())
}

/// Content address of a narration: same text and voice, same file.
pub fn cache_key(text: &str, config: &NarrationConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(config.voice.as_bytes());
    hasher.update(config.voice_speed.to_be_bytes());
    hasher.update(config.voice_pitch.to_be_bytes());
    hasher.update(config.sample_rate.to_be_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path).map_err(|source| Error::Wav {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn check_status(tool: &str, status: &std::process::ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(Error::Tool {
            tool: tool.to_string(),
            detail: status.to_string(),
        })
    }
}

fn is_installed(program: &str) -> bool {
    ProcessCommand::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn find_tool(candidates: &[&'static str]) -> Option<&'static str> {
    candidates.iter().copied().find(|tool| is_installed(tool))
}
