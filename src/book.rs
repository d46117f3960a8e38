use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pages::Chunk;

pub const MANIFEST_FILE: &str = "pages.json";
pub const PLAYLIST_FILE: &str = "playlist.m3u";

/// A displayed and narrated page. Audio and image are attached after
/// pagination by the narration and image stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub title: String,
    pub text: String,
    pub markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl Page {
    pub fn from_chunk(index: usize, chunk: Chunk) -> Self {
        Self {
            index,
            title: chunk.title,
            markdown: chunk.text.clone(),
            text: chunk.text,
            transcript: None,
            audio: None,
            image: None,
            duration_secs: None,
        }
    }

    /// Text handed to the speech engine.
    pub fn narration_text(&self) -> &str {
        self.transcript.as_deref().unwrap_or(&self.text)
    }

    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            format!("Page {}", self.index + 1)
        } else {
            self.title.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub pages: Vec<Page>,
}

impl Book {
    pub fn from_chunks(title: impl Into<String>, chunks: Vec<Chunk>) -> Self {
        Self {
            title: title.into(),
            pages: chunks
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| Page::from_chunk(index, chunk))
                .collect(),
        }
    }

    pub fn total_words(&self) -> usize {
        self.pages.iter().map(|p| p.text.split_whitespace().count()).sum()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Writes the manifest, one markdown file per page and an M3U playlist
    /// whose entries point into `audio_dir` (relative to `output_dir`).
    pub fn write_to(&self, output_dir: &Path, audio_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)?;

        let manifest_path = output_dir.join(MANIFEST_FILE);
        let manifest = BufWriter::new(File::create(&manifest_path)?);
        serde_json::to_writer_pretty(manifest, self)?;

        let pages_dir = output_dir.join("pages");
        fs::create_dir_all(&pages_dir)?;
        for page in &self.pages {
            let mut body = String::new();
            if !page.title.trim().is_empty() {
                body.push_str(&format!("# {}\n\n", page.title.trim()));
            }
            body.push_str(page.markdown.trim());
            body.push('\n');
            fs::write(pages_dir.join(format!("{:03}.md", page.index)), body)?;
        }

        self.write_playlist(&output_dir.join(PLAYLIST_FILE), audio_dir)?;
        Ok(manifest_path)
    }

    fn write_playlist(&self, path: &Path, audio_dir: &Path) -> Result<()> {
        let mut playlist_file = BufWriter::new(File::create(path)?);

        writeln!(playlist_file, "#EXTM3U")?;
        writeln!(playlist_file, "#PLAYLIST:{}", self.title)?;
        for page in &self.pages {
            if let Some(audio) = &page.audio {
                let seconds = page.duration_secs.map(|d| d.round() as i64).unwrap_or(-1);
                writeln!(playlist_file, "#EXTINF:{},{}", seconds, page.display_title())?;
                writeln!(playlist_file, "{}", audio_dir.join(audio).display())?;
            }
        }
        playlist_file.flush()?;
        Ok(())
    }
}
