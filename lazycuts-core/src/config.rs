use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const PROCESSED_DIR_NAME: &str = "processed";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LazyCutsConfig {
    pub paths: PathsSection,
    pub tools: ToolsSection,
    pub normalize: NormalizeSection,
    pub stitch: StitchSection,
    pub schedule: ScheduleSection,
}

impl LazyCutsConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn shows_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.shows_dir)
    }

    pub fn bumpers_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.bumpers_dir)
    }

    pub fn commercials_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.commercials_dir)
    }

    pub fn promos_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.promos_dir)
    }

    pub fn screenbug_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.screenbug_dir)
    }

    pub fn temp_root(&self) -> PathBuf {
        self.resolve_path(&self.paths.temp_dir)
    }

    /// Directory holding normalized clips shared across runs.
    pub fn cache_dir(&self) -> PathBuf {
        self.temp_root().join(PROCESSED_DIR_NAME)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.output_dir)
            .join(&self.paths.output_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub shows_dir: String,
    pub bumpers_dir: String,
    pub commercials_dir: String,
    pub promos_dir: String,
    pub screenbug_dir: String,
    pub output_dir: String,
    pub temp_dir: String,
    pub output_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeSection {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub fade_seconds: f64,
    pub overlay_preset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StitchSection {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub manifest_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSection {
    pub max_shows: usize,
    pub ad_break_seconds: f64,
    pub ad_break_tolerance_seconds: f64,
    pub extensions: Vec<String>,
}

pub fn load_lazycuts_config<P: AsRef<Path>>(path: P) -> Result<LazyCutsConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
