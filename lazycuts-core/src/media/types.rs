use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClipCategory {
    Show,
    Bumper,
    Commercial,
    Promo,
    /// Half of a show episode cut by the composer.
    FeatureSegment,
}

impl ClipCategory {
    pub fn is_interstitial(self) -> bool {
        matches!(
            self,
            ClipCategory::Bumper | ClipCategory::Commercial | ClipCategory::Promo
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClipCategory::Show => "show",
            ClipCategory::Bumper => "bumper",
            ClipCategory::Commercial => "commercial",
            ClipCategory::Promo => "promo",
            ClipCategory::FeatureSegment => "feature_segment",
        }
    }
}

impl fmt::Display for ClipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file from the catalog. Metadata is probed on demand through
/// [`crate::tools::MediaTools`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaClip {
    path: PathBuf,
    category: ClipCategory,
    catalog_root: PathBuf,
}

impl MediaClip {
    pub fn new(
        path: impl Into<PathBuf>,
        category: ClipCategory,
        catalog_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            category,
            catalog_root: catalog_root.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> ClipCategory {
        self.category
    }

    pub fn catalog_root(&self) -> &Path {
        &self.catalog_root
    }

    /// Path relative to the category root, or the full path when the clip
    /// lives outside of it.
    pub fn relative_path(&self) -> PathBuf {
        self.path
            .strip_prefix(&self.catalog_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }

    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for MediaClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.relative_path().display(), self.category)
    }
}

/// Exact frame rate as reported by the prober (`30/1`, `30000/1001`).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (num, den) = match value.split_once('/') {
            Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => (value.trim().parse().ok()?, 1),
        };
        if den == 0 {
            return None;
        }
        Some(Self::new(num, den))
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct VideoDescriptor {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<FrameRate>,
    pub pixel_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct AudioDescriptor {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

/// Comparable stream parameters of a clip. Two clips can be joined by stream
/// copy only when their profiles are equal.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct StreamProfile {
    pub video: VideoDescriptor,
    pub audio: Option<AudioDescriptor>,
}

/// Everything the prober could tell about a file. Missing values are `None`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ClipMetadata {
    pub duration: Option<f64>,
    pub video: Option<VideoDescriptor>,
    pub audio: Option<AudioDescriptor>,
}

impl ClipMetadata {
    pub fn geometry(&self) -> Option<Geometry> {
        let video = self.video.as_ref()?;
        Some(Geometry {
            width: video.width,
            height: video.height,
            fps: video.frame_rate.map(|rate| rate.as_f64()),
        })
    }

    pub fn stream_profile(&self) -> Option<StreamProfile> {
        Some(StreamProfile {
            video: self.video.clone()?,
            audio: self.audio.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

impl Geometry {
    pub fn matches(&self, width: u32, height: u32, fps: u32) -> bool {
        self.width == width
            && self.height == height
            && self
                .fps
                .map(|value| value.round() as i64 == fps as i64)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedOrigin {
    /// Served from the processed-clip cache without invoking the encoder.
    Cached,
    Reencoded,
    Overlaid,
    /// Already canonical; the source file is used as-is.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessedClip {
    pub path: PathBuf,
    pub source: PathBuf,
    pub category: ClipCategory,
    pub origin: ProcessedOrigin,
}
