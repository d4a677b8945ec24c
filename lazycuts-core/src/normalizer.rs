use std::path::{Path, PathBuf};

use hex::encode as hex_encode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::sanitize_filename;
use crate::config::{LazyCutsConfig, NormalizeSection};
use crate::media::{ClipCategory, MediaClip, ProcessedClip, ProcessedOrigin};
use crate::tools::{MediaTools, ToolError};

const OVERLAY_PREFIX: &str = "overlayed_";
const DIGEST_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Brings clips to the canonical encode profile and caches the result under
/// a key derived from the source path.
#[derive(Debug, Clone)]
pub struct ClipNormalizer {
    tools: MediaTools,
    profile: NormalizeSection,
    cache_dir: PathBuf,
    overlay: Option<PathBuf>,
}

impl ClipNormalizer {
    pub fn new(tools: MediaTools, config: &LazyCutsConfig) -> Self {
        Self {
            tools,
            profile: config.normalize.clone(),
            cache_dir: config.cache_dir(),
            overlay: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Option<PathBuf>) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_entry(&self, clip: &MediaClip) -> PathBuf {
        self.cache_dir.join(cache_key(clip))
    }

    pub async fn normalize(&self, clip: &MediaClip) -> NormalizeResult<ProcessedClip> {
        let entry = self.cache_entry(clip);
        if clip.category() == ClipCategory::Show {
            return self.normalize_show(clip, entry).await;
        }

        if entry.is_file() {
            debug!(clip = %clip, entry = %entry.display(), "processed clip cached");
            return Ok(processed(clip, entry, ProcessedOrigin::Cached));
        }

        let needs_encode = clip.category().is_interstitial()
            || match self.tools.geometry(clip.path()).await {
                Some(geometry) => {
                    !geometry.matches(self.profile.width, self.profile.height, self.profile.fps)
                }
                None => true,
            };
        if !needs_encode {
            debug!(clip = %clip, "clip already canonical");
            return Ok(processed(
                clip,
                clip.path().to_path_buf(),
                ProcessedOrigin::Passthrough,
            ));
        }

        info!(clip = %clip, "converting to canonical profile");
        let filter = self.scale_filter();
        self.write_entry(clip.path(), &entry, |partial| {
            self.encode_args(clip.path(), &filter, partial)
        })
        .await?;
        Ok(processed(clip, entry, ProcessedOrigin::Reencoded))
    }

    async fn normalize_show(
        &self,
        clip: &MediaClip,
        entry: PathBuf,
    ) -> NormalizeResult<ProcessedClip> {
        let overlay = self
            .overlay
            .as_ref()
            .map(|asset| (asset.clone(), overlay_entry(&entry)));
        if let Some((_, overlaid)) = &overlay {
            if overlaid.is_file() {
                debug!(clip = %clip, entry = %overlaid.display(), "processed clip cached");
                return Ok(processed(clip, overlaid.clone(), ProcessedOrigin::Cached));
            }
        }

        let origin = if entry.is_file() {
            debug!(clip = %clip, entry = %entry.display(), "faded clip cached");
            ProcessedOrigin::Cached
        } else {
            let duration = self.tools.duration(clip.path()).await;
            if duration.is_none() {
                warn!(clip = %clip, "duration unknown, skipping fade-out");
            }
            info!(clip = %clip, "applying fade in/out to show clip");
            let filter = self.fade_filter(duration);
            self.write_entry(clip.path(), &entry, |partial| {
                self.encode_args(clip.path(), &filter, partial)
            })
            .await?;
            ProcessedOrigin::Reencoded
        };

        if let Some((asset, overlaid)) = overlay {
            let marker = failure_marker(&overlaid);
            if marker.is_file() {
                debug!(clip = %clip, marker = %marker.display(), "overlay failed earlier, keeping faded clip");
                return Ok(processed(clip, entry, origin));
            }
            match self.apply_overlay(&entry, &asset, &overlaid).await {
                Ok(()) => {
                    info!(clip = %clip, entry = %overlaid.display(), "applied overlay");
                    return Ok(processed(clip, overlaid, ProcessedOrigin::Overlaid));
                }
                Err(error) => {
                    warn!(clip = %clip, %error, "overlay pass failed, keeping faded clip");
                    if let Err(write_error) = fs::write(&marker, error.to_string()).await {
                        warn!(marker = %marker.display(), error = %write_error, "could not record overlay failure");
                    }
                }
            }
        }

        Ok(processed(clip, entry, origin))
    }

    async fn apply_overlay(
        &self,
        faded: &Path,
        asset: &Path,
        overlaid: &Path,
    ) -> NormalizeResult<()> {
        let duration = self.tools.duration(faded).await;
        let fade = self.profile.fade_seconds;
        let window = match duration {
            Some(duration) => format!(
                "gt(t,{})*lt(t,{})",
                seconds(fade),
                seconds((duration - fade).max(fade))
            ),
            None => format!("gt(t,{})", seconds(fade)),
        };
        let graph = format!("[1][0]scale2ref[img][vid];[vid][img]overlay=enable='{window}'");
        self.write_entry(faded, overlaid, |partial| {
            vec![
                "-i".to_string(),
                faded.to_string_lossy().to_string(),
                "-i".to_string(),
                asset.to_string_lossy().to_string(),
                "-filter_complex".to_string(),
                graph.clone(),
                "-c:v".to_string(),
                self.profile.video_codec.clone(),
                "-preset".to_string(),
                self.profile.overlay_preset.clone(),
                "-crf".to_string(),
                self.profile.crf.to_string(),
                "-c:a".to_string(),
                "copy".to_string(),
                partial.to_string_lossy().to_string(),
            ]
        })
        .await
    }

    /// Runs one encode into a partial file next to `entry` and renames it
    /// into place once the tool succeeded.
    async fn write_entry<F>(&self, source: &Path, entry: &Path, build_args: F) -> NormalizeResult<()>
    where
        F: FnOnce(&Path) -> Vec<String>,
    {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| NormalizeError::Io {
                path: self.cache_dir.clone(),
                source,
            })?;
        let partial = partial_path(entry);
        let args = build_args(&partial);
        if let Err(error) = self.tools.transform(source, &args).await {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "no partial file to remove");
            }
            return Err(error.into());
        }
        fs::rename(&partial, entry)
            .await
            .map_err(|source| NormalizeError::Io {
                path: entry.to_path_buf(),
                source,
            })
    }

    fn scale_filter(&self) -> String {
        format!(
            "scale={}:{},fps={}",
            self.profile.width, self.profile.height, self.profile.fps
        )
    }

    fn fade_filter(&self, duration: Option<f64>) -> String {
        let fade = self.profile.fade_seconds;
        let mut filter = format!(
            "{},fade=t=in:st=0:d={}",
            self.scale_filter(),
            seconds(fade)
        );
        if let Some(duration) = duration {
            filter.push_str(&format!(
                ",fade=t=out:st={}:d={}",
                seconds((duration - fade).max(0.0)),
                seconds(fade)
            ));
        }
        filter
    }

    fn encode_args(&self, input: &Path, filter: &str, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            filter.to_string(),
            "-r".to_string(),
            self.profile.fps.to_string(),
            "-c:v".to_string(),
            self.profile.video_codec.clone(),
            "-preset".to_string(),
            self.profile.preset.clone(),
            "-crf".to_string(),
            self.profile.crf.to_string(),
            "-c:a".to_string(),
            self.profile.audio_codec.clone(),
            "-b:a".to_string(),
            self.profile.audio_bitrate.clone(),
            "-ar".to_string(),
            self.profile.sample_rate.to_string(),
            "-ac".to_string(),
            self.profile.channels.to_string(),
            "-af".to_string(),
            "aformat=sample_fmts=fltp".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

/// `<sanitized relative path>_<digest>_processed.mp4`, where the digest
/// covers the category and the unsanitized relative path.
pub fn cache_key(clip: &MediaClip) -> String {
    let relative = clip.relative_path();
    let identity = format!("{}/{}", clip.category(), relative.to_string_lossy());
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    let digest = hex_encode(hasher.finalize());
    let stem = sanitize_filename(&relative.with_extension("").to_string_lossy());
    format!("{stem}_{}_processed.mp4", &digest[..DIGEST_LEN])
}

fn overlay_entry(entry: &Path) -> PathBuf {
    let name = entry
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    entry.with_file_name(format!("{OVERLAY_PREFIX}{name}"))
}

/// Sits next to the overlaid entry once its encode has failed, so later runs
/// reuse the faded entry instead of retrying. Purging the cache clears it.
fn failure_marker(overlaid: &Path) -> PathBuf {
    let mut name = overlaid.as_os_str().to_os_string();
    name.push(".failed");
    PathBuf::from(name)
}

fn partial_path(entry: &Path) -> PathBuf {
    let stem = entry
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    entry.with_file_name(format!(".{stem}.{}.partial.mp4", Uuid::new_v4().simple()))
}

fn processed(clip: &MediaClip, path: PathBuf, origin: ProcessedOrigin) -> ProcessedClip {
    ProcessedClip {
        path,
        source: clip.path().to_path_buf(),
        category: clip.category(),
        origin,
    }
}

/// Trims float noise so filter arguments stay readable (`599.5`, not
/// `599.5000000001`).
pub(crate) fn seconds(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{rounded}")
}
