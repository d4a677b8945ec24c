use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::compat::is_stream_copy_safe;
use crate::config::{LazyCutsConfig, StitchSection};
use crate::media::ProcessedClip;
use crate::tools::{MediaTools, ToolError};

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("nothing to stitch: playlist is empty")]
    EmptyPlaylist,
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type StitchResult<T> = Result<T, StitchError>;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    StreamCopy,
    Reencode,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::StreamCopy => f.write_str("stream copy"),
            JoinStrategy::Reencode => f.write_str("re-encode"),
        }
    }
}

/// Joins processed clips into the final program file.
#[derive(Debug, Clone)]
pub struct Stitcher {
    tools: MediaTools,
    settings: StitchSection,
    manifest_path: PathBuf,
    output_path: PathBuf,
}

impl Stitcher {
    pub fn new(tools: MediaTools, config: &LazyCutsConfig) -> Self {
        Self {
            tools,
            settings: config.stitch.clone(),
            manifest_path: config.temp_root().join(&config.stitch.manifest_name),
            output_path: config.output_path(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Classifies `clips` and joins them with the matching strategy.
    pub async fn stitch(&self, clips: &[ProcessedClip]) -> StitchResult<JoinStrategy> {
        if clips.is_empty() {
            return Err(StitchError::EmptyPlaylist);
        }
        let strategy = if is_stream_copy_safe(&self.tools, clips).await {
            JoinStrategy::StreamCopy
        } else {
            JoinStrategy::Reencode
        };
        self.join(clips, strategy).await?;
        Ok(strategy)
    }

    /// Runs `strategy` into a partial file and moves the result onto the
    /// output path. On failure no output file is left behind.
    pub async fn join(&self, clips: &[ProcessedClip], strategy: JoinStrategy) -> StitchResult<()> {
        if clips.is_empty() {
            return Err(StitchError::EmptyPlaylist);
        }
        info!(clips = clips.len(), %strategy, output = %self.output_path.display(), "stitching program");

        let output_dir = self
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        create_dir(&output_dir).await?;
        let partial = partial_path(&self.output_path);

        let result = match strategy {
            JoinStrategy::StreamCopy => self.join_by_copy(clips, &partial).await,
            JoinStrategy::Reencode => self.join_by_reencode(clips, &partial).await,
        };
        if let Err(error) = result {
            if let Err(cleanup) = fs::remove_file(&partial).await {
                debug!(path = %partial.display(), error = %cleanup, "no partial output to remove");
            }
            return Err(error);
        }

        fs::rename(&partial, &self.output_path)
            .await
            .map_err(|source| StitchError::Io {
                path: self.output_path.clone(),
                source,
            })?;
        info!(output = %self.output_path.display(), %strategy, "program written");
        Ok(())
    }

    async fn join_by_copy(&self, clips: &[ProcessedClip], partial: &Path) -> StitchResult<()> {
        if let Some(dir) = self.manifest_path.parent() {
            create_dir(dir).await?;
        }
        fs::write(&self.manifest_path, render_manifest(clips))
            .await
            .map_err(|source| StitchError::Io {
                path: self.manifest_path.clone(),
                source,
            })?;
        debug!(manifest = %self.manifest_path.display(), "concat manifest written");

        let args = vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            self.manifest_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            partial.to_string_lossy().to_string(),
        ];
        self.tools.transform(&self.output_path, &args).await?;
        Ok(())
    }

    async fn join_by_reencode(&self, clips: &[ProcessedClip], partial: &Path) -> StitchResult<()> {
        let mut args = Vec::with_capacity(clips.len() * 2 + 24);
        for clip in clips {
            args.push("-i".to_string());
            args.push(clip.path.to_string_lossy().to_string());
        }
        args.extend([
            "-filter_complex".to_string(),
            concat_filter(clips.len()),
            "-map".to_string(),
            "[outv]".to_string(),
            "-map".to_string(),
            "[outa]".to_string(),
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-crf".to_string(),
            self.settings.crf.to_string(),
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-b:a".to_string(),
            self.settings.audio_bitrate.clone(),
            "-ar".to_string(),
            self.settings.sample_rate.to_string(),
            "-ac".to_string(),
            self.settings.channels.to_string(),
            partial.to_string_lossy().to_string(),
        ]);
        self.tools.transform(&self.output_path, &args).await?;
        Ok(())
    }
}

/// One `file '<path>'` line per clip, with single quotes escaped the way
/// the concat demuxer expects.
pub fn render_manifest(clips: &[ProcessedClip]) -> String {
    clips
        .iter()
        .map(|clip| {
            let path = std::path::absolute(&clip.path).unwrap_or_else(|_| clip.path.clone());
            format!("file '{}'\n", path.to_string_lossy().replace('\'', "'\\''"))
        })
        .collect()
}

/// `[0:v][0:a][1:v][1:a]...concat=n=N:v=1:a=1[outv][outa]`
fn concat_filter(count: usize) -> String {
    let mut filter = String::new();
    for index in 0..count {
        filter.push_str(&format!("[{index}:v][{index}:a]"));
    }
    filter.push_str(&format!("concat=n={count}:v=1:a=1[outv][outa]"));
    filter
}

async fn create_dir(dir: &Path) -> StitchResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| StitchError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

/// Keeps the output's extension so ffmpeg picks the same container for the
/// partial file as for the final name.
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = output
        .extension()
        .map(|extension| extension.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string());
    output.with_file_name(format!(
        ".{stem}.{}.partial.{extension}",
        Uuid::new_v4().simple()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ClipCategory, ProcessedOrigin};
    use crate::test_framework::{FakeMedia, StationFixture};

    fn processed(station: &StationFixture, name: &str, media: FakeMedia) -> ProcessedClip {
        let dir = station.root().join("staged");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"staged").unwrap();
        station.executor.register(&path, media);
        ProcessedClip {
            source: path.clone(),
            path,
            category: ClipCategory::Bumper,
            origin: ProcessedOrigin::Reencoded,
        }
    }

    fn output_dir_entries(station: &StationFixture) -> Vec<String> {
        std::fs::read_dir(station.config.output_path().parent().unwrap())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn manifest_escapes_single_quotes() {
        let clips = vec![
            ProcessedClip {
                path: PathBuf::from("/media/Bob's Show/a.mp4"),
                source: PathBuf::from("/media/a.mp4"),
                category: ClipCategory::FeatureSegment,
                origin: ProcessedOrigin::Passthrough,
            },
            ProcessedClip {
                path: PathBuf::from("/media/b.mp4"),
                source: PathBuf::from("/media/b.mp4"),
                category: ClipCategory::Bumper,
                origin: ProcessedOrigin::Cached,
            },
        ];
        assert_eq!(
            render_manifest(&clips),
            "file '/media/Bob'\\''s Show/a.mp4'\nfile '/media/b.mp4'\n"
        );
    }

    #[test]
    fn concat_filter_lists_every_input() {
        assert_eq!(
            concat_filter(3),
            "[0:v][0:a][1:v][1:a][2:v][2:a]concat=n=3:v=1:a=1[outv][outa]"
        );
    }

    #[tokio::test]
    async fn uniform_clips_join_by_stream_copy() {
        let station = StationFixture::new().unwrap();
        let clips = vec![
            processed(&station, "a.mp4", FakeMedia::canonical(10.0)),
            processed(&station, "b.mp4", FakeMedia::canonical(20.0)),
        ];
        let stitcher = Stitcher::new(station.tools(), &station.config);

        let strategy = stitcher.stitch(&clips).await.unwrap();
        assert_eq!(strategy, JoinStrategy::StreamCopy);
        assert!(stitcher.output_path().is_file());
        assert_eq!(output_dir_entries(&station), vec!["Final_Stitched_Show.mp4"]);

        let manifest = std::fs::read_to_string(stitcher.manifest_path()).unwrap();
        assert_eq!(manifest.lines().count(), 2);
        let call = &station.executor.transform_calls()[0];
        assert_eq!(call.value_after("-f"), Some("concat"));
        assert_eq!(call.value_after("-safe"), Some("0"));
        assert_eq!(call.value_after("-c"), Some("copy"));

        let joined = station.executor.media(stitcher.output_path()).unwrap();
        assert_eq!(joined.duration, Some(30.0));
    }

    #[tokio::test]
    async fn mixed_geometry_joins_by_reencode() {
        let station = StationFixture::new().unwrap();
        let clips = vec![
            processed(&station, "a.mp4", FakeMedia::canonical(10.0)),
            processed(&station, "b.mp4", FakeMedia::with_geometry(10.0, 1920, 1080, "30/1")),
            processed(&station, "c.mp4", FakeMedia::canonical(10.0)),
        ];
        let stitcher = Stitcher::new(station.tools(), &station.config);

        let strategy = stitcher.stitch(&clips).await.unwrap();
        assert_eq!(strategy, JoinStrategy::Reencode);
        let call = &station.executor.transform_calls()[0];
        assert_eq!(call.inputs().len(), 3);
        assert_eq!(
            call.value_after("-filter_complex"),
            Some(concat_filter(3).as_str())
        );
        assert_eq!(call.value_after("-preset"), Some("slow"));
        assert_eq!(call.value_after("-crf"), Some("18"));
        assert_eq!(call.value_after("-b:a"), Some("256k"));
        assert!(!stitcher.manifest_path().exists());
        assert!(stitcher.output_path().is_file());
    }

    #[tokio::test]
    async fn forced_reencode_skips_manifest() {
        let station = StationFixture::new().unwrap();
        let clips = vec![
            processed(&station, "a.mp4", FakeMedia::canonical(10.0)),
            processed(&station, "b.mp4", FakeMedia::canonical(10.0)),
        ];
        let stitcher = Stitcher::new(station.tools(), &station.config);

        stitcher.join(&clips, JoinStrategy::Reencode).await.unwrap();
        assert!(!stitcher.manifest_path().exists());
        assert_eq!(station.executor.probe_count(), 0);
        let joined = station.executor.media(stitcher.output_path()).unwrap();
        assert_eq!(joined.duration, Some(20.0));
    }

    #[tokio::test]
    async fn empty_playlist_is_rejected() {
        let station = StationFixture::new().unwrap();
        let stitcher = Stitcher::new(station.tools(), &station.config);
        assert!(matches!(
            stitcher.stitch(&[]).await,
            Err(StitchError::EmptyPlaylist)
        ));
        assert_eq!(station.executor.transform_count(), 0);
    }

    #[tokio::test]
    async fn failed_join_leaves_no_output() {
        let station = StationFixture::new().unwrap();
        let clips = vec![
            processed(&station, "a.mp4", FakeMedia::canonical(10.0)),
            processed(&station, "b.mp4", FakeMedia::canonical(10.0)),
        ];
        station.executor.fail_transforms_matching("concat");
        let stitcher = Stitcher::new(station.tools(), &station.config);

        let err = stitcher.stitch(&clips).await.unwrap_err();
        assert!(matches!(err, StitchError::Tool(ToolError::CommandFailed { .. })));
        assert!(!stitcher.output_path().exists());
        assert!(output_dir_entries(&station).is_empty());
    }

    #[test]
    fn partial_file_keeps_the_output_container() {
        let partial = partial_path(Path::new("/out/program.mkv"));
        let name = partial.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".program."));
        assert!(name.ends_with(".partial.mkv"));
        assert_eq!(partial.parent(), Some(Path::new("/out")));
    }

    #[tokio::test]
    async fn matroska_output_is_encoded_as_matroska() {
        let mut station = StationFixture::new().unwrap();
        station.config.paths.output_name = "program.mkv".to_string();
        let clips = vec![
            processed(&station, "a.mp4", FakeMedia::canonical(10.0)),
            processed(&station, "b.mp4", FakeMedia::canonical(10.0)),
        ];
        let stitcher = Stitcher::new(station.tools(), &station.config);

        stitcher.stitch(&clips).await.unwrap();
        let call = &station.executor.transform_calls()[0];
        assert!(call.output().unwrap().ends_with(".partial.mkv"));
        assert!(stitcher.output_path().ends_with("program.mkv"));
        assert_eq!(output_dir_entries(&station), vec!["program.mkv"]);
    }
}
