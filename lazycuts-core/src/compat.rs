use tracing::{debug, info};

use crate::media::{ProcessedClip, StreamProfile};
use crate::tools::MediaTools;

/// Decides whether `clips` can be joined by stream copy: every clip must
/// probe to the same video and audio parameters. An empty list, or any clip
/// whose profile is unknown, is not copy-safe.
pub async fn is_stream_copy_safe(tools: &MediaTools, clips: &[ProcessedClip]) -> bool {
    let mut reference: Option<StreamProfile> = None;
    for clip in clips {
        let Some(profile) = tools.stream_profile(&clip.path).await else {
            info!(clip = %clip.path.display(), "stream profile unknown, joining by re-encode");
            return false;
        };
        match &reference {
            None => reference = Some(profile),
            Some(expected) if *expected != profile => {
                info!(
                    clip = %clip.path.display(),
                    expected = ?expected,
                    found = ?profile,
                    "stream profile mismatch, joining by re-encode"
                );
                return false;
            }
            Some(_) => {}
        }
    }
    debug!(clips = clips.len(), "stream profiles compatible");
    reference.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsSection;
    use crate::media::{ClipCategory, ProcessedOrigin};
    use crate::test_framework::{FakeMedia, ScriptedExecutor};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn clip(path: &str) -> ProcessedClip {
        ProcessedClip {
            path: PathBuf::from(path),
            source: PathBuf::from(path),
            category: ClipCategory::Commercial,
            origin: ProcessedOrigin::Reencoded,
        }
    }

    fn tools(executor: Arc<ScriptedExecutor>) -> MediaTools {
        MediaTools::new(&ToolsSection {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            log_level: "error".into(),
        })
        .with_executor(executor)
    }

    #[tokio::test]
    async fn identical_profiles_are_copy_safe() {
        let executor = ScriptedExecutor::new();
        executor.register("/p/a.mp4", FakeMedia::canonical(10.0));
        executor.register("/p/b.mp4", FakeMedia::canonical(99.0));
        let tools = tools(executor);
        assert!(is_stream_copy_safe(&tools, &[clip("/p/a.mp4"), clip("/p/b.mp4")]).await);
    }

    #[tokio::test]
    async fn differing_geometry_is_not_copy_safe() {
        let executor = ScriptedExecutor::new();
        executor.register("/p/a.mp4", FakeMedia::canonical(10.0));
        executor.register("/p/b.mp4", FakeMedia::with_geometry(10.0, 1920, 1080, "30/1"));
        let tools = tools(executor);
        assert!(!is_stream_copy_safe(&tools, &[clip("/p/a.mp4"), clip("/p/b.mp4")]).await);
    }

    #[tokio::test]
    async fn differing_audio_is_not_copy_safe() {
        let executor = ScriptedExecutor::new();
        executor.register("/p/a.mp4", FakeMedia::canonical(10.0));
        let mut mono = FakeMedia::canonical(10.0);
        mono.channels = 1;
        executor.register("/p/b.mp4", mono);
        let tools = tools(executor);
        assert!(!is_stream_copy_safe(&tools, &[clip("/p/a.mp4"), clip("/p/b.mp4")]).await);
    }

    #[tokio::test]
    async fn unknown_profile_or_empty_list_is_not_copy_safe() {
        let executor = ScriptedExecutor::new();
        executor.register("/p/a.mp4", FakeMedia::canonical(10.0));
        let tools = tools(executor);
        assert!(!is_stream_copy_safe(&tools, &[clip("/p/a.mp4"), clip("/p/gone.mp4")]).await);
        assert!(!is_stream_copy_safe(&tools, &[]).await);
        assert!(is_stream_copy_safe(&tools, &[clip("/p/a.mp4")]).await);
    }
}
