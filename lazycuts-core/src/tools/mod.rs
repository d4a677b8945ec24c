mod error;
mod ffprobe;

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolsSection;
use crate::media::{ClipMetadata, Geometry, StreamProfile};

pub use error::{ToolError, ToolResult};

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// Handle on the external prober and transformer. Every subprocess in the
/// pipeline is spawned through here.
#[derive(Clone)]
pub struct MediaTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    log_level: String,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for MediaTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTools")
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl MediaTools {
    pub fn new(config: &ToolsSection) -> Self {
        Self {
            ffmpeg: PathBuf::from(&config.ffmpeg),
            ffprobe: PathBuf::from(&config.ffprobe),
            log_level: config.log_level.clone(),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Probes a file. Any failure is logged and reported as `None`.
    pub async fn probe(&self, path: &Path) -> Option<ClipMetadata> {
        match self.try_probe(path).await {
            Ok(metadata) => Some(metadata),
            Err(error) => {
                warn!(file = %path.display(), %error, "probe failed, treating metadata as unknown");
                None
            }
        }
    }

    pub async fn duration(&self, path: &Path) -> Option<f64> {
        self.probe(path).await.and_then(|metadata| metadata.duration)
    }

    pub async fn geometry(&self, path: &Path) -> Option<Geometry> {
        self.probe(path).await.and_then(|metadata| metadata.geometry())
    }

    pub async fn stream_profile(&self, path: &Path) -> Option<StreamProfile> {
        self.probe(path)
            .await
            .and_then(|metadata| metadata.stream_profile())
    }

    pub async fn try_probe(&self, path: &Path) -> ToolResult<ClipMetadata> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self.launch(&self.ffprobe, &args).await?;
        if !output.status.success() {
            return Err(ToolError::CommandFailed {
                clip: path.to_path_buf(),
                command: render_command(&self.ffprobe, &args),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        ffprobe::parse_metadata(&output.stdout).map_err(|err| ToolError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Runs the transformer with `args` appended to the common flags. A
    /// non-zero exit is reported against `clip`.
    pub async fn transform(&self, clip: &Path, args: &[String]) -> ToolResult<()> {
        let mut full_args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
            "-y".to_string(),
        ];
        full_args.extend_from_slice(args);
        debug!(clip = %clip.display(), "running {}", render_command(&self.ffmpeg, &full_args));
        let output = self.launch(&self.ffmpeg, &full_args).await?;
        if !output.status.success() {
            return Err(ToolError::CommandFailed {
                clip: clip.to_path_buf(),
                command: render_command(&self.ffmpeg, &full_args),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Verifies that both binaries can be launched.
    pub async fn check(&self) -> ToolResult<()> {
        for program in [&self.ffmpeg, &self.ffprobe] {
            let args = vec!["-version".to_string()];
            let output = self.launch(program, &args).await?;
            if !output.status.success() {
                return Err(ToolError::Unavailable {
                    program: program.display().to_string(),
                    command: render_command(program, &args),
                    status: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn launch(&self, program: &Path, args: &[String]) -> ToolResult<Output> {
        self.executor
            .run(program, args)
            .await
            .map_err(|source| ToolError::Launch {
                program: program.display().to_string(),
                source,
            })
    }
}

fn render_command(program: &Path, args: &[String]) -> String {
    format!("{} {}", program.display(), args.join(" "))
}
