use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },
    #[error("command failed for {clip} ({command}) with status {status:?}: {stderr}")]
    CommandFailed {
        clip: PathBuf,
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("{program} is not usable ({command}) with status {status:?}: {stderr}")]
    Unavailable {
        program: String,
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("invalid ffprobe payload for {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub type ToolResult<T> = Result<T, ToolError>;
