use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::tools::CommandExecutor;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
#[cfg(windows)]
use std::os::windows::process::ExitStatusExt;

/// Media description served by [`ScriptedExecutor`] when a file is probed.
/// Transform outputs carry it as their file contents, so renamed outputs
/// still probe correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeMedia {
    pub duration: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
    pub video_codec: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl FakeMedia {
    /// 1280x720, 30 fps, H.264 + AAC 48 kHz stereo.
    pub fn canonical(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            width: 1280,
            height: 720,
            frame_rate: "30/1".into(),
            video_codec: "h264".into(),
            pixel_format: "yuv420p".into(),
            audio_codec: "aac".into(),
            sample_rate: 48000,
            channels: 2,
        }
    }

    pub fn with_geometry(duration: f64, width: u32, height: u32, frame_rate: &str) -> Self {
        Self {
            width,
            height,
            frame_rate: frame_rate.into(),
            ..Self::canonical(duration)
        }
    }

    pub fn without_duration(mut self) -> Self {
        self.duration = None;
        self
    }

    fn to_json(&self) -> serde_json::Value {
        let mut format = json!({ "format_name": "mov,mp4,m4a,3gp,3g2,mj2" });
        if let Some(duration) = self.duration {
            format["duration"] = json!(format!("{duration:.6}"));
        }
        json!({
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": self.video_codec,
                    "width": self.width,
                    "height": self.height,
                    "r_frame_rate": self.frame_rate,
                    "pix_fmt": self.pixel_format,
                },
                {
                    "index": 1,
                    "codec_type": "audio",
                    "codec_name": self.audio_codec,
                    "sample_rate": self.sample_rate.to_string(),
                    "channels": self.channels,
                }
            ],
            "format": format,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RecordedCall {
    pub fn is_probe(&self) -> bool {
        program_name(&self.program).contains("ffprobe")
    }

    pub fn output(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    pub fn value_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(String::as_str)
    }

    pub fn inputs(&self) -> Vec<&str> {
        self.args
            .windows(2)
            .filter(|pair| pair[0] == "-i")
            .map(|pair| pair[1].as_str())
            .collect()
    }
}

/// Stand-in for ffprobe/ffmpeg. Probes answer with JSON for registered
/// files; transforms write a placeholder output and register the media the
/// real tool would have produced. Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    media: Mutex<HashMap<PathBuf, FakeMedia>>,
    calls: Mutex<Vec<RecordedCall>>,
    failing: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, path: impl Into<PathBuf>, media: FakeMedia) {
        self.media.lock().unwrap().insert(path.into(), media);
    }

    pub fn media(&self, path: impl AsRef<Path>) -> Option<FakeMedia> {
        let path = path.as_ref();
        let registered = self.media.lock().unwrap().get(path).cloned();
        registered.or_else(|| {
            std::fs::read(path)
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        })
    }

    /// Any transform or version check with an argument containing `needle`
    /// exits with status 1.
    pub fn fail_transforms_matching(&self, needle: impl Into<String>) {
        self.failing.lock().unwrap().push(needle.into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transform_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| !call.is_probe())
            .collect()
    }

    pub fn transform_count(&self) -> usize {
        self.transform_calls().len()
    }

    pub fn probe_count(&self) -> usize {
        self.calls().iter().filter(|call| call.is_probe()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn probe(&self, call: &RecordedCall) -> Output {
        let media = call.output().and_then(|path| self.media(path));
        match media {
            Some(media) => success(media.to_json().to_string().into_bytes()),
            None => failure(format!(
                "{}: No such file or directory",
                call.output().unwrap_or_default()
            )),
        }
    }

    fn is_failing(&self, call: &RecordedCall) -> bool {
        self.failing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| call.args.iter().any(|arg| arg.contains(needle.as_str())))
    }

    fn transform(&self, call: &RecordedCall) -> std::io::Result<Output> {
        if self.is_failing(call) {
            return Ok(failure("simulated transform failure".into()));
        }
        let Some(output) = call.output().map(PathBuf::from) else {
            return Ok(failure("no output file".into()));
        };
        let produced = self.produced_media(call)?;
        std::fs::write(&output, serde_json::to_vec(&produced)?)?;
        self.register(output, produced);
        Ok(success(Vec::new()))
    }

    fn produced_media(&self, call: &RecordedCall) -> std::io::Result<FakeMedia> {
        let inputs = call.inputs();

        if call.value_after("-f") == Some("concat") {
            let manifest = inputs.first().copied().unwrap_or_default();
            let listed: Vec<PathBuf> = std::fs::read_to_string(manifest)?
                .lines()
                .filter_map(parse_manifest_line)
                .collect();
            return Ok(self.joined(listed.iter().map(PathBuf::as_path), false));
        }
        if call
            .value_after("-filter_complex")
            .map(|graph| graph.contains("concat=n="))
            .unwrap_or(false)
        {
            return Ok(self.joined(inputs.iter().map(Path::new), true));
        }

        let base = inputs
            .first()
            .and_then(|path| self.media(path))
            .unwrap_or_else(|| FakeMedia::canonical(0.0).without_duration());
        let mut produced = if call.value_after("-c") == Some("copy")
            || call.value_after("-c:a") == Some("copy")
        {
            base.clone()
        } else {
            FakeMedia {
                duration: base.duration,
                ..FakeMedia::canonical(0.0)
            }
        };
        if let Some(limit) = call.value_after("-t").and_then(|v| v.parse::<f64>().ok()) {
            produced.duration = base.duration.map(|duration| duration.min(limit));
        }
        if let Some(offset) = call.value_after("-ss").and_then(|v| v.parse::<f64>().ok()) {
            produced.duration = base.duration.map(|duration| (duration - offset).max(0.0));
        }
        Ok(produced)
    }

    fn joined<'a>(&self, parts: impl Iterator<Item = &'a Path>, reencode: bool) -> FakeMedia {
        let mut total = 0.0;
        let mut first = None;
        for part in parts {
            let media = self.media(part);
            total += media.as_ref().and_then(|m| m.duration).unwrap_or(0.0);
            if first.is_none() {
                first = media;
            }
        }
        match first {
            Some(first) if !reencode => FakeMedia {
                duration: Some(total),
                ..first
            },
            _ => FakeMedia::canonical(total),
        }
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        let call = RecordedCall {
            program: program.to_path_buf(),
            args: args.to_vec(),
        };
        self.calls.lock().unwrap().push(call.clone());
        if args.iter().any(|arg| arg == "-version") {
            if self.is_failing(&call) {
                return Ok(failure("simulated launch failure".into()));
            }
            return Ok(success(b"version n6.1".to_vec()));
        }
        if call.is_probe() {
            Ok(self.probe(&call))
        } else {
            self.transform(&call)
        }
    }
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parse_manifest_line(line: &str) -> Option<PathBuf> {
    let quoted = line.trim().strip_prefix("file '")?.strip_suffix('\'')?;
    Some(PathBuf::from(quoted.replace("'\\''", "'")))
}

fn success(stdout: Vec<u8>) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout,
        stderr: Vec::new(),
    }
}

fn failure(stderr: String) -> Output {
    #[cfg(unix)]
    let status = ExitStatus::from_raw(1 << 8);
    #[cfg(windows)]
    let status = ExitStatus::from_raw(1);
    Output {
        status,
        stdout: Vec::new(),
        stderr: stderr.into_bytes(),
    }
}
