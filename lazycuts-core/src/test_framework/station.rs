use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::LazyCutsConfig;
use crate::tools::MediaTools;

use super::executor::{FakeMedia, ScriptedExecutor};

const REFERENCE_CONFIG: &str = include_str!("../../../configs/lazycuts.toml");

/// A throwaway station: catalog folders in a temp directory, the reference
/// configuration pointed at them, and a scripted executor that knows every
/// clip added through the fixture.
pub struct StationFixture {
    pub temp_dir: TempDir,
    pub config: LazyCutsConfig,
    pub executor: Arc<ScriptedExecutor>,
}

impl StationFixture {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let mut config: LazyCutsConfig = toml::from_str(REFERENCE_CONFIG)?;
        config.paths.base_dir = temp_dir.path().to_string_lossy().to_string();

        for root in [
            config.shows_root(),
            config.bumpers_root(),
            config.commercials_root(),
            config.promos_root(),
        ] {
            std::fs::create_dir_all(root)?;
        }

        Ok(Self {
            temp_dir,
            config,
            executor: ScriptedExecutor::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn tools(&self) -> MediaTools {
        MediaTools::new(&self.config.tools).with_executor(self.executor.clone())
    }

    pub fn add_show(&self, show: &str) -> PathBuf {
        let dir = self.config.shows_root().join(show);
        std::fs::create_dir_all(&dir).expect("create show folder");
        dir
    }

    pub fn add_episode(&self, show: &str, file_name: &str, media: FakeMedia) -> PathBuf {
        let dir = self.add_show(show);
        self.add_file(dir.join(file_name), media)
    }

    pub fn add_bumper(&self, file_name: &str, media: FakeMedia) -> PathBuf {
        self.add_file(self.config.bumpers_root().join(file_name), media)
    }

    pub fn add_commercial(&self, file_name: &str, media: FakeMedia) -> PathBuf {
        self.add_file(self.config.commercials_root().join(file_name), media)
    }

    pub fn add_promo(&self, file_name: &str, media: FakeMedia) -> PathBuf {
        self.add_file(self.config.promos_root().join(file_name), media)
    }

    pub fn add_screenbug(&self, file_name: &str) -> PathBuf {
        let dir = self.config.screenbug_root();
        std::fs::create_dir_all(&dir).expect("create screenbug folder");
        let path = dir.join(file_name);
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").expect("write screenbug");
        path
    }

    fn add_file(&self, path: PathBuf, media: FakeMedia) -> PathBuf {
        std::fs::write(&path, b"source").expect("write clip");
        self.executor.register(&path, media);
        path
    }
}
