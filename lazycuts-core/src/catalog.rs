use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::LazyCutsConfig;
use crate::media::{ClipCategory, MediaClip};

const OVERLAY_EXTENSION: &str = "png";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{category} folder not found at {path}")]
    MissingRoot { category: String, path: PathBuf },
    #[error("failed to list {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShowFolder {
    pub name: String,
    pub path: PathBuf,
}

/// Read-only view over the category folders of a station.
#[derive(Debug, Clone)]
pub struct Catalog {
    shows_root: PathBuf,
    bumpers_root: PathBuf,
    commercials_root: PathBuf,
    promos_root: PathBuf,
    screenbug_root: PathBuf,
    extensions: Vec<String>,
}

impl Catalog {
    pub fn new(config: &LazyCutsConfig) -> Self {
        Self {
            shows_root: config.shows_root(),
            bumpers_root: config.bumpers_root(),
            commercials_root: config.commercials_root(),
            promos_root: config.promos_root(),
            screenbug_root: config.screenbug_root(),
            extensions: config
                .schedule
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// One folder per show, sorted by name.
    pub fn show_folders(&self) -> CatalogResult<Vec<ShowFolder>> {
        let entries = list_dir(&self.shows_root, "shows")?;
        Ok(entries
            .into_iter()
            .filter(|path| path.is_dir())
            .map(|path| ShowFolder {
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path,
            })
            .collect())
    }

    pub fn episodes(&self, show: &ShowFolder) -> CatalogResult<Vec<MediaClip>> {
        self.clips_in(&show.path, ClipCategory::Show, &self.shows_root, "show")
    }

    pub fn bumpers(&self) -> CatalogResult<Vec<MediaClip>> {
        self.clips_in(
            &self.bumpers_root,
            ClipCategory::Bumper,
            &self.bumpers_root,
            "bumpers",
        )
    }

    pub fn commercials(&self) -> CatalogResult<Vec<MediaClip>> {
        self.clips_in(
            &self.commercials_root,
            ClipCategory::Commercial,
            &self.commercials_root,
            "commercials",
        )
    }

    pub fn promos(&self) -> CatalogResult<Vec<MediaClip>> {
        self.clips_in(
            &self.promos_root,
            ClipCategory::Promo,
            &self.promos_root,
            "promos",
        )
    }

    /// First PNG in the screenbug folder, if any.
    pub fn overlay_asset(&self) -> Option<PathBuf> {
        let entries = list_dir(&self.screenbug_root, "screenbug").ok()?;
        entries
            .into_iter()
            .find(|path| path.is_file() && has_extension(path, OVERLAY_EXTENSION))
    }

    fn clips_in(
        &self,
        dir: &Path,
        category: ClipCategory,
        catalog_root: &Path,
        label: &str,
    ) -> CatalogResult<Vec<MediaClip>> {
        let entries = list_dir(dir, label)?;
        Ok(entries
            .into_iter()
            .filter(|path| path.is_file() && self.is_video(path))
            .map(|path| MediaClip::new(path, category, catalog_root))
            .collect())
    }

    fn is_video(&self, path: &Path) -> bool {
        self.extensions.iter().any(|ext| has_extension(path, ext))
    }
}

fn list_dir(dir: &Path, label: &str) -> CatalogResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CatalogError::MissingRoot {
            category: label.to_string(),
            path: dir.to_path_buf(),
        });
    }
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| CatalogError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.into_path());
    }
    Ok(entries)
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

/// Replaces every character outside `[A-Za-z0-9_.-]` (Unicode word
/// characters included) with `_`.
pub fn sanitize_filename(name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"[^\w.-]").expect("valid regex"));
    pattern.replace_all(name, "_").into_owned()
}
