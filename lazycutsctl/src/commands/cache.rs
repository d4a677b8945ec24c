use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

use crate::{DisplayFallback, Result};

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// List processed clips in the cache
    List,
    /// Delete every processed clip so the next build re-encodes
    Purge,
}

#[derive(Debug, Serialize)]
pub struct CacheListing {
    pub dir: PathBuf,
    pub entries: Vec<CacheEntry>,
    pub total_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheEntry {
    pub name: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct CachePurge {
    pub dir: PathBuf,
    pub removed: usize,
    pub bytes: u64,
}

pub fn list(dir: &Path) -> Result<CacheListing> {
    let mut entries = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                bytes: meta.len(),
            });
        }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let total_bytes = entries.iter().map(|entry| entry.bytes).sum();
    Ok(CacheListing {
        dir: dir.to_path_buf(),
        entries,
        total_bytes,
    })
}

pub fn purge(dir: &Path) -> Result<CachePurge> {
    let listing = list(dir)?;
    for entry in &listing.entries {
        fs::remove_file(dir.join(&entry.name))?;
    }
    Ok(CachePurge {
        dir: listing.dir,
        removed: listing.entries.len(),
        bytes: listing.total_bytes,
    })
}

impl DisplayFallback for CacheListing {
    fn display(&self) -> String {
        if self.entries.is_empty() {
            return format!("Cache {} is empty", self.dir.display());
        }
        let mut lines = vec![format!(
            "{count} processed clips in {dir} ({bytes} bytes)",
            count = self.entries.len(),
            dir = self.dir.display(),
            bytes = self.total_bytes
        )];
        for entry in &self.entries {
            lines.push(format!("  {:>12}  {}", entry.bytes, entry.name));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for CachePurge {
    fn display(&self) -> String {
        format!(
            "Removed {removed} processed clips ({bytes} bytes) from {dir}",
            removed = self.removed,
            bytes = self.bytes,
            dir = self.dir.display()
        )
    }
}
