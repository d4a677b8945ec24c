use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::budget::{AdBlock, DurationBudgeter};
use crate::catalog::{sanitize_filename, Catalog, CatalogError, ShowFolder};
use crate::config::LazyCutsConfig;
use crate::media::{ClipCategory, MediaClip, ProcessedClip};
use crate::normalizer::{ClipNormalizer, NormalizeError};
use crate::stitcher::{JoinStrategy, StitchError, Stitcher};
use crate::tools::{MediaTools, ToolError};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no show folders found in {0}")]
    NoShows(PathBuf),
    #[error("no bumpers found in {0}")]
    NoBumpers(PathBuf),
    #[error("no commercials or promos found in {commercials} or {promos}")]
    NoAds {
        commercials: PathBuf,
        promos: PathBuf,
    },
    #[error("none of the selected shows produced playable segments")]
    NoPlayableShows,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Stitch(#[from] StitchError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotRole {
    FeatureFirstHalf { show: String },
    FeatureSecondHalf { show: String },
    Bumper,
    AdSpot,
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRole::FeatureFirstHalf { show } => write!(f, "{show} (part 1)"),
            SlotRole::FeatureSecondHalf { show } => write!(f, "{show} (part 2)"),
            SlotRole::Bumper => f.write_str("bumper"),
            SlotRole::AdSpot => f.write_str("ad"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaylistEntry {
    pub role: SlotRole,
    /// Index of the ad break a bumper or ad spot belongs to.
    pub ad_break: Option<usize>,
    pub clip: ProcessedClip,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdBreakSummary {
    pub index: usize,
    pub spots: usize,
    pub total_seconds: f64,
    pub under_filled: bool,
}

/// The broadcast in playback order. Built once by the composer and never
/// reordered.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
    shows: Vec<String>,
    breaks: Vec<AdBreakSummary>,
    estimated_seconds: f64,
}

impl Playlist {
    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn clips(&self) -> Vec<ProcessedClip> {
        self.entries.iter().map(|entry| entry.clip.clone()).collect()
    }

    pub fn shows(&self) -> &[String] {
        &self.shows
    }

    pub fn breaks(&self) -> &[AdBreakSummary] {
        &self.breaks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bumper_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.role == SlotRole::Bumper)
            .count()
    }

    pub fn estimated_seconds(&self) -> f64 {
        self.estimated_seconds
    }

    fn push(&mut self, role: SlotRole, ad_break: Option<usize>, clip: ProcessedClip) {
        self.entries.push(PlaylistEntry {
            role,
            ad_break,
            clip,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub output: PathBuf,
    pub strategy: JoinStrategy,
    pub shows: Vec<String>,
    pub slots: usize,
    pub ad_breaks: usize,
    pub estimated_seconds: f64,
    pub generated_at: DateTime<Utc>,
}

impl fmt::Display for BroadcastReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Output: {}", self.output.display())?;
        writeln!(f, "Join: {}", self.strategy)?;
        writeln!(f, "Shows: {}", self.shows.join(", "))?;
        writeln!(f, "Slots: {} ({} ad breaks)", self.slots, self.ad_breaks)?;
        writeln!(f, "Estimated duration: {:.1}s", self.estimated_seconds)?;
        write!(f, "Generated at: {}", self.generated_at.to_rfc3339())
    }
}

/// Both halves of one aired episode, ready for placement.
struct ShowSegments {
    show: String,
    first: ProcessedClip,
    second: ProcessedClip,
    duration: f64,
}

struct Pools {
    bumpers: Vec<MediaClip>,
    commercials: Vec<MediaClip>,
    promos: Vec<MediaClip>,
}

/// Assembles one broadcast: picks shows, splits each chosen episode at its
/// midpoint, surrounds the halves with bumpers and ad breaks, and hands the
/// result to the stitcher.
#[derive(Debug, Clone)]
pub struct PlaylistComposer {
    config: LazyCutsConfig,
    catalog: Catalog,
    tools: MediaTools,
}

impl PlaylistComposer {
    pub fn new(config: LazyCutsConfig) -> Self {
        let tools = MediaTools::new(&config.tools);
        Self::with_tools(config, tools)
    }

    pub fn with_tools(config: LazyCutsConfig, tools: MediaTools) -> Self {
        Self {
            catalog: Catalog::new(&config),
            config,
            tools,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> ComposeResult<BroadcastReport> {
        let playlist = self.compose(rng).await?;
        let stitcher = Stitcher::new(self.tools.clone(), &self.config);
        let strategy = stitcher.stitch(&playlist.clips()).await?;
        Ok(BroadcastReport {
            output: stitcher.output_path().to_path_buf(),
            strategy,
            shows: playlist.shows().to_vec(),
            slots: playlist.len(),
            ad_breaks: playlist.breaks().len(),
            estimated_seconds: playlist.estimated_seconds(),
            generated_at: Utc::now(),
        })
    }

    pub async fn compose<R: Rng + ?Sized>(&self, rng: &mut R) -> ComposeResult<Playlist> {
        let mut folders = self.catalog.show_folders()?;
        if folders.is_empty() {
            return Err(ComposeError::NoShows(self.config.shows_root()));
        }
        let pools = self.pools()?;

        folders.shuffle(rng);
        folders.truncate(self.config.schedule.max_shows);
        info!(
            shows = ?folders.iter().map(|show| show.name.as_str()).collect::<Vec<_>>(),
            "selected shows"
        );

        let normalizer = ClipNormalizer::new(self.tools.clone(), &self.config)
            .with_overlay(self.catalog.overlay_asset());
        let budgeter = DurationBudgeter::new(
            self.tools.clone(),
            self.config.schedule.ad_break_seconds,
            self.config.schedule.ad_break_tolerance_seconds,
        );

        // Segments keep their position in the selection: the trailing ad
        // break is skipped only after the last selected show.
        let mut segments = Vec::new();
        for (position, folder) in folders.iter().enumerate() {
            if let Some(show) = self.prepare_show(folder, &normalizer, rng).await? {
                segments.push((position, show));
            }
        }
        if segments.is_empty() {
            return Err(ComposeError::NoPlayableShows);
        }

        let mut playlist = Playlist::default();
        let last = folders.len() - 1;
        for (position, show) in segments {
            info!(show = %show.show, "laying out show");
            playlist.shows.push(show.show.clone());
            playlist.estimated_seconds += show.duration;
            playlist.push(
                SlotRole::FeatureFirstHalf {
                    show: show.show.clone(),
                },
                None,
                show.first,
            );
            self.push_ad_break(&mut playlist, &pools, &normalizer, &budgeter, true, rng)
                .await?;
            playlist.push(
                SlotRole::FeatureSecondHalf { show: show.show },
                None,
                show.second,
            );
            if position != last {
                self.push_ad_break(&mut playlist, &pools, &normalizer, &budgeter, true, rng)
                    .await?;
            }
        }
        self.push_ad_break(&mut playlist, &pools, &normalizer, &budgeter, false, rng)
            .await?;

        info!(
            slots = playlist.len(),
            ad_breaks = playlist.breaks.len(),
            estimated_seconds = playlist.estimated_seconds,
            "playlist composed"
        );
        Ok(playlist)
    }

    fn pools(&self) -> ComposeResult<Pools> {
        let bumpers = self.catalog.bumpers()?;
        if bumpers.is_empty() {
            return Err(ComposeError::NoBumpers(self.config.bumpers_root()));
        }
        let commercials = self.catalog.commercials()?;
        let promos = self.catalog.promos()?;
        if commercials.is_empty() && promos.is_empty() {
            return Err(ComposeError::NoAds {
                commercials: self.config.commercials_root(),
                promos: self.config.promos_root(),
            });
        }
        Ok(Pools {
            bumpers,
            commercials,
            promos,
        })
    }

    async fn prepare_show<R: Rng + ?Sized>(
        &self,
        folder: &ShowFolder,
        normalizer: &ClipNormalizer,
        rng: &mut R,
    ) -> ComposeResult<Option<ShowSegments>> {
        let episodes = self.catalog.episodes(folder)?;
        let Some(episode) = episodes.choose(rng) else {
            warn!(show = %folder.name, "show folder has no episodes, skipping");
            return Ok(None);
        };
        info!(show = %folder.name, episode = %episode, "preparing episode");

        let processed = normalizer.normalize(episode).await?;
        let Some(duration) = self.tools.duration(&processed.path).await else {
            warn!(show = %folder.name, episode = %episode, "episode duration unknown, skipping");
            return Ok(None);
        };

        let temp = self.config.temp_root();
        fs::create_dir_all(&temp)
            .await
            .map_err(|source| ComposeError::Io {
                path: temp.clone(),
                source,
            })?;
        let stem = sanitize_filename(&episode.relative_path().with_extension("").to_string_lossy());
        let midpoint = duration / 2.0;
        let first_path = temp.join(format!("{stem}_part1.mp4"));
        let second_path = temp.join(format!("{stem}_part2.mp4"));
        info!(show = %folder.name, duration, midpoint, "splitting episode");
        self.split(&processed, &["-t", &midpoint.to_string()], &first_path)
            .await?;
        self.split(&processed, &["-ss", &midpoint.to_string()], &second_path)
            .await?;

        let first = normalizer
            .normalize(&MediaClip::new(&first_path, ClipCategory::FeatureSegment, &temp))
            .await?;
        let second = normalizer
            .normalize(&MediaClip::new(&second_path, ClipCategory::FeatureSegment, &temp))
            .await?;
        Ok(Some(ShowSegments {
            show: folder.name.clone(),
            first,
            second,
            duration,
        }))
    }

    async fn split(
        &self,
        source: &ProcessedClip,
        window: &[&str],
        output: &Path,
    ) -> ComposeResult<()> {
        let mut args = vec!["-i".to_string(), source.path.to_string_lossy().to_string()];
        args.extend(window.iter().map(|arg| arg.to_string()));
        args.extend([
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        self.tools.transform(&source.path, &args).await?;
        Ok(())
    }

    /// Appends `[bumper] [ads...]`, plus a closing bumper when `closed`.
    async fn push_ad_break<R: Rng + ?Sized>(
        &self,
        playlist: &mut Playlist,
        pools: &Pools,
        normalizer: &ClipNormalizer,
        budgeter: &DurationBudgeter,
        closed: bool,
        rng: &mut R,
    ) -> ComposeResult<()> {
        let index = playlist.breaks.len();
        self.push_bumper(playlist, pools, normalizer, index, rng)
            .await?;

        let block: AdBlock = budgeter
            .select(&[pools.commercials.as_slice(), pools.promos.as_slice()], rng)
            .await;
        for spot in &block.clips {
            let processed = normalizer.normalize(spot).await?;
            playlist.push(SlotRole::AdSpot, Some(index), processed);
        }
        info!(
            ad_break = index,
            spots = block.len(),
            total_seconds = block.total_seconds,
            "ad break filled"
        );
        playlist.estimated_seconds += block.total_seconds;
        playlist.breaks.push(AdBreakSummary {
            index,
            spots: block.len(),
            total_seconds: block.total_seconds,
            under_filled: block.under_filled,
        });

        if closed {
            self.push_bumper(playlist, pools, normalizer, index, rng)
                .await?;
        }
        Ok(())
    }

    async fn push_bumper<R: Rng + ?Sized>(
        &self,
        playlist: &mut Playlist,
        pools: &Pools,
        normalizer: &ClipNormalizer,
        index: usize,
        rng: &mut R,
    ) -> ComposeResult<()> {
        // Pools are checked non-empty before composition starts.
        let Some(bumper) = pools.bumpers.choose(rng) else {
            return Ok(());
        };
        let processed = normalizer.normalize(bumper).await?;
        playlist.estimated_seconds += self.tools.duration(&processed.path).await.unwrap_or(0.0);
        playlist.push(SlotRole::Bumper, Some(index), processed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_framework::{FakeMedia, StationFixture};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::BTreeSet;

    fn station(shows: &[(&str, f64)]) -> StationFixture {
        let station = StationFixture::new().unwrap();
        for (show, duration) in shows {
            station.add_episode(show, "episode.mkv", FakeMedia::canonical(*duration));
        }
        station.add_bumper("ident.mp4", FakeMedia::canonical(5.0));
        for index in 0..8 {
            station.add_commercial(&format!("spot{index}.mp4"), FakeMedia::canonical(30.0));
        }
        for index in 0..4 {
            station.add_promo(&format!("promo{index}.mp4"), FakeMedia::canonical(15.0));
        }
        station
    }

    fn composer(station: &StationFixture) -> PlaylistComposer {
        PlaylistComposer::with_tools(station.config.clone(), station.tools())
    }

    fn kinds(playlist: &Playlist) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = Vec::new();
        for entry in playlist.entries() {
            let kind = match entry.role {
                SlotRole::FeatureFirstHalf { .. } => "half1",
                SlotRole::FeatureSecondHalf { .. } => "half2",
                SlotRole::Bumper => "bumper",
                SlotRole::AdSpot => "ads",
            };
            if kind == "ads" && kinds.last() == Some(&"ads") {
                continue;
            }
            kinds.push(kind);
        }
        kinds
    }

    #[tokio::test]
    async fn single_show_layout() {
        let station = station(&[("Night Owls", 600.0)]);
        let playlist = composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(1))
            .await
            .unwrap();
        assert_eq!(
            kinds(&playlist),
            vec!["half1", "bumper", "ads", "bumper", "half2", "bumper", "ads"]
        );
        assert_eq!(playlist.shows(), ["Night Owls".to_string()]);
        assert_eq!(playlist.breaks().len(), 2);
        assert!(playlist
            .breaks()
            .iter()
            .all(|summary| summary.total_seconds >= 180.0 && summary.total_seconds <= 195.0));
    }

    #[tokio::test]
    async fn four_shows_get_expected_break_counts() {
        let station = station(&[
            ("Alpha", 600.0),
            ("Bravo", 1200.0),
            ("Charlie", 900.0),
            ("Delta", 1500.0),
            ("Echo", 300.0),
        ]);
        let playlist = composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(9))
            .await
            .unwrap();
        let n = 4;
        assert_eq!(playlist.shows().len(), n);
        assert_eq!(playlist.bumper_count(), 4 * n - 1);
        assert_eq!(playlist.breaks().len(), 2 * n);

        let indices: BTreeSet<usize> = playlist
            .entries()
            .iter()
            .filter_map(|entry| entry.ad_break)
            .collect();
        assert_eq!(indices.len(), 2 * n);
        let distinct: BTreeSet<&String> = playlist.shows().iter().collect();
        assert_eq!(distinct.len(), n);
    }

    #[tokio::test]
    async fn episode_is_cut_at_exact_midpoint() {
        let station = station(&[("Night Owls", 601.0)]);
        composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(3))
            .await
            .unwrap();
        let splits: Vec<_> = station
            .executor
            .transform_calls()
            .into_iter()
            .filter(|call| call.value_after("-c") == Some("copy"))
            .collect();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].value_after("-t"), Some("300.5"));
        assert!(splits[0].output().unwrap().ends_with("Night_Owls_episode_part1.mp4"));
        assert_eq!(splits[1].value_after("-ss"), Some("300.5"));
        assert!(splits[1].output().unwrap().ends_with("Night_Owls_episode_part2.mp4"));
    }

    #[tokio::test]
    async fn canonical_halves_pass_through() {
        let station = station(&[("Night Owls", 600.0)]);
        let playlist = composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(5))
            .await
            .unwrap();
        let halves: Vec<_> = playlist
            .entries()
            .iter()
            .filter(|entry| entry.ad_break.is_none())
            .collect();
        assert_eq!(halves.len(), 2);
        for half in halves {
            assert_eq!(half.clip.category, ClipCategory::FeatureSegment);
            assert!(half.clip.path.starts_with(station.config.temp_root()));
        }
    }

    #[tokio::test]
    async fn empty_show_folder_is_skipped() {
        let station = station(&[("Night Owls", 600.0)]);
        station.add_show("Cancelled");
        let playlist = composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(2))
            .await
            .unwrap();
        assert_eq!(playlist.shows(), ["Night Owls".to_string()]);
        assert_eq!(playlist.breaks().len(), 2);
    }

    #[tokio::test]
    async fn skipped_last_selection_keeps_the_post_show_break() {
        let station = station(&[("Alpha", 600.0)]);
        station.add_show("Zulu");
        let composer = composer(&station);

        let mut saw_zulu_last = false;
        for seed in 0..8 {
            let mut order = vec!["Alpha", "Zulu"];
            order.shuffle(&mut ChaCha20Rng::seed_from_u64(seed));
            let zulu_last = order[1] == "Zulu";
            saw_zulu_last |= zulu_last;

            let playlist = composer
                .compose(&mut ChaCha20Rng::seed_from_u64(seed))
                .await
                .unwrap();
            assert_eq!(playlist.shows(), ["Alpha".to_string()]);
            if zulu_last {
                assert_eq!(
                    kinds(&playlist),
                    vec![
                        "half1", "bumper", "ads", "bumper", "half2", "bumper", "ads", "bumper",
                        "bumper", "ads"
                    ]
                );
                assert_eq!(playlist.breaks().len(), 3);
                assert_eq!(playlist.bumper_count(), 5);
            } else {
                assert_eq!(playlist.breaks().len(), 2);
                assert_eq!(playlist.bumper_count(), 3);
            }
        }
        assert!(saw_zulu_last);
    }

    #[tokio::test]
    async fn unprobeable_episode_leaves_no_playable_show() {
        let station = station(&[]);
        station.add_episode(
            "Static",
            "episode.mkv",
            FakeMedia::canonical(0.0).without_duration(),
        );
        let err = composer(&station)
            .compose(&mut ChaCha20Rng::seed_from_u64(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::NoPlayableShows));
    }

    #[tokio::test]
    async fn empty_pools_fail_before_processing() {
        let station = StationFixture::new().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(matches!(
            composer(&station).compose(&mut rng).await,
            Err(ComposeError::NoShows(_))
        ));

        station.add_episode("Night Owls", "episode.mkv", FakeMedia::canonical(600.0));
        assert!(matches!(
            composer(&station).compose(&mut rng).await,
            Err(ComposeError::NoBumpers(_))
        ));

        station.add_bumper("ident.mp4", FakeMedia::canonical(5.0));
        assert!(matches!(
            composer(&station).compose(&mut rng).await,
            Err(ComposeError::NoAds { .. })
        ));
        assert_eq!(station.executor.transform_count(), 0);
    }

    #[tokio::test]
    async fn run_reports_the_stitched_program() {
        let station = station(&[("Night Owls", 600.0)]);
        let report = composer(&station)
            .run(&mut ChaCha20Rng::seed_from_u64(11))
            .await
            .unwrap();
        assert_eq!(report.output, station.config.output_path());
        assert!(report.output.is_file());
        assert_eq!(report.strategy, JoinStrategy::StreamCopy);
        assert_eq!(report.shows, vec!["Night Owls".to_string()]);
        assert_eq!(report.ad_breaks, 2);
        assert!(report.estimated_seconds >= 600.0 + 3.0 * 5.0 + 2.0 * 180.0);
    }
}
