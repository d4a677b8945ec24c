use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::media::MediaClip;
use crate::tools::MediaTools;

/// Ad clips picked for one break, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub struct AdBlock {
    pub clips: Vec<MediaClip>,
    pub total_seconds: f64,
    /// Set when the pools ran out before the target was reached.
    pub under_filled: bool,
}

impl AdBlock {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Fills an ad break from the commercial and promo pools: candidates are
/// drawn in random order and accepted while the running total stays under
/// `target + tolerance`; selection stops once the total reaches `target`.
#[derive(Debug, Clone)]
pub struct DurationBudgeter {
    tools: MediaTools,
    target_seconds: f64,
    tolerance_seconds: f64,
}

impl DurationBudgeter {
    pub fn new(tools: MediaTools, target_seconds: f64, tolerance_seconds: f64) -> Self {
        Self {
            tools,
            target_seconds,
            tolerance_seconds,
        }
    }

    pub fn target_seconds(&self) -> f64 {
        self.target_seconds
    }

    pub async fn select<R: Rng + ?Sized>(&self, pools: &[&[MediaClip]], rng: &mut R) -> AdBlock {
        let mut candidates: Vec<&MediaClip> = pools.iter().flat_map(|pool| pool.iter()).collect();
        candidates.shuffle(rng);

        let ceiling = self.target_seconds + self.tolerance_seconds;
        let mut clips = Vec::new();
        let mut total = 0.0;
        for candidate in candidates {
            if total >= self.target_seconds {
                break;
            }
            // Unprobeable clips count as zero seconds.
            let duration = self.tools.duration(candidate.path()).await.unwrap_or(0.0);
            if total + duration <= ceiling {
                debug!(clip = %candidate, duration, "ad accepted");
                total += duration;
                clips.push(candidate.clone());
            } else {
                debug!(clip = %candidate, duration, "ad skipped, would overrun break");
            }
        }

        let under_filled = total < self.target_seconds;
        if under_filled {
            warn!(
                total_seconds = total,
                target_seconds = self.target_seconds,
                "ad pools exhausted before break was filled"
            );
        }
        AdBlock {
            clips,
            total_seconds: total,
            under_filled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::test_framework::{FakeMedia, StationFixture};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn station_with_ads(durations: &[f64]) -> (StationFixture, Vec<MediaClip>, Vec<MediaClip>) {
        let station = StationFixture::new().unwrap();
        for (index, duration) in durations.iter().enumerate() {
            let media = FakeMedia::canonical(*duration);
            if index % 2 == 0 {
                station.add_commercial(&format!("spot{index:02}.mp4"), media);
            } else {
                station.add_promo(&format!("promo{index:02}.mp4"), media);
            }
        }
        let catalog = Catalog::new(&station.config);
        let commercials = catalog.commercials().unwrap();
        let promos = catalog.promos().unwrap();
        (station, commercials, promos)
    }

    #[tokio::test]
    async fn fills_break_inside_window() {
        let durations: Vec<f64> = (0..12)
            .map(|index| if index % 2 == 0 { 30.0 } else { 15.0 })
            .collect();
        let (station, commercials, promos) = station_with_ads(&durations);
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);
        for seed in 0..16 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let block = budgeter.select(&[commercials.as_slice(), promos.as_slice()], &mut rng).await;
            assert!(!block.under_filled, "seed {seed}");
            assert!(block.total_seconds >= 180.0 && block.total_seconds <= 195.0, "seed {seed}");
        }
    }

    #[tokio::test]
    async fn oversized_clip_is_never_chosen() {
        let (station, commercials, promos) = station_with_ads(&[400.0, 60.0, 60.0, 60.0]);
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let block = budgeter.select(&[commercials.as_slice(), promos.as_slice()], &mut rng).await;
        assert_eq!(block.total_seconds, 180.0);
        assert!(block
            .clips
            .iter()
            .all(|clip| !clip.path().ends_with("spot00.mp4")));
    }

    #[tokio::test]
    async fn exhausted_pools_flag_under_fill() {
        let (station, commercials, promos) = station_with_ads(&[30.0, 20.0]);
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let block = budgeter.select(&[commercials.as_slice(), promos.as_slice()], &mut rng).await;
        assert_eq!(block.len(), 2);
        assert_eq!(block.total_seconds, 50.0);
        assert!(block.under_filled);
    }

    #[tokio::test]
    async fn unprobeable_clip_counts_as_zero() {
        let (station, _, _) = station_with_ads(&[]);
        std::fs::write(station.config.commercials_root().join("mystery.mp4"), b"x").unwrap();
        let commercials = Catalog::new(&station.config).commercials().unwrap();
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let block = budgeter.select(&[commercials.as_slice()], &mut rng).await;
        assert_eq!(block.len(), 1);
        assert_eq!(block.total_seconds, 0.0);
        assert!(block.under_filled);
    }

    #[tokio::test]
    async fn same_seed_same_block_and_pools_untouched() {
        let (station, commercials, promos) =
            station_with_ads(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 25.0, 35.0, 45.0]);
        let before = (commercials.clone(), promos.clone());
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);

        let first = budgeter
            .select(&[commercials.as_slice(), promos.as_slice()], &mut ChaCha20Rng::seed_from_u64(42))
            .await;
        let second = budgeter
            .select(&[commercials.as_slice(), promos.as_slice()], &mut ChaCha20Rng::seed_from_u64(42))
            .await;
        assert_eq!(first, second);
        assert_eq!((commercials, promos), before);
    }

    #[tokio::test]
    async fn empty_pools_yield_empty_block() {
        let (station, _, _) = station_with_ads(&[]);
        let budgeter = DurationBudgeter::new(station.tools(), 180.0, 15.0);
        let block = budgeter
            .select(&[], &mut ChaCha20Rng::seed_from_u64(0))
            .await;
        assert!(block.is_empty());
        assert!(block.under_filled);
    }
}
