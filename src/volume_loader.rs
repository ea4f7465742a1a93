//! Progressive, out-of-order assembly of a volume.
//!
//! Every slice is an independent unit: fetch its pixels, look up its slot,
//! insert it. Fetches run concurrently and finish in any order; the load
//! future itself is the only owner of the processed counter and the
//! volume-level range, which it updates as units complete.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use web_time::Instant;

use crate::config::LoaderConfig;
use crate::enums::LoadState;
use crate::error::{FetchError, VolumeError};
use crate::insert::RawSlice;
use crate::metadata::SliceId;
use crate::volume::{VolumeChanged, VolumeHandle};

/// Asynchronous source of raw slice pixels.
#[async_trait]
pub trait SliceFetcher: Send + Sync {
    async fn fetch(&self, slice: &SliceId) -> Result<RawSlice, FetchError>;
}

/// Result of a call to [`ProgressiveLoader::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { slices: usize },
    /// Another load of the same handle is in flight; nothing was done
    AlreadyLoading,
    /// The handle was loaded before; nothing was done
    AlreadyLoaded,
    /// The handle failed earlier; call `clear_failure` to retry
    PreviouslyFailed,
}

/// Decides when a coalesced progress notification is due.
///
/// With `steps` fractions of `total`, a notification fires the first time
/// the processed count exceeds each successive fraction.
#[derive(Debug, Clone)]
pub(crate) struct ProgressThrottle {
    step: f64,
    target: f64,
}

impl ProgressThrottle {
    pub(crate) fn new(total: usize, steps: usize) -> Self {
        let step = if steps == 0 {
            f64::INFINITY
        } else {
            total as f64 / steps as f64
        };
        Self { step, target: step }
    }

    pub(crate) fn advance(&mut self, processed: usize) -> bool {
        if processed as f64 > self.target {
            self.target += self.step;
            true
        } else {
            false
        }
    }
}

/// Restores a handle that stopped loading without finishing.
///
/// If the load future is dropped mid-flight the handle returns to
/// `NotStarted` with a cleared buffer, so a later load starts from scratch.
struct LoadingGuard<'a> {
    handle: &'a VolumeHandle,
    settled: bool,
}

impl<'a> LoadingGuard<'a> {
    fn begin(handle: &'a VolumeHandle) -> Result<Self, LoadState> {
        handle.begin_loading()?;
        Ok(Self {
            handle,
            settled: false,
        })
    }

    fn settle(mut self, state: LoadState) {
        self.handle.set_state(state);
        self.settled = true;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("volume load abandoned, resetting handle");
            self.handle.reset_contents();
            self.handle.set_state(LoadState::NotStarted);
        }
    }
}

/// Fills a [`VolumeHandle`] slice by slice from a [`SliceFetcher`].
pub struct ProgressiveLoader<F: ?Sized> {
    fetcher: Arc<F>,
    config: LoaderConfig,
}

impl<F: ?Sized> Clone for ProgressiveLoader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            config: self.config.clone(),
        }
    }
}

impl<F> ProgressiveLoader<F>
where
    F: SliceFetcher + ?Sized + 'static,
{
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_config(fetcher, LoaderConfig::default())
    }

    pub fn with_config(fetcher: Arc<F>, config: LoaderConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load every slice of `handle`.
    ///
    /// Idempotent: a handle that is loading, loaded or failed is left
    /// untouched and the returned [`LoadOutcome`] says why.
    ///
    /// # Errors
    ///
    /// The first fetch or insert failure aborts the load, leaves the handle
    /// `Failed` and is returned. Fetches still in flight are dropped.
    pub async fn load(&self, handle: &VolumeHandle) -> Result<LoadOutcome, VolumeError> {
        let guard = match LoadingGuard::begin(handle) {
            Ok(guard) => guard,
            Err(state) => {
                debug!(?state, "volume load skipped");
                return Ok(match state {
                    LoadState::Loaded => LoadOutcome::AlreadyLoaded,
                    LoadState::Failed => LoadOutcome::PreviouslyFailed,
                    LoadState::NotStarted | LoadState::Loading => LoadOutcome::AlreadyLoading,
                });
            }
        };

        let started = Instant::now();
        let total = handle.slice_count();
        info!(slices = total, "volume load started");

        match self.assemble(handle).await {
            Ok(()) => {
                guard.settle(LoadState::Loaded);
                handle.notify(VolumeChanged {
                    processed: total,
                    total,
                    state: LoadState::Loaded,
                });
                info!(
                    slices = total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "volume loaded"
                );
                Ok(LoadOutcome::Loaded { slices: total })
            }
            Err(error) => {
                warn!(%error, "volume load failed");
                guard.settle(LoadState::Failed);
                Err(error)
            }
        }
    }

    /// Spawn [`load`](Self::load) on the current tokio runtime.
    ///
    /// Aborting the returned task abandons the load and resets the handle.
    pub fn start(
        &self,
        handle: Arc<VolumeHandle>,
    ) -> JoinHandle<Result<LoadOutcome, VolumeError>> {
        let loader = self.clone();
        tokio::spawn(async move { loader.load(&handle).await })
    }

    async fn assemble(&self, handle: &VolumeHandle) -> Result<(), VolumeError> {
        let total = handle.slice_count();
        handle.seed_sentinel(self.config.range_sentinel);

        let mut throttle = ProgressThrottle::new(total, self.config.progress_steps);
        let mut processed = 0;

        let mut units = stream::iter(handle.index().ids().iter().cloned())
            .map(|slice| {
                let fetcher = Arc::clone(&self.fetcher);
                async move {
                    let raw = fetcher
                        .fetch(&slice)
                        .await
                        .map_err(|source| VolumeError::SliceFetchFailure {
                            slice: slice.clone(),
                            source,
                        })?;
                    let range = handle.insert(&slice, &raw)?;
                    debug!(%slice, "slice inserted");
                    Ok::<_, VolumeError>(range)
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1));

        while let Some(unit) = units.next().await {
            let range = handle.publish_range(&unit?)?;
            processed += 1;

            if throttle.advance(processed) {
                debug!(processed, total, ranges = ?range.channels(), "volume changed");
                handle.notify(VolumeChanged {
                    processed,
                    total,
                    state: LoadState::Loading,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::insert::PixelSamples;
    use crate::metadata::{SliceEntry, SliceMetadata};

    struct ConstantFetcher;

    #[async_trait]
    impl SliceFetcher for ConstantFetcher {
        async fn fetch(&self, slice: &SliceId) -> Result<RawSlice, FetchError> {
            let value: u16 = slice
                .as_str()
                .parse()
                .map_err(|_| FetchError::NotFound(slice.clone()))?;
            Ok(RawSlice::new(1, 2, PixelSamples::U16(vec![value, value + 1])))
        }
    }

    fn handle(count: usize) -> VolumeHandle {
        let slices: Vec<_> = (0..count)
            .map(|i| {
                SliceEntry::new(
                    i.to_string(),
                    SliceMetadata::new(1, 2).with_position([0.0, 0.0, i as f64]),
                )
            })
            .collect();
        VolumeHandle::build(&slices, &VolumeConfig::default()).unwrap()
    }

    #[test]
    fn throttle_fires_at_each_fifth() {
        let mut throttle = ProgressThrottle::new(20, 5);
        let fired: Vec<_> = (1..=20).filter(|&n| throttle.advance(n)).collect();
        assert_eq!(fired, [5, 9, 13, 17]);
    }

    #[test]
    fn throttle_with_few_slices() {
        let mut throttle = ProgressThrottle::new(3, 5);
        let fired: Vec<_> = (1..=3).filter(|&n| throttle.advance(n)).collect();
        assert_eq!(fired, [1, 2, 3]);

        let mut disabled = ProgressThrottle::new(10, 0);
        assert!((1..=10).all(|n| !disabled.advance(n)));
    }

    #[tokio::test]
    async fn loads_every_slice() {
        let handle = handle(4);
        let loader = ProgressiveLoader::new(Arc::new(ConstantFetcher));

        let outcome = loader.load(&handle).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { slices: 4 });
        assert_eq!(handle.load_state(), LoadState::Loaded);
        assert_eq!(handle.buffer().slot_values(3).unwrap(), [3.0, 4.0]);
        let range = handle.channel_range(0).unwrap();
        assert_eq!((range.min, range.max), (0.0, 4.0));
    }

    #[tokio::test]
    async fn second_load_is_a_no_op() {
        let handle = handle(2);
        let loader = ProgressiveLoader::new(Arc::new(ConstantFetcher));
        loader.load(&handle).await.unwrap();
        let buffer = handle.buffer().clone();
        let range = handle.range();

        assert_eq!(loader.load(&handle).await.unwrap(), LoadOutcome::AlreadyLoaded);
        assert_eq!(*handle.buffer(), buffer);
        assert_eq!(handle.range(), range);
    }

    #[tokio::test]
    async fn spawned_load_completes() {
        let handle = Arc::new(handle(3));
        let loader = ProgressiveLoader::new(Arc::new(ConstantFetcher));
        let outcome = loader.start(Arc::clone(&handle)).await.unwrap().unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { slices: 3 });
        assert_eq!(handle.load_state(), LoadState::Loaded);
    }
}
