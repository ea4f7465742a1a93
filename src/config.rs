//! Tunables for volume construction and progressive loading.
//!
//! Both option sets follow the builder style of
//! [`ConvertOptions`](https://docs.rs/dicom-pixeldata): start from
//! `Default` and override single fields with `with_*`.
//!
//! ```
//! # use slice_volume::config::{LoaderConfig, VolumeConfig};
//! let volume = VolumeConfig::default().with_spacing_tolerance(0.01);
//! let loader = LoaderConfig::default().with_max_concurrent_fetches(4);
//! assert_eq!(loader.progress_steps, 5);
//! # let _ = volume;
//! ```

/// Relative tolerance for deviations from the first inter-slice spacing.
pub const DEFAULT_SPACING_TOLERANCE: f64 = 1e-2;

/// Capacity of the "volume changed" broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Progress notifications are emitted at each 1/5 of the slice count.
pub const DEFAULT_PROGRESS_STEPS: usize = 5;

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// Value written to the first voxel before any slice lands.
pub const DEFAULT_RANGE_SENTINEL: f64 = 1.0;

/// Options applied when a [`VolumeHandle`](crate::volume::VolumeHandle) is built.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeConfig {
    pub spacing_tolerance: f64,
    pub event_capacity: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            spacing_tolerance: DEFAULT_SPACING_TOLERANCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl VolumeConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_spacing_tolerance(mut self, tolerance: f64) -> Self {
        self.spacing_tolerance = tolerance;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Options applied by the [`ProgressiveLoader`](crate::volume_loader::ProgressiveLoader).
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Number of intermediate "volume changed" notifications; 0 disables them
    pub progress_steps: usize,
    pub max_concurrent_fetches: usize,
    pub range_sentinel: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            progress_steps: DEFAULT_PROGRESS_STEPS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            range_sentinel: DEFAULT_RANGE_SENTINEL,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_progress_steps(mut self, steps: usize) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    pub fn with_range_sentinel(mut self, sentinel: f64) -> Self {
        self.range_sentinel = sentinel;
        self
    }
}
