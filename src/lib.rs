//! # slice-volume
//!
//! This crate assembles a 3D volume from a stack of 2D cross-sectional
//! slices while the slices are still arriving.
//!
//! The geometry of the volume (dimensions, spacing, origin, direction and
//! slot order) is derived from per-slice metadata alone, so a
//! [`VolumeHandle`] with a zero-filled buffer is available before any pixel
//! data has been fetched. A [`ProgressiveLoader`] then fetches every slice
//! through a [`SliceFetcher`], concurrently and in any completion order,
//! and writes each one into its slot:
//!  - Rows are flipped vertically on insertion
//!  - Rescale slope/intercept and, for PET, body-weight normalization are
//!    applied to every sample
//!  - A per-channel value range is kept up to date as slices land
//!  - Subscribers are notified at most five times per load
//!
//! Slices are assumed to be single-frame images of one series. Only
//! MONOCHROME data and 3-channel RGB are accepted, with 8 bit unsigned or
//! 16 bit samples.
//!
//! # Examples
//!
//! ## Loading a DICOM series
//!
//! Open every .dcm file of the dicom/ directory, assemble the volume and
//! wait until all slices are in place.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use slice_volume::{DicomSeries, ProgressiveLoader, VolumeConfig, VolumeHandle};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let series = DicomSeries::open_directory("dicom")?;
//! let handle = VolumeHandle::build(series.slices(), &VolumeConfig::default())?;
//! let loader = ProgressiveLoader::new(Arc::new(series));
//! loader.load(&handle).await?;
//! println!("{:?}", handle.channel_range(0)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dicom_source;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod insert;
pub mod metadata;
pub mod range;
pub mod registry;
pub mod scaling;
pub mod slice_order;
pub mod volume;
pub mod volume_loader;

pub use config::{LoaderConfig, VolumeConfig};
pub use dicom_source::DicomSeries;
pub use enums::{ElementType, LoadState, PhotometricInterpretation, SampleStride};
pub use error::{FetchError, VolumeError};
pub use insert::{PixelSamples, RawSlice};
pub use metadata::{SliceEntry, SliceId, SliceMetadata};
pub use range::{ChannelRange, RangeTracker};
pub use registry::VolumeRegistry;
pub use volume::{VolumeBuffer, VolumeChanged, VolumeHandle};
pub use volume_loader::{LoadOutcome, ProgressiveLoader, SliceFetcher};
