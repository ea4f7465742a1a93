use thiserror::Error;

use crate::metadata::SliceId;

/// Errors reported by the slice fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Slice not found: {0}")]
    NotFound(SliceId),

    #[error("Could not decode pixel data: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("No slices to assemble")]
    NoSlices,

    /// Multi-component pixels that are not RGB
    #[error("Multi component image {photometric} with {samples_per_pixel} samples per pixel is not supported")]
    UnsupportedFormat {
        photometric: String,
        samples_per_pixel: u16,
    },

    #[error("{bits_allocated} bit {} images are not supported", signedness(.signed))]
    UnsupportedBitDepth { bits_allocated: u16, signed: bool },

    #[error("Missing scaling parameter: {0}")]
    MissingScalingParameter(&'static str),

    #[error("Invalid scaling parameter {name}: {value}")]
    InvalidScalingParameter { name: &'static str, value: f64 },

    #[error("Source and target range have different size: {expected} != {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Range index {index} out of bounds for {len} channels")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Row and column cosines do not span a plane")]
    DegenerateOrientation,

    #[error("Slice {0} appears more than once")]
    DuplicateSlice(SliceId),

    #[error("Slices {first} and {second} share the same position along the scan axis")]
    CoincidentSlices { first: SliceId, second: SliceId },

    #[error("Non-uniform slice spacing at slot {slot}: expected {expected}, found {found}")]
    NonUniformSpacing {
        slot: usize,
        expected: f64,
        found: f64,
    },

    #[error("Slice {0} is not part of this volume")]
    UnknownSlice(SliceId),

    #[error("Slice shape mismatch: expected {expected_rows}x{expected_columns} with {expected_samples} samples, got {rows}x{columns} with {samples} samples")]
    SliceShapeMismatch {
        expected_rows: usize,
        expected_columns: usize,
        expected_samples: usize,
        rows: usize,
        columns: usize,
        samples: usize,
    },

    #[error("Malformed pixel data: {0}")]
    MalformedPixelData(String),

    #[error("Could not fetch slice {slice}: {source}")]
    SliceFetchFailure {
        slice: SliceId,
        #[source]
        source: FetchError,
    },

    #[error("Could not insert slice {slice}: {source}")]
    SliceInsertFailure {
        slice: SliceId,
        #[source]
        source: Box<VolumeError>,
    },
}

fn signedness(signed: &bool) -> &'static str {
    if *signed { "signed" } else { "unsigned" }
}
