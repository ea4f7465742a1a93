use std::fmt;

/// Photometric interpretation of the source pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PhotometricInterpretation {
    Monochrome1,
    #[default]
    Monochrome2,
    Rgb,
    Other(String),
}

impl PhotometricInterpretation {
    pub fn parse(value: &str) -> Self {
        match value.trim().trim_end_matches('\0') {
            "MONOCHROME1" => Self::Monochrome1,
            "MONOCHROME2" => Self::Monochrome2,
            "RGB" => Self::Rgb,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PhotometricInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monochrome1 => f.write_str("MONOCHROME1"),
            Self::Monochrome2 => f.write_str("MONOCHROME2"),
            Self::Rgb => f.write_str("RGB"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// Element type of the assembled volume buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    U8,
    I16,
    U16,
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotStarted,
    Loading,
    Loaded,
    Failed,
}

/// Padding samples carried by each pixel of a padded RGB source.
pub const RGB_PADDING_SAMPLES: usize = 1;

/// How the samples of one pixel are laid out in a fetched slice.
///
/// Image loaders commonly hand out colour images as RGBA, so a 3-channel
/// pixel is followed by one padding sample. `RgbPadded` keeps that layout;
/// `Packed` is for sources that deliver exactly `channels` samples per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleStride {
    #[default]
    RgbPadded,
    Packed,
}

impl SampleStride {
    /// Number of source samples between the starts of two adjacent pixels.
    pub fn samples_per_pixel(self, channels: usize) -> usize {
        match self {
            SampleStride::RgbPadded if channels == 3 => channels + RGB_PADDING_SAMPLES,
            _ => channels,
        }
    }
}
