use std::fmt;

use crate::enums::PhotometricInterpretation;

/// Opaque identity of one slice, e.g. a SOP Instance UID or an image URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SliceId(String);

impl SliceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SliceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SliceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-slice metadata supplied by the metadata collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMetadata {
    /// Position of the first transmitted pixel, in patient coordinates
    pub image_position: [f64; 3],
    pub row_cosines: [f64; 3],
    pub column_cosines: [f64; 3],
    /// Distance between adjacent rows
    pub row_spacing: f64,
    /// Distance between adjacent columns
    pub column_spacing: f64,
    pub rows: usize,
    pub columns: usize,
    pub bits_allocated: u16,
    pub samples_per_pixel: u16,
    pub signed: bool,
    pub photometric_interpretation: PhotometricInterpretation,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub slice_thickness: Option<f64>,
    pub modality: Option<String>,
    pub patient_weight: Option<f64>,
    pub corrected_dose: Option<f64>,
}

impl SliceMetadata {
    /// Axial, unit-spaced, unsigned 16 bit monochrome slice at the origin.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            image_position: [0.0; 3],
            row_cosines: [1.0, 0.0, 0.0],
            column_cosines: [0.0, 1.0, 0.0],
            row_spacing: 1.0,
            column_spacing: 1.0,
            rows,
            columns,
            bits_allocated: 16,
            samples_per_pixel: 1,
            signed: false,
            photometric_interpretation: PhotometricInterpretation::Monochrome2,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            slice_thickness: None,
            modality: None,
            patient_weight: None,
            corrected_dose: None,
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.image_position = position;
        self
    }

    pub fn with_orientation(mut self, row_cosines: [f64; 3], column_cosines: [f64; 3]) -> Self {
        self.row_cosines = row_cosines;
        self.column_cosines = column_cosines;
        self
    }

    pub fn with_pixel_spacing(mut self, row_spacing: f64, column_spacing: f64) -> Self {
        self.row_spacing = row_spacing;
        self.column_spacing = column_spacing;
        self
    }

    pub fn with_pixel_format(
        mut self,
        bits_allocated: u16,
        signed: bool,
        samples_per_pixel: u16,
        photometric_interpretation: PhotometricInterpretation,
    ) -> Self {
        self.bits_allocated = bits_allocated;
        self.signed = signed;
        self.samples_per_pixel = samples_per_pixel;
        self.photometric_interpretation = photometric_interpretation;
        self
    }

    pub fn with_rescale(mut self, slope: f64, intercept: f64) -> Self {
        self.rescale_slope = slope;
        self.rescale_intercept = intercept;
        self
    }

    pub fn with_modality(mut self, modality: impl Into<String>) -> Self {
        self.modality = Some(modality.into());
        self
    }

    pub fn with_dose_normalization(mut self, patient_weight: f64, corrected_dose: f64) -> Self {
        self.patient_weight = Some(patient_weight);
        self.corrected_dose = Some(corrected_dose);
        self
    }

    pub fn with_slice_thickness(mut self, thickness: f64) -> Self {
        self.slice_thickness = Some(thickness);
        self
    }
}

/// A slice identity together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceEntry {
    pub id: SliceId,
    pub metadata: SliceMetadata,
}

impl SliceEntry {
    pub fn new(id: impl Into<SliceId>, metadata: SliceMetadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }
}
