//! Modality-dependent pixel scaling.
//!
//! The modality of a series is resolved once into a [`ScalingContext`] when
//! the volume is built. Every slice then gets a [`ScalingFunction`], a
//! precomputed affine transform of its raw samples; no modality dispatch
//! happens per pixel.

use crate::error::VolumeError;
use crate::metadata::SliceMetadata;

/// Modality tag of weight normalized (standardized uptake value) series.
pub const WEIGHT_NORMALIZED_MODALITY: &str = "PT";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modality {
    /// `raw * slope + intercept`
    Default,
    /// `1000 * (raw * slope + intercept) * weight / dose`
    WeightNormalized { weight: f64, dose: f64 },
}

impl Modality {
    /// Resolve the modality from a series' tag and its normalization parameters.
    ///
    /// # Errors
    ///
    /// A weight normalized modality fails with
    /// [`VolumeError::MissingScalingParameter`] when weight or dose is absent
    /// and with [`VolumeError::InvalidScalingParameter`] when either is not a
    /// finite positive number.
    pub fn resolve(
        tag: Option<&str>,
        weight: Option<f64>,
        dose: Option<f64>,
    ) -> Result<Self, VolumeError> {
        match tag.map(str::trim) {
            Some(WEIGHT_NORMALIZED_MODALITY) => {
                let weight = weight.ok_or(VolumeError::MissingScalingParameter("patient weight"))?;
                let dose = dose.ok_or(VolumeError::MissingScalingParameter("corrected dose"))?;
                for (name, value) in [("patient weight", weight), ("corrected dose", dose)] {
                    if !value.is_finite() || value <= 0.0 {
                        return Err(VolumeError::InvalidScalingParameter { name, value });
                    }
                }
                Ok(Modality::WeightNormalized { weight, dose })
            }
            _ => Ok(Modality::Default),
        }
    }

    fn factor(self) -> f64 {
        match self {
            Modality::Default => 1.0,
            Modality::WeightNormalized { weight, dose } => 1000.0 * weight / dose,
        }
    }
}

/// Scaling parameters shared by every slice of one volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingContext {
    modality: Modality,
    factor: f64,
}

impl ScalingContext {
    pub fn new(modality: Modality) -> Self {
        Self {
            modality,
            factor: modality.factor(),
        }
    }

    /// Resolve from the metadata of the first slice of a series.
    pub fn from_metadata(metadata: &SliceMetadata) -> Result<Self, VolumeError> {
        Modality::resolve(
            metadata.modality.as_deref(),
            metadata.patient_weight,
            metadata.corrected_dose,
        )
        .map(Self::new)
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn function(&self, slope: f64, intercept: f64) -> ScalingFunction {
        ScalingFunction {
            slope,
            intercept,
            factor: self.factor,
        }
    }

    pub fn function_for(&self, metadata: &SliceMetadata) -> ScalingFunction {
        self.function(metadata.rescale_slope, metadata.rescale_intercept)
    }
}

/// Pure raw-sample → stored-value transform of one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingFunction {
    slope: f64,
    intercept: f64,
    factor: f64,
}

impl ScalingFunction {
    pub fn identity() -> Self {
        ScalingContext::new(Modality::Default).function(1.0, 0.0)
    }

    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        (raw * self.slope + self.intercept) * self.factor
    }

    pub fn is_identity(&self) -> bool {
        self.slope == 1.0 && self.intercept == 0.0 && self.factor == 1.0
    }
}

/// Dose remaining after `elapsed` seconds of decay with the given half life.
pub fn decay_corrected_dose(total_dose: f64, half_life: f64, elapsed: f64) -> f64 {
    total_dose * (-elapsed * std::f64::consts::LN_2 / half_life).exp()
}
