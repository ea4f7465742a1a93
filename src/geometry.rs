use crate::config::VolumeConfig;
use crate::enums::{ElementType, PhotometricInterpretation};
use crate::error::VolumeError;
use crate::metadata::{SliceEntry, SliceMetadata};
use crate::slice_order::{SliceOrderer, SortedSliceIndex};

/// Minimum length of the scan-axis normal for the cosines to span a plane.
const MIN_NORMAL_LENGTH: f64 = 1e-6;

#[inline]
pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Shape and placement of an assembled volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    /// (columns, rows, slices)
    pub dimensions: [usize; 3],
    /// Components per voxel
    pub channels: usize,
    /// (column spacing, row spacing, inter-slice spacing)
    pub spacing: [f64; 3],
    /// Position of the first voxel of slot 0
    pub origin: [f64; 3],
    /// Row cosines, column cosines and scan-axis normal, concatenated
    pub direction: [f64; 9],
    pub element_type: ElementType,
}

impl VolumeGeometry {
    /// Derive the geometry and slot order of a slice stack.
    ///
    /// The first entry provides orientation, pixel spacing and pixel format.
    /// `identity_scaling` tells whether every slice stores its raw samples
    /// unchanged, which lets 16 bit data keep an integer element type.
    ///
    /// # Errors
    ///
    /// Format and bit depth errors are raised here, before any slice is
    /// fetched.
    pub fn describe(
        slices: &[SliceEntry],
        identity_scaling: bool,
        config: &VolumeConfig,
    ) -> Result<(Self, SortedSliceIndex), VolumeError> {
        let first = &slices.first().ok_or(VolumeError::NoSlices)?.metadata;

        let supported_format = match first.samples_per_pixel {
            1 => true,
            3 => first.photometric_interpretation == PhotometricInterpretation::Rgb,
            _ => false,
        };
        if !supported_format {
            return Err(VolumeError::UnsupportedFormat {
                photometric: first.photometric_interpretation.to_string(),
                samples_per_pixel: first.samples_per_pixel,
            });
        }
        let element_type =
            Self::element_type_for(first.bits_allocated, first.signed, identity_scaling)?;

        if slices
            .iter()
            .any(|entry| !Self::same_frame_layout(first, &entry.metadata))
        {
            return Err(VolumeError::InconsistentDimensions);
        }

        let normal = cross(first.row_cosines, first.column_cosines);
        if dot(normal, normal).sqrt() < MIN_NORMAL_LENGTH {
            return Err(VolumeError::DegenerateOrientation);
        }

        let ordering = SliceOrderer::new(normal, config.spacing_tolerance).order(slices)?;

        let mut direction = [0.0; 9];
        direction[..3].copy_from_slice(&first.row_cosines);
        direction[3..6].copy_from_slice(&first.column_cosines);
        direction[6..].copy_from_slice(&normal);

        let geometry = Self {
            dimensions: [first.columns, first.rows, slices.len()],
            channels: usize::from(first.samples_per_pixel),
            spacing: [first.column_spacing, first.row_spacing, ordering.spacing],
            origin: ordering.origin,
            direction,
            element_type,
        };
        Ok((geometry, ordering.index))
    }

    /// Element type chosen for a source bit depth and sign.
    pub fn element_type_for(
        bits_allocated: u16,
        signed: bool,
        identity_scaling: bool,
    ) -> Result<ElementType, VolumeError> {
        match (bits_allocated, signed) {
            (8, false) => Ok(ElementType::U8),
            (16, true) if identity_scaling => Ok(ElementType::I16),
            (16, false) if identity_scaling => Ok(ElementType::U16),
            (16, _) => Ok(ElementType::F32),
            (bits_allocated, signed) => Err(VolumeError::UnsupportedBitDepth {
                bits_allocated,
                signed,
            }),
        }
    }

    fn same_frame_layout(a: &SliceMetadata, b: &SliceMetadata) -> bool {
        a.rows == b.rows
            && a.columns == b.columns
            && a.samples_per_pixel == b.samples_per_pixel
            && a.bits_allocated == b.bits_allocated
            && a.signed == b.signed
    }

    pub fn columns(&self) -> usize {
        self.dimensions[0]
    }

    pub fn rows(&self) -> usize {
        self.dimensions[1]
    }

    pub fn depth(&self) -> usize {
        self.dimensions[2]
    }

    pub fn scan_axis_normal(&self) -> [f64; 3] {
        [self.direction[6], self.direction[7], self.direction[8]]
    }

    /// Number of scalar elements in the buffer.
    pub fn element_count(&self) -> usize {
        self.dimensions.iter().product::<usize>() * self.channels
    }
}
