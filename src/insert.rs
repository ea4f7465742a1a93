//! Writing one fetched slice into its slot of the volume.
//!
//! The destination is an [`ArrayViewMut3`] over a single slot
//! (rows × columns × channels), so a caller that splits a buffer by slot can
//! insert any number of slices in parallel. Rows within a slice are written
//! in parallel as well.

use ndarray::{ArrayViewMut3, Axis};
use num_traits::AsPrimitive;
use rayon::prelude::*;

use crate::enums::SampleStride;
use crate::error::VolumeError;
use crate::range::RangeTracker;
use crate::scaling::ScalingFunction;

/// Element type of a volume buffer.
pub trait Voxel: Copy + Default + Send + Sync + AsPrimitive<f64> {
    /// Convert a scaled value; integer types round and saturate.
    fn from_scaled(value: f64) -> Self;
}

macro_rules! integer_voxel {
    ($($ty:ty),*) => {
        $(impl Voxel for $ty {
            #[inline]
            fn from_scaled(value: f64) -> Self {
                value.round() as $ty
            }
        })*
    };
}

integer_voxel!(u8, i16, u16);

impl Voxel for f32 {
    #[inline]
    fn from_scaled(value: f64) -> Self {
        value as f32
    }
}

/// Raw samples of one slice, as delivered by the fetch collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
}

impl PixelSamples {
    /// Interpret a native-endian byte buffer.
    pub fn from_native_bytes(
        bytes: &[u8],
        bits_allocated: u16,
        signed: bool,
    ) -> Result<Self, VolumeError> {
        match (bits_allocated, signed) {
            (8, false) => Ok(PixelSamples::U8(bytes.to_vec())),
            (16, _) if bytes.len() % 2 != 0 => Err(VolumeError::MalformedPixelData(format!(
                "{} bytes is not a whole number of 16 bit samples",
                bytes.len()
            ))),
            (16, false) => Ok(PixelSamples::U16(bytemuck::pod_collect_to_vec(bytes))),
            (16, true) => Ok(PixelSamples::I16(bytemuck::pod_collect_to_vec(bytes))),
            (bits_allocated, signed) => Err(VolumeError::UnsupportedBitDepth {
                bits_allocated,
                signed,
            }),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelSamples::U8(samples) => samples.len(),
            PixelSamples::U16(samples) => samples.len(),
            PixelSamples::I16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pixel data of one fetched slice.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSlice {
    pub rows: usize,
    pub columns: usize,
    pub samples: PixelSamples,
    pub stride: SampleStride,
}

impl RawSlice {
    pub fn new(rows: usize, columns: usize, samples: PixelSamples) -> Self {
        Self {
            rows,
            columns,
            samples,
            stride: SampleStride::default(),
        }
    }

    pub fn with_stride(mut self, stride: SampleStride) -> Self {
        self.stride = stride;
        self
    }
}

/// Write `raw` into the slot view `dest` and return the slice's range.
///
/// Source row `r` lands in destination row `rows - 1 - r`. Each pixel is read
/// with the stride declared by `raw.stride`; its `channels` components are
/// scaled and stored. The returned range holds the values as stored.
pub fn insert_slice<T: Voxel>(
    dest: ArrayViewMut3<'_, T>,
    raw: &RawSlice,
    scaling: &ScalingFunction,
) -> Result<RangeTracker, VolumeError> {
    let (rows, columns, channels) = dest.dim();
    let stride = raw.stride.samples_per_pixel(channels);
    let expected_samples = rows * columns * stride;
    if stride == 0
        || raw.rows != rows
        || raw.columns != columns
        || raw.samples.len() < expected_samples
    {
        return Err(VolumeError::SliceShapeMismatch {
            expected_rows: rows,
            expected_columns: columns,
            expected_samples,
            rows: raw.rows,
            columns: raw.columns,
            samples: raw.samples.len(),
        });
    }

    let range = match &raw.samples {
        PixelSamples::U8(samples) => write_flipped(dest, samples, stride, scaling),
        PixelSamples::U16(samples) => write_flipped(dest, samples, stride, scaling),
        PixelSamples::I16(samples) => write_flipped(dest, samples, stride, scaling),
    };
    Ok(range)
}

fn write_flipped<S, T>(
    mut dest: ArrayViewMut3<'_, T>,
    source: &[S],
    stride: usize,
    scaling: &ScalingFunction,
) -> RangeTracker
where
    S: AsPrimitive<f64> + Sync,
    T: Voxel,
{
    let (rows, columns, channels) = dest.dim();
    let source_row_len = columns * stride;

    dest.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(dest_row, mut row)| {
            let source_row = rows - 1 - dest_row;
            let source = &source[source_row * source_row_len..][..source_row_len];
            let mut range = RangeTracker::new(channels);
            for (pixel, mut tuple) in source.chunks_exact(stride).zip(row.axis_iter_mut(Axis(0))) {
                for (channel, (value, out)) in pixel.iter().zip(tuple.iter_mut()).enumerate() {
                    let stored = T::from_scaled(scaling.apply(value.as_()));
                    *out = stored;
                    range.include(channel, stored.as_());
                }
            }
            range
        })
        .reduce(
            || RangeTracker::new(channels),
            |mut merged, row| {
                merged.absorb(&row);
                merged
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ChannelRange;
    use crate::scaling::{Modality, ScalingContext};
    use ndarray::{Array3, Array4, array};

    #[test]
    fn rows_are_flipped_vertically() {
        let mut dest = Array3::<f32>::zeros((2, 2, 1));
        let raw = RawSlice::new(2, 2, PixelSamples::U16(vec![1, 2, 3, 4]));
        let range = insert_slice(dest.view_mut(), &raw, &ScalingFunction::identity()).unwrap();

        assert_eq!(dest.index_axis(Axis(2), 0), array![[3.0f32, 4.0], [1.0, 2.0]]);
        assert_eq!(range.channel(0).unwrap(), ChannelRange { min: 1.0, max: 4.0 });
    }

    #[test]
    fn applies_scaling_and_reports_stored_range() {
        let mut dest = Array3::<f32>::zeros((1, 3, 1));
        let raw = RawSlice::new(1, 3, PixelSamples::I16(vec![-10, 0, 10]));
        let scaling = ScalingContext::new(Modality::Default).function(2.0, -1.0);
        let range = insert_slice(dest.view_mut(), &raw, &scaling).unwrap();

        assert_eq!(dest.iter().copied().collect::<Vec<_>>(), [-21.0f32, -1.0, 19.0]);
        assert_eq!(range.channel(0).unwrap(), ChannelRange { min: -21.0, max: 19.0 });
    }

    #[test]
    fn integer_targets_round_and_saturate() {
        let mut dest = Array3::<u8>::zeros((1, 3, 1));
        let raw = RawSlice::new(1, 3, PixelSamples::U8(vec![1, 100, 200]));
        let scaling = ScalingContext::new(Modality::Default).function(1.5, 0.0);
        let range = insert_slice(dest.view_mut(), &raw, &scaling).unwrap();

        assert_eq!(dest.iter().copied().collect::<Vec<_>>(), [2, 150, 255]);
        assert_eq!(range.channel(0).unwrap(), ChannelRange { min: 2.0, max: 255.0 });
    }

    #[test]
    fn padded_rgb_skips_one_sample_per_pixel() {
        let mut dest = Array3::<u8>::zeros((1, 2, 3));
        let raw = RawSlice::new(
            1,
            2,
            PixelSamples::U8(vec![10, 20, 30, 255, 11, 21, 31, 255]),
        );
        let range = insert_slice(dest.view_mut(), &raw, &ScalingFunction::identity()).unwrap();

        assert_eq!(dest.iter().copied().collect::<Vec<_>>(), [10, 20, 30, 11, 21, 31]);
        assert_eq!(range.channel(2).unwrap(), ChannelRange { min: 30.0, max: 31.0 });
    }

    #[test]
    fn packed_rgb_reads_every_sample() {
        let mut dest = Array3::<u8>::zeros((1, 2, 3));
        let raw = RawSlice::new(1, 2, PixelSamples::U8(vec![10, 20, 30, 11, 21, 31]))
            .with_stride(SampleStride::Packed);
        insert_slice(dest.view_mut(), &raw, &ScalingFunction::identity()).unwrap();
        assert_eq!(dest.iter().copied().collect::<Vec<_>>(), [10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn rejects_wrong_shape() {
        let mut dest = Array3::<f32>::zeros((2, 2, 1));
        let short = RawSlice::new(2, 2, PixelSamples::U16(vec![1, 2, 3]));
        assert!(matches!(
            insert_slice(dest.view_mut(), &short, &ScalingFunction::identity()),
            Err(VolumeError::SliceShapeMismatch { expected_samples: 4, samples: 3, .. })
        ));

        let transposed = RawSlice::new(1, 4, PixelSamples::U16(vec![1, 2, 3, 4]));
        assert!(insert_slice(dest.view_mut(), &transposed, &ScalingFunction::identity()).is_err());

        let mut no_channels = Array3::<f32>::zeros((2, 2, 0));
        let raw = RawSlice::new(2, 2, PixelSamples::U16(vec![1, 2, 3, 4]));
        assert!(matches!(
            insert_slice(no_channels.view_mut(), &raw, &ScalingFunction::identity()),
            Err(VolumeError::SliceShapeMismatch { expected_samples: 0, .. })
        ));
    }

    #[test]
    fn slots_can_be_filled_in_parallel() {
        let (depth, rows, columns) = (6, 3, 4);
        let slice = |slot: usize| {
            let samples = (0..rows * columns).map(|i| (slot * 100 + i) as u16).collect();
            RawSlice::new(rows, columns, PixelSamples::U16(samples))
        };

        let mut parallel = Array4::<u16>::zeros((depth, rows, columns, 1));
        let ranges: Vec<_> = parallel
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(slot, view)| insert_slice(view, &slice(slot), &ScalingFunction::identity()))
            .collect::<Result<_, _>>()
            .unwrap();

        let mut sequential = Array4::<u16>::zeros((depth, rows, columns, 1));
        for slot in (0..depth).rev() {
            insert_slice(
                sequential.index_axis_mut(Axis(0), slot),
                &slice(slot),
                &ScalingFunction::identity(),
            )
            .unwrap();
        }

        assert_eq!(parallel, sequential);
        assert_eq!(ranges[5].channel(0).unwrap(), ChannelRange { min: 500.0, max: 511.0 });
    }

    #[test]
    fn decodes_native_bytes() {
        let bytes: Vec<u8> = [1u16, 513].iter().flat_map(|v| v.to_ne_bytes()).collect();
        assert_eq!(
            PixelSamples::from_native_bytes(&bytes, 16, false).unwrap(),
            PixelSamples::U16(vec![1, 513])
        );
        assert!(matches!(
            PixelSamples::from_native_bytes(&bytes[..3], 16, true),
            Err(VolumeError::MalformedPixelData(_))
        ));
        assert!(matches!(
            PixelSamples::from_native_bytes(&bytes, 8, true),
            Err(VolumeError::UnsupportedBitDepth { .. })
        ));
    }
}
