//! DICOM files as a slice source.
//!
//! [`DicomSeries`] reads the per-slice metadata of a series up front and
//! decodes pixel data lazily, one slice per [`SliceFetcher::fetch`] call.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use thiserror::Error;
use tracing::{debug, warn};

use crate::enums::{PhotometricInterpretation, SampleStride};
use crate::error::FetchError;
use crate::insert::{PixelSamples, RawSlice};
use crate::metadata::{SliceEntry, SliceId, SliceMetadata};
use crate::scaling::decay_corrected_dose;
use crate::volume_loader::SliceFetcher;

type DicomObject = FileDicomObject<InMemDicomObject>;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum DicomSourceError {
    #[error("No valid DICOM images found")]
    NoValidImages,
    #[error("Missing or unreadable attribute {0}")]
    MissingAttribute(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// A series of single-frame DICOM images.
#[derive(Debug)]
pub struct DicomSeries {
    entries: Vec<SliceEntry>,
    objects: HashMap<SliceId, (Arc<DicomObject>, SliceMetadata)>,
    series_uid: Option<String>,
}

impl DicomSeries {
    /// Open every `.dcm` file of a directory.
    pub fn open_directory(path: impl AsRef<Path>) -> Result<Self, DicomSourceError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(DicomSourceError::NoValidImages);
        }

        Self::open_files(&paths)
    }

    pub fn open_files(paths: &[impl AsRef<Path>]) -> Result<Self, DicomSourceError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::from_objects(objects?)
    }

    /// Build a series from already parsed objects.
    ///
    /// Objects without usable image metadata are skipped. Slices are keyed
    /// by SOP Instance UID, or by their position in `objects` when absent.
    pub fn from_objects(
        objects: impl IntoIterator<Item = DicomObject>,
    ) -> Result<Self, DicomSourceError> {
        let mut entries = Vec::new();
        let mut by_id = HashMap::new();
        let mut series_uid = None;

        for (position, object) in objects.into_iter().enumerate() {
            let metadata = match slice_metadata(&object) {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!(position, %error, "skipping DICOM object");
                    continue;
                }
            };
            let id = SliceId::new(
                text(&object, tags::SOP_INSTANCE_UID).unwrap_or_else(|| position.to_string()),
            );
            if series_uid.is_none() {
                series_uid = text(&object, tags::SERIES_INSTANCE_UID);
            }
            entries.push(SliceEntry::new(id.clone(), metadata.clone()));
            by_id.insert(id, (Arc::new(object), metadata));
        }

        if entries.is_empty() {
            return Err(DicomSourceError::NoValidImages);
        }
        debug!(slices = entries.len(), "DICOM series opened");

        Ok(Self {
            entries,
            objects: by_id,
            series_uid,
        })
    }

    pub fn slices(&self) -> &[SliceEntry] {
        &self.entries
    }

    /// Series Instance UID of the first readable object.
    pub fn series_uid(&self) -> Option<&str> {
        self.series_uid.as_deref()
    }
}

#[async_trait]
impl SliceFetcher for DicomSeries {
    async fn fetch(&self, slice: &SliceId) -> Result<RawSlice, FetchError> {
        let (object, metadata) = self
            .objects
            .get(slice)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(slice.clone()))?;

        tokio::task::spawn_blocking(move || decode_slice(&object, &metadata))
            .await
            .map_err(|error| FetchError::Other(error.to_string()))?
    }
}

fn decode_slice(object: &DicomObject, metadata: &SliceMetadata) -> Result<RawSlice, FetchError> {
    if metadata.samples_per_pixel > 1
        && object
            .element(tags::PLANAR_CONFIGURATION)
            .ok()
            .and_then(|element| element.to_int::<u16>().ok())
            == Some(1)
    {
        return Err(FetchError::Decode(
            "planar colour data is not supported".to_string(),
        ));
    }

    let decoded = object
        .decode_pixel_data()
        .map_err(|error| FetchError::Decode(error.to_string()))?;

    let frame_len = metadata.rows
        * metadata.columns
        * usize::from(metadata.samples_per_pixel)
        * usize::from(metadata.bits_allocated / 8);
    let bytes = decoded.data().get(..frame_len).ok_or_else(|| {
        FetchError::Decode(format!(
            "expected {frame_len} bytes of pixel data, found {}",
            decoded.data().len()
        ))
    })?;

    let samples = PixelSamples::from_native_bytes(bytes, metadata.bits_allocated, metadata.signed)
        .map_err(|error| FetchError::Decode(error.to_string()))?;

    Ok(RawSlice::new(metadata.rows, metadata.columns, samples).with_stride(SampleStride::Packed))
}

/// Read the attributes volume assembly needs from one image.
pub fn slice_metadata(object: &InMemDicomObject) -> Result<SliceMetadata, DicomSourceError> {
    let rows = required(uint16(object, tags::ROWS), "Rows")?;
    let columns = required(uint16(object, tags::COLUMNS), "Columns")?;
    let position = required(triple(object, tags::IMAGE_POSITION_PATIENT), "ImagePositionPatient")?;
    let orientation = floats(object, tags::IMAGE_ORIENTATION_PATIENT)
        .filter(|values| values.len() >= 6)
        .ok_or(DicomSourceError::MissingAttribute("ImageOrientationPatient"))?;
    let spacing = floats(object, tags::PIXEL_SPACING)
        .filter(|values| values.len() >= 2)
        .ok_or(DicomSourceError::MissingAttribute("PixelSpacing"))?;

    let photometric = text(object, tags::PHOTOMETRIC_INTERPRETATION)
        .map(|value| PhotometricInterpretation::parse(&value))
        .unwrap_or_default();

    let metadata = SliceMetadata::new(usize::from(rows), usize::from(columns))
        .with_position(position)
        .with_orientation(
            [orientation[0], orientation[1], orientation[2]],
            [orientation[3], orientation[4], orientation[5]],
        )
        .with_pixel_spacing(spacing[0], spacing[1])
        .with_pixel_format(
            uint16(object, tags::BITS_ALLOCATED).unwrap_or(16),
            uint16(object, tags::PIXEL_REPRESENTATION) == Some(1),
            uint16(object, tags::SAMPLES_PER_PIXEL).unwrap_or(1),
            photometric,
        )
        .with_rescale(
            float(object, tags::RESCALE_SLOPE).unwrap_or(1.0),
            float(object, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
        );

    let mut metadata = match text(object, tags::MODALITY) {
        Some(modality) => metadata.with_modality(modality),
        None => metadata,
    };
    metadata.slice_thickness = float(object, tags::SLICE_THICKNESS);
    metadata.patient_weight = float(object, tags::PATIENT_WEIGHT);
    metadata.corrected_dose = corrected_dose(object);
    Ok(metadata)
}

/// Injected dose decayed to the series acquisition time.
fn corrected_dose(object: &InMemDicomObject) -> Option<f64> {
    let info = object
        .element(tags::RADIOPHARMACEUTICAL_INFORMATION_SEQUENCE)
        .ok()?
        .items()?
        .first()?;

    let total = float(info, tags::RADIONUCLIDE_TOTAL_DOSE)?;
    let half_life = float(info, tags::RADIONUCLIDE_HALF_LIFE)?;
    let start = seconds_of_day(info, tags::RADIOPHARMACEUTICAL_START_TIME)?;
    let acquired = seconds_of_day(object, tags::SERIES_TIME)?;

    let mut elapsed = acquired - start;
    // injection the day before
    if elapsed < 0.0 {
        elapsed += SECONDS_PER_DAY;
    }
    Some(decay_corrected_dose(total, half_life, elapsed))
}

/// A TM attribute as seconds since midnight.
fn seconds_of_day(object: &InMemDicomObject, tag: Tag) -> Option<f64> {
    let time = object.element(tag).ok()?.to_time().ok()?;
    let minutes = time.minute().map_or(0.0, |&m| f64::from(m));
    let seconds = time.second().map_or(0.0, |&s| f64::from(s));
    let micros = time.fraction_micro().map_or(0.0, f64::from);
    Some(f64::from(*time.hour()) * 3600.0 + minutes * 60.0 + seconds + micros / 1e6)
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, DicomSourceError> {
    value.ok_or(DicomSourceError::MissingAttribute(name))
}

fn uint16(object: &InMemDicomObject, tag: Tag) -> Option<u16> {
    object.element(tag).ok()?.to_int::<u16>().ok()
}

fn float(object: &InMemDicomObject, tag: Tag) -> Option<f64> {
    object.element(tag).ok()?.to_float64().ok()
}

fn floats(object: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    object.element(tag).ok()?.to_multi_float64().ok()
}

fn triple(object: &InMemDicomObject, tag: Tag) -> Option<[f64; 3]> {
    match floats(object, tag)?.as_slice() {
        [x, y, z, ..] => Some([*x, *y, *z]),
        _ => None,
    }
}

fn text(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = object.element(tag).ok()?.to_str().ok()?;
    let value = value.trim().trim_end_matches('\0');
    (!value.is_empty()).then(|| value.to_string())
}
