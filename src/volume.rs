use std::collections::HashMap;

use ndarray::{Array4, Axis};
use num_traits::AsPrimitive;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::broadcast;

use crate::config::VolumeConfig;
use crate::enums::{ElementType, LoadState};
use crate::error::VolumeError;
use crate::geometry::VolumeGeometry;
use crate::insert::{RawSlice, Voxel, insert_slice};
use crate::metadata::{SliceEntry, SliceId};
use crate::range::{ChannelRange, RangeTracker};
use crate::scaling::{ScalingContext, ScalingFunction};
use crate::slice_order::SortedSliceIndex;

/// Voxel storage of a volume, shaped (slices, rows, columns, channels).
///
/// The layout is row-major, so the tuple of voxel `(row, column)` in slot
/// `slot` starts at element `((slot * rows + row) * columns + column) * channels`.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeBuffer {
    U8(Array4<u8>),
    I16(Array4<i16>),
    U16(Array4<u16>),
    F32(Array4<f32>),
}

macro_rules! each_array {
    ($buffer:expr, $array:ident => $body:expr) => {
        match $buffer {
            VolumeBuffer::U8($array) => $body,
            VolumeBuffer::I16($array) => $body,
            VolumeBuffer::U16($array) => $body,
            VolumeBuffer::F32($array) => $body,
        }
    };
}

impl VolumeBuffer {
    /// Zero-filled buffer of shape (slices, rows, columns, channels).
    pub fn zeros(element_type: ElementType, shape: (usize, usize, usize, usize)) -> Self {
        match element_type {
            ElementType::U8 => VolumeBuffer::U8(Array4::zeros(shape)),
            ElementType::I16 => VolumeBuffer::I16(Array4::zeros(shape)),
            ElementType::U16 => VolumeBuffer::U16(Array4::zeros(shape)),
            ElementType::F32 => VolumeBuffer::F32(Array4::zeros(shape)),
        }
    }

    pub fn for_geometry(geometry: &VolumeGeometry) -> Self {
        Self::zeros(
            geometry.element_type,
            (
                geometry.depth(),
                geometry.rows(),
                geometry.columns(),
                geometry.channels,
            ),
        )
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            VolumeBuffer::U8(_) => ElementType::U8,
            VolumeBuffer::I16(_) => ElementType::I16,
            VolumeBuffer::U16(_) => ElementType::U16,
            VolumeBuffer::F32(_) => ElementType::F32,
        }
    }

    /// (slices, rows, columns, channels)
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        each_array!(self, array => array.dim())
    }

    pub fn len(&self) -> usize {
        each_array!(self, array => array.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `[slot, row, column, channel]`.
    pub fn get(&self, index: [usize; 4]) -> Option<f64> {
        each_array!(self, array => array.get(index).map(|&value| value.as_()))
    }

    /// Value at a row-major element offset.
    pub fn value_at(&self, offset: usize) -> Option<f64> {
        each_array!(self, array => array
            .as_slice()
            .and_then(|values| values.get(offset))
            .map(|&value| value.as_()))
    }

    /// All values of one slot in row-major order.
    pub fn slot_values(&self, slot: usize) -> Option<Vec<f64>> {
        if slot >= self.dim().0 {
            return None;
        }
        each_array!(self, array => Some(
            array
                .index_axis(Axis(0), slot)
                .iter()
                .map(|&value| value.as_())
                .collect()
        ))
    }

    pub fn to_f64(&self) -> Array4<f64> {
        each_array!(self, array => array.mapv(|value| value.as_()))
    }

    /// Range computed from the stored values, channel by channel.
    pub fn computed_range(&self) -> RangeTracker {
        let channels = self.dim().3;
        let mut range = RangeTracker::new(channels);
        each_array!(self, array => {
            for tuple in array.lanes(Axis(3)) {
                for (channel, &value) in tuple.iter().enumerate() {
                    range.include(channel, value.as_());
                }
            }
        });
        range
    }

    /// Scale and write `raw` into `slot`, returning the slice's range.
    pub fn insert_slice(
        &mut self,
        slot: usize,
        raw: &RawSlice,
        scaling: &ScalingFunction,
    ) -> Result<RangeTracker, VolumeError> {
        let depth = self.dim().0;
        if slot >= depth {
            return Err(VolumeError::IndexOutOfRange {
                index: slot,
                len: depth,
            });
        }
        each_array!(self, array => insert_slice(array.index_axis_mut(Axis(0), slot), raw, scaling))
    }

    pub(crate) fn seed_first(&mut self, value: f64) {
        each_array!(self, array => {
            if let Some(first) = array.iter_mut().next() {
                *first = Voxel::from_scaled(value);
            }
        })
    }

    pub(crate) fn clear(&mut self) {
        each_array!(self, array => array.fill(Default::default()))
    }
}

/// "Volume changed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeChanged {
    pub processed: usize,
    pub total: usize,
    pub state: LoadState,
}

/// An assembled (or assembling) volume.
///
/// The handle is built synchronously from slice metadata; all format
/// validation happens here. Its buffer and range are then filled by a
/// [`ProgressiveLoader`](crate::volume_loader::ProgressiveLoader).
#[derive(Debug)]
pub struct VolumeHandle {
    geometry: VolumeGeometry,
    index: SortedSliceIndex,
    scaling: ScalingContext,
    slice_scaling: HashMap<SliceId, ScalingFunction>,
    buffer: RwLock<VolumeBuffer>,
    range: RwLock<RangeTracker>,
    state: Mutex<LoadState>,
    events: broadcast::Sender<VolumeChanged>,
}

impl VolumeHandle {
    /// Build an empty volume for `slices`.
    ///
    /// Modality and scaling parameters come from the first entry.
    ///
    /// # Errors
    ///
    /// Returns error for unsupported pixel formats and bit depths, missing
    /// modality scaling parameters, and stacks that cannot be ordered.
    pub fn build(slices: &[SliceEntry], config: &VolumeConfig) -> Result<Self, VolumeError> {
        let first = &slices.first().ok_or(VolumeError::NoSlices)?.metadata;
        let scaling = ScalingContext::from_metadata(first)?;
        let slice_scaling: HashMap<_, _> = slices
            .iter()
            .map(|entry| (entry.id.clone(), scaling.function_for(&entry.metadata)))
            .collect();
        let identity_scaling = slice_scaling.values().all(ScalingFunction::is_identity);

        let (geometry, index) = VolumeGeometry::describe(slices, identity_scaling, config)?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            buffer: RwLock::new(VolumeBuffer::for_geometry(&geometry)),
            range: RwLock::new(RangeTracker::new(geometry.channels)),
            state: Mutex::new(LoadState::NotStarted),
            geometry,
            index,
            scaling,
            slice_scaling,
            events,
        })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// (columns, rows, slices)
    pub fn dimensions(&self) -> [usize; 3] {
        self.geometry.dimensions
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.geometry.spacing
    }

    pub fn origin(&self) -> [f64; 3] {
        self.geometry.origin
    }

    pub fn direction(&self) -> [f64; 9] {
        self.geometry.direction
    }

    pub fn channels(&self) -> usize {
        self.geometry.channels
    }

    pub fn slice_count(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &SortedSliceIndex {
        &self.index
    }

    pub fn scaling(&self) -> &ScalingContext {
        &self.scaling
    }

    /// Read access to the voxel data; partially filled while loading.
    pub fn buffer(&self) -> RwLockReadGuard<'_, VolumeBuffer> {
        self.buffer.read()
    }

    /// Merged range of every slice inserted so far.
    pub fn range(&self) -> RangeTracker {
        self.range.read().clone()
    }

    pub fn channel_range(&self, channel: usize) -> Result<ChannelRange, VolumeError> {
        self.range.read().channel(channel)
    }

    pub fn load_state(&self) -> LoadState {
        *self.state.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VolumeChanged> {
        self.events.subscribe()
    }

    /// Return a failed handle to `NotStarted` so a load can be retried.
    ///
    /// The buffer is zeroed and the range emptied. Returns `false` when the
    /// handle was not in the `Failed` state.
    pub fn clear_failure(&self) -> bool {
        let mut state = self.state.lock();
        if *state != LoadState::Failed {
            return false;
        }
        self.reset_contents();
        *state = LoadState::NotStarted;
        true
    }

    pub(crate) fn begin_loading(&self) -> Result<(), LoadState> {
        let mut state = self.state.lock();
        match *state {
            LoadState::NotStarted => {
                *state = LoadState::Loading;
                Ok(())
            }
            other => Err(other),
        }
    }

    pub(crate) fn set_state(&self, next: LoadState) {
        *self.state.lock() = next;
    }

    pub(crate) fn reset_contents(&self) {
        self.buffer.write().clear();
        *self.range.write() = RangeTracker::new(self.geometry.channels);
    }

    pub(crate) fn seed_sentinel(&self, value: f64) {
        self.buffer.write().seed_first(value);
    }

    /// Insert one fetched slice into the slot its identity maps to.
    pub(crate) fn insert(
        &self,
        slice: &SliceId,
        raw: &RawSlice,
    ) -> Result<RangeTracker, VolumeError> {
        let slot = self
            .index
            .slot(slice)
            .ok_or_else(|| VolumeError::UnknownSlice(slice.clone()))?;
        let scaling = self
            .slice_scaling
            .get(slice)
            .ok_or_else(|| VolumeError::UnknownSlice(slice.clone()))?;
        self.buffer
            .write()
            .insert_slice(slot, raw, scaling)
            .map_err(|source| VolumeError::SliceInsertFailure {
                slice: slice.clone(),
                source: Box::new(source),
            })
    }

    /// Merge a slice's range into the volume range and return the result.
    pub(crate) fn publish_range(
        &self,
        local: &RangeTracker,
    ) -> Result<RangeTracker, VolumeError> {
        let mut range = self.range.write();
        range.merge_from(local)?;
        Ok(range.clone())
    }

    pub(crate) fn notify(&self, event: VolumeChanged) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
