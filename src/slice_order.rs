use std::collections::HashMap;

use crate::error::VolumeError;
use crate::geometry::dot;
use crate::metadata::{SliceEntry, SliceId};

/// Mapping from slice identity to its slot along the scan axis.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSliceIndex {
    order: Vec<SliceId>,
    projections: Vec<f64>,
    slots: HashMap<SliceId, usize>,
}

impl SortedSliceIndex {
    pub fn slot(&self, id: &SliceId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Slice identities in slot order.
    pub fn ids(&self) -> &[SliceId] {
        &self.order
    }

    /// Position of each slot projected onto the scan-axis normal.
    pub fn projections(&self) -> &[f64] {
        &self.projections
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceOrdering {
    pub index: SortedSliceIndex,
    /// Distance between consecutive slots
    pub spacing: f64,
    /// Position of the slice in slot 0
    pub origin: [f64; 3],
}

/// Sorts slices along the scan-axis normal.
pub struct SliceOrderer {
    normal: [f64; 3],
    tolerance: f64,
}

impl SliceOrderer {
    pub fn new(normal: [f64; 3], tolerance: f64) -> Self {
        Self { normal, tolerance }
    }

    /// Sort `slices` by ascending projection and derive spacing and origin.
    ///
    /// # Errors
    ///
    /// Fails when a slice identity repeats, when two slices project onto the
    /// same position, or when a gap between neighbours deviates from the
    /// first gap by more than the relative tolerance.
    pub fn order(&self, slices: &[SliceEntry]) -> Result<SliceOrdering, VolumeError> {
        let mut projected: Vec<_> = slices
            .iter()
            .map(|entry| (dot(self.normal, entry.metadata.image_position), entry))
            .collect();
        projected.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (_, first) = projected.first().ok_or(VolumeError::NoSlices)?;
        let origin = first.metadata.image_position;
        let spacing = match projected.as_slice() {
            [_] => first.metadata.slice_thickness.unwrap_or(1.0),
            [(p0, _), (p1, _), ..] => p1 - p0,
            [] => return Err(VolumeError::NoSlices),
        };

        for (slot, pair) in projected.windows(2).enumerate() {
            let ((previous, a), (current, b)) = (&pair[0], &pair[1]);
            let gap = current - previous;
            if gap == 0.0 {
                return Err(VolumeError::CoincidentSlices {
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
            if (gap - spacing).abs() > self.tolerance * spacing.abs() {
                return Err(VolumeError::NonUniformSpacing {
                    slot: slot + 1,
                    expected: spacing,
                    found: gap,
                });
            }
        }

        let mut slots = HashMap::with_capacity(projected.len());
        for (slot, (_, entry)) in projected.iter().enumerate() {
            if slots.insert(entry.id.clone(), slot).is_some() {
                return Err(VolumeError::DuplicateSlice(entry.id.clone()));
            }
        }

        Ok(SliceOrdering {
            index: SortedSliceIndex {
                order: projected.iter().map(|(_, entry)| entry.id.clone()).collect(),
                projections: projected.iter().map(|(p, _)| *p).collect(),
                slots,
            },
            spacing,
            origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SPACING_TOLERANCE;
    use crate::metadata::SliceMetadata;

    const AXIAL_NORMAL: [f64; 3] = [0.0, 0.0, 1.0];

    fn entry(id: &str, z: f64) -> SliceEntry {
        SliceEntry::new(id, SliceMetadata::new(2, 2).with_position([-5.0, 3.0, z]))
    }

    #[test]
    fn sorts_by_projection_and_derives_spacing() {
        let slices = vec![
            entry("c", 20.0),
            entry("a", 0.0),
            entry("d", 30.0),
            entry("b", 10.0),
        ];
        let ordering = SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&slices).unwrap();

        assert_eq!(ordering.spacing, 10.0);
        assert_eq!(ordering.origin, [-5.0, 3.0, 0.0]);
        assert_eq!(ordering.index.projections(), &[0.0, 10.0, 20.0, 30.0]);
        let ids: Vec<_> = ordering.index.ids().iter().map(SliceId::as_str).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(ordering.index.slot(&SliceId::from("c")), Some(2));
        assert_eq!(ordering.index.slot(&SliceId::from("x")), None);
    }

    #[test]
    fn projects_onto_oblique_normal() {
        let normal = [0.0, 1.0, 0.0];
        let slices = vec![
            SliceEntry::new("far", SliceMetadata::new(1, 1).with_position([0.0, 5.0, 9.0])),
            SliceEntry::new("near", SliceMetadata::new(1, 1).with_position([0.0, 2.5, 1.0])),
        ];
        let ordering = SliceOrderer::new(normal, 1e-3).order(&slices).unwrap();
        assert_eq!(ordering.spacing, 2.5);
        assert_eq!(ordering.index.slot(&SliceId::from("near")), Some(0));
    }

    #[test]
    fn tolerates_small_spacing_noise() {
        let slices = vec![entry("a", 0.0), entry("b", 2.0), entry("c", 4.0005)];
        assert!(SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&slices).is_ok());
    }

    #[test]
    fn default_tolerance_accepts_rounded_positions() {
        // positions printed with three decimals
        let slices = vec![
            entry("a", 0.0),
            entry("b", 0.625),
            entry("c", 1.251),
            entry("d", 1.875),
        ];
        let ordering = SliceOrderer::new(AXIAL_NORMAL, DEFAULT_SPACING_TOLERANCE)
            .order(&slices)
            .unwrap();
        assert_eq!(ordering.spacing, 0.625);
        assert_eq!(ordering.index.slot(&SliceId::from("c")), Some(2));
    }

    #[test]
    fn rejects_non_uniform_spacing() {
        let slices = vec![entry("a", 0.0), entry("b", 10.0), entry("c", 25.0)];
        let result = SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&slices);
        assert!(matches!(
            result,
            Err(VolumeError::NonUniformSpacing { slot: 2, .. })
        ));
    }

    #[test]
    fn rejects_coincident_and_duplicate_slices() {
        let coincident = vec![entry("a", 0.0), entry("b", 0.0)];
        assert!(matches!(
            SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&coincident),
            Err(VolumeError::CoincidentSlices { .. })
        ));

        let duplicate = vec![entry("a", 0.0), entry("a", 1.0)];
        assert!(matches!(
            SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&duplicate),
            Err(VolumeError::DuplicateSlice(_))
        ));
    }

    #[test]
    fn single_slice_uses_thickness() {
        let slices = vec![SliceEntry::new(
            "only",
            SliceMetadata::new(2, 2).with_slice_thickness(2.5),
        )];
        let ordering = SliceOrderer::new(AXIAL_NORMAL, 1e-3).order(&slices).unwrap();
        assert_eq!(ordering.spacing, 2.5);
        assert_eq!(ordering.index.len(), 1);
    }
}
