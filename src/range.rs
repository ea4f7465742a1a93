use crate::error::VolumeError;

/// Observed bounds of one channel.
///
/// A fresh range is `{ min: +inf, max: -inf }` and only ever widens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRange {
    pub min: f64,
    pub max: f64,
}

impl ChannelRange {
    pub const EMPTY: ChannelRange = ChannelRange {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    /// True until at least one value has been observed.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    #[inline]
    pub fn include(&mut self, value: f64) {
        // f64::min/max ignore NaN
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn union(self, other: ChannelRange) -> ChannelRange {
        ChannelRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Running per-channel min/max.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTracker {
    channels: Vec<ChannelRange>,
}

impl RangeTracker {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![ChannelRange::EMPTY; channels],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[ChannelRange] {
        &self.channels
    }

    pub fn update_single(&mut self, channel: usize, value: f64) -> Result<(), VolumeError> {
        let len = self.channels.len();
        let range = self
            .channels
            .get_mut(channel)
            .ok_or(VolumeError::IndexOutOfRange { index: channel, len })?;
        range.include(value);
        Ok(())
    }

    pub fn merge_from(&mut self, other: &RangeTracker) -> Result<(), VolumeError> {
        if self.channels.len() != other.channels.len() {
            return Err(VolumeError::SizeMismatch {
                expected: self.channels.len(),
                found: other.channels.len(),
            });
        }
        self.absorb(other);
        Ok(())
    }

    pub fn channel(&self, index: usize) -> Result<ChannelRange, VolumeError> {
        self.channels
            .get(index)
            .copied()
            .ok_or(VolumeError::IndexOutOfRange {
                index,
                len: self.channels.len(),
            })
    }

    /// Widen without checking sizes; callers guarantee equal channel counts.
    pub(crate) fn absorb(&mut self, other: &RangeTracker) {
        for (target, source) in self.channels.iter_mut().zip(&other.channels) {
            *target = target.union(*source);
        }
    }

    #[inline]
    pub(crate) fn include(&mut self, channel: usize, value: f64) {
        self.channels[channel].include(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(values: &[(f64, f64)]) -> RangeTracker {
        let mut tracker = RangeTracker::new(values.len());
        for (channel, (a, b)) in values.iter().enumerate() {
            tracker.update_single(channel, *a).unwrap();
            tracker.update_single(channel, *b).unwrap();
        }
        tracker
    }

    #[test]
    fn new_tracker_is_empty() {
        let tracker = RangeTracker::new(3);
        assert_eq!(tracker.channel_count(), 3);
        for range in tracker.channels() {
            assert!(range.is_empty());
            assert_eq!(range.min, f64::INFINITY);
            assert_eq!(range.max, f64::NEG_INFINITY);
        }
    }

    #[test]
    fn update_single_widens() {
        let mut tracker = RangeTracker::new(1);
        tracker.update_single(0, 5.0).unwrap();
        tracker.update_single(0, -2.0).unwrap();
        tracker.update_single(0, 1.0).unwrap();
        let range = tracker.channel(0).unwrap();
        assert_eq!(range, ChannelRange { min: -2.0, max: 5.0 });
    }

    #[test]
    fn nan_does_not_narrow() {
        let mut tracker = tracker(&[(0.0, 10.0)]);
        tracker.update_single(0, f64::NAN).unwrap();
        assert_eq!(tracker.channel(0).unwrap(), ChannelRange { min: 0.0, max: 10.0 });
    }

    #[test]
    fn merge_is_commutative_and_associative() {
        let a = tracker(&[(0.0, 3.0), (-1.0, 1.0)]);
        let b = tracker(&[(2.0, 8.0), (-5.0, 0.5)]);
        let c = tracker(&[(-4.0, 1.0), (0.0, 9.0)]);

        let mut ab = a.clone();
        ab.merge_from(&b).unwrap();
        let mut ba = b.clone();
        ba.merge_from(&a).unwrap();
        assert_eq!(ab, ba);

        let mut ab_c = ab.clone();
        ab_c.merge_from(&c).unwrap();
        let mut bc = b.clone();
        bc.merge_from(&c).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge_from(&bc).unwrap();
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn merge_never_narrows_either_operand() {
        let a = tracker(&[(0.0, 3.0), (-1.0, 1.0)]);
        let b = tracker(&[(1.0, 2.0), (-5.0, 0.5)]);
        let mut merged = a.clone();
        merged.merge_from(&b).unwrap();
        for operand in [&a, &b] {
            for (m, o) in merged.channels().iter().zip(operand.channels()) {
                assert!(m.min <= o.min);
                assert!(m.max >= o.max);
            }
        }

        let mut with_empty = a.clone();
        with_empty.merge_from(&RangeTracker::new(2)).unwrap();
        assert_eq!(with_empty, a);
    }

    #[test]
    fn merge_rejects_different_channel_counts() {
        let mut a = RangeTracker::new(1);
        let b = RangeTracker::new(3);
        assert!(matches!(
            a.merge_from(&b),
            Err(VolumeError::SizeMismatch { expected: 1, found: 3 })
        ));
    }

    #[test]
    fn channel_index_is_checked() {
        let mut tracker = RangeTracker::new(2);
        assert!(matches!(
            tracker.channel(2),
            Err(VolumeError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(tracker.update_single(5, 1.0).is_err());
    }
}
