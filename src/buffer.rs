//! Time-indexed snapshot storage for one capture run.
use crate::book::DepthSnapshot;
use crate::error::BufferError;

/// One slot per elapsed time unit of the capture window.
///
/// Slot `n` holds the snapshot observed during unit `n`. Units with no
/// snapshot stay empty and read back as the zero-valued [`DepthSnapshot`];
/// nothing downstream can tell such a gap from an all-zero book.
#[derive(Debug, Clone)]
pub struct DepthBuffer {
    slots: Vec<Option<DepthSnapshot>>,
    filled: usize,
}

impl DepthBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { slots: vec![None; capacity], filled: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that received at least one snapshot.
    pub fn snapshot_count(&self) -> usize {
        self.filled
    }

    /// Store `snapshot` at `index`, replacing whatever the slot held.
    ///
    /// Returns `true` when the slot was previously written.
    pub fn write(&mut self, index: usize, snapshot: DepthSnapshot) -> Result<bool, BufferError> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(BufferError::IndexOutOfRange { index, capacity })?;
        let replaced = slot.replace(snapshot).is_some();
        if !replaced {
            self.filled += 1;
        }
        Ok(replaced)
    }

    pub fn get(&self, index: usize) -> Option<&DepthSnapshot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn is_gap(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(None))
    }

    /// Every slot in index order, gaps zero-filled.
    pub fn rows(&self) -> impl Iterator<Item = DepthSnapshot> + '_ {
        self.slots.iter().map(|s| s.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PriceLevel;

    fn snap(p: f32) -> DepthSnapshot {
        let mut s = DepthSnapshot::default();
        s.bids[0] = PriceLevel::new(p, 1.0);
        s.asks[0] = PriceLevel::new(p + 1.0, 1.0);
        s
    }

    #[test]
    fn bounds_are_checked_at_capacity() {
        let mut b = DepthBuffer::with_capacity(4);
        assert!(b.write(3, snap(1.0)).is_ok());
        assert_eq!(
            b.write(4, snap(1.0)),
            Err(BufferError::IndexOutOfRange { index: 4, capacity: 4 })
        );
        assert_eq!(b.snapshot_count(), 1);
    }

    #[test]
    fn overwrite_does_not_bump_count() {
        let mut b = DepthBuffer::with_capacity(2);
        assert_eq!(b.write(0, snap(1.0)), Ok(false));
        assert_eq!(b.write(0, snap(2.0)), Ok(true));
        assert_eq!(b.snapshot_count(), 1);
        assert_eq!(b.get(0), Some(&snap(2.0)));
    }

    #[test]
    fn gaps_read_back_as_zero() {
        let mut b = DepthBuffer::with_capacity(3);
        b.write(1, snap(5.0)).unwrap();
        assert!(b.is_gap(0));
        assert!(!b.is_gap(1));
        assert!(!b.is_gap(3));
        let rows: Vec<_> = b.rows().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_zero());
        assert_eq!(rows[1], snap(5.0));
        assert!(rows[2].is_zero());
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut b = DepthBuffer::with_capacity(0);
        assert!(b.write(0, snap(1.0)).is_err());
        assert_eq!(b.rows().count(), 0);
    }
}
