//! The segment set and its rotation rules.

use crate::config::{MAX_SEGMENTS, NOMINAL_SEGMENTS};
use crate::error::{CoreError, CoreResult};
use crate::segment::buffer::{Segment, SegmentInfo, SegmentWriter};
use memdump_storage::ShmNamespace;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Index of a segment slot in the set's arena.
pub type SlotId = usize;

/// Bookkeeping for a rotation that could not run because a reader holds
/// the segment it would recycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeferredRotation {
    /// Records dropped by the ingestion path while waiting.
    pub missed_events: u64,
    /// Further rotation requests dropped while waiting.
    pub dropped_requests: u64,
}

/// What a call to [`SegmentSet::rotate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// A new active segment is in place.
    Rotated {
        /// A temporary segment was added instead of recycling the oldest.
        grew: bool,
        /// The deferred rotation this one resolved, if any.
        resolved: Option<DeferredRotation>,
    },
    /// The set is at its maximum and the oldest segment is being read.
    Deferred,
}

/// Two (transiently three) segments under rotation.
///
/// Segments live in a fixed arena of [`MAX_SEGMENTS`] slots. `order` lists
/// occupied slots newest first; `order[0]` is the active segment. Jobs claim
/// slots while they read them so rotation never recycles a segment under a
/// reader.
#[derive(Debug)]
pub struct SegmentSet {
    namespace: ShmNamespace,
    name_prefix: String,
    capacity: usize,
    next_id: u64,
    slots: [Option<Segment>; MAX_SEGMENTS],
    order: VecDeque<SlotId>,
    claims: [u32; MAX_SEGMENTS],
    deferred: Option<DeferredRotation>,
}

impl SegmentSet {
    /// Creates the nominal segments, closed.
    #[must_use]
    pub fn new(namespace: ShmNamespace, name_prefix: impl Into<String>, capacity: usize) -> Self {
        let mut set = Self {
            namespace,
            name_prefix: name_prefix.into(),
            capacity,
            next_id: 0,
            slots: std::array::from_fn(|_| None),
            order: VecDeque::with_capacity(MAX_SEGMENTS),
            claims: [0; MAX_SEGMENTS],
            deferred: None,
        };
        for slot in 0..NOMINAL_SEGMENTS {
            let segment = set.new_segment();
            set.slots[slot] = Some(segment);
            set.order.push_back(slot);
        }
        set
    }

    fn new_segment(&mut self) -> Segment {
        let name = format!("{}{}", self.name_prefix, self.next_id);
        self.next_id += 1;
        Segment::new(self.namespace.clone(), name, self.capacity)
    }

    /// Opens every segment.
    ///
    /// All segments are attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first allocation error.
    pub fn open_all(&mut self) -> CoreResult<()> {
        let mut first_err = None;
        for segment in self.slots.iter_mut().flatten() {
            if let Err(e) = segment.open() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Closes every segment.
    pub fn close_all(&mut self) {
        for segment in self.slots.iter_mut().flatten() {
            segment.close();
        }
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always false; a set holds at least [`NOMINAL_SEGMENTS`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the slot of the active segment.
    #[must_use]
    pub fn active(&self) -> SlotId {
        self.order[0]
    }

    /// Returns the slot of the segment retired by the last rotation.
    #[must_use]
    pub fn previous(&self) -> SlotId {
        self.order[1]
    }

    /// Returns the slot of the oldest segment.
    #[must_use]
    pub fn oldest(&self) -> SlotId {
        self.order[self.order.len() - 1]
    }

    /// Returns the segment in `slot`.
    #[must_use]
    pub fn segment(&self, slot: SlotId) -> Option<&Segment> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Returns the write capability of the active segment.
    #[must_use]
    pub fn active_writer(&self) -> Option<Arc<SegmentWriter>> {
        self.segment(self.active()).and_then(Segment::writer)
    }

    /// Returns whether any job is reading `slot`.
    #[must_use]
    pub fn is_claimed(&self, slot: SlotId) -> bool {
        self.claims.get(slot).is_some_and(|&c| c > 0)
    }

    /// Returns the oldest segment a job is currently reading.
    #[must_use]
    pub fn reader(&self) -> Option<SlotId> {
        self.order.iter().rev().copied().find(|&s| self.is_claimed(s))
    }

    /// Returns the pending deferred rotation, if any.
    #[must_use]
    pub fn deferred(&self) -> Option<DeferredRotation> {
        self.deferred
    }

    /// Returns whether a deferred rotation can now run.
    #[must_use]
    pub fn deferred_ready(&self) -> bool {
        self.deferred.is_some() && !self.must_defer()
    }

    /// Counts a record dropped while a rotation is deferred.
    pub fn record_missed_event(&mut self) {
        if let Some(deferred) = self.deferred.as_mut() {
            deferred.missed_events += 1;
        }
    }

    fn must_defer(&self) -> bool {
        self.is_claimed(self.oldest()) && self.order.len() >= MAX_SEGMENTS
    }

    /// Retires the active segment and activates another.
    ///
    /// - If the oldest segment is claimed and the set has room, a temporary
    ///   segment is created and becomes active.
    /// - If the oldest segment is claimed and the set is full, nothing
    ///   changes and the rotation is deferred.
    /// - Otherwise the oldest segment is reopened empty and becomes active.
    ///
    /// # Errors
    ///
    /// Returns an allocation error if the new active segment cannot be
    /// opened. The set structure is still updated.
    pub fn rotate(&mut self) -> CoreResult<RotationOutcome> {
        let oldest = self.oldest();

        if self.is_claimed(oldest) {
            if self.order.len() >= MAX_SEGMENTS {
                match self.deferred.as_mut() {
                    Some(deferred) => deferred.dropped_requests += 1,
                    None => {
                        warn!("stopping event processing while a job reads the oldest segment");
                        self.deferred = Some(DeferredRotation::default());
                    }
                }
                return Ok(RotationOutcome::Deferred);
            }

            let slot = self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or_else(|| CoreError::invalid_operation("no free segment slot"))?;
            let mut segment = self.new_segment();
            debug!(
                segment = segment.name(),
                "creating temporary additional segment while reader is active"
            );
            let opened = segment.open();
            self.slots[slot] = Some(segment);
            self.order.push_front(slot);
            opened?;
            return Ok(RotationOutcome::Rotated {
                grew: true,
                resolved: self.deferred.take(),
            });
        }

        self.order.pop_back();
        self.order.push_front(oldest);
        let resolved = self.deferred.take();
        self.slots[oldest]
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("rotation hit an empty slot"))?
            .open()?;

        Ok(RotationOutcome::Rotated {
            grew: false,
            resolved,
        })
    }

    /// Claims the oldest segment for a job and returns its slot.
    pub fn claim_oldest(&mut self) -> SlotId {
        let slot = self.oldest();
        self.claims[slot] += 1;
        slot
    }

    /// Moves a job's claim from `slot` to the next newer segment.
    ///
    /// The next segment is claimed before `slot` is released, so rotation can
    /// never recycle it in between. Returns `None` once `slot` was the active
    /// segment.
    pub fn advance_claim(&mut self, slot: SlotId) -> Option<SlotId> {
        let next = self
            .order
            .iter()
            .position(|&s| s == slot)
            .filter(|&pos| pos > 0)
            .map(|pos| self.order[pos - 1]);
        if let Some(next) = next {
            self.claims[next] += 1;
        }
        self.release(slot);
        next
    }

    /// Drops a job's claim on `slot`.
    pub fn release(&mut self, slot: SlotId) {
        if let Some(claims) = self.claims.get_mut(slot) {
            *claims = claims.saturating_sub(1);
        }
    }

    /// Removes temporary segments no job is reading.
    ///
    /// Returns how many segments were removed.
    pub fn shrink(&mut self) -> usize {
        let mut removed = 0;
        while self.order.len() > NOMINAL_SEGMENTS {
            let oldest = self.oldest();
            if self.is_claimed(oldest) {
                break;
            }
            self.order.pop_back();
            if let Some(mut segment) = self.slots[oldest].take() {
                debug!(
                    segment = segment.name(),
                    "removing temporary additional segment after reader finished"
                );
                segment.close();
            }
            removed += 1;
        }
        removed
    }

    /// Describes every segment, newest first.
    #[must_use]
    pub fn infos(&self) -> Vec<SegmentInfo> {
        self.order
            .iter()
            .enumerate()
            .filter_map(|(pos, &slot)| {
                self.segment(slot)
                    .map(|s| s.info(pos == 0, self.is_claimed(slot)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memdump_codec::EventRecord;

    fn open_set() -> SegmentSet {
        let mut set = SegmentSet::new(ShmNamespace::new(), "/set-test-", 1024);
        set.open_all().unwrap();
        set
    }

    fn names(set: &SegmentSet) -> Vec<String> {
        set.infos().into_iter().map(|i| i.name).collect()
    }

    fn assert_invariants(set: &SegmentSet) {
        assert!(set.len() >= NOMINAL_SEGMENTS && set.len() <= MAX_SEGMENTS);
        assert_eq!(set.infos().iter().filter(|i| i.active).count(), 1);
    }

    #[test]
    fn starts_with_two_open_segments() {
        let set = open_set();
        assert_eq!(set.len(), 2);
        assert!(set.infos().iter().all(|i| i.open));
        assert_eq!(names(&set), vec!["/set-test-0", "/set-test-1"]);
        assert_invariants(&set);
    }

    #[test]
    fn rotation_recycles_oldest() {
        let mut set = open_set();
        set.active_writer()
            .unwrap()
            .append(&EventRecord::event(1, 1, b"x".to_vec()));

        let outcome = set.rotate().unwrap();
        assert_eq!(
            outcome,
            RotationOutcome::Rotated {
                grew: false,
                resolved: None
            }
        );
        assert_eq!(names(&set), vec!["/set-test-1", "/set-test-0"]);
        assert_eq!(set.infos()[1].records, 1);
        assert_eq!(set.infos()[0].records, 0);
        assert_invariants(&set);
    }

    #[test]
    fn claimed_oldest_grows_to_three() {
        let mut set = open_set();
        let claimed = set.claim_oldest();

        let outcome = set.rotate().unwrap();
        assert!(matches!(outcome, RotationOutcome::Rotated { grew: true, .. }));
        assert_eq!(set.len(), 3);
        assert_eq!(names(&set)[0], "/set-test-2");
        assert!(set.segment(claimed).unwrap().is_open());
        assert_invariants(&set);
    }

    #[test]
    fn full_set_defers_and_counts() {
        let mut set = open_set();
        set.claim_oldest();
        set.rotate().unwrap();

        assert_eq!(set.rotate().unwrap(), RotationOutcome::Deferred);
        assert_eq!(set.rotate().unwrap(), RotationOutcome::Deferred);
        set.record_missed_event();
        assert_eq!(
            set.deferred(),
            Some(DeferredRotation {
                missed_events: 1,
                dropped_requests: 1
            })
        );
        assert!(!set.deferred_ready());
        assert_eq!(set.len(), 3);
        assert_invariants(&set);
    }

    #[test]
    fn deferred_rotation_resolves_after_release() {
        let mut set = open_set();
        let slot = set.claim_oldest();
        set.rotate().unwrap();
        set.rotate().unwrap();
        set.release(slot);
        assert!(set.deferred_ready());

        let outcome = set.rotate().unwrap();
        assert_eq!(
            outcome,
            RotationOutcome::Rotated {
                grew: false,
                resolved: Some(DeferredRotation::default())
            }
        );
        assert!(set.deferred().is_none());
        assert_invariants(&set);
    }

    #[test]
    fn advance_claim_walks_oldest_to_newest() {
        let mut set = open_set();
        let first = set.claim_oldest();
        assert_eq!(set.segment(first).unwrap().name(), "/set-test-1");

        let second = set.advance_claim(first).unwrap();
        assert_eq!(set.segment(second).unwrap().name(), "/set-test-0");
        assert!(!set.is_claimed(first));
        assert!(set.is_claimed(second));

        assert_eq!(set.advance_claim(second), None);
        assert_eq!(set.reader(), None);
    }

    #[test]
    fn shrink_keeps_claimed_segments() {
        let mut set = open_set();
        let slot = set.claim_oldest();
        set.rotate().unwrap();
        assert_eq!(set.shrink(), 0);
        assert_eq!(set.len(), 3);

        set.release(slot);
        assert_eq!(set.shrink(), 1);
        assert_eq!(set.len(), 2);
        assert!(set.segment(slot).is_none());
        assert_invariants(&set);
    }

    #[test]
    fn reader_marker_follows_claims() {
        let mut set = open_set();
        assert_eq!(set.reader(), None);
        let slot = set.claim_oldest();
        assert_eq!(set.reader(), Some(slot));
        set.release(slot);
        assert_eq!(set.reader(), None);
    }

    #[test]
    fn failed_open_is_reported() {
        let ns = ShmNamespace::with_limit(1024);
        let mut set = SegmentSet::new(ns, "/set-test-", 1024);
        let err = set.open_all().unwrap_err();
        assert!(matches!(err, CoreError::Allocation { .. }));
        assert_eq!(set.infos().iter().filter(|i| i.open).count(), 1);
    }
}
