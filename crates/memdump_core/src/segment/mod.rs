//! Capture segments and the set that rotates them.

mod buffer;
mod set;

pub use buffer::{Segment, SegmentInfo, SegmentWriter};
pub use set::{DeferredRotation, RotationOutcome, SegmentSet, SlotId};
