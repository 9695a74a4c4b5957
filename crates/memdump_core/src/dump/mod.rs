//! Output artifacts and the continuous dump governor.

mod file;
mod governor;

pub use file::{DumpReader, DumpRecords, DumpSummary, DumpWriter};
pub use governor::{
    CloseReason, ContinuousDump, ContinuousDumpStatus, SessionClosed, StartOutcome,
};
