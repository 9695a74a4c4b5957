//! Filter seams.
//!
//! The filter language lives outside this crate. The dumper only sees a
//! [`FilterCompiler`] that turns an expression into a [`Predicate`].

use crate::error::{CoreError, CoreResult};
use memdump_codec::EventRecord;

/// A compiled filter.
pub trait Predicate: Send + Sync {
    /// Returns whether the record should be written to the output.
    fn matches(&self, record: &EventRecord) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&EventRecord) -> bool + Send + Sync,
{
    fn matches(&self, record: &EventRecord) -> bool {
        self(record)
    }
}

/// Compiles filter expressions.
pub trait FilterCompiler: Send + Sync {
    /// Compiles `expression`.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic message if the expression is invalid.
    fn compile(&self, expression: &str) -> Result<Box<dyn Predicate>, String>;
}

/// Compiler used when the embedding agent provides none: every non-empty
/// expression is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilterCompiler;

impl FilterCompiler for NoFilterCompiler {
    fn compile(&self, _expression: &str) -> Result<Box<dyn Predicate>, String> {
        Err("no filter compiler configured".to_string())
    }
}

/// The filter of one job.
///
/// An empty expression matches everything. Notification records always
/// match, so alert markers survive any filter.
pub struct JobFilter {
    expression: String,
    predicate: Option<Box<dyn Predicate>>,
}

impl JobFilter {
    /// Compiles `expression` with `compiler`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Compile`] if the compiler rejects it.
    pub fn compile(compiler: &dyn FilterCompiler, expression: &str) -> CoreResult<Self> {
        let predicate = if expression.is_empty() {
            None
        } else {
            Some(
                compiler
                    .compile(expression)
                    .map_err(|message| CoreError::compile(expression, message))?,
            )
        };
        Ok(Self {
            expression: expression.to_string(),
            predicate,
        })
    }

    /// Returns whether `record` passes.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.is_notification()
            || self
                .predicate
                .as_ref()
                .map_or(true, |predicate| predicate.matches(record))
    }
}

impl std::fmt::Debug for JobFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFilter")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}
