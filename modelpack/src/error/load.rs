/*!
 The uniform error emitted by the top-level load entry points.

 Internal error kinds never cross the load boundary; callers only see the
 rendered message of whatever failed, after it has been reported to the
 lifecycle observer.
*/

use std::{
    error::Error,
    fmt::{Display, Formatter, Result},
};

/// The uniform fatal error emitted by the top-level load entry points
#[derive(Debug)]
pub struct LoadError {
    message: String,
}

impl LoadError {
    pub(crate) fn new(message: String) -> Self {
        Self { message }
    }

    /// The rendered message of the failure that aborted the load
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for LoadError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        write!(fmt, "{}", self.message)
    }
}

impl Error for LoadError {}
