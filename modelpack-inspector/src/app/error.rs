/*!
 Errors that can happen during the application's runtime.
*/

use std::{
    fmt::{Display, Formatter, Result},
    io::Error as IoError,
    path::PathBuf,
};

use modelpack::error::{container::ContainerError, load::LoadError};

/// Errors that can happen during the application's runtime
#[derive(Debug)]
pub enum RuntimeError {
    InvalidOptions(String),
    OpenError(IoError, PathBuf),
    ArchiveError(ContainerError),
    LoadError(LoadError),
}

impl Display for RuntimeError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            RuntimeError::InvalidOptions(why) => write!(fmt, "Invalid options!\n{why}"),
            RuntimeError::OpenError(why, path) => write!(fmt, "Unable to open {path:?}: {why}"),
            RuntimeError::ArchiveError(why) => write!(fmt, "{why}"),
            RuntimeError::LoadError(why) => write!(fmt, "{why}"),
        }
    }
}
