/*!
 Errors that can happen when reading records out of a model container.
*/

use std::{
    fmt::{Display, Formatter, Result},
    io::Error as IoError,
};

/// Errors that can happen when reading records out of a model container
#[derive(Debug)]
pub enum ContainerError {
    /// The named record does not exist in the container
    RecordNotFound(String),
    /// The container's structure could not be parsed
    Malformed(String),
    /// The named record uses a compression method this reader does not support
    Compressed(String),
    /// A record's stored checksum did not match its contents
    ChecksumMismatch(String, u32, u32),
    Io(IoError),
}

impl Display for ContainerError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            ContainerError::RecordNotFound(name) => {
                write!(fmt, "Record {name} does not exist in the archive!")
            }
            ContainerError::Malformed(why) => write!(fmt, "Unable to read archive: {why}"),
            ContainerError::Compressed(name) => {
                write!(fmt, "Record {name} is compressed; only stored records are supported")
            }
            ContainerError::ChecksumMismatch(name, expected, got) => write!(
                fmt,
                "Record {name} is corrupt: expected checksum {expected:08x}, got {got:08x}"
            ),
            ContainerError::Io(why) => write!(fmt, "{why}"),
        }
    }
}
