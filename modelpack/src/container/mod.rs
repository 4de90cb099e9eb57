/*!
 Contains logic and data structures used to read named records out of a
 model container.

 A container is treated as an opaque key to blob store: the loading
 pipeline only ever asks for a record by name and receives its bytes. The
 concrete [`reader::ArchiveReader`] understands the ZIP-based layout model
 containers actually use; [`memory::MemoryStore`] serves records straight
 from a map for embedders and tests.
*/

pub mod memory;
pub mod reader;

use crate::error::container::ContainerError;

/// A named-record view over a model container
///
/// Returned buffers are owned by the caller, so a record stays usable no
/// matter how many lookups happen after it.
pub trait RecordStore {
    /// Fetch the raw bytes of the named record
    fn record(&self, name: &str) -> Result<Vec<u8>, ContainerError>;

    /// Whether the named record exists
    fn has_record(&self, name: &str) -> bool;
}
