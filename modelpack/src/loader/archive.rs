/*!
 Drives one archive's pickled record through the value-graph interpreter.

 The loader owns no state of its own: it borrows the session's compilation
 unit and record store, binds the interpreter's three callbacks to them, and
 hands back whatever root value the interpreter produces.
*/

use std::rc::Rc;

use crate::{
    container::RecordStore,
    error::pickle::PickleError,
    pickle::{
        cursor::RecordCursor,
        models::Value,
        parser::{LoadHooks, ValueReader},
    },
    runtime::{
        reconstruct::reconstruct,
        resolver::resolve,
        types::{ClassType, CompilationUnit, CustomClassRegistry, TypeHandle},
    },
    util::device::Device,
};

/// The extension of the record holding an archive's pickled value graph
const RECORD_EXTENSION: &str = "pkl";

/// Materializes one archive out of a record store
pub struct ArchiveLoader<'a, S: RecordStore> {
    store: &'a S,
    compilation_unit: &'a Rc<CompilationUnit>,
    custom_classes: &'a CustomClassRegistry,
    device: Option<Device>,
}

impl<'a, S: RecordStore> ArchiveLoader<'a, S> {
    pub fn new(
        store: &'a S,
        compilation_unit: &'a Rc<CompilationUnit>,
        custom_classes: &'a CustomClassRegistry,
        device: Option<Device>,
    ) -> Self {
        Self {
            store,
            compilation_unit,
            custom_classes,
            device,
        }
    }

    /// Deserialize the named archive's value graph and return its root value
    ///
    /// The structured record `<name>.pkl` is loaded into one buffer before
    /// interpretation begins; the storages the graph references are fetched
    /// on demand under `<name>/`.
    pub fn read_archive(&self, archive_name: &str) -> Result<Value, PickleError> {
        let record = self
            .store
            .record(&format!("{archive_name}.{RECORD_EXTENSION}"))
            .map_err(PickleError::Container)?;
        let hooks = SessionHooks {
            store: self.store,
            archive_name,
            compilation_unit: self.compilation_unit,
            custom_classes: self.custom_classes,
        };
        ValueReader::new(RecordCursor::new(record), hooks, self.device).parse()
    }
}

/// The interpreter's callbacks, bound to one archive's record scope
struct SessionHooks<'a, S: RecordStore> {
    store: &'a S,
    archive_name: &'a str,
    compilation_unit: &'a Rc<CompilationUnit>,
    custom_classes: &'a CustomClassRegistry,
}

impl<S: RecordStore> LoadHooks for SessionHooks<'_, S> {
    fn resolve_type(&mut self, name: &str) -> Result<TypeHandle, PickleError> {
        resolve(self.compilation_unit, name).map_err(PickleError::Runtime)
    }

    fn build_object(
        &mut self,
        class: &Rc<ClassType>,
        payload: Value,
    ) -> Result<Value, PickleError> {
        reconstruct(self.compilation_unit, self.custom_classes, class, payload)
            .map(Value::Object)
            .map_err(PickleError::Runtime)
    }

    fn read_record(&mut self, name: &str) -> Result<Vec<u8>, PickleError> {
        self.store
            .record(&format!("{}/{name}", self.archive_name))
            .map_err(PickleError::Container)
    }
}
