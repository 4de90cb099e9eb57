/*!
 Contains the top-level entry points that load a model archive into a flat
 list of named parameters.

 ## Overview

 A load is one pass: open the container, interpret the `data` archive's
 pickled value graph, and walk the resulting module for its tensors. Every
 load runs under a fresh [`LoadSession`]; nothing is shared across loads, so
 concurrent loads only need their own sessions and container handles.

 ## Failure boundary

 Internal error kinds stop at this module. Whatever fails inside a load is
 rendered to a message, reported to the optional
 [`LoadObserver`](crate::util::observer::LoadObserver), and then re-raised as
 the uniform [`LoadError`](crate::error::load::LoadError). Observation never
 swallows a failure.
*/

pub mod archive;

use std::{
    fs::File,
    io::{Read, Seek},
    path::Path,
    rc::Rc,
};

use crate::{
    container::{reader::ArchiveReader, RecordStore},
    error::{load::LoadError, pickle::PickleError, runtime::RuntimeError},
    loader::archive::ArchiveLoader,
    pickle::models::Value,
    runtime::{
        module::Module,
        tensor::Tensor,
        types::{CompilationUnit, CustomClassRegistry},
    },
    util::{device::Device, observer::LoadObserver},
};

/// The archive inside a container that holds the module's value graph
const DATA_ARCHIVE: &str = "data";

/// One model load: a fresh compilation unit plus the collaborators object
/// reconstruction may need
///
/// Restore-state procedures and natively-implemented classes must be in
/// place before the load runs; the session is consumed by it, so state never
/// leaks from one load into the next.
pub struct LoadSession {
    compilation_unit: Rc<CompilationUnit>,
    custom_classes: CustomClassRegistry,
    device: Option<Device>,
}

impl LoadSession {
    pub fn new() -> Self {
        Self {
            compilation_unit: CompilationUnit::new(),
            custom_classes: CustomClassRegistry::new(),
            device: None,
        }
    }

    /// Override the storage locations recorded in the archive
    pub fn set_device(&mut self, device: Option<Device>) {
        self.device = device;
    }

    /// The unit this load's classes and restore-state procedures register
    /// against
    pub fn compilation_unit(&self) -> &Rc<CompilationUnit> {
        &self.compilation_unit
    }

    /// The registry of natively-implemented classes for this load
    pub fn custom_classes_mut(&mut self) -> &mut CustomClassRegistry {
        &mut self.custom_classes
    }

    /// Deserialize the container's `data` archive into a module
    pub fn load_module<S: RecordStore>(
        self,
        store: &S,
        observer: Option<&dyn LoadObserver>,
    ) -> Result<Module, LoadError> {
        if let Some(observer) = observer {
            observer.on_enter_load_model();
        }
        match self.run(store) {
            Ok(module) => {
                if let Some(observer) = observer {
                    observer.on_exit_load_model(&module.name());
                }
                Ok(module)
            }
            Err(why) => Err(fail(observer, why.to_string())),
        }
    }

    /// Deserialize the container's `data` archive and enumerate its tensors
    /// by name, in declaration order
    pub fn load_parameters<S: RecordStore>(
        self,
        store: &S,
        observer: Option<&dyn LoadObserver>,
    ) -> Result<Vec<(String, Tensor)>, LoadError> {
        Ok(self.load_module(store, observer)?.named_parameters())
    }

    fn run<S: RecordStore>(&self, store: &S) -> Result<Module, PickleError> {
        let loader = ArchiveLoader::new(
            store,
            &self.compilation_unit,
            &self.custom_classes,
            self.device,
        );
        match loader.read_archive(DATA_ARCHIVE)? {
            Value::Object(object) => Ok(Module::new(object, Rc::clone(&self.compilation_unit))),
            other => Err(PickleError::Runtime(RuntimeError::NotAModule(
                other.kind().to_string(),
            ))),
        }
    }
}

impl Default for LoadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Load named parameters from any record store under a fresh session
pub fn load_parameters<S: RecordStore>(
    store: &S,
    device: Option<Device>,
    observer: Option<&dyn LoadObserver>,
) -> Result<Vec<(String, Tensor)>, LoadError> {
    let mut session = LoadSession::new();
    session.set_device(device);
    session.load_parameters(store, observer)
}

/// Open a container over any seekable byte source and load its parameters
pub fn from_reader<R: Read + Seek>(
    source: R,
    device: Option<Device>,
    observer: Option<&dyn LoadObserver>,
) -> Result<Vec<(String, Tensor)>, LoadError> {
    let store = match ArchiveReader::open(source) {
        Ok(store) => store,
        Err(why) => return Err(fail(observer, why.to_string())),
    };
    load_parameters(&store, device, observer)
}

/// Open a container file on disk and load its parameters
pub fn from_path<P: AsRef<Path>>(
    path: P,
    device: Option<Device>,
    observer: Option<&dyn LoadObserver>,
) -> Result<Vec<(String, Tensor)>, LoadError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(why) => return Err(fail(observer, why.to_string())),
    };
    from_reader(file, device, observer)
}

/// Report a failure to the observer, then convert it into the uniform error
fn fail(observer: Option<&dyn LoadObserver>, message: String) -> LoadError {
    if let Some(observer) = observer {
        observer.on_fail_load_model(&message);
    }
    LoadError::new(message)
}
