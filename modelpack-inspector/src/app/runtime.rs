/*!
 Application state and the inspection passes it drives over one container.
*/

use std::{
    fs::File,
    io::{Read, Seek},
};

use modelpack::{
    container::reader::ArchiveReader,
    loader::LoadSession,
    util::{
        observer::LoadObserver,
        output::{done_processing, processing},
    },
};

use crate::app::{error::RuntimeError, options::Options};

/// Emits load progress to the terminal
struct ProgressObserver;

impl LoadObserver for ProgressObserver {
    fn on_enter_load_model(&self) {
        processing("Loading model parameters");
    }

    fn on_exit_load_model(&self, _name: &str) {
        done_processing();
    }

    fn on_fail_load_model(&self, _message: &str) {
        done_processing();
    }
}

/// Drives one inspection run over the container named by the options
pub struct Inspector {
    options: Options,
}

impl Inspector {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Open the container and run the requested inspection passes
    pub fn run(&self) -> Result<(), RuntimeError> {
        let file = File::open(&self.options.container_path)
            .map_err(|why| RuntimeError::OpenError(why, self.options.container_path.clone()))?;
        let reader = ArchiveReader::open(file).map_err(RuntimeError::ArchiveError)?;

        if self.options.list_records {
            self.list_records(&reader);
        }

        let mut session = LoadSession::new();
        session.set_device(self.options.device);
        let parameters = session
            .load_parameters(&reader, Some(&ProgressObserver))
            .map_err(RuntimeError::LoadError)?;

        println!("Parameters ({}):", parameters.len());
        for (name, tensor) in &parameters {
            println!(
                "  {name}: {} tensor of shape {:?} on {}",
                tensor.dtype, tensor.shape, tensor.device
            );
        }
        Ok(())
    }

    /// Print the container's record index with stored sizes
    fn list_records<R: Read + Seek>(&self, reader: &ArchiveReader<R>) {
        println!("Records in archive {}:", reader.archive_name());
        for name in reader.record_names() {
            let size = reader.record_size(name).unwrap_or(0);
            println!("  {name} ({size} bytes)");
        }
    }
}
