/*!
 The command line interface to inspect model parameter archives.
*/

use std::process::ExitCode;

mod app;

use crate::app::{
    options::{from_command_line, Options},
    runtime::Inspector,
};

fn main() -> ExitCode {
    // Get args from the command line
    let args = from_command_line();
    // Create application options
    match Options::from_args(&args) {
        // Create app state and inspect the archive
        Ok(options) => match Inspector::new(options).run() {
            Ok(()) => ExitCode::SUCCESS,
            Err(why) => {
                eprintln!("{why}");
                ExitCode::FAILURE
            }
        },
        Err(why) => {
            eprintln!("{why}");
            ExitCode::FAILURE
        }
    }
}
