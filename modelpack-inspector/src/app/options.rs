/*!
 Parses command line arguments into validated application options.
*/

use std::path::PathBuf;

use clap::{crate_version, Arg, ArgAction, ArgMatches, Command};

use modelpack::util::device::Device;

use crate::app::error::RuntimeError;

pub const OPTION_PATH: &str = "path";
pub const OPTION_DEVICE: &str = "device";
pub const OPTION_LIST_RECORDS: &str = "list-records";

/// Help text shown by the command line interface
const ABOUT: &str = "Inspect a model parameter archive: list its records and dump its named parameters.";

/// Validated options the application runs under
#[derive(Debug, PartialEq, Eq)]
pub struct Options {
    /// Path to the model container to inspect
    pub container_path: PathBuf,
    /// Device override applied to every loaded tensor
    pub device: Option<Device>,
    /// Emit the container's record index before loading
    pub list_records: bool,
}

impl Options {
    /// Build validated options out of the raw argument matches
    pub fn from_args(args: &ArgMatches) -> Result<Self, RuntimeError> {
        let user_path: Option<&String> = args.get_one(OPTION_PATH);
        let user_device: Option<&String> = args.get_one(OPTION_DEVICE);
        let list_records = args.get_flag(OPTION_LIST_RECORDS);

        let container_path = match user_path {
            Some(path) => PathBuf::from(path),
            None => {
                return Err(RuntimeError::InvalidOptions(format!(
                    "`--{OPTION_PATH}` is required"
                )))
            }
        };

        let device = match user_device {
            Some(raw) => Some(Device::from_cli(raw).ok_or_else(|| {
                RuntimeError::InvalidOptions(format!(
                    "{raw} is not a valid device; expected `cpu`, `cuda`, or `cuda:<ordinal>`"
                ))
            })?),
            None => None,
        };

        Ok(Options {
            container_path,
            device,
            list_records,
        })
    }
}

fn command() -> Command {
    Command::new("Modelpack Inspector")
        .version(crate_version!())
        .about(ABOUT)
        .arg_required_else_help(true)
        .arg(
            Arg::new(OPTION_PATH)
                .short('p')
                .long(OPTION_PATH)
                .help("Specify a path to the model container to inspect\n")
                .display_order(0)
                .value_name("path/to/model.zip"),
        )
        .arg(
            Arg::new(OPTION_DEVICE)
                .short('d')
                .long(OPTION_DEVICE)
                .help("Override the device recorded for every tensor storage\nIf omitted, tensors keep the locations written into the archive\n")
                .display_order(1)
                .value_name("cpu|cuda:0"),
        )
        .arg(
            Arg::new(OPTION_LIST_RECORDS)
                .short('l')
                .long(OPTION_LIST_RECORDS)
                .help("Print the container's record index before loading\n")
                .action(ArgAction::SetTrue)
                .display_order(2),
        )
}

/// Parse the arguments the process was started with
pub fn from_command_line() -> ArgMatches {
    command().get_matches()
}
