/*!
 Errors that can happen when interpreting a pickled value graph.
*/

use std::{
    fmt::{Display, Formatter, Result},
    io::Error as IoError,
    string::FromUtf8Error,
};

use crate::error::{container::ContainerError, runtime::RuntimeError};

/// Errors that can happen when interpreting a pickled value graph
#[derive(Debug)]
pub enum PickleError {
    /// The stream ended before the current value was complete
    UnexpectedEof,
    /// The stream declares a pickle protocol this reader does not support
    UnsupportedProtocol(u8),
    UnknownOpcode(u8),
    /// An opcode needed more values than the stack holds
    StackUnderflow(&'static str),
    /// An opcode needed a mark that was never pushed
    NoMark,
    StringParse(FromUtf8Error),
    /// An encoded integer is wider than 8 bytes
    IntegerTooLarge(usize),
    /// A memo reference points at a slot that was never stored
    UnknownMemo(u32),
    /// An opcode found the wrong kind of value on the stack
    UnexpectedValue(&'static str, String),
    /// A global reference names something that cannot construct objects
    UnsupportedGlobal(String),
    /// A reduce opcode found an unusable callee or payload
    BadReduce(String),
    /// A persistent-id tuple does not describe a storage record
    BadPersistentId(String),
    /// A storage record is too small for the tensor built over it
    BadTensorData(String),
    Io(IoError),
    Container(ContainerError),
    Runtime(RuntimeError),
}

impl Display for PickleError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            PickleError::UnexpectedEof => write!(fmt, "Unexpected end of pickle stream!"),
            PickleError::UnsupportedProtocol(version) => {
                write!(fmt, "Unsupported pickle protocol {version}")
            }
            PickleError::UnknownOpcode(opcode) => {
                write!(fmt, "Unknown pickle opcode {opcode:#04x}")
            }
            PickleError::StackUnderflow(opcode) => {
                write!(fmt, "Stack underflow while handling {opcode}")
            }
            PickleError::NoMark => write!(fmt, "No mark on the stack"),
            PickleError::StringParse(why) => write!(fmt, "Failed to parse string: {why}"),
            PickleError::IntegerTooLarge(width) => {
                write!(fmt, "Encoded integer is {width} bytes wide, expected at most 8")
            }
            PickleError::UnknownMemo(index) => {
                write!(fmt, "Memo slot {index} was referenced before it was stored")
            }
            PickleError::UnexpectedValue(expected, got) => {
                write!(fmt, "Expected {expected} on the stack, got {got}")
            }
            PickleError::UnsupportedGlobal(name) => {
                write!(fmt, "Global {name} cannot be used to construct values")
            }
            PickleError::BadReduce(why) => write!(fmt, "Unable to apply reduce: {why}"),
            PickleError::BadPersistentId(why) => {
                write!(fmt, "Unable to parse persistent id: {why}")
            }
            PickleError::BadTensorData(why) => write!(fmt, "Invalid tensor data: {why}"),
            PickleError::Io(why) => write!(fmt, "{why}"),
            PickleError::Container(why) => write!(fmt, "{why}"),
            PickleError::Runtime(why) => write!(fmt, "{why}"),
        }
    }
}
