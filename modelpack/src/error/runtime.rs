/*!
 Errors that can happen when resolving types or reconstructing objects.
*/

use std::fmt::{Display, Formatter, Result};

/// Errors that can happen when resolving types or reconstructing objects
#[derive(Debug)]
pub enum RuntimeError {
    /// The qualified name is neither a reserved-namespace class nor a parseable type expression
    TypeResolution(String),
    /// An attribute was re-declared on a class with an incompatible type
    AttributeConflict(String, String),
    /// The generic reconstruction fallback was handed a payload that is not a keyed mapping
    PayloadShape(String),
    /// A reconstruction method failed; the message is the method's own, uninterpreted
    MethodDispatch(String),
    /// The archive's root value is not a module object
    NotAModule(String),
}

impl Display for RuntimeError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result {
        match self {
            RuntimeError::TypeResolution(name) => {
                write!(fmt, "Unable to resolve type name {name}!")
            }
            RuntimeError::AttributeConflict(class, attribute) => write!(
                fmt,
                "Attribute {attribute} on {class} was re-declared with an incompatible type"
            ),
            RuntimeError::PayloadShape(got) => {
                write!(fmt, "Expected a keyed mapping to reconstruct an object, got {got}")
            }
            RuntimeError::MethodDispatch(why) => write!(fmt, "{why}"),
            RuntimeError::NotAModule(got) => {
                write!(fmt, "Expected the archive root to be a module object, got {got}")
            }
        }
    }
}
