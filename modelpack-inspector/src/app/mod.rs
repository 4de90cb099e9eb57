/*!
 Defines the application layer: option parsing, runtime state, and errors.
*/

pub mod error;
pub mod options;
pub mod runtime;
