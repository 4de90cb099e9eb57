/*!
 Contains the type system and object model serialized archives are loaded into.

 A load session owns one [`CompilationUnit`](crate::runtime::types::CompilationUnit);
 every class resolved and every object reconstructed during that session hangs
 off of it. The unit is dropped with the session, so nothing here is shared
 across loads.
*/

pub mod module;
pub mod object;
pub mod reconstruct;
pub mod resolver;
pub mod tensor;
pub mod types;
