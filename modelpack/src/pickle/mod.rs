/*!
 Contains logic and data structures used to parse and deserialize the pickled
 value graph stored inside a model container.

 ## Overview

 Model archives describe their parameter graph with a restricted dialect of
 the pickle serialization protocol. One record holds an opcode stream that,
 when interpreted, yields a single root value referencing the archive's raw
 storage records by name.

 ## Features

 - Pure Rust implementation with no dependency on a Python runtime
 - Policy-free interpreter: type resolution, object reconstruction, and
   record access are injected by the embedding
 - Robust error handling for malformed or incomplete pickle data
*/

pub mod cursor;
pub mod models;
pub mod parser;
