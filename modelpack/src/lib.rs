#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod container;
pub mod error;
pub mod loader;
pub mod pickle;
pub mod runtime;
pub mod util;
