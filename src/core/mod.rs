//! Compilation pipeline — types, parsing, resolution, Appfile, manifests.

pub mod appfile;
pub mod config;
pub mod error;
pub mod manifest;
pub mod parser;
pub mod resolver;
pub mod store;
pub mod types;
pub mod value;
pub mod workflow;
