//! Kumiko core library.
//!
//! Synthesises Unix Makefiles from a resolved build-target model: per-target
//! compile and link rules, the help/clean/install scaffolding, recursive
//! subdirectory descent and the object dependency fragments. The model is
//! produced by an external configure step and loaded through [`model`].

pub mod cli;
pub mod config;
pub mod depends;
pub mod error;
pub mod link;
pub mod make_gen;
pub mod model;
pub mod naming;
pub mod output;
pub mod paths;
pub mod runner;
pub mod sanitize;
pub mod subdirs;
pub mod template;
pub mod vars;

pub use error::GenerateError;
pub use make_gen::{Generated, generate};
