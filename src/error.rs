//! Error taxonomy for a generation pass.
//!
//! A single [`GenerateError`] enum covers every failure the rule synthesiser
//! can report. Only configuration errors abort a pass; the remaining variants
//! are collected alongside the generated text so callers can surface them
//! without losing the rest of the build script.

// `unused_assignments` fires on the `Diagnostic` and `Error` derive
// expansions with some toolchains only.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors raised while synthesising or writing build rules.
#[derive(Debug, Error, Diagnostic)]
pub enum GenerateError {
    /// A variable the toolchain tables must provide is absent.
    #[error("variable `{variable}` is required to generate rules for `{target}` but is not defined")]
    #[diagnostic(
        code(kumiko::generate::missing_variable),
        help("define `{variable}` in the toolchain variable store")
    )]
    MissingVariable {
        /// Name of the missing variable.
        variable: String,
        /// Target (or scaffolding rule) whose generation needed it.
        target: String,
    },

    /// A library or executable has no source that selects a linker language.
    #[error("cannot determine the linker language for `{target}`")]
    #[diagnostic(
        code(kumiko::generate::linker_language),
        help("set `linker_language` on the target or add a compiled source")
    )]
    NoLinkerLanguage {
        /// Target lacking a linker language.
        target: String,
    },

    /// A target references a source index outside the project's source list.
    #[error("target `{target}` references source #{index}, but only {len} sources exist")]
    #[diagnostic(code(kumiko::generate::unknown_source))]
    UnknownSource {
        /// Target holding the dangling reference.
        target: String,
        /// Offending index.
        index: usize,
        /// Number of sources in the project.
        len: usize,
    },

    /// Two custom commands claim the same output path.
    #[error("custom command in `{source_file}` also claims output `{output}`; keeping the first rule")]
    #[diagnostic(code(kumiko::generate::duplicate_output))]
    DuplicateOutput {
        /// The contested output path.
        output: Utf8PathBuf,
        /// Source file carrying the rejected command.
        source_file: Utf8PathBuf,
    },

    /// A utility or library dependency is neither a known library nor a
    /// known executable target.
    #[error("dependency `{dependency}` of `{target}` is not a known library or executable")]
    #[diagnostic(code(kumiko::generate::unknown_kind))]
    UnknownDependencyKind {
        /// Target declaring the dependency.
        target: String,
        /// The dependency that could not be classified.
        dependency: String,
    },

    /// A source file's extension maps to no enabled language.
    #[error("source `{source_file}` of target `{target}` has no enabled language")]
    #[diagnostic(
        code(kumiko::generate::unknown_language),
        help("mark the file header-only or enable a language for its extension")
    )]
    UnknownLanguage {
        /// Target owning the source.
        target: String,
        /// The offending source path.
        source_file: Utf8PathBuf,
    },

    /// Collision avoidance ran out of numeric suffixes for a make variable.
    #[error("could not derive a unique make variable for `{owner}{suffix}`")]
    #[diagnostic(code(kumiko::generate::variable_name))]
    VariableNameExhausted {
        /// Owner part of the variable.
        owner: String,
        /// Suffix part of the variable.
        suffix: String,
    },

    /// Collision avoidance ran out of spellings for a mangled object file.
    #[error("could not derive a unique object file name for `{object}`")]
    #[diagnostic(code(kumiko::generate::object_name))]
    ObjectNameExhausted {
        /// Object file name before mangling.
        object: String,
    },

    /// The dependency scan references a node that does not exist.
    #[error("dependency scan node {index} is out of range (graph has {len} nodes)")]
    #[diagnostic(code(kumiko::generate::depend_scan))]
    InvalidDependScan {
        /// Offending node index.
        index: usize,
        /// Number of nodes in the graph.
        len: usize,
    },

    /// Rendering text into the output buffer failed.
    #[error("failed to render generated text")]
    #[diagnostic(code(kumiko::generate::format))]
    Format(#[from] fmt::Error),

    /// An artifact could not be written.
    #[error("cannot write {artifact} to {path}")]
    #[diagnostic(code(kumiko::output::io))]
    Io {
        /// Human-readable artifact label (e.g. `Makefile`).
        artifact: String,
        /// Destination path.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

impl GenerateError {
    /// Return `true` when the error aborts the current generation pass.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingVariable { .. }
                | Self::NoLinkerLanguage { .. }
                | Self::UnknownSource { .. }
                | Self::VariableNameExhausted { .. }
                | Self::ObjectNameExhausted { .. }
                | Self::InvalidDependScan { .. }
                | Self::Format(_)
        )
    }
}
