//! Resolved build-target model consumed by the generator.
//!
//! The model is produced by an external configuration front end and is
//! immutable for the duration of a generation pass. It is deserialised from
//! YAML (via `serde-saphyr`) or JSON.
//!
//! ```yaml
//! model_version: "1.0.0"
//! source_dir: /src
//! binary_dir: /build
//! languages:
//!   - name: C
//!     source_extensions: [c]
//!     object_extension: .o
//! sources:
//!   - path: /src/main.c
//! targets:
//!   foo:
//!     kind: executable
//!     sources: [0]
//! ```

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;

use crate::config::GeneratorOptions;
use crate::error::GenerateError;
use crate::vars::VariableStore;

/// Closed set of target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Archive of object files.
    StaticLibrary,
    /// Dynamically linked library.
    SharedLibrary,
    /// Dynamically loaded plugin.
    ModuleLibrary,
    /// Linked program.
    Executable,
    /// Rule that only runs custom commands.
    Utility,
    /// Files copied by the install script; produces no build rule.
    InstallArtifact,
}

impl TargetKind {
    /// Return `true` for the three library kinds.
    #[must_use]
    pub const fn is_library(self) -> bool {
        matches!(
            self,
            Self::StaticLibrary | Self::SharedLibrary | Self::ModuleLibrary
        )
    }

    /// Return `true` for shared and module libraries.
    #[must_use]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::SharedLibrary | Self::ModuleLibrary)
    }
}

/// Build configuration a link library applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkConfig {
    /// Linked in every configuration.
    #[default]
    Always,
    /// Linked only when the active configuration is `Debug`.
    DebugOnly,
    /// Linked in every configuration except `Debug`.
    OptimizedOnly,
}

impl LinkConfig {
    /// Return `true` when the entry applies to a build whose configuration
    /// name is `build_type`.
    #[must_use]
    pub fn applies_to(self, build_type: &str) -> bool {
        let debug = build_type.eq_ignore_ascii_case("debug");
        match self {
            Self::Always => true,
            Self::DebugOnly => debug,
            Self::OptimizedOnly => !debug,
        }
    }
}

/// One entry of a target's link-library list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkLibrary {
    /// Library name, path or raw linker flag.
    pub name: String,
    /// Configuration filter.
    #[serde(default)]
    pub config: LinkConfig,
}

impl LinkLibrary {
    /// Entry linked in every configuration.
    #[must_use]
    pub fn always(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: LinkConfig::Always,
        }
    }
}

/// A user-declared command producing one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomCommand {
    /// File produced by the command.
    #[serde(default)]
    pub output: Utf8PathBuf,
    /// Program to run.
    pub command: String,
    /// Argument string appended to the program.
    #[serde(default)]
    pub arguments: String,
    /// Progress comment shown when the rule runs.
    #[serde(default)]
    pub comment: Option<String>,
    /// Files the command reads.
    #[serde(default)]
    pub depends: Vec<String>,
}

/// Index of a source in [`Project::sources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub usize);

/// A source file shared by one or more targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    /// Full path to the file.
    pub path: Utf8PathBuf,
    /// The file is only included by other sources and is never compiled.
    #[serde(default)]
    pub header_only: bool,
    /// The file is a prebuilt object linked as-is.
    #[serde(default)]
    pub external_object: bool,
    /// Extra compiler flags for this file.
    #[serde(default)]
    pub compile_flags: Option<String>,
    /// Extra prerequisites of the object rule.
    #[serde(default)]
    pub object_depends: Vec<String>,
    /// Dependency hints from the front end; replaced by the scan result.
    #[serde(default)]
    pub depends: Vec<Utf8PathBuf>,
    /// Command generating this file.
    #[serde(default)]
    pub custom_command: Option<CustomCommand>,
}

impl SourceFile {
    /// Source at `path` with default properties.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            header_only: false,
            external_object: false,
            compile_flags: None,
            object_depends: Vec::new(),
            depends: Vec::new(),
            custom_command: None,
        }
    }

    /// Extension without the leading dot, or `""`.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.path.extension().unwrap_or_default()
    }
}

/// A named buildable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    /// What the target produces.
    pub kind: TargetKind,
    /// Overrides the platform name prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Overrides the platform name suffix.
    #[serde(default)]
    pub suffix: Option<String>,
    /// Full library version, e.g. `2.3.1`.
    #[serde(default)]
    pub version: Option<String>,
    /// ABI version embedded as the soname.
    #[serde(default)]
    pub soversion: Option<String>,
    /// Extra linker flags.
    #[serde(default)]
    pub link_flags: Option<String>,
    /// Extra compiler flags for every source.
    #[serde(default)]
    pub compile_flags: Option<String>,
    /// Extra archiver flags for static libraries.
    #[serde(default)]
    pub static_library_flags: Option<String>,
    /// Export symbol defined while compiling a shared library.
    #[serde(default)]
    pub define_symbol: Option<String>,
    /// Place the executable inside an application bundle.
    #[serde(default)]
    pub bundle: bool,
    /// Link as a GUI rather than a console program.
    #[serde(default)]
    pub win32_executable: bool,
    /// Built by the default `all` rule.
    #[serde(default = "default_true")]
    pub in_all: bool,
    /// Language whose driver links the target.
    #[serde(default)]
    pub linker_language: Option<String>,
    /// Sources in declaration order.
    #[serde(default)]
    pub sources: Vec<SourceId>,
    /// Libraries in link order.
    #[serde(default)]
    pub link_libraries: Vec<LinkLibrary>,
    /// Library search directories.
    #[serde(default)]
    pub link_directories: Vec<String>,
    /// Other targets that must be built first.
    #[serde(default)]
    pub utilities: BTreeSet<String>,
    /// Commands run before anything else.
    #[serde(default)]
    pub pre_build: Vec<CustomCommand>,
    /// Commands run after compiling, before linking.
    #[serde(default)]
    pub pre_link: Vec<CustomCommand>,
    /// Commands run after linking.
    #[serde(default)]
    pub post_build: Vec<CustomCommand>,
}

const fn default_true() -> bool {
    true
}

impl Target {
    /// Target of `kind` with default properties.
    #[must_use]
    pub const fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            prefix: None,
            suffix: None,
            version: None,
            soversion: None,
            link_flags: None,
            compile_flags: None,
            static_library_flags: None,
            define_symbol: None,
            bundle: false,
            win32_executable: false,
            in_all: true,
            linker_language: None,
            sources: Vec::new(),
            link_libraries: Vec::new(),
            link_directories: Vec::new(),
            utilities: BTreeSet::new(),
            pre_build: Vec::new(),
            pre_link: Vec::new(),
            post_build: Vec::new(),
        }
    }
}

/// An enabled language and how its sources map to objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Language {
    /// Name used in variable keys, e.g. `CXX`.
    pub name: String,
    /// Extensions (without dot) compiled by this language.
    pub source_extensions: Vec<String>,
    /// Extension of produced objects, including the dot.
    #[serde(default = "default_object_extension")]
    pub object_extension: String,
    /// Higher values win when choosing a target's linker language.
    #[serde(default)]
    pub linker_preference: u32,
}

fn default_object_extension() -> String {
    ".o".into()
}

/// Whether a subdirectory is built before or after its siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryOrder {
    /// Built before the directory's own targets.
    Pre,
    /// Built after the directory's own targets.
    #[default]
    Post,
}

/// A subdirectory with its own generated script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryEntry {
    /// Path relative to the current binary directory.
    pub path: String,
    /// The directory takes part in this pass.
    #[serde(default = "default_true")]
    pub participates: bool,
    /// Ordering group.
    #[serde(default)]
    pub order: DirectoryOrder,
}

/// One node of the external dependency scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependNode {
    /// Resolved path; absent for hint-only nodes.
    #[serde(default)]
    pub path: Option<Utf8PathBuf>,
    /// Indices of the nodes this one includes directly.
    #[serde(default)]
    pub depends: Vec<usize>,
}

/// Raw dependency-scan result: an arena of nodes plus one root per source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependScan {
    /// Node arena.
    #[serde(default)]
    pub nodes: Vec<DependNode>,
    /// Source path to the index of its root node.
    #[serde(default)]
    pub roots: IndexMap<Utf8PathBuf, usize>,
}

/// The full input to a generation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    /// Version of the serialised model format.
    pub model_version: Version,
    /// Source directory of this script.
    pub source_dir: Utf8PathBuf,
    /// Binary directory of this script.
    pub binary_dir: Utf8PathBuf,
    /// Top-level source directory; defaults to `source_dir`.
    #[serde(default)]
    pub home_source_dir: Option<Utf8PathBuf>,
    /// Top-level binary directory; defaults to `binary_dir`.
    #[serde(default)]
    pub home_binary_dir: Option<Utf8PathBuf>,
    /// Configuration files the script was generated from.
    #[serde(default)]
    pub list_files: Vec<Utf8PathBuf>,
    /// Enabled languages.
    #[serde(default)]
    pub languages: Vec<Language>,
    /// Extensions that never get an object rule.
    #[serde(default)]
    pub ignored_extensions: Vec<String>,
    /// Toolchain and platform variables.
    #[serde(default)]
    pub variables: VariableStore,
    /// Source arena referenced by targets.
    #[serde(default)]
    pub sources: Vec<SourceFile>,
    /// Targets in declaration order.
    #[serde(default)]
    pub targets: IndexMap<String, Target>,
    /// Include directories shared by every compile.
    #[serde(default)]
    pub include_directories: Vec<String>,
    /// Preprocessor definitions shared by every compile.
    #[serde(default)]
    pub define_flags: String,
    /// Subdirectories built recursively.
    #[serde(default)]
    pub subdirectories: Vec<DirectoryEntry>,
    /// Dependency scan; absent when generating from the top.
    #[serde(default)]
    pub depend_scan: Option<DependScan>,
    /// Extra files removed by `clean`.
    #[serde(default)]
    pub additional_clean_files: Vec<String>,
    /// Generator options.
    #[serde(default)]
    pub options: GeneratorOptions,
}

impl Project {
    /// Empty model rooted at the given directories.
    #[must_use]
    pub fn new(source_dir: impl Into<Utf8PathBuf>, binary_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            model_version: Version::new(1, 0, 0),
            source_dir: source_dir.into(),
            binary_dir: binary_dir.into(),
            home_source_dir: None,
            home_binary_dir: None,
            list_files: Vec::new(),
            languages: Vec::new(),
            ignored_extensions: Vec::new(),
            variables: VariableStore::new(),
            sources: Vec::new(),
            targets: IndexMap::new(),
            include_directories: Vec::new(),
            define_flags: String::new(),
            subdirectories: Vec::new(),
            depend_scan: None,
            additional_clean_files: Vec::new(),
            options: GeneratorOptions::default(),
        }
    }

    /// Append `source` to the arena and return its id.
    pub fn add_source(&mut self, source: SourceFile) -> SourceId {
        self.sources.push(source);
        SourceId(self.sources.len() - 1)
    }

    /// Look up a source by id.
    #[must_use]
    pub fn source(&self, id: SourceId) -> Option<&SourceFile> {
        self.sources.get(id.0)
    }

    /// Iterate a target's sources, skipping dangling ids.
    pub fn target_sources<'a>(
        &'a self,
        target: &'a Target,
    ) -> impl Iterator<Item = (SourceId, &'a SourceFile)> + 'a {
        target
            .sources
            .iter()
            .filter_map(|id| self.source(*id).map(|src| (*id, src)))
    }

    /// Top-level source directory.
    #[must_use]
    pub fn home_source(&self) -> &Utf8Path {
        self.home_source_dir.as_deref().unwrap_or(self.source_dir.as_path())
    }

    /// Top-level binary directory.
    #[must_use]
    pub fn home_binary(&self) -> &Utf8Path {
        self.home_binary_dir.as_deref().unwrap_or(self.binary_dir.as_path())
    }

    /// Language compiling files with extension `ext`.
    #[must_use]
    pub fn language_for_extension(&self, ext: &str) -> Option<&Language> {
        self.languages
            .iter()
            .find(|lang| lang.source_extensions.iter().any(|e| e == ext))
    }

    /// Return `true` when `ext` never receives an object rule.
    #[must_use]
    pub fn is_ignored_extension(&self, ext: &str) -> bool {
        self.ignored_extensions.iter().any(|e| e == ext)
    }

    /// Language used to link `target`.
    ///
    /// An explicit `linker_language` wins; otherwise the language of the
    /// target's compiled sources with the highest preference is chosen,
    /// earlier sources winning ties.
    #[must_use]
    pub fn linker_language<'a>(&'a self, target: &'a Target) -> Option<&'a str> {
        if let Some(lang) = target.linker_language.as_deref() {
            return Some(lang);
        }
        let mut best: Option<&Language> = None;
        for (_, src) in self.target_sources(target) {
            if src.header_only {
                continue;
            }
            let Some(lang) = self.language_for_extension(src.extension()) else {
                continue;
            };
            if best.is_none_or(|current| lang.linker_preference > current.linker_preference) {
                best = Some(lang);
            }
        }
        best.map(|lang| lang.name.as_str())
    }

    /// Check every source reference.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::UnknownSource`] for the first dangling id.
    pub fn validate(&self) -> Result<(), GenerateError> {
        for (name, target) in &self.targets {
            if let Some(bad) = target.sources.iter().find(|id| id.0 >= self.sources.len()) {
                return Err(GenerateError::UnknownSource {
                    target: name.clone(),
                    index: bad.0,
                    len: self.sources.len(),
                });
            }
        }
        Ok(())
    }
}

/// Parse a model from YAML text.
///
/// # Errors
///
/// Returns an error when the text is not a valid model or its version is
/// unsupported.
pub fn from_yaml_str(yaml: &str) -> Result<Project> {
    let project: Project = serde_saphyr::from_str(yaml).context("parse YAML model")?;
    check_version(&project)?;
    Ok(project)
}

/// Parse a model from JSON text.
///
/// # Errors
///
/// Returns an error when the text is not a valid model or its version is
/// unsupported.
pub fn from_json_str(json: &str) -> Result<Project> {
    let project: Project = serde_json::from_str(json).context("parse JSON model")?;
    check_version(&project)?;
    Ok(project)
}

/// Load a model from `path`, choosing the format by extension.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed.
pub fn from_path(path: &Utf8Path) -> Result<Project> {
    let text = fs::read_to_string(path).with_context(|| format!("read model {path}"))?;
    let parsed = if path.extension() == Some("json") {
        from_json_str(&text)
    } else {
        from_yaml_str(&text)
    };
    parsed.with_context(|| format!("load model {path}"))
}

fn check_version(project: &Project) -> Result<()> {
    ensure!(
        project.model_version.major == 1,
        "unsupported model_version {}; expected 1.x",
        project.model_version
    );
    Ok(())
}
