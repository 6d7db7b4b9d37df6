//! Generator options.
//!
//! Options may be embedded in the serialised model under `options:`. The
//! model's values are layered over the defaults, then `KUMIKO_*` environment
//! variables and finally command-line flags (see [`crate::cli::merge_options`]).

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

/// Name of the primary build script.
pub const MAKEFILE_NAME: &str = "Makefile";

const DEFAULT_INCLUDE_DIRECTIVE: &str = "include";
const DEFAULT_DEPEND_FILE: &str = "kumiko.depends";
const DEFAULT_CHECK_DEPEND_FILE: &str = "kumiko.check_depends";
const DEFAULT_INSTALL_SCRIPT: &str = "kumiko_install.script";
const DEFAULT_CACHE_FILE: &str = "KumikoCache.txt";
const DEFAULT_CHECK_CACHE_FILE: &str = "kumiko.check_cache";

/// Knobs controlling a single generation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[serde(default, deny_unknown_fields)]
#[ortho_config(prefix = "KUMIKO")]
pub struct GeneratorOptions {
    /// Maximum length of generated make variable names. `None` means
    /// unlimited.
    pub max_variable_length: Option<usize>,
    /// Rewrite characters such as `+` in object file names.
    #[ortho_config(default = false)]
    pub mangle_object_names: bool,
    /// Re-add the `lib` prefix when a full library path is turned into a
    /// link flag.
    #[ortho_config(default = false)]
    pub keep_lib_prefix: bool,
    /// Pass `$(MAKEFLAGS)` explicitly to the recursive `all` invocation.
    #[ortho_config(default = false)]
    pub pass_makeflags: bool,
    /// Flag passed to recursive makes to keep them quiet.
    #[ortho_config(default = String::new())]
    pub make_silent_flag: String,
    /// Directive used to pull in the dependency fragment.
    #[ortho_config(default = String::from(DEFAULT_INCLUDE_DIRECTIVE))]
    pub include_directive: String,
    /// Leave command echoing enabled in the generated script.
    #[ortho_config(default = false)]
    pub verbose_makefile: bool,
    /// Emit a `test` rule.
    #[ortho_config(default = false)]
    pub testing_enabled: bool,
    /// Directory that receives every library, when set.
    pub library_output_path: Option<Utf8PathBuf>,
    /// Directory that receives every executable, when set.
    pub executable_output_path: Option<Utf8PathBuf>,
    /// File name of the object dependency fragment.
    #[ortho_config(default = String::from(DEFAULT_DEPEND_FILE))]
    pub depend_file: String,
    /// File name of the self-regenerating check fragment.
    #[ortho_config(default = String::from(DEFAULT_CHECK_DEPEND_FILE))]
    pub check_depend_file: String,
    /// Script run by the `install` rule.
    #[ortho_config(default = String::from(DEFAULT_INSTALL_SCRIPT))]
    pub install_script: String,
    /// Name of the configuration cache in the top-level build directory.
    #[ortho_config(default = String::from(DEFAULT_CACHE_FILE))]
    pub cache_file: String,
    /// Name of the stamp proving the cache is current.
    #[ortho_config(default = String::from(DEFAULT_CHECK_CACHE_FILE))]
    pub check_cache_file: String,
    /// Write paths beneath the binary directory relative to it.
    #[ortho_config(default = false)]
    pub relative_paths: bool,
    /// A dependency fragment from an earlier pass is already on disk.
    #[ortho_config(default = false)]
    pub depends_present: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            max_variable_length: None,
            mangle_object_names: false,
            keep_lib_prefix: false,
            pass_makeflags: false,
            make_silent_flag: String::new(),
            include_directive: DEFAULT_INCLUDE_DIRECTIVE.into(),
            verbose_makefile: false,
            testing_enabled: false,
            library_output_path: None,
            executable_output_path: None,
            depend_file: DEFAULT_DEPEND_FILE.into(),
            check_depend_file: DEFAULT_CHECK_DEPEND_FILE.into(),
            install_script: DEFAULT_INSTALL_SCRIPT.into(),
            cache_file: DEFAULT_CACHE_FILE.into(),
            check_cache_file: DEFAULT_CHECK_CACHE_FILE.into(),
            relative_paths: false,
            depends_present: false,
        }
    }
}

impl GeneratorOptions {
    /// Library output directory with a trailing `/`, or the empty string.
    #[must_use]
    pub fn library_prefix(&self) -> String {
        dir_prefix(self.library_output_path.as_ref())
    }

    /// Executable output directory with a trailing `/`, or the empty string.
    #[must_use]
    pub fn executable_prefix(&self) -> String {
        dir_prefix(self.executable_output_path.as_ref())
    }

    /// The configured library and executable output directories, without a
    /// trailing `/` and each listed once.
    ///
    /// Both are searched at link time and created before the script runs.
    #[must_use]
    pub fn output_directories(&self) -> Vec<Utf8PathBuf> {
        let mut dirs: Vec<Utf8PathBuf> = Vec::new();
        let configured = [&self.library_output_path, &self.executable_output_path];
        for path in configured.into_iter().flatten() {
            let trimmed = path.as_str().trim_end_matches('/');
            let dir = if trimmed.is_empty() && !path.as_str().is_empty() {
                Utf8PathBuf::from("/")
            } else {
                Utf8PathBuf::from(trimmed)
            };
            if !dir.as_str().is_empty() && !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

fn dir_prefix(dir: Option<&Utf8PathBuf>) -> String {
    match dir.map(|p| p.as_str()) {
        None | Some("") => String::new(),
        Some(path) if path.ends_with('/') => path.to_owned(),
        Some(path) => format!("{path}/"),
    }
}
