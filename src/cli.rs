//! Command line interface definition using clap.
//!
//! Generator options are layered with `OrthoConfig`: defaults, then the
//! model's `options:` block, then `KUMIKO_*` environment variables and
//! finally the flags given here.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use ortho_config::declarative::LayerComposition;
use ortho_config::figment::{Figment, providers::Env};
use ortho_config::uncased::Uncased;
use ortho_config::{MergeComposer, OrthoConfig, OrthoMergeExt, OrthoResult, sanitize_value};
use serde::Serialize;

use crate::config::GeneratorOptions;

/// Shortest variable-name limit that still leaves room for a hashed suffix.
const MIN_VARIABLE_LENGTH: usize = 16;

/// Model file used when `--model` is omitted.
pub const DEFAULT_MODEL: &str = "kumiko.yaml";

/// Prefix of environment variables that override generator options.
pub const ENV_PREFIX: &str = "KUMIKO_";

/// Option keys read from the environment. Other `KUMIKO_*` variables are
/// ignored rather than rejected as unknown fields.
const ENV_KEYS: [&str; 17] = [
    "max_variable_length",
    "mangle_object_names",
    "keep_lib_prefix",
    "pass_makeflags",
    "make_silent_flag",
    "include_directive",
    "verbose_makefile",
    "testing_enabled",
    "library_output_path",
    "executable_output_path",
    "depend_file",
    "check_depend_file",
    "install_script",
    "cache_file",
    "check_cache_file",
    "relative_paths",
    "depends_present",
];

fn parse_variable_length(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("{s} is not a valid number"))?;
    if value >= MIN_VARIABLE_LENGTH {
        Ok(value)
    } else {
        Err(format!(
            "variable names must be allowed at least {MIN_VARIABLE_LENGTH} characters"
        ))
    }
}

/// Synthesise Unix Makefiles from a resolved build-target model.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute; defaults to `generate` when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Parse command-line arguments, providing `generate` as the default
    /// command.
    #[must_use]
    pub fn parse_with_default() -> Self {
        Self::parse().with_default_command()
    }

    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Generate(GenerateArgs::default()));
        }
        self
    }
}

/// Arguments accepted by the `generate` command.
#[derive(Debug, Args, PartialEq, Eq, Clone)]
pub struct GenerateArgs {
    /// Serialised model to read; `.json` files are parsed as JSON, anything
    /// else as YAML.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MODEL)]
    pub model: Utf8PathBuf,

    /// Directory receiving the script; defaults to the model's binary
    /// directory.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<Utf8PathBuf>,

    /// Option overrides; unset flags leave lower layers in place.
    #[command(flatten)]
    pub options: OptionFlags,
}

impl Default for GenerateArgs {
    fn default() -> Self {
        Self {
            model: Utf8PathBuf::from(DEFAULT_MODEL),
            output_dir: None,
            options: OptionFlags::default(),
        }
    }
}

/// Command-line layer over [`GeneratorOptions`].
///
/// Switches accept an optional value, so `--testing` turns testing on and
/// `--testing=false` turns it off even when the model enables it.
#[derive(Debug, Args, PartialEq, Eq, Clone, Default, Serialize)]
pub struct OptionFlags {
    /// Write paths beneath the binary directory relative to it.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_paths: Option<bool>,

    /// Rewrite awkward characters in object file names.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mangle_object_names: Option<bool>,

    /// Limit generated variable names to this many characters.
    #[arg(long, value_name = "N", value_parser = parse_variable_length)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_variable_length: Option<usize>,

    /// Keep command echoing enabled in the generated script.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_makefile: Option<bool>,

    /// Emit a `test` rule.
    #[arg(long = "testing", value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testing_enabled: Option<bool>,

    /// Keep the `lib` prefix when turning library paths into link flags.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_lib_prefix: Option<bool>,

    /// Pass `$(MAKEFLAGS)` explicitly to recursive makes.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_makeflags: Option<bool>,

    /// Include the dependency fragment left by an earlier run.
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_present: Option<bool>,

    /// Directory that receives every library.
    #[arg(long, value_name = "DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_output_path: Option<Utf8PathBuf>,

    /// Directory that receives every executable.
    #[arg(long, value_name = "DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_output_path: Option<Utf8PathBuf>,
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Write the Makefile and dependency fragments for a model.
    Generate(GenerateArgs),

    /// Load and validate a model without writing anything.
    Check {
        /// Serialised model to check.
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_MODEL)]
        model: Utf8PathBuf,
    },
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
}

/// Return `true` when no overrides were supplied by a layer.
fn is_empty_value(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Object(map) if map.is_empty())
}

/// Environment layer restricted to known option keys.
fn environment_layer() -> OrthoResult<serde_json::Value> {
    let provider = env_provider().map(|key| Uncased::new(key.as_str().to_ascii_lowercase()));
    let mut value = Figment::from(provider)
        .extract::<serde_json::Value>()
        .into_ortho_merge()?;
    if let Some(map) = value.as_object_mut() {
        map.retain(|key, _| ENV_KEYS.contains(&key.as_str()));
    }
    Ok(value)
}

/// Merge the environment and `flags` over the model's `options:` block.
///
/// # Errors
///
/// Returns an [`ortho_config::OrthoError`] if a layer cannot be read or the
/// merged value does not describe valid options.
pub fn merge_options(model: &GeneratorOptions, flags: &OptionFlags) -> OrthoResult<GeneratorOptions> {
    compose_options(model, environment_layer(), flags)
}

/// Layer `model`, `environment` and `flags` over the defaults, later layers
/// winning.
///
/// # Errors
///
/// Returns an [`ortho_config::OrthoError`] if any layer failed or the merge
/// is rejected.
pub fn compose_options(
    model: &GeneratorOptions,
    environment: OrthoResult<serde_json::Value>,
    flags: &OptionFlags,
) -> OrthoResult<GeneratorOptions> {
    let mut errors = Vec::new();
    let mut composer = MergeComposer::with_capacity(4);

    match sanitize_value(&GeneratorOptions::default()) {
        Ok(value) => composer.push_defaults(value),
        Err(err) => errors.push(err),
    }
    match sanitize_value(model) {
        Ok(value) => composer.push_file(value, None),
        Err(err) => errors.push(err),
    }
    match environment {
        Ok(value) if !is_empty_value(&value) => composer.push_environment(value),
        Ok(_) => {}
        Err(err) => errors.push(err),
    }
    match sanitize_value(flags) {
        Ok(value) if !is_empty_value(&value) => composer.push_cli(value),
        Ok(_) => {}
        Err(err) => errors.push(err),
    }

    let composition = LayerComposition::new(composer.layers(), errors);
    composition.into_merge_result(GeneratorOptions::merge_from_layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn generate_args(args: &[&str]) -> GenerateArgs {
        let argv = ["kumiko", "generate"].into_iter().chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv).expect("parse");
        let Some(Commands::Generate(args)) = cli.command else {
            panic!("expected generate");
        };
        args
    }

    #[test]
    fn defaults_to_generate() {
        let cli = Cli::try_parse_from(["kumiko"])
            .expect("parse")
            .with_default_command();
        assert_eq!(
            cli.command,
            Some(Commands::Generate(GenerateArgs::default()))
        );
    }

    #[test]
    fn flags_override_model_options() {
        let args = generate_args(&[
            "--model",
            "build/model.json",
            "--relative-paths",
            "--testing",
            "--max-variable-length",
            "32",
            "--library-output-path",
            "/out/lib",
        ]);
        assert_eq!(args.model, Utf8PathBuf::from("build/model.json"));
        let model = GeneratorOptions {
            mangle_object_names: true,
            ..GeneratorOptions::default()
        };
        let options = compose_options(&model, Ok(json!({})), &args.options).expect("merge");
        assert!(options.relative_paths);
        assert!(options.testing_enabled);
        assert!(options.mangle_object_names);
        assert_eq!(options.max_variable_length, Some(32));
        assert_eq!(
            options.library_output_path,
            Some(Utf8PathBuf::from("/out/lib"))
        );
        assert_eq!(options.executable_output_path, None);
    }

    #[rstest]
    #[case(&["--verbose-makefile=false"], false)]
    #[case(&["--verbose-makefile"], true)]
    #[case(&[], true)]
    fn switches_can_turn_model_options_off(#[case] flags: &[&str], #[case] expected: bool) {
        let args = generate_args(flags);
        let model = GeneratorOptions {
            verbose_makefile: true,
            ..GeneratorOptions::default()
        };
        let options = compose_options(&model, Ok(json!({})), &args.options).expect("merge");
        assert_eq!(options.verbose_makefile, expected);
    }

    #[test]
    fn later_layers_take_precedence() {
        let model = GeneratorOptions {
            max_variable_length: Some(24),
            depend_file: "model.depends".into(),
            ..GeneratorOptions::default()
        };
        let environment = json!({
            "max_variable_length": 40,
            "relative_paths": true,
            "cache_file": "EnvCache.txt",
        });
        let flags = OptionFlags {
            max_variable_length: Some(32),
            relative_paths: Some(false),
            ..OptionFlags::default()
        };
        let options = compose_options(&model, Ok(environment), &flags).expect("merge");
        assert_eq!(options.max_variable_length, Some(32));
        assert!(!options.relative_paths);
        assert_eq!(options.cache_file, "EnvCache.txt");
        assert_eq!(options.depend_file, "model.depends");
        assert_eq!(options.include_directive, "include");
    }

    #[test]
    fn unset_flags_serialise_to_an_empty_layer() {
        let value = sanitize_value(&OptionFlags::default()).expect("sanitise");
        assert!(is_empty_value(&value));
    }

    #[rstest]
    #[case("8")]
    #[case("many")]
    fn rejects_bad_variable_lengths(#[case] value: &str) {
        let result = Cli::try_parse_from(["kumiko", "generate", "--max-variable-length", value]);
        assert!(result.is_err());
    }
}
