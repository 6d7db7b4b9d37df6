//! Synthesis of the library portion of a link command.
//!
//! Search directories are emitted once each, library paths are split into a
//! search flag plus a bare link name, and runtime search paths are collected
//! for platforms that embed them.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use crate::error::GenerateError;
use crate::model::{Target, TargetKind};
use crate::paths::PathFormatter;
use crate::vars::VariableStore;

#[expect(clippy::expect_used, reason = "pattern is a literal")]
static RAW_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*-[lWRB]|[ \t]*-framework|\$\{|[ \t]*-pthread|[ \t]*`")
        .expect("raw flag pattern")
});

#[expect(clippy::expect_used, reason = "pattern is a literal")]
static PREFIXED_LIBRARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^lib([^/]*)(\.so|\.lib|\.dll|\.sl|\.a|\.dylib)").expect("library pattern")
});

#[expect(clippy::expect_used, reason = "pattern is a literal")]
static BARE_LIBRARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([^/]*)(\.so|\.lib|\.dll|\.sl|\.a|\.dylib)").expect("library pattern")
});

/// Library flags for one link command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkLine {
    /// Search-path and library flags in emission order.
    pub flags: Vec<String>,
    /// Directories recorded for runtime lookup.
    pub runtime_paths: Vec<String>,
    runtime_flag: String,
    runtime_separator: Option<String>,
    standard_libraries: Option<String>,
}

impl LinkLine {
    /// The runtime search-path fragment, if any path was recorded.
    #[must_use]
    pub fn runtime_fragment(&self) -> Option<String> {
        if self.runtime_paths.is_empty() {
            return None;
        }
        let flag = &self.runtime_flag;
        let fragment = match self.runtime_separator.as_deref() {
            Some(sep) => format!("{flag}{}", self.runtime_paths.join(sep)),
            None => self
                .runtime_paths
                .iter()
                .map(|path| format!("{flag}{path}"))
                .collect::<Vec<_>>()
                .join(" "),
        };
        Some(fragment)
    }
}

impl fmt::Display for LinkLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runtime = self.runtime_fragment();
        let parts = self
            .flags
            .iter()
            .map(String::as_str)
            .chain(runtime.as_deref())
            .chain(self.standard_libraries.as_deref())
            .filter(|part| !part.is_empty());
        write!(f, "{}", itertools::join(parts, " "))
    }
}

/// Builds link lines for the targets of one generation pass.
#[derive(Debug)]
pub struct LinkLineBuilder<'a> {
    vars: &'a VariableStore,
    paths: &'a PathFormatter,
    build_type: String,
    keep_lib_prefix: bool,
    output_directories: Vec<String>,
}

impl<'a> LinkLineBuilder<'a> {
    /// Builder reading platform values from `vars`.
    ///
    /// The active configuration is taken from `BUILD_TYPE`.
    #[must_use]
    pub fn new(vars: &'a VariableStore, paths: &'a PathFormatter, keep_lib_prefix: bool) -> Self {
        Self {
            vars,
            paths,
            build_type: vars.get_safe("BUILD_TYPE").to_owned(),
            keep_lib_prefix,
            output_directories: Vec::new(),
        }
    }

    /// Also search `dirs`, after each target's own link directories.
    ///
    /// Used for the library and executable output directories so targets
    /// find the libraries built alongside them.
    #[must_use]
    pub fn with_output_directories<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_directories = dirs.into_iter().map(Into::into).collect();
        self
    }

    /// Compose the library flags for target `name` linked by `language`.
    ///
    /// Entries equal to `exclude_self` are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::MissingVariable`] when `LIBRARY_PATH_FLAG` is
    /// undefined.
    pub fn build(
        &self,
        name: &str,
        target: &Target,
        language: &str,
        exclude_self: Option<&str>,
    ) -> Result<LinkLine, GenerateError> {
        let vars = self.vars;
        let path_flag = vars.required("LIBRARY_PATH_FLAG", name)?;
        let link_flag = vars.get_safe("LINK_LIBRARY_FLAG");
        let link_suffix = vars.get_safe("LINK_LIBRARY_SUFFIX");

        let runtime_var = format!("SHARED_LIBRARY_RUNTIME_{language}_FLAG");
        let runtime_flag = vars.get_safe(&runtime_var).to_owned();
        let runtime_separator = vars
            .get(&format!("{runtime_var}_SEP"))
            .filter(|sep| !sep.is_empty())
            .map(str::to_owned);
        let embed_runtime = !runtime_flag.is_empty() && !vars.is_on("SKIP_RPATH");

        let mut emitted: HashSet<String> = ["", "/usr/lib"].into_iter().map(str::to_owned).collect();
        emitted.extend(vars.list("IMPLICIT_LINK_DIRECTORIES").into_iter().map(str::to_owned));

        let mut line = LinkLine {
            runtime_flag,
            runtime_separator,
            standard_libraries: vars.get("STANDARD_LIBRARIES").map(str::to_owned),
            ..LinkLine::default()
        };
        if target.kind == TargetKind::Executable {
            line.flags.push(
                vars.get_safe(&format!("SHARED_LIBRARY_LINK_{language}_FLAGS"))
                    .to_owned(),
            );
        }

        let directories = target
            .link_directories
            .iter()
            .chain(&self.output_directories);
        for dir in directories {
            let libpath = self.paths.output(dir);
            if !emitted.insert(libpath.clone()) {
                continue;
            }
            let already_flagged = !path_flag.is_empty() && dir.starts_with(path_flag);
            if already_flagged || dir.contains("${") {
                line.flags.push(libpath);
            } else {
                line.flags.push(format!("{path_flag}{libpath}"));
                if embed_runtime {
                    line.runtime_paths.push(libpath);
                }
            }
        }

        let mut libraries = Vec::new();
        for lib in &target.link_libraries {
            let entry = lib.name.as_str();
            if exclude_self.is_some_and(|own| own == entry)
                || !lib.config.applies_to(&self.build_type)
                || entry.is_empty()
            {
                continue;
            }
            let raw = RAW_FLAG.is_match(entry);
            if raw || !entry.contains('/') {
                let flag = if raw { "" } else { link_flag };
                libraries.push(format!("{flag}{}", with_suffix(entry, link_suffix)));
                continue;
            }

            let (dir, file) = entry.rsplit_once('/').unwrap_or(("", entry));
            let dir = if dir.is_empty() { "/" } else { dir };
            let libpath = self.paths.output(dir);
            if emitted.insert(libpath.clone()) {
                line.flags.push(format!("{path_flag}{libpath}"));
                if embed_runtime {
                    line.runtime_paths.push(libpath);
                }
            }
            libraries.push(self.library_flag(entry, file, link_flag, link_suffix));
        }
        line.flags.extend(libraries);
        Ok(line)
    }

    /// Recover the bare link name from a library file name.
    fn library_flag(&self, entry: &str, file: &str, link_flag: &str, link_suffix: &str) -> String {
        if let Some(caps) = PREFIXED_LIBRARY.captures(file)
            && let Some(stem) = caps.get(1)
        {
            let stem = if self.keep_lib_prefix {
                format!("lib{}", stem.as_str())
            } else {
                stem.as_str().to_owned()
            };
            return format!("{link_flag}{}", with_suffix(&stem, link_suffix));
        }
        if let Some(caps) = BARE_LIBRARY.captures(file)
            && let Some(stem) = caps.get(1)
        {
            return format!("{link_flag}{}", with_suffix(stem.as_str(), link_suffix));
        }
        entry.to_owned()
    }
}

fn with_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() || name.ends_with(suffix) {
        name.to_owned()
    } else {
        format!("{name}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinkConfig, LinkLibrary};
    use rstest::{fixture, rstest};

    #[fixture]
    fn vars() -> VariableStore {
        [
            ("LIBRARY_PATH_FLAG", "-L"),
            ("LINK_LIBRARY_FLAG", "-l"),
            ("SHARED_LIBRARY_RUNTIME_C_FLAG", "-Wl,-rpath,"),
            ("SHARED_LIBRARY_RUNTIME_C_FLAG_SEP", ":"),
            ("SHARED_LIBRARY_LINK_C_FLAGS", "-rdynamic"),
            ("BUILD_TYPE", "Release"),
        ]
        .into_iter()
        .collect()
    }

    fn formatter() -> PathFormatter {
        PathFormatter::new("/build", false)
    }

    fn library(libs: &[(&str, LinkConfig)]) -> Target {
        let mut target = Target::new(TargetKind::SharedLibrary);
        target.link_libraries = libs
            .iter()
            .map(|(name, config)| LinkLibrary {
                name: (*name).to_owned(),
                config: *config,
            })
            .collect();
        target
    }

    fn render(vars: &VariableStore, target: &Target, exclude: Option<&str>) -> String {
        let paths = formatter();
        let builder = LinkLineBuilder::new(vars, &paths, false);
        builder
            .build("foo", target, "C", exclude)
            .expect("link line")
            .to_string()
    }

    #[rstest]
    fn never_links_itself(vars: VariableStore) {
        let target = library(&[("foo", LinkConfig::Always), ("m", LinkConfig::Always)]);
        let line = render(&vars, &target, Some("foo"));
        assert_eq!(line, "-lm");
        assert!(!line.contains("-lfoo"));
    }

    #[rstest]
    #[case("Debug", "-ldbg")]
    #[case("Release", "-lopt")]
    fn configuration_filters(mut vars: VariableStore, #[case] build: &str, #[case] expected: &str) {
        vars.set("BUILD_TYPE", build);
        let target = library(&[
            ("dbg", LinkConfig::DebugOnly),
            ("opt", LinkConfig::OptimizedOnly),
        ]);
        assert_eq!(render(&vars, &target, None), expected);
    }

    #[rstest]
    fn full_paths_split_into_search_flag_and_name(vars: VariableStore) {
        let target = library(&[
            ("/opt/x/lib/libz.so.1", LinkConfig::Always),
            ("/opt/x/lib/bar.a", LinkConfig::Always),
            ("/opt/x/lib/weird.obj", LinkConfig::Always),
        ]);
        assert_eq!(
            render(&vars, &target, None),
            "-L/opt/x/lib -lz -lbar /opt/x/lib/weird.obj -Wl,-rpath,/opt/x/lib"
        );
    }

    #[rstest]
    fn raw_flags_pass_through(vars: VariableStore) {
        let target = library(&[
            ("-lpthread", LinkConfig::Always),
            ("-framework Cocoa", LinkConfig::Always),
            ("${EXTRA}/libq.a", LinkConfig::Always),
            ("", LinkConfig::Always),
        ]);
        assert_eq!(
            render(&vars, &target, None),
            "-lpthread -framework Cocoa ${EXTRA}/libq.a"
        );
    }

    #[rstest]
    fn search_paths_are_emitted_once(vars: VariableStore) {
        let mut target = library(&[("/usr/lib/libc.so", LinkConfig::Always)]);
        target.link_directories = vec![
            "/opt/a".into(),
            "/opt/a".into(),
            "/usr/lib".into(),
            "/opt/b".into(),
        ];
        let line = render(&vars, &target, None);
        assert_eq!(line, "-L/opt/a -L/opt/b -lc -Wl,-rpath,/opt/a:/opt/b");
        assert_eq!(line.matches("-L/opt/a").count(), 1);
    }

    #[rstest]
    fn runtime_flag_repeats_without_separator(mut vars: VariableStore) {
        vars.set("SHARED_LIBRARY_RUNTIME_C_FLAG_SEP", "");
        vars.set("SHARED_LIBRARY_RUNTIME_C_FLAG", "-R");
        let mut target = library(&[]);
        target.link_directories = vec!["/a".into(), "/b".into()];
        assert_eq!(render(&vars, &target, None), "-L/a -L/b -R/a -R/b");
    }

    #[rstest]
    fn skip_rpath_disables_runtime_paths(mut vars: VariableStore) {
        vars.set("SKIP_RPATH", "ON");
        let mut target = library(&[]);
        target.link_directories = vec!["/a".into()];
        assert_eq!(render(&vars, &target, None), "-L/a");
    }

    #[rstest]
    fn executables_get_shared_link_flags_and_standard_libraries(mut vars: VariableStore) {
        vars.set("STANDARD_LIBRARIES", "-lstdc++");
        let mut target = library(&[("m", LinkConfig::Always)]);
        target.kind = TargetKind::Executable;
        assert_eq!(render(&vars, &target, None), "-rdynamic -lm -lstdc++");
    }

    #[rstest]
    fn keep_prefix_restores_lib(vars: VariableStore) {
        let target = library(&[("/x/libfoo.lib", LinkConfig::Always)]);
        let paths = formatter();
        let line = LinkLineBuilder::new(&vars, &paths, true)
            .build("app", &target, "C", None)
            .expect("link line");
        assert!(line.flags.contains(&"-llibfoo".to_owned()), "{line}");
    }

    #[rstest]
    fn link_suffix_is_appended_once(mut vars: VariableStore) {
        vars.set("LINK_LIBRARY_FLAG", "");
        vars.set("LINK_LIBRARY_SUFFIX", ".lib");
        let target = library(&[("kernel32", LinkConfig::Always), ("user32.lib", LinkConfig::Always)]);
        assert_eq!(render(&vars, &target, None), "kernel32.lib user32.lib");
    }

    #[rstest]
    fn output_directories_follow_target_directories(vars: VariableStore) {
        let mut target = library(&[("util", LinkConfig::Always)]);
        target.link_directories = vec!["/opt/a".into(), "/build/lib".into()];
        let paths = formatter();
        let line = LinkLineBuilder::new(&vars, &paths, false)
            .with_output_directories(["/build/lib", "/build/bin"])
            .build("app", &target, "C", None)
            .expect("link line")
            .to_string();
        assert_eq!(
            line,
            "-L/opt/a -L/build/lib -L/build/bin -lutil -Wl,-rpath,/opt/a:/build/lib:/build/bin"
        );
    }

    #[test]
    fn requires_library_path_flag() {
        let vars = VariableStore::new();
        let paths = formatter();
        let err = LinkLineBuilder::new(&vars, &paths, false)
            .build("foo", &library(&[]), "C", None)
            .expect_err("missing path flag");
        assert!(err.is_fatal());
    }
}
