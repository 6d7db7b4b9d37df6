//! Unix Makefile generator.
//!
//! [`generate`] drives one pass over a resolved [`Project`]: it writes the
//! scaffolding, the per-target variables and rules, one rule per custom
//! command output, the subdirectory descent rules and, when a dependency scan
//! is supplied, the two dependency fragments. All memo tables live in the
//! pass and are dropped with it.

mod objects;
pub mod rule;
mod targets;

use camino::Utf8PathBuf;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write;
use tracing::{debug, warn};

use crate::config::{GeneratorOptions, MAKEFILE_NAME};
use crate::error::GenerateError;
use crate::model::{CustomCommand, Project, Target, TargetKind};
use crate::naming::{TargetNames, resolve_names};
use crate::paths::PathFormatter;
use crate::sanitize::NameSanitizer;
use crate::subdirs::{DescentBlock, standard_groups};
use crate::template::TemplateExpander;
use crate::vars::VariableStore;

use rule::{MakeRule, RuleSink};

/// Recipe that reruns the generator for the current directory.
const REGENERATE: &str = "$(GENERATOR_COMMAND) -S$(CURRENT_SOURCE) -O$(CURRENT_BINARY) \
                          -H$(SOURCE_DIR) -B$(BINARY_DIR)";
/// Recipe that refreshes the configuration cache.
const REBUILD_CACHE: &str = "$(GENERATOR_COMMAND) -H$(SOURCE_DIR) -B$(BINARY_DIR)";

/// Text produced by one generation pass.
#[derive(Debug, Default)]
pub struct Generated {
    /// The primary build script.
    pub makefile: String,
    /// Object to header edges; present when a dependency scan was supplied.
    pub depends: Option<String>,
    /// Tag fragment rerunning dependency generation when a header changes.
    pub check_depends: Option<String>,
    /// Directories that must exist before objects are compiled into them.
    pub directories: Vec<Utf8PathBuf>,
    /// Problems reported without aborting the pass.
    pub diagnostics: Vec<GenerateError>,
}

/// Generate the Makefile and dependency fragments for `project`.
///
/// # Errors
///
/// Returns the first fatal error: a dangling source reference, a missing
/// required variable, a target without linker language, an exhausted
/// variable name or a malformed dependency scan. Other problems are collected
/// in [`Generated::diagnostics`].
pub fn generate(project: &Project, options: &GeneratorOptions) -> Result<Generated, GenerateError> {
    project.validate()?;
    let mut pass = Pass::new(project, options);
    let fragments = project
        .depend_scan
        .as_ref()
        .map(|scan| pass.depend_fragments(scan))
        .transpose()?;
    let makefile = pass.makefile(fragments.is_some())?;
    let (depends, check_depends) = fragments.unzip();
    debug!(
        targets = project.targets.len(),
        diagnostics = pass.diagnostics.len(),
        "generation pass finished"
    );
    Ok(Generated {
        makefile,
        depends,
        check_depends,
        directories: pass.directories.into_iter().collect(),
        diagnostics: pass.diagnostics,
    })
}

/// State of one generation pass.
struct Pass<'a> {
    project: &'a Project,
    options: &'a GeneratorOptions,
    vars: &'a VariableStore,
    paths: PathFormatter,
    expander: TemplateExpander<'a>,
    names: NameSanitizer,
    include_flags: HashMap<String, String>,
    emitted_objects: HashSet<String>,
    directories: BTreeSet<Utf8PathBuf>,
    diagnostics: Vec<GenerateError>,
    build_type: String,
    library_prefix: String,
    executable_prefix: String,
}

impl<'a> Pass<'a> {
    fn new(project: &'a Project, options: &'a GeneratorOptions) -> Self {
        let vars = &project.variables;
        let paths = PathFormatter::new(project.binary_dir.clone(), options.relative_paths);
        let expander = TemplateExpander::new(
            vars,
            project.languages.iter().map(|lang| lang.name.as_str()),
            &paths,
            project.source_dir.as_str(),
            project.binary_dir.as_str(),
        );
        Self {
            project,
            options,
            vars,
            paths,
            expander,
            names: NameSanitizer::new(options.max_variable_length, options.mangle_object_names),
            include_flags: HashMap::new(),
            emitted_objects: HashSet::new(),
            directories: options.output_directories().into_iter().collect(),
            diagnostics: Vec::new(),
            build_type: vars.get_safe("BUILD_TYPE").to_ascii_uppercase(),
            library_prefix: options.library_prefix(),
            executable_prefix: options.executable_prefix(),
        }
    }

    fn report(&mut self, err: GenerateError) {
        warn!(error = %err, "generation problem");
        self.diagnostics.push(err);
    }

    fn binary_dir(&self) -> &'a str {
        self.project.binary_dir.as_str()
    }

    fn generator_command(&self) -> Result<String, GenerateError> {
        let command = self.vars.required("GENERATOR_COMMAND", MAKEFILE_NAME)?;
        Ok(self.paths.output(command))
    }

    fn target_names(&self, name: &str, target: &Target) -> TargetNames {
        resolve_names(name, target, self.vars, self.project.linker_language(target))
    }

    /// `<name>_TARGET_DIR` when the front end placed `name` elsewhere.
    fn target_dir(&self, name: &str) -> Option<&'a str> {
        self.vars
            .get(&format!("{name}_TARGET_DIR"))
            .filter(|dir| !dir.is_empty())
    }

    /// One recipe line per custom command: program, then arguments.
    fn custom_command_lines(&self, commands: &[CustomCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|custom| {
                let program = self.paths.output(&self.vars.expand(&custom.command));
                join_flags([program, self.vars.expand(&custom.arguments)])
            })
            .collect()
    }

    fn check_cache_path(&self) -> String {
        let path = self
            .project
            .home_binary()
            .join(&self.options.check_cache_file);
        self.paths.output(path.as_str())
    }

    fn cache_path(&self) -> String {
        let path = self.project.home_binary().join(&self.options.cache_file);
        self.paths.output(path.as_str())
    }

    fn makefile(&mut self, fragments_written: bool) -> Result<String, GenerateError> {
        let mut out = String::new();
        self.write_header(&mut out)?;
        out.push_str(&self.make_variables()?);
        self.write_default_target(&mut out)?;
        if !self.options.verbose_makefile {
            out.comment("Suppresses display of executed commands")?;
            out.push_str("$(VERBOSE).SILENT:\n\n");
        }
        self.write_target_variables(&mut out)?;
        self.write_depend_libs(&mut out)?;
        self.write_target_rules(&mut out)?;
        self.write_subdirectory_rules(&mut out)?;
        self.write_custom_rules(&mut out)?;
        self.write_make_rules(&mut out)?;
        if fragments_written || self.options.depends_present {
            writeln!(
                out,
                "{} {}",
                self.options.include_directive, self.options.depend_file
            )?;
        }
        Ok(out)
    }

    fn write_header(&self, out: &mut String) -> Result<(), GenerateError> {
        let cache = self.project.home_binary().join(&self.options.cache_file);
        let listed: BTreeSet<&Utf8PathBuf> = self.project.list_files.iter().collect();
        out.comment("kumiko generated Makefile, DO NOT EDIT!")?;
        out.comment("Generated from the following files:")?;
        out.comment(cache.as_str())?;
        for file in listed {
            out.comment(file.as_str())?;
        }
        out.push_str("\n\n");
        out.comment("disable some common implicit rules to speed things up")?;
        out.push_str(".SUFFIXES:\n.SUFFIXES:.hpuxmakemusthaverule\n");
        out.push_str("GENERATOR_SOURCES = ");
        for file in &self.project.list_files {
            write!(out, " {}", self.paths.output(file.as_str()))?;
        }
        write!(out, " {}\n\n\n", self.paths.output(cache.as_str()))?;
        Ok(())
    }

    /// Variables shared by the Makefile and the check fragment.
    fn make_variables(&self) -> Result<String, GenerateError> {
        let generator = self.generator_command()?;
        let mut out = String::new();
        out.comment("the standard shell for make")?;
        out.variable("SHELL", "/bin/sh")?;
        out.push('\n');
        if !self.options.make_silent_flag.is_empty() {
            out.variable("MAKESILENT", &self.options.make_silent_flag)?;
        }
        out.variable("GENERATOR_COMMAND", &generator)?;
        out.variable("RM", &format!("{generator} -E remove -f"))?;
        if let Some(edit) = self.vars.get("EDIT_COMMAND") {
            out.variable("EDIT_COMMAND", &self.paths.output(edit))?;
        }
        let project = self.project;
        let dirs = [
            ("CURRENT_SOURCE", project.source_dir.as_path()),
            ("CURRENT_BINARY", project.binary_dir.as_path()),
            ("SOURCE_DIR", project.home_source()),
            ("BINARY_DIR", project.home_binary()),
        ];
        for (name, dir) in dirs {
            out.variable(name, &self.paths.output(dir.as_str()))?;
        }
        out.push_str("\n\n");
        Ok(out)
    }

    fn write_default_target(&self, out: &mut String) -> Result<(), GenerateError> {
        let depend = &self.options.depend_file;
        let check = &self.options.check_depend_file;
        let all = if self.options.pass_makeflags {
            "$(MAKE) $(MAKESILENT) -$(MAKEFLAGS) all"
        } else {
            "$(MAKE) $(MAKESILENT) all"
        };
        let rule = MakeRule::new("default_target")
            .comment(format!(
                "Default target executed when no arguments are given to make, first make \
                 sure {depend} exists, {check} is up-to-date, check the sources, then build \
                 the all target"
            ))
            .depend(self.check_cache_path())
            .commands([
                format!("$(MAKE) $(MAKESILENT) {depend}"),
                format!("$(MAKE) $(MAKESILENT) {check}"),
                format!("$(MAKE) $(MAKESILENT) -f {check}"),
                all.to_owned(),
            ]);
        out.rule(&rule)?;
        Ok(())
    }

    fn write_subdirectory_rules(&self, out: &mut String) -> Result<(), GenerateError> {
        let entries = &self.project.subdirectories;
        if entries.is_empty() {
            return Ok(());
        }
        for group in standard_groups() {
            write!(out, "{}", DescentBlock::new(entries, &self.paths, group))?;
        }
        Ok(())
    }

    fn write_custom_rules(&mut self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        let mut claimed = HashSet::new();
        for source in &project.sources {
            let Some(custom) = &source.custom_command else {
                continue;
            };
            if !claimed.insert(custom.output.as_path()) {
                self.report(GenerateError::DuplicateOutput {
                    output: custom.output.clone(),
                    source_file: source.path.clone(),
                });
                continue;
            }
            let program = self
                .paths
                .output(&self.vars.expand(&custom.command).replace("/./", "/"));
            let command = join_flags([program, self.vars.expand(&custom.arguments)]);
            let depends: Vec<String> = custom
                .depends
                .iter()
                .map(|dep| self.custom_dependency(dep))
                .collect();
            let comment = custom
                .comment
                .as_deref()
                .filter(|text| !text.is_empty())
                .unwrap_or("Custom command");
            let rule = MakeRule::new(self.paths.output(custom.output.as_str()))
                .comment(comment)
                .depends(depends)
                .command(command);
            out.rule(&rule)?;
        }
        Ok(())
    }

    /// Spelling of a custom command prerequisite; executables built by this
    /// project resolve to their output path.
    fn custom_dependency(&self, dep: &str) -> String {
        let dep = self.vars.expand(dep);
        let suffix = self.vars.get_safe("EXECUTABLE_SUFFIX");
        let resolved = if let Some(dir) = self.target_dir(&dep) {
            let dir = self
                .options
                .executable_output_path
                .as_ref()
                .map_or(dir, |path| path.as_str().trim_end_matches('/'));
            format!("{dir}/{dep}{suffix}")
        } else if let Some(local) = self.project.targets.get(&dep)
            && local.kind == TargetKind::Executable
        {
            let names = self.target_names(&dep, local);
            format!("{}{}", self.executable_prefix, names.full)
        } else {
            dep
        };
        self.paths.output(&resolved.replace("/./", "/"))
    }

    fn write_make_rules(&mut self, out: &mut String) -> Result<(), GenerateError> {
        let depend = self.options.depend_file.clone();
        let check = self.options.check_depend_file.clone();
        let cache = self.options.cache_file.clone();

        out.rule(
            &MakeRule::new("all")
                .comment("default build rule")
                .depend(format!(
                    "{depend} $(SUBDIR_PREORDER_BUILD) $(TARGETS) $(SUBDIR_BUILD)"
                )),
        )?;
        out.rule(
            &MakeRule::new("clean")
                .comment("clean generated files")
                .depend("$(SUBDIR_CLEAN)")
                .command(
                    "-@ $(RM) $(CLEAN_OBJECT_FILES)  $(TARGETS) $(TARGET_EXTRAS) \
                     $(ADDITIONAL_MAKE_CLEAN_FILES)",
                ),
        )?;
        out.rule(
            &MakeRule::new(depend.as_str())
                .comment("dependencies.")
                .depend("$(GENERATOR_SOURCES)")
                .command(REGENERATE),
        )?;
        out.rule(
            &MakeRule::new(check.as_str())
                .comment("dependencies")
                .depends(self.compiled_sources())
                .command(REGENERATE),
        )?;
        out.rule(
            &MakeRule::new("depend")
                .comment("dependencies")
                .depend("$(SUBDIR_DEPEND)")
                .command(REGENERATE),
        )?;
        out.rule(
            &MakeRule::new("dependlocal")
                .comment("dependencies")
                .command(REGENERATE),
        )?;
        self.write_cache_rules(out, &cache)?;
        out.rule(
            &MakeRule::new(".PRECIOUS")
                .comment(
                    "Rule to keep make from removing Makefiles if control-C is hit during a \
                     run of kumiko.",
                )
                .depend(format!("{MAKEFILE_NAME} {depend}")),
        )?;
        self.write_object_rules(out)?;
        self.write_install_rules(out)
    }

    /// Every non-header source of every target, once each.
    fn compiled_sources(&self) -> Vec<String> {
        let project = self.project;
        let mut seen = HashSet::new();
        project
            .targets
            .values()
            .flat_map(|target| project.target_sources(target))
            .filter(|(id, source)| !source.header_only && seen.insert(*id))
            .map(|(_, source)| self.paths.output(source.path.as_str()))
            .collect()
    }

    fn write_cache_rules(&self, out: &mut String, cache: &str) -> Result<(), GenerateError> {
        out.rule(
            &MakeRule::new("rebuild_cache")
                .comment(cache)
                .command(REBUILD_CACHE),
        )?;
        out.rule(
            &MakeRule::new(self.check_cache_path())
                .comment(format!("{cache} because out-of-date:"))
                .depend("$(GENERATOR_SOURCES)")
                .command(REBUILD_CACHE),
        )?;
        let edit = if self.vars.get("EDIT_COMMAND").is_some() {
            "$(EDIT_COMMAND) -H$(SOURCE_DIR) -B$(BINARY_DIR)".to_owned()
        } else {
            format!("{REBUILD_CACHE} -i")
        };
        out.rule(
            &MakeRule::new("edit_cache")
                .comment(format!("edit {cache}"))
                .command(edit),
        )?;
        out.rule(
            &MakeRule::new(self.cache_path())
                .comment(cache)
                .command(REBUILD_CACHE),
        )?;
        Ok(())
    }

    fn write_install_rules(&self, out: &mut String) -> Result<(), GenerateError> {
        if self.options.testing_enabled {
            let test = self.vars.required("TEST_COMMAND", "test")?;
            out.push_str("ARGS=\n");
            out.rule(
                &MakeRule::new("test")
                    .comment("tests")
                    .command(format!("{} $(ARGS)", self.paths.output(test))),
            )?;
        }
        out.rule(
            &MakeRule::new("install")
                .comment("installation")
                .command(format!(
                    "$(GENERATOR_COMMAND) -P {}",
                    self.options.install_script
                )),
        )?;
        Ok(())
    }
}

/// Join the non-blank parts with single spaces.
fn join_flags<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = parts
        .into_iter()
        .map(|part| part.as_ref().trim().to_owned())
        .filter(|part| !part.is_empty())
        .collect();
    parts.join(" ")
}
