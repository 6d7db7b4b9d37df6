//! Per-target variables and build rules.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

use camino::Utf8PathBuf;
use tracing::debug;

use super::rule::{Echo, MakeRule, RuleSink};
use super::{Pass, join_flags};
use crate::error::GenerateError;
use crate::link::LinkLineBuilder;
use crate::model::{Target, TargetKind};
use crate::paths::to_make_target;
use crate::template::RuleBindings;
use crate::vars::split_list;

const HELP_ENTRIES: [&str; 6] = [
    "The following are some of the valid targets for this Makefile:",
    "... all (the default if no target is provided)",
    "... clean",
    "... depend",
    "... install",
    "... rebuild_cache",
];

/// Object files of one target as written in the script.
#[derive(Debug, Default)]
struct TargetObjects {
    compiled: Vec<String>,
    external: Vec<String>,
}

/// Make variables naming one target's objects and dependencies.
struct ObjectVariables {
    objects: String,
    objects_quoted: String,
    depend_libs: String,
}

impl ObjectVariables {
    fn prerequisites(&self) -> String {
        format!("{} {}", self.objects, self.depend_libs)
    }
}

/// Output directory for a dependency living in `dir`: the configured output
/// path, nothing for the current directory, otherwise `dir` itself.
fn output_prefix(configured: &str, dir: &str, binary_dir: &str) -> String {
    if !configured.is_empty() {
        configured.to_owned()
    } else if dir == binary_dir {
        String::new()
    } else {
        format!("{dir}/")
    }
}

impl<'a> Pass<'a> {
    pub(super) fn write_target_variables(&mut self, out: &mut String) -> Result<(), GenerateError> {
        self.write_help(out)?;
        self.write_targets_list(out)?;

        let project = self.project;
        let mut cleaned = Vec::new();
        for (name, target) in &project.targets {
            if target.sources.is_empty() {
                continue;
            }
            let objects = self.target_objects(target)?;
            let src = self.names.variable_name(name, "_SRC_OBJS")?;
            let ext = self.names.variable_name(name, "_EXTERNAL_OBJS")?;
            let src_quoted = self.names.variable_name(name, "_SRC_OBJS_QUOTED")?;
            let ext_quoted = self.names.variable_name(name, "_EXTERNAL_OBJS_QUOTED")?;

            write!(out, "{src} = ")?;
            for object in &objects.compiled {
                write!(out, "\\\n{object} ")?;
            }
            write!(out, "\n\n{ext} = ")?;
            for object in &objects.external {
                write!(out, "\\\n{object} ")?;
            }
            write!(out, "\n\n{src_quoted} = ")?;
            for object in &objects.compiled {
                write!(out, "\\\n\"{object}\" ")?;
            }
            write!(out, "\n\n{ext_quoted} = ")?;
            for object in &objects.external {
                write!(out, "\\\n\"{object}\" ")?;
            }
            out.push_str("\n\n");
            cleaned.push(src);
        }

        self.write_target_extras(out)?;
        out.push_str("CLEAN_OBJECT_FILES = ");
        for variable in &cleaned {
            write!(out, "$({variable}) ")?;
        }
        out.push_str("\n\n");
        if !project.additional_clean_files.is_empty() {
            out.push_str("ADDITIONAL_MAKE_CLEAN_FILES = ");
            for file in &project.additional_clean_files {
                write!(out, "{} ", self.paths.output(&self.vars.expand(file)))?;
            }
            out.push_str("\n\n");
        }
        Ok(())
    }

    fn target_objects(&mut self, target: &Target) -> Result<TargetObjects, GenerateError> {
        let project = self.project;
        let mut objects = TargetObjects::default();
        for (_, source) in project.target_sources(target) {
            if source.header_only || source.custom_command.is_some() {
                continue;
            }
            if source.external_object {
                objects.external.push(self.paths.output(source.path.as_str()));
            } else if let Some(object) = self.object_name(source)? {
                objects.compiled.push(self.paths.output(&object.file));
            }
        }
        Ok(objects)
    }

    fn write_help(&self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        let exe_suffix = self.vars.get_safe("EXECUTABLE_SUFFIX");
        let mut entries: Vec<String> = HELP_ENTRIES.iter().map(|&e| e.to_owned()).collect();
        for (name, target) in project.targets.iter().filter(|(_, t)| t.kind.is_library()) {
            let names = self.target_names(name, target);
            let path = format!("{}{}", self.library_prefix, names.full);
            entries.push(format!("... {}", self.paths.output(&path)));
        }
        for (name, target) in &project.targets {
            if target.kind == TargetKind::Executable {
                entries.push(format!("... {name}{exe_suffix}"));
            }
        }
        for (name, target) in &project.targets {
            if target.kind == TargetKind::Utility {
                entries.push(format!("... {name}"));
            }
        }
        out.push_str("help:\n");
        for entry in &entries {
            write!(out, "{}", Echo(entry))?;
        }
        out.push_str("\n\n");
        Ok(())
    }

    /// Path under which a library or executable is listed in `TARGETS`.
    fn listed_output(&self, name: &str, target: &Target) -> Option<String> {
        let prefix = match target.kind {
            kind if kind.is_library() => &self.library_prefix,
            TargetKind::Executable => &self.executable_prefix,
            TargetKind::Utility => return Some(name.to_owned()),
            _ => return None,
        };
        let names = self.target_names(name, target);
        Some(self.paths.target(&format!("{prefix}{}", names.full)))
    }

    fn write_targets_list(&self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        out.push_str("TARGETS = ");
        let kinds: [fn(TargetKind) -> bool; 3] = [
            TargetKind::is_library,
            |kind| kind == TargetKind::Executable,
            |kind| kind == TargetKind::Utility,
        ];
        for admits in kinds {
            for (name, target) in &project.targets {
                if !target.in_all || !admits(target.kind) {
                    continue;
                }
                if let Some(listed) = self.listed_output(name, target) {
                    write!(out, " \\\n{listed}")?;
                }
            }
        }
        out.push_str("\n\n");
        Ok(())
    }

    fn write_target_extras(&self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        out.push_str("TARGET_EXTRAS = ");
        for (name, target) in &project.targets {
            if !target.in_all || !target.kind.is_shared() {
                continue;
            }
            let names = self.target_names(name, target);
            let prefix = &self.library_prefix;
            if names.so != names.full {
                write!(out, " \\\n{}", self.paths.output(&format!("{prefix}{}", names.so)))?;
            }
            if names.real != names.full && names.real != names.so {
                write!(out, " \\\n{}", self.paths.output(&format!("{prefix}{}", names.real)))?;
            }
        }
        out.push_str("\n\n");
        Ok(())
    }

    pub(super) fn write_depend_libs(&mut self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        let mut used: BTreeSet<&str> = BTreeSet::new();
        for (name, target) in &project.targets {
            if target.kind == TargetKind::InstallArtifact {
                continue;
            }
            let variable = self.names.variable_name(name, "_DEPEND_LIBS")?;
            write!(out, "{variable} = ")?;
            let mut emitted: HashSet<&str> = HashSet::from([name.as_str()]);
            if target.kind != TargetKind::StaticLibrary {
                for library in &target.link_libraries {
                    used.insert(&library.name);
                    if !emitted.insert(&library.name) {
                        continue;
                    }
                    if let Some(dep) = self.library_dependency(name, &library.name) {
                        write!(out, "{dep} ")?;
                    }
                }
            }
            for utility in &target.utilities {
                used.insert(utility);
                if !emitted.insert(utility) {
                    continue;
                }
                if let Some(dep) = self.utility_dependency(name, utility) {
                    write!(out, "{dep} ")?;
                }
            }
            out.push('\n');
        }
        out.push('\n');
        for dependency in used {
            self.write_remote_build_rule(out, dependency)?;
        }
        Ok(())
    }

    /// File name of a library built elsewhere, from its recorded type.
    fn library_file_name(&self, name: &str) -> Option<String> {
        let (prefix, suffix) = match self.vars.get(&format!("{name}_LIBRARY_TYPE"))? {
            "STATIC" => ("STATIC_LIBRARY_PREFIX", "STATIC_LIBRARY_SUFFIX"),
            "SHARED" => ("SHARED_LIBRARY_PREFIX", "SHARED_LIBRARY_SUFFIX"),
            "MODULE" => ("SHARED_MODULE_PREFIX", "SHARED_MODULE_SUFFIX"),
            _ => return None,
        };
        Some(format!(
            "{}{name}{}",
            self.vars.get_safe(prefix),
            self.vars.get_safe(suffix)
        ))
    }

    /// Prerequisite for linking against `library`, when it is built by this
    /// project. Plain system libraries and raw flags yield `None`.
    fn library_dependency(&mut self, owner: &str, library: &str) -> Option<String> {
        let project = self.project;
        if let Some(local) = project.targets.get(library)
            && local.kind.is_library()
        {
            let names = self.target_names(library, local);
            return Some(self.paths.output(&format!("{}{}", self.library_prefix, names.full)));
        }
        let dir = self.target_dir(library)?;
        let Some(file) = self.library_file_name(library) else {
            self.report(GenerateError::UnknownDependencyKind {
                target: owner.to_owned(),
                dependency: library.to_owned(),
            });
            return None;
        };
        let prefix = output_prefix(&self.library_prefix, dir, self.binary_dir());
        Some(self.paths.output(&format!("{prefix}{file}")))
    }

    fn utility_dependency(&mut self, owner: &str, utility: &str) -> Option<String> {
        let project = self.project;
        if let Some(local) = project.targets.get(utility) {
            match local.kind {
                kind if kind.is_library() => return self.library_dependency(owner, utility),
                TargetKind::Executable => return self.listed_output(utility, local),
                TargetKind::Utility => return Some(utility.to_owned()),
                _ => {}
            }
        } else if self.vars.get(&format!("{utility}_LIBRARY_TYPE")).is_some() {
            return self.library_dependency(owner, utility);
        } else if let Some(dir) = self.target_dir(utility) {
            let prefix = output_prefix(&self.executable_prefix, dir, self.binary_dir());
            let suffix = self.vars.get_safe("EXECUTABLE_SUFFIX");
            return Some(self.paths.output(&format!("{prefix}{utility}{suffix}")));
        }
        self.report(GenerateError::UnknownDependencyKind {
            target: owner.to_owned(),
            dependency: utility.to_owned(),
        });
        None
    }

    /// Rule building `name` by recursing into the directory it lives in.
    fn write_remote_build_rule(&self, out: &mut String, name: &str) -> Result<(), GenerateError> {
        if self.project.targets.contains_key(name) {
            return Ok(());
        }
        let Some(dir) = self.target_dir(name) else {
            return Ok(());
        };
        if dir == self.binary_dir() {
            return Ok(());
        }
        let (prefix, file) = if self.vars.get(&format!("{name}_LIBRARY_TYPE")).is_some() {
            let Some(file) = self.library_file_name(name) else {
                return Ok(());
            };
            (output_prefix(&self.library_prefix, dir, self.binary_dir()), file)
        } else {
            let suffix = self.vars.get_safe("EXECUTABLE_SUFFIX");
            (
                output_prefix(&self.executable_prefix, dir, self.binary_dir()),
                format!("{name}{suffix}"),
            )
        };
        let depend = &self.options.depend_file;
        let check = &self.options.check_depend_file;
        write!(
            out,
            "{}:\n\tcd {}; $(MAKE) $(MAKESILENT) {depend}; $(MAKE) $(MAKESILENT) {check}; \
             $(MAKE) $(MAKESILENT) -f {check}; $(MAKE) $(MAKESILENT) {file}\n\n",
            self.paths.output(&format!("{prefix}{file}")),
            self.paths.output(dir),
        )?;
        Ok(())
    }

    pub(super) fn write_target_rules(&mut self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        for (name, target) in &project.targets {
            debug!(target = %name, kind = ?target.kind, "emitting build rule");
            match target.kind {
                TargetKind::StaticLibrary | TargetKind::SharedLibrary | TargetKind::ModuleLibrary => {
                    self.write_library_rule(out, name, target)?;
                }
                TargetKind::Executable => self.write_executable_rule(out, name, target)?,
                TargetKind::Utility => self.write_utility_rule(out, name, target)?,
                TargetKind::InstallArtifact => {}
            }
        }
        Ok(())
    }

    fn object_variables(&mut self, name: &str) -> Result<ObjectVariables, GenerateError> {
        let src = self.names.variable_name(name, "_SRC_OBJS")?;
        let ext = self.names.variable_name(name, "_EXTERNAL_OBJS")?;
        let src_quoted = self.names.variable_name(name, "_SRC_OBJS_QUOTED")?;
        let ext_quoted = self.names.variable_name(name, "_EXTERNAL_OBJS_QUOTED")?;
        let depend_libs = self.names.variable_name(name, "_DEPEND_LIBS")?;
        Ok(ObjectVariables {
            objects: format!("$({src}) $({ext})"),
            objects_quoted: format!("$({src_quoted}) $({ext_quoted})"),
            depend_libs: format!("$({depend_libs})"),
        })
    }

    fn linker_language(&self, name: &str, target: &'a Target) -> Result<&'a str, GenerateError> {
        self.project
            .linker_language(target)
            .ok_or_else(|| GenerateError::NoLinkerLanguage {
                target: name.to_owned(),
            })
    }

    fn link_libraries(
        &self,
        name: &str,
        target: &Target,
        language: &str,
        exclude_self: Option<&str>,
    ) -> Result<String, GenerateError> {
        let builder = LinkLineBuilder::new(self.vars, &self.paths, self.options.keep_lib_prefix)
            .with_output_directories(
                self.options
                    .output_directories()
                    .into_iter()
                    .map(Utf8PathBuf::into_string),
            );
        Ok(builder.build(name, target, language, exclude_self)?.to_string())
    }

    /// Per-configuration variant of `variable`, when a build type is active.
    fn configured(&self, variable: &str) -> &'a str {
        if self.build_type.is_empty() {
            return "";
        }
        self.vars
            .get_safe(&format!("{variable}_{}", self.build_type))
    }

    fn library_link_flags(&self, target: &Target) -> String {
        let (variable, extra) = match target.kind {
            TargetKind::SharedLibrary => ("SHARED_LINKER_FLAGS", &target.link_flags),
            TargetKind::ModuleLibrary => ("MODULE_LINKER_FLAGS", &target.link_flags),
            _ => return target.static_library_flags.clone().unwrap_or_default(),
        };
        join_flags([
            self.vars.get_safe(variable),
            self.configured(variable),
            extra.as_deref().unwrap_or_default(),
        ])
    }

    fn write_library_rule(
        &mut self,
        out: &mut String,
        name: &str,
        target: &'a Target,
    ) -> Result<(), GenerateError> {
        let language = self.linker_language(name, target)?;
        let names = self.target_names(name, target);
        let (create, comment) = match target.kind {
            TargetKind::SharedLibrary => ("CREATE_SHARED_LIBRARY", "shared library"),
            TargetKind::ModuleLibrary => ("CREATE_SHARED_MODULE", "shared module"),
            _ => ("CREATE_STATIC_LIBRARY", "static library"),
        };
        let templates = self.vars.required(&format!("{language}_{create}"), name)?;
        let generator = self.generator_command()?;

        let in_output_dir = |file: &str| self.paths.output(&format!("{}{file}", self.library_prefix));
        let full = in_output_dir(&names.full);
        let so = in_output_dir(&names.so);
        let real = in_output_dir(&names.real);
        let base = in_output_dir(&names.base);

        let mut remove = format!("{generator} -E remove -f {real}");
        if so != real {
            write!(remove, " {so}")?;
        }
        if full != so && full != real {
            write!(remove, " {full}")?;
        }
        let mut commands = vec![remove];
        commands.extend(self.custom_command_lines(&target.pre_build));
        commands.extend(self.custom_command_lines(&target.pre_link));
        commands.extend(split_list(templates).into_iter().map(str::to_owned));
        if names.is_versioned() {
            commands.push(format!("{generator} -E symlink_library {real} {so} {full}"));
        }
        commands.extend(self.custom_command_lines(&target.post_build));

        let variables = self.object_variables(name)?;
        let link_libraries = self.link_libraries(name, target, language, Some(name))?;
        let link_flags = self.library_link_flags(target);
        let bindings = RuleBindings {
            language: Some(language),
            objects: Some(&variables.objects),
            objects_quoted: Some(&variables.objects_quoted),
            target: Some(&real),
            target_base: Some(&base),
            target_soname: Some(&names.so),
            link_libraries: Some(&link_libraries),
            link_flags: Some(&link_flags),
            ..RuleBindings::default()
        };
        let commands: Vec<String> = commands
            .iter()
            .map(|command| self.expander.expand(command, &bindings))
            .collect();

        out.rule(
            &MakeRule::new(full.as_str())
                .comment(comment)
                .depend(variables.prerequisites())
                .commands(commands),
        )?;
        let local = to_make_target(&full).contains('/');
        self.write_alias_rules(out, name, &names.full, &full, comment, local)
    }

    fn executable_link_flags(&self, target: &Target, language: &str) -> String {
        let vars = self.vars;
        let shared_build = if vars.is_on("BUILD_SHARED_LIBS") {
            vars.get_safe(&format!("SHARED_BUILD_{language}_FLAGS"))
        } else {
            ""
        };
        let subsystem = if target.win32_executable {
            vars.get_safe("CREATE_WIN32_EXE")
        } else {
            vars.get_safe("CREATE_CONSOLE_EXE")
        };
        join_flags([
            vars.get_safe("EXE_LINKER_FLAGS"),
            self.configured("EXE_LINKER_FLAGS"),
            shared_build,
            subsystem,
            target.link_flags.as_deref().unwrap_or_default(),
        ])
    }

    fn write_executable_rule(
        &mut self,
        out: &mut String,
        name: &str,
        target: &'a Target,
    ) -> Result<(), GenerateError> {
        let language = self.linker_language(name, target)?;
        let names = self.target_names(name, target);
        let templates = self
            .vars
            .required(&format!("{language}_LINK_EXECUTABLE"), name)?;

        let mut dir = if self.executable_prefix.is_empty() {
            format!("{}/", self.binary_dir())
        } else {
            self.executable_prefix.clone()
        };
        if target.bundle {
            write!(dir, "{name}.app/Contents/MacOS/")?;
        }
        let output = self.paths.output(&format!("{dir}{}", names.full));

        let mut commands = self.custom_command_lines(&target.pre_build);
        commands.extend(self.custom_command_lines(&target.pre_link));
        commands.extend(split_list(templates).into_iter().map(str::to_owned));
        commands.extend(self.custom_command_lines(&target.post_build));

        let variables = self.object_variables(name)?;
        let link_libraries = self.link_libraries(name, target, language, None)?;
        let flags = join_flags([
            self.vars.get_safe(&format!("{language}_FLAGS")),
            self.vars
                .get_safe(&format!("SHARED_LIBRARY_{language}_FLAGS")),
        ]);
        let link_flags = self.executable_link_flags(target, language);
        let bindings = RuleBindings {
            language: Some(language),
            objects: Some(&variables.objects),
            objects_quoted: Some(&variables.objects_quoted),
            target: Some(&output),
            link_libraries: Some(&link_libraries),
            flags: Some(&flags),
            link_flags: Some(&link_flags),
            ..RuleBindings::default()
        };
        let commands: Vec<String> = commands
            .iter()
            .map(|command| self.expander.expand(command, &bindings))
            .collect();

        out.rule(
            &MakeRule::new(output.as_str())
                .comment("executable")
                .depend(variables.prerequisites())
                .commands(commands),
        )?;
        let local = !self.options.relative_paths || to_make_target(&output).contains('/');
        self.write_alias_rules(out, name, &names.full, &output, "executable", local)
    }

    /// Short-name rule for an output in another directory, then the rule
    /// named after the target itself.
    fn write_alias_rules(
        &self,
        out: &mut String,
        name: &str,
        short: &str,
        output: &str,
        comment: &str,
        local: bool,
    ) -> Result<(), GenerateError> {
        let mut current = to_make_target(output);
        if local && short != current {
            out.rule(&MakeRule::new(short).comment(comment).depend(output))?;
            short.clone_into(&mut current);
        }
        if name != current {
            out.rule(&MakeRule::new(name).comment(comment).depend(current))?;
        }
        Ok(())
    }

    fn write_utility_rule(
        &mut self,
        out: &mut String,
        name: &str,
        target: &Target,
    ) -> Result<(), GenerateError> {
        let depend_libs = self.names.variable_name(name, "_DEPEND_LIBS")?;
        let mut commands = self.custom_command_lines(&target.pre_build);
        commands.extend(self.custom_command_lines(&target.pre_link));
        commands.extend(self.custom_command_lines(&target.post_build));
        let depends = std::iter::once(format!("$({depend_libs})")).chain(
            target
                .post_build
                .iter()
                .flat_map(|custom| &custom.depends)
                .map(|dep| self.paths.output(&self.vars.expand(dep))),
        );
        out.rule(
            &MakeRule::new(name)
                .comment("Utility")
                .depends(depends)
                .commands(commands),
        )?;
        Ok(())
    }
}
