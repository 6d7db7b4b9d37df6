//! Object file naming, compile rules and the dependency fragments.

use camino::Utf8PathBuf;
use itertools::Itertools;
use std::collections::HashSet;
use std::iter;

use super::rule::{MakeRule, RuleSink};
use super::{Pass, join_flags};
use crate::depends::{ObjectDepends, resolve_source_depends, write_check_depends, write_object_depends};
use crate::error::GenerateError;
use crate::model::{DependScan, Language, SourceFile, Target, TargetKind};
use crate::sanitize::c_identifier;
use crate::template::RuleBindings;
use crate::vars::split_list;

/// Object produced from one source.
pub(super) struct ObjectName<'a> {
    /// Sanitised file name relative to the binary directory.
    pub(super) file: String,
    pub(super) language: &'a Language,
    /// Binary subdirectory the object is written to, if any.
    pub(super) subdir: Option<Utf8PathBuf>,
}

impl<'a> Pass<'a> {
    /// Source path relative to the directory it was found in, without its
    /// extension, and the binary subdirectory mirroring its parent.
    fn short_name(&self, source: &SourceFile) -> (String, Option<Utf8PathBuf>) {
        let project = self.project;
        let relative = [&project.source_dir, &project.binary_dir]
            .into_iter()
            .find_map(|dir| source.path.strip_prefix(dir).ok());
        let Some(relative) = relative else {
            let stem = source.path.file_stem().unwrap_or_default();
            return (stem.to_owned(), None);
        };
        let subdir = relative
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .map(|parent| project.binary_dir.join(parent));
        (relative.with_extension("").into_string(), subdir)
    }

    /// Object for `source`, or `None` when no enabled language compiles it.
    pub(super) fn object_name(
        &mut self,
        source: &SourceFile,
    ) -> Result<Option<ObjectName<'a>>, GenerateError> {
        let Some(language) = self.project.language_for_extension(source.extension()) else {
            return Ok(None);
        };
        let (short, subdir) = self.short_name(source);
        let file = self
            .names
            .object_file_name(&format!("{short}{}", language.object_extension))?;
        Ok(Some(ObjectName {
            file,
            language,
            subdir,
        }))
    }

    pub(super) fn write_object_rules(&mut self, out: &mut String) -> Result<(), GenerateError> {
        let project = self.project;
        out.push_str("# Rules to build source files :\n\n");
        for (name, target) in &project.targets {
            if !target.kind.is_library() && target.kind != TargetKind::Executable {
                continue;
            }
            let export = target.kind.is_shared().then(|| {
                let symbol = target
                    .define_symbol
                    .clone()
                    .unwrap_or_else(|| c_identifier(&format!("{name}_EXPORTS")));
                format!("-D{symbol}")
            });
            for (_, source) in project.target_sources(target) {
                if source.header_only || source.custom_command.is_some() || source.external_object {
                    continue;
                }
                if project.is_ignored_extension(source.extension()) {
                    continue;
                }
                let Some(object) = self.object_name(source)? else {
                    self.report(GenerateError::UnknownLanguage {
                        target: name.clone(),
                        source_file: source.path.clone(),
                    });
                    continue;
                };
                let output = self.paths.output(&object.file);
                if !self.emitted_objects.insert(output.clone()) {
                    continue;
                }
                if let Some(dir) = &object.subdir {
                    self.directories.insert(dir.clone());
                }
                let unit = CompileUnit {
                    name,
                    target,
                    source,
                    language: &object.language.name,
                    object: &output,
                    export: export.as_deref(),
                };
                self.write_object_rule(out, &unit, &object.language.object_extension)?;
            }
        }
        Ok(())
    }

    fn write_object_rule(
        &mut self,
        out: &mut String,
        unit: &CompileUnit<'_>,
        object_extension: &str,
    ) -> Result<(), GenerateError> {
        let vars = self.vars;
        let language = unit.language;
        let templates = vars.required(&format!("{language}_COMPILE_OBJECT"), unit.name)?;
        let flags = self.compile_flags(unit);
        let source = self.paths.output(unit.source.path.as_str());
        let bindings = RuleBindings {
            language: Some(language),
            source: Some(&source),
            object: Some(unit.object),
            flags: Some(&flags),
            ..RuleBindings::default()
        };
        let commands: Vec<String> = split_list(templates)
            .into_iter()
            .map(|template| self.expander.expand(template, &bindings))
            .collect();
        let extra = unit
            .source
            .object_depends
            .iter()
            .map(|dep| self.paths.output(&vars.expand(dep)));
        let depends: Vec<String> = iter::once(source.clone()).chain(extra).collect();
        let comment = format!("{:<18}", format!("{object_extension} file from {language}: "));
        out.rule(
            &MakeRule::new(unit.object)
                .comment(comment)
                .depends(depends)
                .commands(commands),
        )?;
        Ok(())
    }

    fn compile_flags(&mut self, unit: &CompileUnit<'_>) -> String {
        let vars = self.vars;
        let language = unit.language;
        let shared = unit.target.kind.is_shared();
        let configured = if self.build_type.is_empty() {
            ""
        } else {
            vars.get_safe(&format!("{language}_FLAGS_{}", self.build_type))
        };
        let shared_library = if shared {
            vars.get_safe(&format!("SHARED_LIBRARY_{language}_FLAGS"))
        } else {
            ""
        };
        let shared_build = if vars.is_on("BUILD_SHARED_LIBS") {
            vars.get_safe(&format!("SHARED_BUILD_{language}_FLAGS"))
        } else {
            ""
        };
        let includes = self.include_flags(language);
        join_flags([
            unit.export.unwrap_or_default(),
            unit.source.compile_flags.as_deref().unwrap_or_default(),
            unit.target.compile_flags.as_deref().unwrap_or_default(),
            vars.get_safe(&format!("{language}_FLAGS")),
            configured,
            shared_library,
            shared_build,
            includes.as_str(),
        ])
    }

    /// Include and define flags for `language`, computed once per pass.
    fn include_flags(&mut self, language: &str) -> String {
        if let Some(flags) = self.include_flags.get(language) {
            return flags.clone();
        }
        let vars = self.vars;
        let flag = vars.get_safe(&format!("INCLUDE_FLAG_{language}"));
        let separator = vars
            .get(&format!("INCLUDE_FLAG_SEP_{language}"))
            .filter(|sep| !sep.is_empty());
        let implicit: HashSet<&str> = iter::once("/usr/include")
            .chain(vars.list("IMPLICIT_INCLUDE_DIRECTORIES"))
            .collect();
        let dirs: Vec<String> = self
            .project
            .include_directories
            .iter()
            .filter(|dir| !implicit.contains(dir.as_str()))
            .map(|dir| self.paths.output(dir))
            .collect();
        let includes = match separator {
            Some(sep) if !dirs.is_empty() => format!("{flag}{}", dirs.join(sep)),
            _ => dirs.iter().map(|dir| format!("{flag}{dir}")).join(" "),
        };
        let flags = join_flags([includes.as_str(), self.project.define_flags.as_str()]);
        self.include_flags.insert(language.to_owned(), flags.clone());
        flags
    }

    /// Render the object dependency fragment and its check fragment.
    pub(super) fn depend_fragments(
        &mut self,
        scan: &DependScan,
    ) -> Result<(String, String), GenerateError> {
        let project = self.project;
        let resolved = resolve_source_depends(project, scan)?;
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for target in project.targets.values() {
            for (id, source) in project.target_sources(target) {
                if source.header_only || source.custom_command.is_some() || source.external_object {
                    continue;
                }
                if !seen.insert(id) {
                    continue;
                }
                if let Some(object) = self.object_name(source)? {
                    entries.push(ObjectDepends {
                        object: object.file,
                        depends: resolved.get(id),
                    });
                }
            }
        }
        let mut depends = String::new();
        let any = write_object_depends(&mut depends, &entries, &self.paths)?;
        let mut check = String::new();
        write_check_depends(
            &mut check,
            &entries,
            &self.make_variables()?,
            &self.paths,
            self.options,
        )?;
        tracing::debug!(objects = entries.len(), edges = any, "dependency fragments rendered");
        Ok((depends, check))
    }
}

/// One source compiled for one target.
struct CompileUnit<'u> {
    name: &'u str,
    target: &'u Target,
    source: &'u SourceFile,
    language: &'u str,
    object: &'u str,
    export: Option<&'u str>,
}
