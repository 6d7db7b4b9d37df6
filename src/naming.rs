//! Prefix, suffix and version-qualified names of a target's outputs.

use crate::model::{Target, TargetKind};
use crate::vars::VariableStore;

/// The four names under which a target's output may appear on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNames {
    /// Prefix plus identity, e.g. `libfoo`.
    pub base: String,
    /// Base plus suffix, e.g. `libfoo.so`.
    pub full: String,
    /// Full name qualified by the ABI version, e.g. `libfoo.so.2`.
    pub so: String,
    /// Name of the real file, e.g. `libfoo.so.2.3.1`.
    pub real: String,
    /// Effective ABI version after defaulting.
    pub soversion: Option<String>,
}

impl TargetNames {
    /// Return `true` when the so name and real name need a symlink step.
    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.full != self.real
    }
}

const fn prefix_variable(kind: TargetKind) -> Option<&'static str> {
    match kind {
        TargetKind::StaticLibrary => Some("STATIC_LIBRARY_PREFIX"),
        TargetKind::SharedLibrary => Some("SHARED_LIBRARY_PREFIX"),
        TargetKind::ModuleLibrary => Some("SHARED_MODULE_PREFIX"),
        TargetKind::Executable | TargetKind::Utility | TargetKind::InstallArtifact => None,
    }
}

const fn suffix_variable(kind: TargetKind) -> Option<&'static str> {
    match kind {
        TargetKind::StaticLibrary => Some("STATIC_LIBRARY_SUFFIX"),
        TargetKind::SharedLibrary => Some("SHARED_LIBRARY_SUFFIX"),
        TargetKind::ModuleLibrary => Some("SHARED_MODULE_SUFFIX"),
        TargetKind::Executable => Some("EXECUTABLE_SUFFIX"),
        TargetKind::Utility | TargetKind::InstallArtifact => None,
    }
}

/// Resolve an affix: language-specific variable, then the generic one.
fn platform_affix<'a>(vars: &'a VariableStore, var: &str, language: Option<&str>) -> &'a str {
    language
        .and_then(|lang| vars.get(&format!("{var}_{lang}")))
        .unwrap_or_else(|| vars.get_safe(var))
}

/// Name prefix of `target` (override, then platform tables).
#[must_use]
pub fn target_prefix<'a>(
    target: &'a Target,
    vars: &'a VariableStore,
    language: Option<&str>,
) -> &'a str {
    if let Some(prefix) = target.prefix.as_deref() {
        return prefix;
    }
    prefix_variable(target.kind).map_or("", |var| platform_affix(vars, var, language))
}

/// Name suffix of `target` (override, then platform tables).
#[must_use]
pub fn target_suffix<'a>(
    target: &'a Target,
    vars: &'a VariableStore,
    language: Option<&str>,
) -> &'a str {
    if let Some(suffix) = target.suffix.as_deref() {
        return suffix;
    }
    suffix_variable(target.kind).map_or("", |var| platform_affix(vars, var, language))
}

/// Return `true` when the platform can embed a soname for `language`.
#[must_use]
pub fn has_soname_flag(vars: &VariableStore, language: Option<&str>) -> bool {
    language.is_some_and(|lang| {
        vars.get(&format!("SHARED_LIBRARY_SONAME_{lang}_FLAG"))
            .is_some()
    }) || vars.get("SHARED_LIBRARY_SONAME_C_FLAG").is_some()
}

/// Compute the base, full, so and real names of target `name`.
///
/// Versioning applies only to shared and module libraries on platforms that
/// declare an soname flag. A missing `soversion` defaults to `version`.
#[must_use]
pub fn resolve_names(
    name: &str,
    target: &Target,
    vars: &VariableStore,
    language: Option<&str>,
) -> TargetNames {
    let versioned = target.kind.is_shared() && has_soname_flag(vars, language);
    let (version, soversion) = if versioned {
        (target.version.as_deref(), target.soversion.as_deref())
    } else {
        (None, None)
    };
    let soversion = soversion.or(version);

    let base = format!("{}{name}", target_prefix(target, vars, language));
    let full = format!("{base}{}", target_suffix(target, vars, language));
    let so = soversion.map_or_else(|| full.clone(), |v| format!("{full}.{v}"));
    let real = version
        .or(soversion)
        .map_or_else(|| full.clone(), |v| format!("{full}.{v}"));

    TargetNames {
        base,
        full,
        so,
        real,
        soversion: soversion.map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn vars() -> VariableStore {
        [
            ("STATIC_LIBRARY_PREFIX", "lib"),
            ("STATIC_LIBRARY_SUFFIX", ".a"),
            ("SHARED_LIBRARY_PREFIX", "lib"),
            ("SHARED_LIBRARY_SUFFIX", ".so"),
            ("SHARED_LIBRARY_SUFFIX_Fortran", ".fso"),
            ("SHARED_MODULE_PREFIX", ""),
            ("SHARED_MODULE_SUFFIX", ".so"),
            ("SHARED_LIBRARY_SONAME_C_FLAG", "-Wl,-soname,"),
        ]
        .into_iter()
        .collect()
    }

    fn shared(version: Option<&str>, soversion: Option<&str>) -> Target {
        let mut target = Target::new(TargetKind::SharedLibrary);
        target.version = version.map(str::to_owned);
        target.soversion = soversion.map(str::to_owned);
        target
    }

    #[rstest]
    #[case(TargetKind::StaticLibrary)]
    #[case(TargetKind::SharedLibrary)]
    #[case(TargetKind::ModuleLibrary)]
    #[case(TargetKind::Executable)]
    #[case(TargetKind::Utility)]
    fn unversioned_names_coincide(vars: VariableStore, #[case] kind: TargetKind) {
        let names = resolve_names("foo", &Target::new(kind), &vars, Some("C"));
        assert_eq!(names.full, names.so);
        assert_eq!(names.so, names.real);
        assert!(!names.is_versioned());
    }

    #[rstest]
    fn version_defaults_soversion(vars: VariableStore) {
        let names = resolve_names("foo", &shared(Some("2.3.1"), None), &vars, Some("C"));
        assert_eq!(names.soversion.as_deref(), Some("2.3.1"));
        assert_eq!(names.so, names.real);
        assert_eq!(names.so, "libfoo.so.2.3.1");
    }

    #[rstest]
    fn distinct_version_and_soversion(vars: VariableStore) {
        let names = resolve_names("foo", &shared(Some("2.3.1"), Some("2")), &vars, Some("C"));
        assert_eq!(names.full, "libfoo.so");
        assert_eq!(names.so, "libfoo.so.2");
        assert_eq!(names.real, "libfoo.so.2.3.1");
        assert_ne!(names.full, names.so);
        assert_ne!(names.so, names.real);
    }

    #[rstest]
    fn static_libraries_ignore_versions(vars: VariableStore) {
        let mut target = Target::new(TargetKind::StaticLibrary);
        target.version = Some("1.0".into());
        let names = resolve_names("foo", &target, &vars, Some("C"));
        assert_eq!(names.real, "libfoo.a");
        assert_eq!(names.soversion, None);
    }

    #[test]
    fn versions_need_soname_flag() {
        let vars: VariableStore = [("SHARED_LIBRARY_SUFFIX", ".dll")].into_iter().collect();
        let names = resolve_names("foo", &shared(Some("1.2"), Some("1")), &vars, Some("C"));
        assert_eq!(names.real, "foo.dll");
        assert_eq!(names.so, "foo.dll");
    }

    #[rstest]
    fn language_specific_affix_wins(vars: VariableStore) {
        let names = resolve_names("foo", &shared(None, None), &vars, Some("Fortran"));
        assert_eq!(names.full, "libfoo.fso");
    }

    #[rstest]
    fn overrides_beat_platform_tables(vars: VariableStore) {
        let mut target = Target::new(TargetKind::SharedLibrary);
        target.prefix = Some(String::new());
        target.suffix = Some(".plugin".into());
        let names = resolve_names("foo", &target, &vars, Some("C"));
        assert_eq!(names.base, "foo");
        assert_eq!(names.full, "foo.plugin");
    }

    #[test]
    fn executables_take_platform_extension() {
        let vars: VariableStore = [("EXECUTABLE_SUFFIX", ".exe")].into_iter().collect();
        let names = resolve_names("app", &Target::new(TargetKind::Executable), &vars, None);
        assert_eq!(names.base, "app");
        assert_eq!(names.full, "app.exe");
    }
}
