//! Placeholder expansion for per-language command templates.
//!
//! Templates such as `<C_COMPILER> <FLAGS> -o <OBJECT> -c <SOURCE>` are
//! expanded in two passes. The first pass substitutes rule bindings; the
//! second substitutes a fixed table of toolchain variables instantiated once
//! per enabled language. Each pass scans the template once, so substituted
//! text is never rescanned by that pass.

use indexmap::IndexMap;

use crate::paths::PathFormatter;
use crate::vars::VariableStore;

/// Toolchain variables expanded by the second pass. `${LANG}` is replaced by
/// each enabled language in turn.
const RULE_VARIABLES: [&str; 12] = [
    "SHARED_LIBRARY_CREATE_${LANG}_FLAGS",
    "SHARED_MODULE_CREATE_${LANG}_FLAGS",
    "SHARED_MODULE_${LANG}_FLAGS",
    "SHARED_LIBRARY_${LANG}_FLAGS",
    "${LANG}_LINK_FLAGS",
    "SHARED_LIBRARY_SONAME_${LANG}_FLAG",
    "${LANG}_ARCHIVE",
    "${LANG}_COMPILER",
    "AR",
    "CURRENT_SOURCE_DIR",
    "CURRENT_BINARY_DIR",
    "RANLIB",
];

/// Values bound to the rule placeholders of one command.
///
/// `None` leaves the placeholder untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBindings<'a> {
    /// Language of the rule, used for `<TARGET_SONAME>`.
    pub language: Option<&'a str>,
    /// `<SOURCE>`
    pub source: Option<&'a str>,
    /// `<OBJECT>`
    pub object: Option<&'a str>,
    /// `<OBJECTS>`
    pub objects: Option<&'a str>,
    /// `<OBJECTS_QUOTED>`
    pub objects_quoted: Option<&'a str>,
    /// `<TARGET>` and `<TARGET_QUOTED>`
    pub target: Option<&'a str>,
    /// `<TARGET_BASE>`
    pub target_base: Option<&'a str>,
    /// `<TARGET_SONAME>`
    pub target_soname: Option<&'a str>,
    /// `<LINK_LIBRARIES>`
    pub link_libraries: Option<&'a str>,
    /// `<FLAGS>`
    pub flags: Option<&'a str>,
    /// `<LINK_FLAGS>`
    pub link_flags: Option<&'a str>,
}

/// Expands command templates for one generation pass.
#[derive(Debug)]
pub struct TemplateExpander<'a> {
    vars: &'a VariableStore,
    table: IndexMap<String, String>,
}

impl<'a> TemplateExpander<'a> {
    /// Build the per-language variable table for `languages`.
    ///
    /// `current_source` and `current_binary` back `CURRENT_SOURCE_DIR` and
    /// `CURRENT_BINARY_DIR` when the store leaves them undefined.
    #[must_use]
    pub fn new<'l>(
        vars: &'a VariableStore,
        languages: impl IntoIterator<Item = &'l str>,
        paths: &PathFormatter,
        current_source: &str,
        current_binary: &str,
    ) -> Self {
        let languages: Vec<&str> = languages.into_iter().collect();
        let mut table = IndexMap::new();
        for pattern in RULE_VARIABLES {
            let names: Vec<String> = if pattern.contains("${LANG}") {
                languages
                    .iter()
                    .map(|lang| pattern.replace("${LANG}", lang))
                    .collect()
            } else {
                vec![pattern.to_owned()]
            };
            for name in names {
                let value = match (vars.get(&name), name.as_str()) {
                    (Some(value), _) => value,
                    (None, "CURRENT_SOURCE_DIR") => current_source,
                    (None, "CURRENT_BINARY_DIR") => current_binary,
                    (None, _) => "",
                };
                let value = if name.contains("FLAG") || value.is_empty() {
                    value.to_owned()
                } else {
                    paths.output(value)
                };
                table.entry(name).or_insert(value);
            }
        }
        Self { vars, table }
    }

    /// Expand `template` with `bindings`, then with the variable table.
    #[must_use]
    pub fn expand(&self, template: &str, bindings: &RuleBindings<'_>) -> String {
        let bound = substitute(template, |name, after| self.bind(name, after, bindings));
        substitute(&bound, |name, _| {
            self.table.get(name).map(|value| (value.clone(), 0))
        })
    }

    fn bind(&self, name: &str, after: &str, b: &RuleBindings<'_>) -> Option<(String, usize)> {
        let plain = |value: Option<&str>| value.map(|v| (v.to_owned(), 0));
        match name {
            "SOURCE" => plain(b.source),
            "OBJECT" => plain(b.object),
            "OBJECTS" => plain(b.objects),
            "OBJECTS_QUOTED" => plain(b.objects_quoted),
            "TARGET" => plain(b.target),
            "TARGET_QUOTED" => b.target.map(|t| (quote(t), 0)),
            "TARGET_BASE" => b.target_base.map(|base| expand_target_base(base, after)),
            "TARGET_SONAME" => b.target_soname.map(|soname| {
                let supported = b.language.is_some_and(|lang| {
                    self.vars
                        .get(&format!("SHARED_LIBRARY_SONAME_{lang}_FLAG"))
                        .is_some()
                });
                (if supported { soname.to_owned() } else { String::new() }, 0)
            }),
            "LINK_LIBRARIES" => plain(b.link_libraries),
            "FLAGS" => plain(b.flags),
            "LINK_FLAGS" => plain(b.link_flags),
            _ => None,
        }
    }
}

/// Wrap `target` in double quotes unless it is empty or already quoted.
fn quote(target: &str) -> String {
    if target.is_empty() || target.starts_with('"') {
        target.to_owned()
    } else {
        format!("\"{target}\"")
    }
}

/// A quoted base followed by `.lib` or `.dll` keeps the suffix inside the
/// quotes.
fn expand_target_base(base: &str, after: &str) -> (String, usize) {
    if base.len() > 1 && base.starts_with('"') {
        for suffix in [".lib", ".dll"] {
            if after.starts_with(suffix) {
                let inner = base.strip_suffix('"').unwrap_or(base);
                return (format!("{inner}{suffix}\""), suffix.len());
            }
        }
    }
    (base.to_owned(), 0)
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

/// Replace each `<NAME>` for which `resolve` yields text.
///
/// `resolve` receives the placeholder name and the text following it and
/// returns the replacement plus the number of following bytes it consumed.
fn substitute<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str, &str) -> Option<(String, usize)>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('<') {
        let (head, tail) = rest.split_at(open);
        out.push_str(head);
        let inner = tail.get(1..).unwrap_or_default();
        if let Some(close) = inner.find('>')
            && let Some(name) = inner.get(..close).filter(|n| is_placeholder_name(n))
            && let Some((text, consumed)) =
                resolve(name, inner.get(close + 1..).unwrap_or_default())
        {
            out.push_str(&text);
            rest = inner.get(close + 1 + consumed..).unwrap_or_default();
        } else {
            out.push('<');
            rest = inner;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn vars() -> VariableStore {
        [
            ("C_COMPILER", "/usr/bin/cc"),
            ("CXX_COMPILER", "/opt/my tools/c++"),
            ("SHARED_LIBRARY_CREATE_C_FLAGS", "-shared"),
            ("SHARED_LIBRARY_SONAME_C_FLAG", "-Wl,-soname,"),
            ("AR", "/usr/bin/ar"),
        ]
        .into_iter()
        .collect()
    }

    fn expander(vars: &VariableStore) -> TemplateExpander<'_> {
        TemplateExpander::new(
            vars,
            ["C", "CXX"],
            &PathFormatter::new("/build", false),
            "/src",
            "/build",
        )
    }

    #[rstest]
    fn compiles_object(vars: VariableStore) {
        let exp = expander(&vars);
        let bindings = RuleBindings {
            source: Some("/src/main.c"),
            object: Some("main.o"),
            flags: Some("-O2"),
            ..RuleBindings::default()
        };
        let out = exp.expand("<C_COMPILER> <FLAGS> -o <OBJECT> -c <SOURCE>", &bindings);
        assert_eq!(out, "/usr/bin/cc -O2 -o main.o -c /src/main.c");
    }

    #[rstest]
    fn absent_bindings_stay_unexpanded(vars: VariableStore) {
        let exp = expander(&vars);
        let out = exp.expand("<TARGET> <OBJECTS> <UNKNOWN>", &RuleBindings::default());
        assert_eq!(out, "<TARGET> <OBJECTS> <UNKNOWN>");
    }

    #[rstest]
    fn substitution_is_not_rescanned(vars: VariableStore) {
        let exp = expander(&vars);
        let bindings = RuleBindings {
            flags: Some("<OBJECT>"),
            object: Some("a.o"),
            ..RuleBindings::default()
        };
        assert_eq!(exp.expand("<FLAGS> <OBJECT>", &bindings), "<OBJECT> a.o");
    }

    #[rstest]
    #[case("libfoo.a", "\"libfoo.a\"")]
    #[case("\"libfoo.a\"", "\"libfoo.a\"")]
    fn target_quoted(vars: VariableStore, #[case] target: &str, #[case] expected: &str) {
        let exp = expander(&vars);
        let bindings = RuleBindings {
            target: Some(target),
            ..RuleBindings::default()
        };
        assert_eq!(exp.expand("<TARGET_QUOTED>", &bindings), expected);
    }

    #[rstest]
    fn quoted_base_keeps_suffix_inside_quotes(vars: VariableStore) {
        let exp = expander(&vars);
        let bindings = RuleBindings {
            target_base: Some("\"out dir/foo\""),
            ..RuleBindings::default()
        };
        let out = exp.expand("/implib:<TARGET_BASE>.lib /def:<TARGET_BASE>.def", &bindings);
        assert_eq!(out, "/implib:\"out dir/foo.lib\" /def:\"out dir/foo\".def");
    }

    #[rstest]
    #[case(Some("C"), "-Wl,-soname,libfoo.so.1")]
    #[case(Some("CXX"), "-Wl,-soname,")]
    #[case(None, "-Wl,-soname,")]
    fn soname_requires_language_flag(
        vars: VariableStore,
        #[case] language: Option<&str>,
        #[case] expected: &str,
    ) {
        let exp = expander(&vars);
        let bindings = RuleBindings {
            language,
            target_soname: Some("libfoo.so.1"),
            ..RuleBindings::default()
        };
        assert_eq!(
            exp.expand("<SHARED_LIBRARY_SONAME_C_FLAG><TARGET_SONAME>", &bindings),
            expected
        );
    }

    #[rstest]
    fn table_variables_are_path_normalised(vars: VariableStore) {
        let exp = expander(&vars);
        let out = exp.expand(
            "<CXX_COMPILER> <SHARED_LIBRARY_CREATE_C_FLAGS> <AR> <CURRENT_BINARY_DIR> <RANLIB>",
            &RuleBindings::default(),
        );
        assert_eq!(out, "/opt/my\\ tools/c++ -shared /usr/bin/ar /build ");
    }

    #[rstest]
    fn shell_redirections_are_left_alone(vars: VariableStore) {
        let exp = expander(&vars);
        let out = exp.expand("sort < in.txt > out.txt", &RuleBindings::default());
        assert_eq!(out, "sort < in.txt > out.txt");
    }
}
