//! Collision-free make variable names and filesystem-safe object names.
//!
//! Both maps live for one generation pass. A given input always maps to the
//! same output within that pass, and two inputs never share an output.

use std::collections::{HashMap, HashSet};

use crate::error::GenerateError;

const COUNTER_LIMIT: u32 = 1000;

/// Pass-local memo of derived identifiers.
#[derive(Debug, Default)]
pub struct NameSanitizer {
    max_length: Option<usize>,
    mangle_objects: bool,
    variables: HashMap<(String, String), String>,
    assigned: HashSet<String>,
    objects: HashMap<String, String>,
    object_names: HashSet<String>,
}

impl NameSanitizer {
    /// Sanitizer honouring an optional variable length limit and the object
    /// name mangling switch.
    #[must_use]
    pub fn new(max_length: Option<usize>, mangle_objects: bool) -> Self {
        Self {
            max_length,
            mangle_objects,
            ..Self::default()
        }
    }

    /// Make variable for `owner` and `suffix`, e.g. `foo` and `_SRC_OBJS`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::VariableNameExhausted`] when no free numeric
    /// suffix remains.
    pub fn variable_name(&mut self, owner: &str, suffix: &str) -> Result<String, GenerateError> {
        let key = (owner.to_owned(), suffix.to_owned());
        if let Some(name) = self.variables.get(&key) {
            return Ok(name.clone());
        }

        let owner_clean = clean_identifier(owner);
        let suffix_clean = clean_identifier(suffix);
        let combined_len = owner_clean.chars().count() + suffix_clean.chars().count();
        let name = match self.max_length {
            Some(max) if combined_len > max => {
                let keep = max.saturating_sub(8);
                let size = keep + 3;
                let tail = truncate(&suffix_clean, keep);
                let head_len = size.saturating_sub(tail.chars().count());
                let head = truncate(&owner_clean, head_len);
                self.claim(&format!("{head}{tail}"), 0, owner, suffix)?
            }
            _ => {
                // A name that needed no cleaning can still collide with one
                // an earlier owner was cleaned into (`foo.bar` then
                // `foo_bar`), so verbatim names also yield to prior claims.
                let clean = format!("{owner_clean}{suffix_clean}");
                if self.assigned.contains(&clean) {
                    self.claim(&clean, 1, owner, suffix)?
                } else {
                    clean
                }
            }
        };
        self.assigned.insert(name.clone());
        self.variables.insert(key, name.clone());
        Ok(name)
    }

    /// First unassigned `stem` + four-digit counter, counting from `start`.
    fn claim(
        &self,
        stem: &str,
        start: u32,
        owner: &str,
        suffix: &str,
    ) -> Result<String, GenerateError> {
        (start..COUNTER_LIMIT)
            .map(|n| format!("{stem}{n:04}"))
            .find(|candidate| !self.assigned.contains(candidate))
            .ok_or_else(|| GenerateError::VariableNameExhausted {
                owner: owner.to_owned(),
                suffix: suffix.to_owned(),
            })
    }

    /// Object file name safe for filesystems that reject `+`.
    ///
    /// Returns `raw` unchanged when mangling is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::ObjectNameExhausted`] when every perturbed
    /// spelling up to the counter limit is already taken.
    pub fn object_file_name(&mut self, raw: &str) -> Result<String, GenerateError> {
        if !self.mangle_objects {
            return Ok(raw.to_owned());
        }
        if let Some(name) = self.objects.get(raw) {
            return Ok(name.clone());
        }
        let mangled = raw.replace('+', "_p_");
        let candidate = std::iter::once(mangled)
            .chain((0..COUNTER_LIMIT).map(|attempt| perturb(raw, attempt)))
            .find(|candidate| !self.object_names.contains(candidate))
            .ok_or_else(|| GenerateError::ObjectNameExhausted {
                object: raw.to_owned(),
            })?;
        self.object_names.insert(candidate.clone());
        self.objects.insert(raw.to_owned(), candidate.clone());
        Ok(candidate)
    }
}

/// Replace every character that is not valid in a make variable name.
fn clean_identifier(raw: &str) -> String {
    raw.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

fn truncate(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

/// Distinct spelling number `attempt` of `raw`.
fn perturb(raw: &str, attempt: u32) -> String {
    let token = format!("_p{attempt}_");
    if raw.contains('+') {
        return raw.replace('+', &token);
    }
    match raw.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = raw.split_at(dot);
            format!("{stem}{token}{ext}")
        }
        _ => format!("{raw}{token}"),
    }
}

/// Convert `name` into a valid C identifier.
#[must_use]
pub fn c_identifier(name: &str) -> String {
    let mut out = clean_identifier(name);
    if out.starts_with(|ch: char| ch.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn plain_names_are_verbatim_and_stable() {
        let mut names = NameSanitizer::new(None, false);
        let first = names.variable_name("foo", "_SRC_OBJS").expect("name");
        let again = names.variable_name("foo", "_SRC_OBJS").expect("name");
        assert_eq!(first, "foo_SRC_OBJS");
        assert_eq!(first, again);
    }

    #[test]
    fn disallowed_characters_are_replaced_without_collisions() {
        let mut names = NameSanitizer::new(None, false);
        let dotted = names.variable_name("foo.bar", "_SRC_OBJS").expect("name");
        let under = names.variable_name("foo_bar", "_SRC_OBJS").expect("name");
        assert_eq!(dotted, "foo_bar_SRC_OBJS");
        assert_eq!(under, "foo_bar_SRC_OBJS0001");
    }

    #[test]
    fn truncated_collisions_get_distinct_counters() {
        let mut names = NameSanitizer::new(Some(16), false);
        let a = names
            .variable_name("averyveryverylongtarget_a", "_SRC_OBJS")
            .expect("name");
        let b = names
            .variable_name("averyveryverylongtarget_b", "_SRC_OBJS")
            .expect("name");
        assert_ne!(a, b);
        assert_eq!(a, "ave_SRC_OBJ0000");
        assert_eq!(b, "ave_SRC_OBJ0001");
        assert!(a.len() <= 16);
        assert_eq!(
            names
                .variable_name("averyveryverylongtarget_a", "_SRC_OBJS")
                .expect("name"),
            a
        );
    }

    #[test]
    fn short_names_fit_under_the_limit() {
        let mut names = NameSanitizer::new(Some(32), false);
        assert_eq!(names.variable_name("foo", "_SRC_OBJS").expect("name"), "foo_SRC_OBJS");
    }

    #[test]
    fn counters_are_bounded() {
        let mut names = NameSanitizer::new(Some(8), false);
        let failure = (0..=COUNTER_LIMIT)
            .map(|n| names.variable_name(&format!("target{n}"), "_X"))
            .find(Result::is_err);
        assert!(matches!(
            failure,
            Some(Err(GenerateError::VariableNameExhausted { .. }))
        ));
    }

    #[rstest]
    #[case(false, "a++.o", "a++.o")]
    #[case(true, "a++.o", "a_p__p_.o")]
    #[case(true, "plain.o", "plain.o")]
    fn object_names(#[case] mangle: bool, #[case] raw: &str, #[case] expected: &str) {
        let mut names = NameSanitizer::new(None, mangle);
        assert_eq!(names.object_file_name(raw).expect("object name"), expected);
    }

    #[test]
    fn object_name_collisions_are_perturbed() {
        let mut names = NameSanitizer::new(None, true);
        let literal = names.object_file_name("x_p_.o").expect("object name");
        let mangled = names.object_file_name("x+.o").expect("object name");
        assert_eq!(literal, "x_p_.o");
        assert_eq!(mangled, "x_p0_.o");
        assert_eq!(names.object_file_name("x+.o").expect("object name"), mangled);
    }

    #[test]
    fn object_name_perturbation_is_bounded() {
        let mut names = NameSanitizer::new(None, true);
        names.object_file_name("y_p_.o").expect("object name");
        for attempt in 0..COUNTER_LIMIT {
            names
                .object_file_name(&format!("y_p{attempt}_.o"))
                .expect("object name");
        }
        let err = names.object_file_name("y+.o").expect_err("no spelling left");
        assert!(matches!(err, GenerateError::ObjectNameExhausted { ref object } if object == "y+.o"));
        assert!(err.is_fatal());
    }

    #[rstest]
    #[case("foo_EXPORTS", "foo_EXPORTS")]
    #[case("my-lib_EXPORTS", "my_lib_EXPORTS")]
    #[case("3d_EXPORTS", "_3d_EXPORTS")]
    fn c_identifiers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(c_identifier(raw), expected);
    }
}
