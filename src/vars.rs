//! Key-value store of toolchain and platform variables.
//!
//! The store is supplied by the configuration front end and is read-only for
//! the duration of a generation pass. Keys follow the `<PURPOSE>[_<LANG>]`
//! convention, for example `STATIC_LIBRARY_PREFIX_CXX` or `C_COMPILE_OBJECT`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

/// Ordered map of variable names to their values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    entries: IndexMap<String, String>,
}

impl VariableStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Return the value of `name` when defined.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Return the value of `name`, or the empty string when undefined.
    #[must_use]
    pub fn get_safe(&self, name: &str) -> &str {
        self.get(name).unwrap_or_default()
    }

    /// Return the value of `name` or a configuration error naming `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::MissingVariable`] when `name` is undefined.
    pub fn required(&self, name: &str, target: &str) -> Result<&str, GenerateError> {
        self.get(name).ok_or_else(|| GenerateError::MissingVariable {
            variable: name.to_owned(),
            target: target.to_owned(),
        })
    }

    /// Return `true` when `name` is defined and holds a true value.
    #[must_use]
    pub fn is_on(&self, name: &str) -> bool {
        self.get(name).is_some_and(is_on)
    }

    /// Split the value of `name` into its `;`-separated elements.
    #[must_use]
    pub fn list(&self, name: &str) -> Vec<&str> {
        self.get(name).map(split_list).unwrap_or_default()
    }

    /// Replace every `${NAME}` reference in `input` with the variable's value.
    ///
    /// Undefined variables expand to nothing. An unterminated reference is
    /// copied through verbatim.
    #[must_use]
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            let (head, tail) = rest.split_at(start);
            out.push_str(head);
            let body = tail.get(2..).unwrap_or_default();
            let Some(end) = body.find('}') else {
                out.push_str(tail);
                return out;
            };
            let (name, after) = body.split_at(end);
            out.push_str(self.get_safe(name));
            rest = after.get(1..).unwrap_or_default();
        }
        out.push_str(rest);
        out
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Interpret `value` using the usual build-configuration truthiness rules.
///
/// `1`, `ON`, `YES`, `TRUE`, `Y` (case-insensitive) and non-zero numbers are
/// true; everything else, including the empty string, is false.
#[must_use]
pub fn is_on(value: &str) -> bool {
    let upper = value.trim().to_ascii_uppercase();
    match upper.as_str() {
        "ON" | "YES" | "TRUE" | "Y" => true,
        _ => upper.parse::<i64>().is_ok_and(|n| n != 0),
    }
}

/// Split a `;`-separated list, dropping empty elements.
#[must_use]
pub fn split_list(value: &str) -> Vec<&str> {
    value.split(';').filter(|item| !item.is_empty()).collect()
}
