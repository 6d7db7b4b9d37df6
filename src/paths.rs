//! Conversion of filesystem paths into the spelling used inside the script.

use camino::{Utf8Path, Utf8PathBuf};

/// Formats paths for the generated script.
///
/// In relative mode, paths inside the current binary directory are written
/// relative to it. Spaces are escaped for the shell unless the path is
/// already quoted.
#[derive(Debug, Clone)]
pub struct PathFormatter {
    binary_dir: Utf8PathBuf,
    relative: bool,
}

impl PathFormatter {
    /// Create a formatter rooted at `binary_dir`.
    #[must_use]
    pub fn new(binary_dir: impl Into<Utf8PathBuf>, relative: bool) -> Self {
        Self {
            binary_dir: binary_dir.into(),
            relative,
        }
    }

    /// Directory the formatter treats as the script's own.
    #[must_use]
    pub const fn binary_dir(&self) -> &Utf8PathBuf {
        &self.binary_dir
    }

    /// Spell `path` for use in a command or dependency list.
    #[must_use]
    pub fn output(&self, path: &str) -> String {
        let path = if self.relative {
            self.relativise(path)
        } else {
            path.to_owned()
        };
        escape_spaces(&path)
    }

    /// Spell `path` for use as a rule target or prerequisite.
    #[must_use]
    pub fn target(&self, path: &str) -> String {
        to_make_target(&self.output(path))
    }

    fn relativise(&self, path: &str) -> String {
        let candidate = Utf8Path::new(path);
        if candidate == self.binary_dir {
            return ".".to_owned();
        }
        candidate
            .strip_prefix(&self.binary_dir)
            .map_or_else(|_| path.to_owned(), |rel| rel.as_str().to_owned())
    }
}

/// Drop a leading `./` from a file in the script's own directory.
#[must_use]
pub fn to_make_target(target: &str) -> String {
    match target.strip_prefix("./") {
        Some(rest) if !rest.is_empty() && !rest.contains('/') => rest.to_owned(),
        _ => target.to_owned(),
    }
}

fn escape_spaces(path: &str) -> String {
    if !path.contains(' ') || path.starts_with('"') {
        return path.to_owned();
    }
    let mut out = String::with_capacity(path.len() + 4);
    let mut prev = '\0';
    for ch in path.chars() {
        if ch == ' ' && prev != '\\' {
            out.push('\\');
        }
        out.push(ch);
        prev = ch;
    }
    out
}
