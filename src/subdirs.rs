//! Ordering and chaining of recursive sub-builds.
//!
//! Pre-order subdirectories come first, post-order ones after, each group in
//! declaration order. Every descent rule depends on the one emitted before it
//! so a parallel `make` still visits directories in sequence.

use std::fmt::{self, Display, Formatter};

use crate::model::{DirectoryEntry, DirectoryOrder};
use crate::paths::PathFormatter;

/// Which ordering group a variable covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFilter {
    /// Every participating directory.
    All,
    /// Only pre-order directories.
    PreOnly,
    /// Only post-order directories.
    PostOnly,
}

impl OrderFilter {
    const fn admits(self, order: DirectoryOrder) -> bool {
        match self {
            Self::All => true,
            Self::PreOnly => matches!(order, DirectoryOrder::Pre),
            Self::PostOnly => matches!(order, DirectoryOrder::Post),
        }
    }
}

/// Entries with the pre-order group first, relative order preserved.
#[must_use]
pub fn ordered_entries(entries: &[DirectoryEntry]) -> Vec<&DirectoryEntry> {
    let (pre, post): (Vec<_>, Vec<_>) = entries
        .iter()
        .partition(|entry| entry.order == DirectoryOrder::Pre);
    pre.into_iter().chain(post).collect()
}

/// Rule-name fragment for a directory path: the first `../` becomes `___`
/// and every `/` becomes `_`.
#[must_use]
pub fn fix_directory_name(path: &str) -> String {
    path.replacen("../", "___", 1).replace('/', "_")
}

/// One generated `<target>_<dir>` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescentRule {
    /// Rule name, e.g. `clean_sub_dir`.
    pub name: String,
    /// Prerequisites: the group dependency, then the previous rule.
    pub depends: Vec<String>,
    /// Directory entered by the commands.
    pub directory: String,
    /// Recursive targets invoked in order.
    pub targets: Vec<String>,
}

impl Display for DescentRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name)?;
        for dep in &self.depends {
            write!(f, " {dep}")?;
        }
        writeln!(f)?;
        let dir = &self.directory;
        if let Some(first) = self.targets.first() {
            writeln!(f, "\t@if test ! -d {dir}; then $(MAKE) rebuild_cache; fi")?;
            writeln!(f, "\t@echo {dir}: building {first}")?;
            writeln!(f, "\t@cd {dir}; $(MAKE) {first}")?;
        }
        for next in self.targets.iter().skip(1) {
            writeln!(f, "\t@echo {dir}: building {next}")?;
            writeln!(f, "\t@cd {dir}; $(MAKE) {next}")?;
        }
        writeln!(f)
    }
}

/// Parameters of one subdirectory variable and its rules.
#[derive(Debug, Clone, Copy)]
pub struct DescentGroup<'a> {
    /// Variable listing the rules, e.g. `SUBDIR_CLEAN`.
    pub variable: &'a str,
    /// Recursive target, e.g. `clean`.
    pub target: &'a str,
    /// Extra prerequisite of every rule, e.g. `$(TARGETS)`.
    pub depend: Option<&'a str>,
    /// Ordering group covered by the variable.
    pub filter: OrderFilter,
}

/// Build the chained descent rules for `group`.
///
/// Subdirectory paths are relative to the binary directory of `paths`,
/// which also spells the directory each rule enters. The chain runs across every participating entry, including those the
/// filter leaves out, so the first rule of the post-order group depends on
/// the last pre-order rule.
#[must_use]
pub fn descent_rules(
    entries: &[DirectoryEntry],
    paths: &PathFormatter,
    group: &DescentGroup<'_>,
) -> Vec<DescentRule> {
    let target = group.target;
    let mut rules = Vec::new();
    let mut last: Option<String> = None;
    for entry in ordered_entries(entries) {
        if !entry.participates {
            continue;
        }
        let subdir = fix_directory_name(&entry.path);
        if !group.filter.admits(entry.order) {
            last = Some(subdir);
            continue;
        }
        let depends = group
            .depend
            .map(str::to_owned)
            .into_iter()
            .chain(last.as_ref().map(|prev| format!("{target}_{prev}")))
            .collect();
        rules.push(DescentRule {
            name: format!("{target}_{subdir}"),
            depends,
            directory: paths.output(paths.binary_dir().join(&entry.path).as_str()),
            targets: vec![target.to_owned()],
        });
        last = Some(subdir);
    }
    rules
}

/// A subdirectory variable followed by its rules.
#[derive(Debug)]
pub struct DescentBlock<'a> {
    group: DescentGroup<'a>,
    rules: Vec<DescentRule>,
}

impl<'a> DescentBlock<'a> {
    /// Block for `group` over `entries`.
    #[must_use]
    pub fn new(entries: &[DirectoryEntry], paths: &PathFormatter, group: DescentGroup<'a>) -> Self {
        let rules = descent_rules(entries, paths, &group);
        Self { group, rules }
    }

    /// Rules in emission order.
    #[must_use]
    pub fn rules(&self) -> &[DescentRule] {
        &self.rules
    }
}

impl Display for DescentBlock<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let DescentGroup {
            variable, target, ..
        } = self.group;
        writeln!(f, "# Variable for making {target} in subdirectories.")?;
        write!(f, "{variable} =")?;
        for rule in &self.rules {
            write!(f, " \\\n{}", rule.name)?;
        }
        write!(f, " \n\n")?;
        writeln!(f, "# Targets for making {target} in subdirectories.")?;
        for rule in &self.rules {
            write!(f, "{rule}")?;
        }
        write!(f, "\n\n")
    }
}

/// The four standard subdirectory groups.
#[must_use]
pub const fn standard_groups() -> [DescentGroup<'static>; 4] {
    [
        DescentGroup {
            variable: "SUBDIR_BUILD",
            target: "default_target",
            depend: Some("$(TARGETS)"),
            filter: OrderFilter::PostOnly,
        },
        DescentGroup {
            variable: "SUBDIR_PREORDER_BUILD",
            target: "default_target",
            depend: None,
            filter: OrderFilter::PreOnly,
        },
        DescentGroup {
            variable: "SUBDIR_CLEAN",
            target: "clean",
            depend: None,
            filter: OrderFilter::All,
        },
        DescentGroup {
            variable: "SUBDIR_DEPEND",
            target: "depend",
            depend: None,
            filter: OrderFilter::All,
        },
    ]
}
