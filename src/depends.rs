//! Source-level dependency processing.
//!
//! The external scanner supplies an arena of [`DependNode`]s. This module
//! flattens each source's transitive includes into an ordered list and writes
//! the two dependency fragments consumed by the generated script: the object
//! edge list and the self-regenerating check fragment.

use camino::Utf8PathBuf;
use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Write};

use crate::config::GeneratorOptions;
use crate::error::GenerateError;
use crate::model::{DependNode, DependScan, Project, SourceId};
use crate::paths::PathFormatter;

/// Validated, index-addressed view of a dependency scan.
#[derive(Debug)]
pub struct DependGraph<'a> {
    scan: &'a DependScan,
}

impl<'a> DependGraph<'a> {
    /// Validate every edge and root of `scan`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::InvalidDependScan`] when an index is out of
    /// range.
    pub fn new(scan: &'a DependScan) -> Result<Self, GenerateError> {
        let len = scan.nodes.len();
        let edges = scan.nodes.iter().flat_map(|node| node.depends.iter());
        if let Some(&index) = edges.chain(scan.roots.values()).find(|&&idx| idx >= len) {
            return Err(GenerateError::InvalidDependScan { index, len });
        }
        Ok(Self { scan })
    }

    fn node(&self, index: usize) -> Option<&DependNode> {
        self.scan.nodes.get(index)
    }

    /// Root node recorded for `source`, if the scanner visited it.
    #[must_use]
    pub fn root_for(&self, source: &Utf8PathBuf) -> Option<usize> {
        self.scan.roots.get(source).copied()
    }

    /// Collect every path reachable from `root` in depth-first preorder.
    ///
    /// The root itself is never reported. Nodes without a resolved path are
    /// traversed but not reported. Each node is visited at most once, so
    /// cycles terminate.
    #[must_use]
    pub fn flatten(&self, root: usize) -> Vec<Utf8PathBuf> {
        let mut visited = vec![false; self.scan.nodes.len()];
        let mut out = Vec::new();
        if let Some(slot) = visited.get_mut(root) {
            *slot = true;
        }
        let mut stack: Vec<usize> = self.children_reversed(root);
        while let Some(index) = stack.pop() {
            let Some(seen) = visited.get_mut(index) else {
                continue;
            };
            if *seen {
                continue;
            }
            *seen = true;
            if let Some(path) = self.node(index).and_then(|n| n.path.as_ref())
                && !path.as_str().is_empty()
            {
                out.push(path.clone());
            }
            stack.extend(self.children_reversed(index));
        }
        out
    }

    fn children_reversed(&self, index: usize) -> Vec<usize> {
        self.node(index)
            .map(|node| node.depends.iter().rev().copied().collect())
            .unwrap_or_default()
    }
}

/// Flattened dependencies of every compiled source for one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceDepends {
    lists: Vec<Vec<Utf8PathBuf>>,
}

impl SourceDepends {
    /// Dependencies of `id`; empty when unknown.
    #[must_use]
    pub fn get(&self, id: SourceId) -> &[Utf8PathBuf] {
        self.lists.get(id.0).map_or(&[], Vec::as_slice)
    }

    /// Return `true` when no source has a dependency.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

/// Replace every non-header source's dependency hints with the flattened
/// scan result.
///
/// # Errors
///
/// Returns [`GenerateError::InvalidDependScan`] when the scan is malformed.
pub fn resolve_source_depends(
    project: &Project,
    scan: &DependScan,
) -> Result<SourceDepends, GenerateError> {
    let graph = DependGraph::new(scan)?;
    let lists = project
        .sources
        .iter()
        .map(|source| {
            if source.header_only {
                return Vec::new();
            }
            graph
                .root_for(&source.path)
                .map(|root| graph.flatten(root))
                .unwrap_or_default()
        })
        .collect();
    Ok(SourceDepends { lists })
}

/// An object file and the headers it depends on.
pub struct ObjectDepends<'a> {
    /// Object file path as written in the script.
    pub object: String,
    /// Flattened dependencies of the object's source.
    pub depends: &'a [Utf8PathBuf],
}

/// Write the `object : header` fragment.
///
/// Returns `true` when at least one edge was written.
///
/// # Errors
///
/// Propagates failures of the underlying writer.
pub fn write_object_depends(
    out: &mut impl Write,
    entries: &[ObjectDepends<'_>],
    paths: &PathFormatter,
) -> Result<bool, fmt::Error> {
    let mut any = false;
    writeln!(out, "# .o dependencies in this directory.")?;
    for entry in entries.iter().filter(|e| !e.depends.is_empty()) {
        let object = paths.output(&entry.object);
        for dep in entry.depends {
            writeln!(out, "{object} : {}", paths.output(dep.as_str()))?;
            any = true;
        }
        write!(out, "\n\n")?;
    }
    Ok(any)
}

/// Write the check fragment that reruns dependency generation whenever a
/// header changes or disappears.
///
/// # Errors
///
/// Propagates failures of the underlying writer.
pub fn write_check_depends(
    out: &mut impl Write,
    entries: &[ObjectDepends<'_>],
    make_variables: &str,
    paths: &PathFormatter,
    options: &GeneratorOptions,
) -> fmt::Result {
    let depend = &options.depend_file;
    let check = &options.check_depend_file;
    writeln!(
        out,
        "# This file is used as a tag file, that all sources depend on.  If a source \
         changes, then the rule to rebuild this file will cause {depend} to be rebuilt."
    )?;

    let mut headers = Vec::new();
    let mut seen = HashSet::new();
    for dep in entries.iter().flat_map(|e| e.depends.iter()) {
        let header = paths.output(dep.as_str());
        if seen.insert(header.clone()) {
            headers.push(header);
        }
    }
    if headers.is_empty() {
        return write!(out, "all:\n\t@echo {depend} is up-to-date\n");
    }

    write!(
        out,
        concat!(
            "# Suppresses display of executed commands\n",
            ".SILENT:\n",
            "# disable some common implicit rules to speed things up\n",
            ".SUFFIXES:\n",
            ".SUFFIXES:.hpuxmakemusthaverule\n",
        )
    )?;
    out.write_str(make_variables)?;
    writeln!(out, "default:")?;
    writeln!(out, "\t$(MAKE) $(MAKESILENT) -f {check} all")?;
    writeln!(out, "\t$(MAKE) $(MAKESILENT) -f {check} {depend}\n")?;
    for header in &headers {
        writeln!(out, "all: {header}")?;
    }
    writeln!(out, "\n\n# if any of these files changes run make dependlocal")?;
    let sorted: BTreeSet<&String> = headers.iter().collect();
    for header in &sorted {
        writeln!(out, "{depend}: {header}")?;
    }
    writeln!(out, "{depend}: \n\t$(MAKE) $(MAKESILENT) dependlocal\n")?;
    writeln!(out, "\n\n# if a .h file is removed then run make dependlocal\n")?;
    for header in &sorted {
        writeln!(out, "{header}:\n\t$(MAKE) $(MAKESILENT) dependlocal\n")?;
    }
    Ok(())
}
