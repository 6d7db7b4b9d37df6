//! Generic make rule primitive and the sink it is written to.

use std::fmt::{self, Display, Formatter, Write};

use crate::paths::to_make_target;

const RULE_BANNER: &str = "#---------------------------------------------------------";

/// One make rule: optional comment, target, prerequisites and commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakeRule {
    /// Short description shown in the banner and progress line.
    pub comment: Option<String>,
    /// Rule target.
    pub target: String,
    /// Prerequisites, one rule line each.
    pub depends: Vec<String>,
    /// Recipe lines.
    pub commands: Vec<String>,
}

impl MakeRule {
    /// Rule for `target` without prerequisites or commands.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Attach a banner comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Append one prerequisite.
    #[must_use]
    pub fn depend(mut self, dep: impl Into<String>) -> Self {
        self.depends.push(dep.into());
        self
    }

    /// Append prerequisites.
    #[must_use]
    pub fn depends<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Append one recipe line.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Append recipe lines.
    #[must_use]
    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    fn progress_line(&self) -> String {
        match self.comment.as_deref() {
            Some(comment) => format!("Building {comment} {}...", self.target),
            None => format!("Building {}...", self.target),
        }
    }
}

/// Return `true` when `command` should be preceded by a progress echo.
fn wants_progress(command: &str) -> bool {
    !command.trim().is_empty()
        && !command.starts_with('-')
        && !command.starts_with('@')
        && !command.starts_with("echo")
        && !command.starts_with("$(MAKE)")
}

impl Display for MakeRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(comment) = &self.comment {
            writeln!(f, "{RULE_BANNER}")?;
            writeln!(f, "# {comment}")?;
            writeln!(f, "#")?;
        }
        writeln!(f)?;
        let target = to_make_target(&self.target);
        if self.depends.is_empty() {
            writeln!(f, "{target}:")?;
        }
        for dep in &self.depends {
            writeln!(f, "{target}: {}", to_make_target(dep))?;
        }
        for (index, command) in self.commands.iter().enumerate() {
            if index == 0 && wants_progress(command) {
                write!(f, "{}", Echo(&self.progress_line()))?;
            }
            writeln!(f, "\t{command}")?;
        }
        writeln!(f)
    }
}

/// A quoted `@echo` recipe line; embedded recipe breaks become further echoes.
#[derive(Debug, Clone, Copy)]
pub struct Echo<'a>(pub &'a str);

impl Display for Echo<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = self
            .0
            .replace("\\\n", " ")
            .replace(" \t", "   ")
            .replace("\n\t", "\"\n\t@echo \"");
        writeln!(f, "\t@echo \"{text}\"")
    }
}

/// Destination of generated rules.
///
/// Emission logic only talks to this capability, so it stays free of I/O.
pub trait RuleSink: Write {
    /// Append a complete rule.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying writer.
    fn rule(&mut self, rule: &MakeRule) -> fmt::Result {
        write!(self, "{rule}")
    }

    /// Append a `#` comment line.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying writer.
    fn comment(&mut self, text: &str) -> fmt::Result {
        writeln!(self, "# {text}")
    }

    /// Append a one-line `NAME = value` assignment.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying writer.
    fn variable(&mut self, name: &str, value: &str) -> fmt::Result {
        writeln!(self, "{name} = {value}")
    }
}

impl RuleSink for String {}
