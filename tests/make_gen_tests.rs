#![allow(
    clippy::expect_used,
    reason = "fixtures use expect for descriptive failures"
)]

//! End-to-end generation from a serialised model.

use anyhow::{Context, Result, ensure};
use camino::Utf8Path;
use insta::{Settings, assert_snapshot};
use kumiko::model::{self, Project};
use kumiko::{Generated, generate};
use rstest::{fixture, rstest};

#[fixture]
fn hello() -> Project {
    model::from_path(Utf8Path::new("tests/data/hello.yaml")).expect("load hello model")
}

fn render(project: &Project) -> Result<Generated> {
    generate(project, &project.options).context("generate hello model")
}

#[rstest]
fn libraries_are_listed_before_executables(hello: Project) -> Result<()> {
    let out = render(&hello)?;
    let text = &out.makefile;
    ensure!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    ensure!(text.contains("TARGETS =  \\\nlibutil.a \\\nhello\n\n"), "{text}");
    ensure!(text.contains("hello_DEPEND_LIBS = libutil.a \n"), "{text}");
    ensure!(text.contains("-o /build/hello -lutil"), "{text}");
    ensure!(!text.contains("util.h:"), "header got a rule: {text}");
    Ok(())
}

#[rstest]
fn pre_order_subdirectories_are_built_first(hello: Project) -> Result<()> {
    let text = render(&hello)?.makefile;
    ensure!(
        text.contains("SUBDIR_PREORDER_BUILD = \\\ndefault_target_A \\\ndefault_target_C \n"),
        "{text}"
    );
    ensure!(text.contains("SUBDIR_BUILD = \\\ndefault_target_B \n"), "{text}");
    ensure!(text.contains("default_target_B: $(TARGETS) default_target_C\n"), "{text}");
    ensure!(text.contains("clean_C: clean_A\n"), "{text}");
    ensure!(text.contains("clean_B: clean_C\n"), "{text}");
    Ok(())
}

#[rstest]
fn scan_produces_fragments_and_include(hello: Project) -> Result<()> {
    let out = render(&hello)?;
    ensure!(out.makefile.ends_with("include kumiko.depends\n"));
    let check = out.check_depends.context("check fragment")?;
    ensure!(check.contains("/src/util.h"), "{check}");
    let depends = out.depends.context("depends fragment")?;
    let mut settings = Settings::new();
    settings.set_snapshot_path(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/snapshots/make"));
    settings.bind(|| {
        assert_snapshot!("object_depends", depends);
    });
    Ok(())
}

#[rstest]
fn full_makefile_matches_snapshot(hello: Project) -> Result<()> {
    let makefile = render(&hello)?.makefile;
    let mut settings = Settings::new();
    settings.set_snapshot_path(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/snapshots/make"));
    settings.bind(|| {
        assert_snapshot!("hello_makefile", makefile);
    });
    Ok(())
}

#[rstest]
fn cli_overrides_reach_the_pass(mut hello: Project) -> Result<()> {
    hello.options.relative_paths = true;
    hello.options.testing_enabled = true;
    hello.variables.set("TEST_COMMAND", "/usr/bin/ktest");
    let text = render(&hello)?.makefile;
    ensure!(text.contains("CURRENT_BINARY = .\n"), "{text}");
    ensure!(text.contains("\t/usr/bin/ktest $(ARGS)\n"), "{text}");
    Ok(())
}
