//! Atomic persistence of generated artefacts.
//!
//! Each artefact is written to a temporary file beside its destination and
//! then renamed over it, so an interrupted or failed write never leaves a
//! truncated script behind. Artefacts are independent: a failure writing one
//! does not stop the others.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, Write};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::{GeneratorOptions, MAKEFILE_NAME};
use crate::error::GenerateError;
use crate::make_gen::Generated;

/// Outcome of [`write_artifacts`].
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Artefacts persisted, in write order.
    pub written: Vec<Utf8PathBuf>,
    /// Failures, one per artefact or directory that could not be written.
    pub errors: Vec<GenerateError>,
}

impl WriteReport {
    /// Return `true` when every artefact was written.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Write the script, the dependency fragments and the object directories of
/// `generated` beneath `dir`.
#[must_use]
pub fn write_artifacts(
    dir: &Utf8Path,
    generated: &Generated,
    options: &GeneratorOptions,
) -> WriteReport {
    let mut report = WriteReport::default();
    if let Err(source) = fs::create_dir_all(dir) {
        report.errors.push(GenerateError::Io {
            artifact: "output directory".into(),
            path: dir.to_owned(),
            source,
        });
        return report;
    }

    for subdir in &generated.directories {
        if let Err(source) = fs::create_dir_all(subdir) {
            report.errors.push(GenerateError::Io {
                artifact: "build directory".into(),
                path: subdir.clone(),
                source,
            });
        }
    }

    let artifacts = [
        (MAKEFILE_NAME, Some(generated.makefile.as_str())),
        (options.depend_file.as_str(), generated.depends.as_deref()),
        (
            options.check_depend_file.as_str(),
            generated.check_depends.as_deref(),
        ),
    ];
    for (name, contents) in artifacts {
        let Some(contents) = contents else {
            debug!(artifact = name, "nothing to write");
            continue;
        };
        let path = dir.join(name);
        match write_atomic(&path, contents) {
            Ok(()) => {
                info!(artifact = name, path = %path, "wrote artifact");
                report.written.push(path);
            }
            Err(source) => report.errors.push(GenerateError::Io {
                artifact: name.to_owned(),
                path,
                source,
            }),
        }
    }
    report
}

/// Replace `path` with `contents` in one rename.
fn write_atomic(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, ensure};
    use tempfile::tempdir;

    fn utf8_dir(dir: &tempfile::TempDir) -> Result<Utf8PathBuf> {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non UTF-8 temp dir {}", path.display()))
    }

    fn generated() -> Generated {
        Generated {
            makefile: "all:\n".into(),
            depends: Some("# .o dependencies in this directory.\n".into()),
            check_depends: Some("all:\n\t@echo up-to-date\n".into()),
            ..Generated::default()
        }
    }

    #[test]
    fn writes_every_artifact() -> Result<()> {
        let tmp = tempdir().context("tempdir")?;
        let dir = utf8_dir(&tmp)?;
        let mut gen_out = generated();
        gen_out.directories = vec![dir.join("sub")];
        let report = write_artifacts(&dir, &gen_out, &GeneratorOptions::default());
        ensure!(report.is_success(), "{:?}", report.errors);
        ensure!(report.written.len() == 3);
        ensure!(fs::read_to_string(dir.join("Makefile"))? == "all:\n");
        ensure!(dir.join("kumiko.check_depends").is_file());
        ensure!(dir.join("sub").is_dir());
        Ok(())
    }

    #[test]
    fn replaces_existing_script() -> Result<()> {
        let tmp = tempdir().context("tempdir")?;
        let dir = utf8_dir(&tmp)?;
        fs::write(dir.join("Makefile"), "old contents\n")?;
        let gen_out = Generated {
            makefile: "new:\n".into(),
            ..Generated::default()
        };
        let report = write_artifacts(&dir, &gen_out, &GeneratorOptions::default());
        ensure!(report.is_success());
        ensure!(report.written == vec![dir.join("Makefile")]);
        ensure!(fs::read_to_string(dir.join("Makefile"))? == "new:\n");
        Ok(())
    }

    #[test]
    fn failed_artifact_does_not_stop_siblings() -> Result<()> {
        let tmp = tempdir().context("tempdir")?;
        let dir = utf8_dir(&tmp)?;
        fs::create_dir(dir.join("kumiko.depends"))?;
        fs::write(dir.join("kumiko.depends").join("keep"), "x")?;
        let report = write_artifacts(&dir, &generated(), &GeneratorOptions::default());
        ensure!(report.written.len() == 2, "{:?}", report.written);
        ensure!(
            matches!(
                report.errors.as_slice(),
                [GenerateError::Io { artifact, .. }] if artifact == "kumiko.depends"
            ),
            "{:?}",
            report.errors
        );
        ensure!(fs::read_to_string(dir.join("Makefile"))? == "all:\n");
        Ok(())
    }

    #[test]
    fn unusable_output_directory_is_reported() -> Result<()> {
        let tmp = tempdir().context("tempdir")?;
        let dir = utf8_dir(&tmp)?;
        let blocker = dir.join("file");
        fs::write(&blocker, "x")?;
        let report = write_artifacts(&blocker, &generated(), &GeneratorOptions::default());
        ensure!(report.written.is_empty());
        ensure!(matches!(
            report.errors.as_slice(),
            [GenerateError::Io { artifact, .. }] if artifact == "output directory"
        ));
        Ok(())
    }
}
