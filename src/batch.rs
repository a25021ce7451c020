// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Batch Driver (spec §4.8, component C8): resolves each command-line
//! argument to a VEO, drives the engine over it, and reports the
//! outcome of the whole run.

use std::path::{Path, PathBuf};

use crate::credential::SignerCredential;
use crate::engine::{self, EngineRequest};
use crate::error::{ResignError, Result};
use crate::signature_codec::HashAlgorithm;
use crate::veo::{Task, VeoDir};

/// What a single command-line argument resolved to.
enum Input {
    /// A `.veo.zip` archive, to be unpacked before processing.
    Archive(PathBuf),
    /// An already-unpacked `.veo` directory.
    Directory(PathBuf),
}

fn resolve(raw: &Path) -> Result<Input> {
    let name = raw
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ResignError::Other(format!("unusable path {:?}", raw)))?;

    if raw.is_dir() && name.ends_with(".veo") {
        return Ok(Input::Directory(raw.to_path_buf()));
    }
    if raw.is_file() && name.ends_with(".veo.zip") {
        return Ok(Input::Archive(raw.to_path_buf()));
    }
    Err(ResignError::Other(format!(
        "{}: not a .veo directory or .veo.zip archive",
        raw.display()
    )))
}

pub struct RunConfig<'a> {
    pub task: Task,
    pub signers: &'a [SignerCredential],
    pub hash_algorithm: HashAlgorithm,
    pub initiator: &'a str,
    pub event_description: Option<&'a str>,
    pub output_dir: PathBuf,
    pub repack: bool,
    pub overwrite: bool,
}

/// One VEO's outcome, as logged at the end of a run (spec §7's
/// one-line-per-VEO summary format).
pub struct Outcome {
    pub veo_name: String,
    pub result: Result<()>,
}

/// Process every input, continuing past per-VEO failures. Returns
/// `Err` only if a fatal error (credential load, bad engine config)
/// aborted the whole batch; otherwise returns every VEO's outcome.
pub fn run(inputs: &[PathBuf], config: &RunConfig) -> Result<Vec<Outcome>> {
    std::fs::create_dir_all(&config.output_dir)?;

    log::debug!(
        "signer order for this run: {}",
        config
            .signers
            .iter()
            .map(|s| s.display_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut outcomes = Vec::with_capacity(inputs.len());

    for raw in inputs {
        let veo_name = raw
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.display().to_string());

        match process_one(raw, config) {
            Ok(()) => {
                log::info!("{}: {}", veo_name, config.task.outcome_phrase());
                outcomes.push(Outcome { veo_name, result: Ok(()) });
            }
            Err(e) if e.is_fatal() => {
                log::error!("{}: fatal error, aborting batch: {}", veo_name, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("{}: {}", veo_name, e);
                outcomes.push(Outcome { veo_name, result: Err(e) });
            }
        }
    }

    Ok(outcomes)
}

fn process_one(raw: &Path, config: &RunConfig) -> Result<()> {
    let input = resolve(raw)?;

    let veo_path = match input {
        Input::Directory(dir) => dir,
        Input::Archive(archive) => unpack_for_batch(&archive, config)?,
    };

    let veo = VeoDir::new(veo_path);

    let request = EngineRequest {
        task: config.task,
        veo: &veo,
        signers: config.signers,
        hash_algorithm: config.hash_algorithm,
        initiator: config.initiator,
        event_description: config.event_description,
    };

    engine::process(&request)?;

    if config.repack {
        engine::maybe_repack(&veo, &config.output_dir, config.overwrite)?;
    }

    Ok(())
}

/// Compute the unpacked target for a `.veo.zip` archive under
/// `config.output_dir`, clearing it first when it already exists and
/// `overwrite` was requested (spec §4.8 step 2).
fn unpack_for_batch(archive: &Path, config: &RunConfig) -> Result<PathBuf> {
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ResignError::Other(format!("unusable path {:?}", archive)))?;
    let veo_name = file_name
        .strip_suffix(".zip")
        .ok_or_else(|| ResignError::Other(format!("{} does not end in .zip", file_name)))?;
    let target = config.output_dir.join(veo_name);

    if target.exists() {
        if !config.overwrite {
            return Err(ResignError::ArchiveExists(target.display().to_string()));
        }
        std::fs::remove_dir_all(&target)?;
    }

    crate::archive::unpack(archive, &config.output_dir)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_rejects_unrecognized_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notaveo.txt");
        std::fs::write(&path, b"x").unwrap();
        assert!(resolve(&path).is_err());
    }

    #[test]
    fn resolve_accepts_veo_directory() {
        let dir = tempfile::tempdir().unwrap();
        let veo = dir.path().join("sample.veo");
        std::fs::create_dir_all(&veo).unwrap();
        assert!(matches!(resolve(&veo).unwrap(), Input::Directory(_)));
    }
}
