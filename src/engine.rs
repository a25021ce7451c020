// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resign Engine (spec §4.7, component C7): orchestrates a single task
//! over one unpacked VEO directory.
//!
//! The state machine of spec §4.7 (`load_sigs` → `mutate_history` →
//! `sign` → `cleanup`, with any failure in the middle three stages
//! abandoning the VEO) is implemented directly rather than through a
//! class hierarchy of "representations" (spec §9): each stage is a
//! free function, and failure paths explicitly restore whatever state
//! they may have already committed.

use std::path::{Path, PathBuf};

use crate::canonical::canonical_bytes;
use crate::credential::SignerCredential;
use crate::error::{ResignError, Result};
use crate::history;
use crate::signature_codec::{self, HashAlgorithm, SignatureRecord};
use crate::veo::{Bucket, Event, Task, VeoDir};
use crate::verifier::{self, VerifiedSignature};

/// Inputs to a single `process` invocation.
pub struct EngineRequest<'a> {
    pub task: Task,
    pub veo: &'a VeoDir,
    pub signers: &'a [SignerCredential],
    pub hash_algorithm: HashAlgorithm,
    pub initiator: &'a str,
    /// Required, and validated non-empty, for [`Task::AddEvent`].
    pub event_description: Option<&'a str>,
}

struct SigningPlan {
    emit_content: bool,
    emit_history: bool,
    delete_content: bool,
    delete_history: bool,
}

impl SigningPlan {
    fn for_task(task: Task) -> Self {
        match task {
            Task::Verify => Self {
                emit_content: false,
                emit_history: true,
                delete_content: false,
                delete_history: true,
            },
            Task::Renew => Self {
                emit_content: true,
                emit_history: true,
                delete_content: true,
                delete_history: true,
            },
            Task::Create => Self {
                emit_content: true,
                emit_history: true,
                delete_content: true,
                delete_history: true,
            },
            Task::AddEvent => Self {
                emit_content: false,
                emit_history: true,
                delete_content: false,
                delete_history: true,
            },
        }
    }
}

/// Process `request` against its VEO. On success, the directory
/// reflects the new signature set and history event. On failure, the
/// directory is left exactly as it was found (spec §8 invariant 5).
pub fn process(request: &EngineRequest) -> Result<()> {
    if request.task == Task::AddEvent {
        let missing = request
            .event_description
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ResignError::EngineConfig(
                "-addevent requires an event description (-e)".to_string(),
            ));
        }
    }

    let content_names = request.veo.signature_files(Bucket::Content)?;
    let history_names = request.veo.signature_files(Bucket::History)?;

    let needs_validity = matches!(request.task, Task::Verify | Task::Renew);
    let content_checked = if needs_validity {
        check_bucket(request.veo, Bucket::Content, &content_names)?
    } else {
        Vec::new()
    };
    let history_checked = if needs_validity {
        check_bucket(request.veo, Bucket::History, &history_names)?
    } else {
        Vec::new()
    };

    let history_snapshot = if request.task.appends_event() {
        Some(std::fs::read(request.veo.history_path())?)
    } else {
        None
    };

    if request.task.appends_event() {
        let event = build_event(request, &content_checked, &history_checked);
        history::append_event(&request.veo.history_path(), &event)?;
    }

    let plan = SigningPlan::for_task(request.task);

    let docs = match generate_signatures(request, &plan) {
        Ok(docs) => docs,
        Err(e) => {
            restore_history_on_abandon(request.veo.history_path(), history_snapshot.as_deref());
            return Err(e);
        }
    };

    if let Err(e) = commit(request.veo, &plan, &content_names, &history_names, docs) {
        restore_history_on_abandon(request.veo.history_path(), history_snapshot.as_deref());
        return Err(e);
    }

    Ok(())
}

fn restore_history_on_abandon(history_path: PathBuf, snapshot: Option<&[u8]>) {
    let Some(bytes) = snapshot else { return };
    if let Err(e) = restore_history(&history_path, bytes) {
        log::error!(
            "failed to restore {} after abandoning VEO: {}",
            history_path.display(),
            e
        );
    }
}

fn restore_history(history_path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = history_path
        .parent()
        .ok_or_else(|| ResignError::HistoryIo("history file has no parent directory".to_string()))?;
    let mut temp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| ResignError::HistoryIo(e.to_string()))?;
    std::io::Write::write_all(&mut temp, bytes).map_err(|e| ResignError::HistoryIo(e.to_string()))?;
    temp.persist(history_path)
        .map_err(|e| ResignError::HistoryIo(e.to_string()))?;
    Ok(())
}

fn check_bucket(veo: &VeoDir, bucket: Bucket, files: &[PathBuf]) -> Result<Vec<VerifiedSignature>> {
    let payload_path = veo.path().join(bucket.payload_file());
    let mut out = Vec::with_capacity(files.len());

    for file in files {
        let record = match signature_codec::parse(file, bucket) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{}: treating as invalid: {}", file.display(), e);
                out.push(VerifiedSignature {
                    record: unparsed_record(file, bucket),
                    valid: false,
                });
                continue;
            }
        };

        let record_for_fallback = record.clone();
        match verifier::verify(record, &payload_path) {
            Ok(verified) => out.push(verified),
            Err(e) => {
                log::warn!("{}: verification error, treating as invalid: {}", file.display(), e);
                out.push(VerifiedSignature {
                    record: record_for_fallback,
                    valid: false,
                });
            }
        }
    }

    Ok(out)
}

fn unparsed_record(path: &Path, bucket: Bucket) -> SignatureRecord {
    SignatureRecord {
        path: path.to_path_buf(),
        bucket,
        hash_algorithm: HashAlgorithm::default(),
        signature_algorithm: "UNKNOWN".to_string(),
        certificate_der: Vec::new(),
        signature_value: Vec::new(),
    }
}

fn describe_bucket(label: &str, checked: &[VerifiedSignature], kept: bool) -> String {
    checked
        .iter()
        .map(|c| {
            let status = if c.valid { "VALID" } else { "FAILED" };
            let action = if kept { "kept" } else { "removed" };
            format!("{} {}: {} ({})", label, c.record.filename(), status, action)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_event(
    request: &EngineRequest,
    content_checked: &[VerifiedSignature],
    history_checked: &[VerifiedSignature],
) -> Event {
    match request.task {
        Task::Verify => {
            let mut lines = Vec::new();
            let content_desc = describe_bucket("content", content_checked, true);
            let history_desc = describe_bucket("history", history_checked, false);
            if !content_desc.is_empty() {
                lines.push(content_desc);
            }
            if !history_desc.is_empty() {
                lines.push(history_desc);
            }
            Event::new("Signature verification", request.initiator, lines.join("\n"))
        }
        Task::Renew => {
            let mut lines = Vec::new();
            let content_desc = describe_bucket("content", content_checked, false);
            let history_desc = describe_bucket("history", history_checked, false);
            if !content_desc.is_empty() {
                lines.push(content_desc);
            }
            if !history_desc.is_empty() {
                lines.push(history_desc);
            }
            Event::new(
                "VEOContent.xml signature renewal",
                request.initiator,
                lines.join("\n"),
            )
        }
        Task::AddEvent => Event::new(
            "VEOHistory.xml event added",
            request.initiator,
            request.event_description.unwrap_or_default(),
        ),
        Task::Create => unreachable!("Create does not append a history event"),
    }
}

struct NewDocuments {
    content: Vec<Vec<u8>>,
    history: Vec<Vec<u8>>,
}

fn generate_signatures(request: &EngineRequest, plan: &SigningPlan) -> Result<NewDocuments> {
    let mut content = Vec::new();
    if plan.emit_content {
        let payload = canonical_bytes(&request.veo.content_path())?;
        for signer in request.signers {
            content.push(signature_codec::emit(&payload, signer, request.hash_algorithm)?);
        }
    }

    let mut history = Vec::new();
    if plan.emit_history {
        let payload = canonical_bytes(&request.veo.history_path())?;
        for signer in request.signers {
            history.push(signature_codec::emit(&payload, signer, request.hash_algorithm)?);
        }
    }

    Ok(NewDocuments { content, history })
}

/// Write the new signature set to disk, replacing whatever the plan
/// says to delete. Rolls back to the pre-call state (old signature
/// files restored, new ones removed) if any step fails partway.
fn commit(
    veo: &VeoDir,
    plan: &SigningPlan,
    old_content: &[PathBuf],
    old_history: &[PathBuf],
    docs: NewDocuments,
) -> Result<()> {
    let mut deleted_cache: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    let mut new_paths: Vec<PathBuf> = Vec::new();

    let outcome: Result<()> = (|| {
        if plan.delete_content {
            for path in old_content {
                deleted_cache.push((path.clone(), std::fs::read(path)?));
                std::fs::remove_file(path)?;
            }
        }
        if plan.delete_history {
            for path in old_history {
                deleted_cache.push((path.clone(), std::fs::read(path)?));
                std::fs::remove_file(path)?;
            }
        }

        for doc in &docs.content {
            let index = veo.next_signature_index(Bucket::Content)?;
            let path = veo.signature_path(Bucket::Content, index);
            std::fs::write(&path, doc)?;
            new_paths.push(path);
        }
        for doc in &docs.history {
            let index = veo.next_signature_index(Bucket::History)?;
            let path = veo.signature_path(Bucket::History, index);
            std::fs::write(&path, doc)?;
            new_paths.push(path);
        }

        Ok(())
    })();

    if let Err(e) = outcome {
        for path in &new_paths {
            let _ = std::fs::remove_file(path);
        }
        for (path, bytes) in &deleted_cache {
            let _ = std::fs::write(path, bytes);
        }
        return Err(e);
    }

    Ok(())
}

/// Optionally repack the VEO directory into a ZIP archive (spec
/// §4.7's S3→Sdone cleanup step). Returns `Ok(None)`, rather than
/// propagating [`ResignError::ArchiveExists`], when the target already
/// exists and `overwrite` was not requested: skipping the repack of an
/// already-processed VEO is not itself a task failure.
pub fn maybe_repack(veo: &VeoDir, output_dir: &Path, overwrite: bool) -> Result<Option<PathBuf>> {
    match crate::archive::pack(veo.path(), output_dir, overwrite) {
        Ok(path) => Ok(Some(path)),
        Err(ResignError::ArchiveExists(target)) => {
            log::info!(
                "{} already exists and -overwrite was not requested; skipping repack",
                target
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signing_plan_matches_table() {
        let verify = SigningPlan::for_task(Task::Verify);
        assert!(!verify.emit_content);
        assert!(verify.emit_history);
        assert!(!verify.delete_content);
        assert!(verify.delete_history);

        let create = SigningPlan::for_task(Task::Create);
        assert!(create.emit_content && create.emit_history);
        assert!(create.delete_content && create.delete_history);
    }

    #[test]
    fn describe_bucket_formats_status_and_action() {
        let record = unparsed_record(Path::new("VEOContent Signature1.xml"), Bucket::Content);
        let checked = vec![VerifiedSignature { record, valid: false }];
        let text = describe_bucket("content", &checked, true);
        assert_eq!(
            text,
            "content VEOContent Signature1.xml: FAILED (kept)"
        );
    }
}
