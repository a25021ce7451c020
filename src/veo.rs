// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The VEO data model: directories, signature buckets, tasks and events.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// The fixed content manifest filename within a VEO directory.
pub const CONTENT_FILE: &str = "VEOContent.xml";

/// The fixed history log filename within a VEO directory.
pub const HISTORY_FILE: &str = "VEOHistory.xml";

/// Which document a signature file is detached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Content,
    History,
}

impl Bucket {
    /// The payload filename this bucket's signatures cover.
    pub fn payload_file(self) -> &'static str {
        match self {
            Bucket::Content => CONTENT_FILE,
            Bucket::History => HISTORY_FILE,
        }
    }

    /// The filename prefix used for signature files in this bucket.
    pub fn filename_prefix(self) -> &'static str {
        match self {
            Bucket::Content => "VEOContent Signature",
            Bucket::History => "VEOHistory Signature",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Content => write!(f, "content"),
            Bucket::History => write!(f, "history"),
        }
    }
}

/// The engine's top-level mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Verify,
    Renew,
    Create,
    AddEvent,
}

impl Task {
    /// Human-readable outcome phrase printed on success (spec §7).
    pub fn outcome_phrase(self) -> &'static str {
        match self {
            Task::Verify => "Signatures verified. VEO history updated.",
            Task::Renew => "Signatures renewed. VEO history updated.",
            Task::Create => "Signatures created.",
            Task::AddEvent => "Event added to history. VEOHistory resigned.",
        }
    }

    /// Whether this task appends a history event (spec §4.7 table).
    pub fn appends_event(self) -> bool {
        !matches!(self, Task::Create)
    }
}

/// A provenance event appended to the history document.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub event_type: String,
    pub initiator: String,
    pub description: String,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        initiator: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            event_type: event_type.into(),
            initiator: initiator.into(),
            description: description.into(),
        }
    }

    /// Timestamp formatted in the VERS date-time convention: ISO-8601
    /// with a numeric timezone offset, second precision.
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }
}

/// A VEO directory rooted at `path`, whose basename ends in `.veo`.
#[derive(Debug, Clone)]
pub struct VeoDir {
    path: PathBuf,
}

impl VeoDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_path(&self) -> PathBuf {
        self.path.join(CONTENT_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.path.join(HISTORY_FILE)
    }

    /// List the signature files present for `bucket`, in filename order.
    pub fn signature_files(&self, bucket: Bucket) -> std::io::Result<Vec<PathBuf>> {
        let prefix = bucket.filename_prefix();
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(prefix) && name.ends_with(".xml") {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// The smallest positive integer `k` not already used by a
    /// `<prefix><k>.xml` file in `bucket` (spec §4.3).
    pub fn next_signature_index(&self, bucket: Bucket) -> std::io::Result<u32> {
        let prefix = bucket.filename_prefix();
        let mut used = std::collections::HashSet::new();
        for path in self.signature_files(bucket)? {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(rest) = name
                    .strip_prefix(prefix)
                    .and_then(|r| r.strip_suffix(".xml"))
                {
                    if let Ok(n) = rest.trim().parse::<u32>() {
                        used.insert(n);
                    }
                }
            }
        }
        let mut k = 1;
        while used.contains(&k) {
            k += 1;
        }
        Ok(k)
    }

    pub fn signature_path(&self, bucket: Bucket, index: u32) -> PathBuf {
        self.path
            .join(format!("{}{}.xml", bucket.filename_prefix(), index))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn event_timestamp_has_offset() {
        let event = Event::new("Test", "tester", "desc");
        let ts = event.formatted_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.len() >= 19);
    }

    #[test]
    fn bucket_payload_files() {
        assert_eq!(Bucket::Content.payload_file(), CONTENT_FILE);
        assert_eq!(Bucket::History.payload_file(), HISTORY_FILE);
    }
}
