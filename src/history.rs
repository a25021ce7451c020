// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! History Mutator (spec §4.5, component C5).
//!
//! Appends a single `<vers:Event>` to `VEOHistory.xml` by streaming the
//! original file line by line into a sibling temporary file, splicing
//! the event in just before the closing root tag, then atomically
//! replacing the original. Any failure leaves the original file
//! untouched; the temporary file is cleaned up automatically by its
//! `Drop` impl if it is never persisted.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{ResignError, Result};
use crate::veo::Event;

const CLOSING_TAG: &str = "</vers:VEOHistory>";

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_event_block(event: &Event) -> String {
    format!(
        " <vers:Event>\n  <vers:EventDateTime>{}</vers:EventDateTime>\n  <vers:EventType>{}</vers:EventType>\n  <vers:Initiator>{}</vers:Initiator>\n  <vers:Description>\n{}\n  </vers:Description>\n </vers:Event>",
        event.formatted_timestamp(),
        xml_escape(&event.event_type),
        xml_escape(&event.initiator),
        xml_escape(&event.description),
    )
}

/// Append `event` to the history document at `history_path`.
pub fn append_event(history_path: &Path, event: &Event) -> Result<()> {
    if !history_path.exists() {
        return Err(ResignError::HistoryMissing(
            history_path.display().to_string(),
        ));
    }

    let dir = history_path.parent().ok_or_else(|| {
        ResignError::HistoryIo("history file has no parent directory".to_string())
    })?;

    let file =
        std::fs::File::open(history_path).map_err(|e| ResignError::HistoryIo(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut temp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| ResignError::HistoryIo(e.to_string()))?;

    let event_block = format_event_block(event);
    let mut inserted = false;

    for line in reader.lines() {
        let line = line.map_err(|e| ResignError::HistoryIo(e.to_string()))?;

        if !inserted {
            if let Some(idx) = line.find(CLOSING_TAG) {
                let (prefix, rest) = line.split_at(idx);
                write!(temp, "{}{}\n{}\n", prefix, event_block, rest)
                    .map_err(|e| ResignError::HistoryIo(e.to_string()))?;
                inserted = true;
                continue;
            }
        }

        writeln!(temp, "{}", line).map_err(|e| ResignError::HistoryIo(e.to_string()))?;
    }

    if !inserted {
        // temp's Drop removes the scratch file; the original is untouched.
        return Err(ResignError::HistoryMalformed);
    }

    temp.persist(history_path)
        .map_err(|e| ResignError::HistoryIo(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::veo::Event;

    fn write_history(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("VEOHistory.xml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn inserts_before_closing_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_history(
            dir.path(),
            "<?xml version=\"1.0\"?>\n<vers:VEOHistory>\n</vers:VEOHistory>\n",
        );

        let event = Event::new("Test event", "tester", "a description");
        append_event(&path, &event).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("<vers:Event>"));
        assert!(contents.contains("<vers:EventType>Test event</vers:EventType>"));
        assert!(contents.contains("</vers:VEOHistory>"));
        // Closing tag must still be the last meaningful element.
        let event_idx = contents.find("<vers:Event>").unwrap();
        let closing_idx = contents.rfind("</vers:VEOHistory>").unwrap();
        assert!(event_idx < closing_idx);
    }

    #[test]
    fn missing_file_is_history_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VEOHistory.xml");
        let event = Event::new("Test", "tester", "desc");
        let err = append_event(&path, &event).unwrap_err();
        assert!(matches!(err, ResignError::HistoryMissing(_)));
    }

    #[test]
    fn missing_closing_tag_is_malformed_and_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_history(dir.path(), "<vers:VEOHistory>\n<vers:Event/>\n");
        let original = std::fs::read_to_string(&path).unwrap();

        let event = Event::new("Test", "tester", "desc");
        let err = append_event(&path, &event).unwrap_err();
        assert!(matches!(err, ResignError::HistoryMalformed));

        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(original, after);
    }

    #[test]
    fn escapes_description_markup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_history(dir.path(), "<vers:VEOHistory>\n</vers:VEOHistory>\n");
        let event = Event::new("Test", "tester", "a <b> & c");
        append_event(&path, &event).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("a &lt;b&gt; &amp; c"));
    }
}
