// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Safe Archive I/O (spec §4.6, component C6): defensive ZIP
//! extraction and creation of VEO archives.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{Datelike, Timelike};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ResignError, Result};

/// Lexically normalize `path`, rejecting any `..` component outright
/// (spec §4.6: "reject if any component equals `..`"). Does not touch
/// the filesystem. `path` may itself be absolute (as `output_root` and
/// a joined extraction target are); use [`normalize_relative_no_parent`]
/// for path fragments that must never be allowed to root themselves.
fn normalize_no_parent(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => return None,
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// As [`normalize_no_parent`], but additionally rejects any rooted
/// component (`RootDir`/`Prefix`). Used for the archive-entry-supplied
/// remainder after stripping the VEO-name segment: that fragment must
/// stay purely relative, or joining it onto `veo_dir` would replace
/// rather than extend the directory (`PathBuf::join`'s documented
/// behavior when the argument is absolute), escaping containment.
fn normalize_relative_no_parent(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => return None,
            Component::RootDir | Component::Prefix(_) => return None,
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Extract the VEO archive at `archive_path` under `output_root`,
/// returning the path to the unpacked VEO directory.
pub fn unpack(archive_path: &Path, output_root: &Path) -> Result<PathBuf> {
    let file_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ResignError::Other(format!("bad archive path {:?}", archive_path)))?;
    let veo_name = file_name
        .strip_suffix(".zip")
        .ok_or_else(|| ResignError::Other(format!("{} does not end in .zip", file_name)))?
        .to_string();

    let archive_size = std::fs::metadata(archive_path)?.len();

    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(file)?;

    let compressed_total: u64 = (0..zip.len())
        .map(|i| zip.by_index(i).map(|e| e.compressed_size()).unwrap_or(0))
        .sum();
    if compressed_total > archive_size {
        return Err(ResignError::ArchiveTruncated);
    }

    let output_root = normalize_no_parent(output_root)
        .ok_or_else(|| ResignError::Other("output root contains `..`".to_string()))?;
    let veo_dir = output_root.join(&veo_name);

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let raw_name = entry.name().replace('\\', "/");

        let mut segments = raw_name.splitn(2, '/');
        let first = segments.next().unwrap_or("");
        let remainder = segments.next().unwrap_or("");

        if first != veo_name {
            return Err(ResignError::ArchiveMislabeled(raw_name));
        }

        let remainder_path = normalize_relative_no_parent(Path::new(remainder))
            .ok_or_else(|| ResignError::ArchiveEscape(raw_name.clone()))?;

        let target = veo_dir.join(&remainder_path);
        let normalized_target = normalize_no_parent(&target)
            .ok_or_else(|| ResignError::ArchiveEscape(raw_name.clone()))?;
        if !normalized_target.starts_with(&output_root) {
            return Err(ResignError::ArchiveEscape(raw_name.clone()));
        }

        if entry.is_dir() || raw_name.ends_with('/') {
            std::fs::create_dir_all(&normalized_target)?;
            continue;
        }

        if let Some(parent) = normalized_target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&normalized_target)?;
        std::io::copy(&mut entry, &mut out)?;
        drop(out);

        if let Some(timestamp) = zip_entry_unix_timestamp(&entry) {
            let filetime = filetime::FileTime::from_unix_time(timestamp, 0);
            let _ = filetime::set_file_mtime(&normalized_target, filetime);
        }
    }

    Ok(veo_dir)
}

/// Convert a ZIP entry's stored MS-DOS timestamp into a Unix epoch
/// offset, provided it round-trips through a real calendar date.
fn zip_entry_unix_timestamp(entry: &zip::read::ZipFile) -> Option<i64> {
    let dt = entry.last_modified();
    let date = chrono::NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?;
    let time =
        chrono::NaiveTime::from_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    Some(date.and_time(time).and_utc().timestamp())
}

fn zip_datetime_for(path: &Path) -> zip::DateTime {
    let fallback = zip::DateTime::default();
    let Ok(meta) = std::fs::metadata(path) else {
        return fallback;
    };
    let Ok(modified) = meta.modified() else {
        return fallback;
    };
    let datetime: chrono::DateTime<chrono::Local> = modified.into();
    zip::DateTime::from_date_and_time(
        datetime.year() as u16,
        datetime.month() as u8,
        datetime.day() as u8,
        datetime.hour() as u8,
        datetime.minute() as u8,
        datetime.second() as u8,
    )
    .unwrap_or(fallback)
}

/// Pack `veo_dir` into `output_dir/<basename>.zip`, entries rooted at
/// the VEO directory's own name.
pub fn pack(veo_dir: &Path, output_dir: &Path, overwrite: bool) -> Result<PathBuf> {
    let veo_name = veo_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ResignError::Other(format!("bad VEO path {:?}", veo_dir)))?;

    let output_path = output_dir.join(format!("{}.zip", veo_name));
    if output_path.exists() {
        if !overwrite {
            return Err(ResignError::ArchiveExists(output_path.display().to_string()));
        }
        std::fs::remove_file(&output_path)?;
    }

    let file = File::create(&output_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(veo_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ResignError::Other(format!("walking {}: {}", veo_dir.display(), e)))?;
        let relative = entry.path().strip_prefix(veo_dir).unwrap();
        if relative.as_os_str().is_empty() {
            continue;
        }
        let entry_name = format!("{}/{}", veo_name, relative.to_string_lossy().replace('\\', "/"));
        let dated_options = options.last_modified_time(zip_datetime_for(entry.path()));

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{}/", entry_name), dated_options)?;
        } else {
            writer.start_file(entry_name, dated_options)?;
            let mut f = File::open(entry.path())?;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            writer.write_all(&buf)?;
        }
    }

    writer.finish()?;
    Ok(output_path)
}
