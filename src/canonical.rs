// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonicalisation of XML payloads for hashing (spec §4.2, component C2).
//!
//! The VEO profile defines the hashed payload to be the literal bytes of
//! the file as stored on disk. No XML normalization, BOM stripping, or
//! line-ending translation is performed here.

use std::path::Path;

use crate::error::Result;

/// Read the canonical byte stream of `path` used as hashing input.
///
/// This is the raw file content; callers must not assume it is
/// whitespace- or encoding-normalized.
pub fn canonical_bytes(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn preserves_bom_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&[0xEF, 0xBB, 0xBF]).unwrap();
        f.write_all(b"<root/>\r\n").unwrap();
        drop(f);

        let bytes = canonical_bytes(&path).unwrap();
        assert_eq!(bytes, [0xEF, 0xBB, 0xBF, b'<', b'r', b'o', b'o', b't', b'/', b'>', b'\r', b'\n']);
    }
}
