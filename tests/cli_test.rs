// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary-level coverage of the `veoresign` CLI surface (spec §6).

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::str::contains;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
}

fn write_sample_veo(tmp: &TempDir) -> assert_fs::fixture::ChildPath {
    let veo = tmp.child("sample.veo");
    veo.create_dir_all().unwrap();
    veo.child("VEOContent.xml")
        .write_str("<vers:VEOContent xmlns:vers=\"urn:test\">\n  <payload>x</payload>\n</vers:VEOContent>\n")
        .unwrap();
    veo.child("VEOHistory.xml")
        .write_str("<?xml version=\"1.0\"?>\n<vers:VEOHistory xmlns:vers=\"urn:test\">\n</vers:VEOHistory>\n")
        .unwrap();
    veo
}

#[test]
fn no_task_flag_is_a_nonzero_exit() {
    let tmp = TempDir::new().unwrap();
    let veo = write_sample_veo(&tmp);

    Command::cargo_bin("veoresign")
        .unwrap()
        .arg("-s")
        .arg(fixture("rsa_signer.p12"))
        .arg("testpass123")
        .arg(veo.path())
        .assert()
        .failure()
        .stderr(contains("is required"));
}

#[test]
fn addevent_without_description_is_a_nonzero_exit() {
    let tmp = TempDir::new().unwrap();
    let veo = write_sample_veo(&tmp);

    Command::cargo_bin("veoresign")
        .unwrap()
        .arg("--addevent")
        .arg("-s")
        .arg(fixture("rsa_signer.p12"))
        .arg("testpass123")
        .arg(veo.path())
        .assert()
        .failure()
        .stderr(contains("-e <eventDesc>"));
}

#[test]
fn create_end_to_end_through_the_binary() {
    let tmp = TempDir::new().unwrap();
    let veo = write_sample_veo(&tmp);

    Command::cargo_bin("veoresign")
        .unwrap()
        .arg("--create")
        .arg("-s")
        .arg(fixture("rsa_signer.p12"))
        .arg("testpass123")
        .arg("-s")
        .arg(fixture("ecdsa_signer.p12"))
        .arg("testpass123")
        .arg("--ha")
        .arg("SHA-256")
        .arg(veo.path())
        .assert()
        .success()
        .stdout(contains("Signatures created."));

    veo.child("VEOContent Signature1.xml").assert(predicates::path::exists());
    veo.child("VEOContent Signature2.xml").assert(predicates::path::exists());
    veo.child("VEOHistory Signature1.xml").assert(predicates::path::exists());
}

#[test]
fn zip_flag_produces_an_archive_alongside_the_directory() {
    let tmp = TempDir::new().unwrap();
    let veo = write_sample_veo(&tmp);
    let out_dir = tmp.child("out");
    out_dir.create_dir_all().unwrap();

    Command::cargo_bin("veoresign")
        .unwrap()
        .arg("--create")
        .arg("-s")
        .arg(fixture("rsa_signer.p12"))
        .arg("testpass123")
        .arg("--zip")
        .arg("-o")
        .arg(out_dir.path())
        .arg(veo.path())
        .assert()
        .success();

    out_dir.child("sample.veo.zip").assert(predicates::path::exists());
}
