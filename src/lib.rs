// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library half of the VEO resign engine: credential loading, detached
//! signature parsing/verification/emission, history mutation, safe
//! archive I/O, the per-VEO engine, and the batch driver. `main.rs`
//! wraps this in a CLI.

pub mod archive;
pub mod batch;
pub mod canonical;
pub mod credential;
pub mod engine;
pub mod error;
pub mod history;
pub mod signature_codec;
pub mod veo;
pub mod verifier;
