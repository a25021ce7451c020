// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `veoresign`: re-signs VERS Encapsulated Object preservation packages.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use veo_resign::batch::{self, RunConfig};
use veo_resign::credential::{self, SignerCredential};
use veo_resign::error::ResignError;
use veo_resign::signature_codec::HashAlgorithm;
use veo_resign::veo::Task;

/// Re-sign VERS Encapsulated Object (VEO) preservation packages.
#[derive(Parser, Debug)]
#[command(name = "veoresign", version, about)]
struct Cli {
    /// Verify existing signatures and record the outcome in the history log.
    #[arg(long = "verify")]
    verify: bool,

    /// Re-sign the content bucket, discarding signatures that no longer verify.
    #[arg(long = "renew")]
    renew: bool,

    /// Sign a freshly assembled VEO from scratch, discarding any prior signatures.
    #[arg(long = "create")]
    create: bool,

    /// Append a user-supplied event and re-sign the history bucket.
    #[arg(long = "addevent")]
    addevent: bool,

    /// A signer: PFX file and its password. Repeatable; order is load-bearing.
    #[arg(short = 's', num_args = 2, value_names = ["PFX_FILE", "PASSWORD"])]
    signer: Vec<String>,

    /// Schema location, forwarded opaquely to the verifier.
    #[arg(long = "support", value_name = "DIR")]
    support: Option<PathBuf>,

    /// The initiator recorded on appended history events (default: current user).
    #[arg(short = 'u', value_name = "USER_DESC")]
    user_desc: Option<String>,

    /// The event description; required for -addevent.
    #[arg(short = 'e', value_name = "EVENT_DESC")]
    event_desc: Option<String>,

    /// The digest algorithm used for both hashing and signing.
    #[arg(long = "ha", value_name = "HASH_ALGORITHM", default_value = "SHA-512")]
    hash_algorithm: String,

    /// Output directory for unpacked VEOs and repacked archives (default: cwd).
    #[arg(short = 'o', value_name = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Repack the VEO into a `.veo.zip` archive after resigning.
    #[arg(long = "zip")]
    zip: bool,

    /// Allow overwriting existing unpacked directories and archives.
    #[arg(long = "overwrite")]
    overwrite: bool,

    /// Verbose (info-level) logging.
    #[arg(short = 'v')]
    verbose: bool,

    /// Debug-level logging.
    #[arg(short = 'd')]
    debug: bool,

    /// One or more `.veo` directories or `.veo.zip` archives.
    #[arg(value_name = "VEO")]
    inputs: Vec<PathBuf>,
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn resolve_task(cli: &Cli) -> Result<Task, ResignError> {
    let chosen = [cli.verify, cli.renew, cli.create, cli.addevent]
        .iter()
        .filter(|&&b| b)
        .count();
    match chosen {
        0 => Err(ResignError::EngineConfig(
            "one of -verify, -renew, -create, -addevent is required".to_string(),
        )),
        1 => {
            if cli.verify {
                Ok(Task::Verify)
            } else if cli.renew {
                Ok(Task::Renew)
            } else if cli.create {
                Ok(Task::Create)
            } else {
                Ok(Task::AddEvent)
            }
        }
        _ => Err(ResignError::EngineConfig(
            "-verify, -renew, -create and -addevent are mutually exclusive".to_string(),
        )),
    }
}

fn default_user_desc() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

fn load_signers(cli: &Cli) -> Result<Vec<SignerCredential>, ResignError> {
    if cli.signer.is_empty() {
        return Err(ResignError::EngineConfig(
            "at least one -s <pfxFile> <password> is required".to_string(),
        ));
    }
    let pairs: Vec<(PathBuf, String)> = cli
        .signer
        .chunks_exact(2)
        .map(|chunk| (PathBuf::from(&chunk[0]), chunk[1].clone()))
        .collect();
    credential::load_all(&pairs)
}

fn run(cli: Cli) -> Result<ExitCode, ResignError> {
    init_logging(cli.verbose, cli.debug);

    if let Some(dir) = &cli.support {
        log::debug!("schema support directory configured: {}", dir.display());
    }

    let task = resolve_task(&cli)?;
    let hash_algorithm = HashAlgorithm::from_cli(&cli.hash_algorithm)?;
    let signers = load_signers(&cli)?;

    if task == Task::AddEvent {
        let missing = cli.event_desc.as_deref().map(str::trim).unwrap_or("").is_empty();
        if missing {
            return Err(ResignError::EngineConfig(
                "-addevent requires -e <eventDesc>".to_string(),
            ));
        }
    }

    if cli.inputs.is_empty() {
        return Err(ResignError::EngineConfig(
            "at least one VEO directory or archive is required".to_string(),
        ));
    }

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let initiator = cli.user_desc.clone().unwrap_or_else(default_user_desc);

    let config = RunConfig {
        task,
        signers: &signers,
        hash_algorithm,
        initiator: &initiator,
        event_description: cli.event_desc.as_deref(),
        output_dir,
        repack: cli.zip,
        overwrite: cli.overwrite,
    };

    let outcomes = batch::run(&cli.inputs, &config)?;

    let mut any_failed = false;
    for outcome in &outcomes {
        let now = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%:z");
        match &outcome.result {
            Ok(()) => println!("{} {} {}", now, outcome.veo_name, task.outcome_phrase()),
            Err(e) => {
                any_failed = true;
                println!("{} {} FAILED. VEO not updated. Cause: {}.", now, outcome.veo_name, e);
            }
        }
    }

    Ok(if any_failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("veoresign: {}", e);
            ExitCode::FAILURE
        }
    }
}
