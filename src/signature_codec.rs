// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signature Codec (spec §4.3, component C3): parsing detached VEO
//! signature documents and emitting fresh ones.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use digest::Digest;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use quick_xml::events::Event as XmlEvent;
use quick_xml::reader::Reader;
use rsa::Pkcs1v15Sign;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::credential::{PrivateKey, SignerCredential};
use crate::error::{ResignError, Result};
use crate::veo::Bucket;

/// A digest algorithm supported for hashing payloads and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha512
    }
}

impl HashAlgorithm {
    /// The schema-facing identifier, e.g. `SHA-256`.
    pub fn label(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim() {
            "SHA-1" | "SHA1" => Ok(HashAlgorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Ok(HashAlgorithm::Sha512),
            other => Err(ResignError::VerifyAlgo(format!("unknown hash algorithm {:?}", other))),
        }
    }

    /// CLI-facing identifier accepted by `-ha`.
    pub fn from_cli(s: &str) -> Result<Self> {
        Self::from_label(&s.to_uppercase())
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// A parsed detached signature document.
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub path: PathBuf,
    pub bucket: Bucket,
    pub hash_algorithm: HashAlgorithm,
    /// The raw `<vers:SignatureAlgorithm>` text, e.g. `SHA256withRSA`.
    pub signature_algorithm: String,
    /// DER bytes of the signer (leaf) certificate.
    pub certificate_der: Vec<u8>,
    pub signature_value: Vec<u8>,
}

impl SignatureRecord {
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

const XMLNS_VERS: &str = "http://www.prov.vic.gov.au/VERS-as-xml/1.0";

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    match s.rfind(':') {
        Some(idx) => s[idx + 1..].to_string(),
        None => s.to_string(),
    }
}

/// Parse a detached signature document at `path`, declared to belong
/// to `bucket`.
pub fn parse(path: &Path, bucket: Bucket) -> Result<SignatureRecord> {
    let bytes = std::fs::read(path)?;
    let mut reader = Reader::from_reader(bytes.as_slice());
    reader.config_mut().trim_text = true;

    let mut buf = Vec::new();
    let mut current: Option<String> = None;

    let mut hash_algorithm_text = None;
    let mut signature_algorithm_text = None;
    let mut certificate_text: Option<String> = None;
    let mut signature_value_text = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                current = Some(local_name(e.name().as_ref()));
            }
            Ok(XmlEvent::Text(e)) | Ok(XmlEvent::CData(e)) => {
                if let Some(tag) = &current {
                    let text = e
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(e.as_ref()).into_owned());
                    match tag.as_str() {
                        "HashAlgorithm" if hash_algorithm_text.is_none() => {
                            hash_algorithm_text = Some(text.trim().to_string());
                        }
                        "SignatureAlgorithm" if signature_algorithm_text.is_none() => {
                            signature_algorithm_text = Some(text.trim().to_string());
                        }
                        "Certificate" if certificate_text.is_none() => {
                            certificate_text = Some(text.trim().to_string());
                        }
                        "SignatureValue" if signature_value_text.is_none() => {
                            signature_value_text = Some(text.trim().to_string());
                        }
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::End(_)) => {
                current = None;
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ResignError::SignatureMalformed(format!(
                    "{}: XML parse error: {}",
                    path.display(),
                    e
                )))
            }
        }
        buf.clear();
    }

    let hash_algorithm = HashAlgorithm::from_label(&hash_algorithm_text.ok_or_else(|| {
        ResignError::SignatureMalformed(format!("{}: missing HashAlgorithm element", path.display()))
    })?)?;
    let signature_algorithm = signature_algorithm_text.ok_or_else(|| {
        ResignError::SignatureMalformed(format!(
            "{}: missing SignatureAlgorithm element",
            path.display()
        ))
    })?;
    let certificate_b64 = certificate_text.ok_or_else(|| {
        ResignError::SignatureMalformed(format!("{}: missing Certificate element", path.display()))
    })?;
    let signature_b64 = signature_value_text.ok_or_else(|| {
        ResignError::SignatureMalformed(format!(
            "{}: missing SignatureValue element",
            path.display()
        ))
    })?;

    let certificate_der = BASE64
        .decode(certificate_b64.as_bytes())
        .map_err(|e| ResignError::SignatureMalformed(format!("{}: bad Certificate base64: {}", path.display(), e)))?;
    let signature_value = BASE64
        .decode(signature_b64.as_bytes())
        .map_err(|e| ResignError::SignatureMalformed(format!("{}: bad SignatureValue base64: {}", path.display(), e)))?;

    Ok(SignatureRecord {
        path: path.to_path_buf(),
        bucket,
        hash_algorithm,
        signature_algorithm,
        certificate_der,
        signature_value,
    })
}

/// Sign `digest` (already hashed with `hash_algorithm`) using `key`,
/// returning the raw signature bytes and the `<SignatureAlgorithm>`
/// text to embed.
fn sign_digest(
    digest: &[u8],
    hash_algorithm: HashAlgorithm,
    key: &PrivateKey,
) -> Result<(Vec<u8>, String)> {
    let algo_suffix = hash_algorithm.label().replace('-', "");

    match key {
        PrivateKey::Rsa(rsa_key) => {
            let padding = match hash_algorithm {
                HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
                HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
                HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
                HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
            };
            let signature = rsa_key
                .sign(padding, digest)
                .map_err(|e| ResignError::Other(format!("RSA signing failed: {}", e)))?;
            Ok((signature, format!("{}withRSA", algo_suffix)))
        }
        PrivateKey::EcdsaP256(ec_key) => {
            let signature: p256::ecdsa::Signature = ec_key
                .sign_prehash(digest)
                .map_err(|e| ResignError::Other(format!("ECDSA signing failed: {}", e)))?;
            Ok((signature.to_der().as_bytes().to_vec(), format!("{}withECDSA", algo_suffix)))
        }
    }
}

/// Produce a fresh detached signature document over `payload` using
/// `credential`, hashed with `hash_algorithm`.
pub fn emit(
    payload: &[u8],
    credential: &SignerCredential,
    hash_algorithm: HashAlgorithm,
) -> Result<Vec<u8>> {
    let digest = hash_algorithm.digest(payload);
    let (signature, signature_algorithm) = sign_digest(&digest, hash_algorithm, &credential.private_key)?;

    let leaf_der = credential
        .leaf_certificate
        .encode_der()
        .map_err(|e| ResignError::Other(format!("encoding leaf certificate: {}", e)))?;

    // `parse` only ever captures the first `<Certificate>` element and
    // treats it as the signer (leaf) certificate, so the leaf must be
    // emitted first regardless of where the PKCS#12 file stored it in
    // `certificate_chain`. Remaining chain certificates follow for
    // completeness but are never read back by `parse`.
    let mut certificate_blocks = format!(
        "  <vers:Certificate>{}</vers:Certificate>\n",
        BASE64.encode(&leaf_der)
    );
    for cert in &credential.certificate_chain {
        let der = cert
            .encode_der()
            .map_err(|e| ResignError::Other(format!("encoding chain certificate: {}", e)))?;
        if der == leaf_der {
            continue;
        }
        certificate_blocks.push_str(&format!(
            "  <vers:Certificate>{}</vers:Certificate>\n",
            BASE64.encode(der)
        ));
    }

    let document = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<vers:SignatureBlock xmlns:vers=\"{ns}\">\n\
 <vers:HashAlgorithm>{hash}</vers:HashAlgorithm>\n\
 <vers:SignatureAlgorithm>{sigalg}</vers:SignatureAlgorithm>\n\
 <vers:CertificateBlock>\n{certs}\
 </vers:CertificateBlock>\n\
 <vers:SignatureValue>{sigval}</vers:SignatureValue>\n\
</vers:SignatureBlock>\n",
        ns = XMLNS_VERS,
        hash = hash_algorithm.label(),
        sigalg = signature_algorithm,
        certs = certificate_blocks,
        sigval = BASE64.encode(&signature),
    );

    Ok(document.into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_algorithm_round_trips_label() {
        for algo in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            let parsed = HashAlgorithm::from_label(algo.label()).unwrap();
            assert_eq!(parsed, algo);
        }
    }

    #[test]
    fn default_is_sha512() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha512);
    }

    #[test]
    fn local_name_strips_namespace_prefix() {
        assert_eq!(local_name(b"vers:SignatureValue"), "SignatureValue");
        assert_eq!(local_name(b"SignatureValue"), "SignatureValue");
    }
}
