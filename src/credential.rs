// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Credential Provider (spec §4.1, component C1).
//!
//! Loads a signing identity from a PKCS#12 ("PFX") container. The PFX
//! parsing here follows the same shape used by Apple's own Keychain
//! Access export format: a `Data` auth-safe wrapping a sequence of
//! `ContentInfo`s, each holding `SafeBag`s that are either certificate
//! bags or (possibly password-shrouded) private key bags.

use std::path::{Path, PathBuf};

use p256::ecdsa::SigningKey as EcdsaSigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey as EcDecodePrivateKey;
use rsa::pkcs8::DecodePrivateKey as RsaDecodePrivateKey;
use rsa::RsaPrivateKey;
use x509_certificate::CapturedX509Certificate;

use crate::error::{ResignError, Result};

/// A private key held in memory, in the one of the two families this
/// engine supports.
#[derive(Clone)]
pub enum PrivateKey {
    Rsa(Box<RsaPrivateKey>),
    EcdsaP256(Box<EcdsaSigningKey>),
}

impl PrivateKey {
    pub fn family(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "RSA",
            PrivateKey::EcdsaP256(_) => "ECDSA",
        }
    }
}

/// A signer credential: a private key, its certificate chain, and a
/// human-readable label for the file it was loaded from.
#[derive(Clone)]
pub struct SignerCredential {
    pub private_key: PrivateKey,
    pub certificate_chain: Vec<CapturedX509Certificate>,
    pub leaf_certificate: CapturedX509Certificate,
    pub display_name: String,
}

fn bmp_string(s: &str) -> Vec<u8> {
    let utf16: Vec<u16> = s.encode_utf16().collect();
    let mut bytes = Vec::with_capacity(utf16.len() * 2 + 2);
    for c in utf16 {
        bytes.push((c / 256) as u8);
        bytes.push((c % 256) as u8);
    }
    bytes.push(0x00);
    bytes.push(0x00);
    bytes
}

/// Load a signer credential from a PKCS#12 file at `path`, decrypted
/// with `password`.
pub fn load(path: &Path, password: &str) -> Result<SignerCredential> {
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let data = std::fs::read(path).map_err(|e| {
        ResignError::CredentialLoad(format!("reading {}: {}", path.display(), e))
    })?;

    let (certificates, key_der) = parse_pfx(&data, password, &display_name)?;

    if certificates.is_empty() {
        return Err(ResignError::CredentialEmpty);
    }
    let key_der = key_der.ok_or(ResignError::CredentialEmpty)?;

    let private_key = decode_private_key(&key_der, &display_name)?;

    let leaf_index = find_leaf_index(&certificates, &private_key);
    let leaf_certificate = certificates[leaf_index].clone();

    Ok(SignerCredential {
        private_key,
        certificate_chain: certificates,
        leaf_certificate,
        display_name,
    })
}

fn parse_pfx(
    data: &[u8],
    password: &str,
    display_name: &str,
) -> Result<(Vec<CapturedX509Certificate>, Option<Vec<u8>>)> {
    let pfx = p12::PFX::parse(data).map_err(|e| {
        ResignError::CredentialLoad(format!("{} does not appear to be a PFX file: {:?}", display_name, e))
    })?;

    if !pfx.verify_mac(password) {
        return Err(ResignError::CredentialLoad(format!(
            "{}: incorrect passphrase",
            display_name
        )));
    }

    let outer_data = match pfx.auth_safe {
        p12::ContentInfo::Data(data) => data,
        _ => {
            return Err(ResignError::CredentialLoad(format!(
                "{}: unexpected top-level PFX content type",
                display_name
            )))
        }
    };

    let content_infos = yasna::parse_der(&outer_data, |reader| {
        reader.collect_sequence_of(p12::ContentInfo::parse)
    })
    .map_err(|e| {
        ResignError::CredentialLoad(format!("{}: malformed inner ContentInfo: {:?}", display_name, e))
    })?;

    let bmp_password = bmp_string(password);

    let mut certificates = Vec::new();
    let mut key_der = None;

    for content in content_infos {
        let bags_data = match content {
            p12::ContentInfo::Data(inner) => inner,
            p12::ContentInfo::EncryptedData(encrypted) => {
                encrypted.data(&bmp_password).ok_or_else(|| {
                    ResignError::CredentialLoad(format!(
                        "{}: failed decrypting inner EncryptedData",
                        display_name
                    ))
                })?
            }
            p12::ContentInfo::OtherContext(_) => {
                return Err(ResignError::CredentialLoad(format!(
                    "{}: unexpected OtherContext in PFX",
                    display_name
                )))
            }
        };

        let bags = yasna::parse_ber(&bags_data, |reader| {
            reader.collect_sequence_of(p12::SafeBag::parse)
        })
        .map_err(|e| {
            ResignError::CredentialLoad(format!("{}: malformed SafeBag: {:?}", display_name, e))
        })?;

        for bag in bags {
            match bag.bag {
                p12::SafeBagKind::CertBag(cert_bag) => match cert_bag {
                    p12::CertBag::X509(cert_data) => {
                        certificates.push(CapturedX509Certificate::from_der(cert_data).map_err(
                            |e| {
                                ResignError::CredentialLoad(format!(
                                    "{}: invalid certificate: {}",
                                    display_name, e
                                ))
                            },
                        )?);
                    }
                    p12::CertBag::SDSI(_) => {
                        return Err(ResignError::CredentialLoad(format!(
                            "{}: unsupported SDSI certificate entry",
                            display_name
                        )))
                    }
                },
                p12::SafeBagKind::Pkcs8ShroudedKeyBag(key_bag) => {
                    let decrypted = key_bag.decrypt(&bmp_password).ok_or_else(|| {
                        ResignError::CredentialLoad(format!(
                            "{}: failed decrypting private key bag; wrong passphrase?",
                            display_name
                        ))
                    })?;
                    key_der = Some(decrypted);
                }
                p12::SafeBagKind::OtherBagKind(_) => {
                    return Err(ResignError::CredentialLoad(format!(
                        "{}: unsupported bag kind in PFX",
                        display_name
                    )))
                }
            }
        }
    }

    Ok((certificates, key_der))
}

fn decode_private_key(der: &[u8], display_name: &str) -> Result<PrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::Rsa(Box::new(key)));
    }
    if let Ok(key) = EcdsaSigningKey::from_pkcs8_der(der) {
        return Ok(PrivateKey::EcdsaP256(Box::new(key)));
    }
    Err(ResignError::CredentialLoad(format!(
        "{}: private key is neither a supported RSA nor P-256 ECDSA PKCS#8 key",
        display_name
    )))
}

/// The leaf certificate is the first certificate on the chain whose
/// public key corresponds to the private key (spec §4.1). Matching is
/// done on the raw public key bytes; if no certificate matches (which
/// should not happen for a well-formed export), the first certificate
/// in the chain is used.
fn find_leaf_index(certs: &[CapturedX509Certificate], key: &PrivateKey) -> usize {
    for (idx, cert) in certs.iter().enumerate() {
        let cert_pub = cert.public_key_data();
        let matches = match key {
            PrivateKey::Rsa(rsa_key) => {
                use rsa::traits::PublicKeyParts;
                let public = rsa_key.to_public_key();
                cert_pub
                    .as_ref()
                    .windows(public.n().to_bytes_be().len())
                    .any(|w| w == public.n().to_bytes_be())
            }
            PrivateKey::EcdsaP256(ec_key) => {
                let verifying = ec_key.verifying_key();
                let point = verifying.to_encoded_point(false);
                cert_pub.as_ref() == point.as_bytes()
            }
        };
        if matches {
            return idx;
        }
    }
    0
}

/// Collect a batch's worth of `(path, password)` pairs into loaded
/// signer credentials, in configuration order. This order is load-bearing:
/// C7 processes signers in this order for both content and history buckets.
pub fn load_all(signers: &[(PathBuf, String)]) -> Result<Vec<SignerCredential>> {
    signers
        .iter()
        .map(|(path, password)| load(path, password))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bmp_string_null_terminated() {
        let encoded = bmp_string("ab");
        assert_eq!(encoded, vec![0x00, b'a', 0x00, b'b', 0x00, 0x00]);
    }
}
