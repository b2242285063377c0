use std::time::SystemTime;

use sha2::{Digest, Sha256};
use x509_cert::certificate::CertificateInner;
use x509_cert::der::Encode;
use x509_verify::VerifyingKey;

use crate::error::{ConfigurationError, CryptoError};
use crate::utils::Expireable;

/// A pinned attestation root. Construction proves the certificate is
/// self-issued and carries a valid self-signature, so chain walks later
/// anchor on DER equality alone.
#[derive(Clone, Debug)]
pub struct TrustedRoot {
    cert: CertificateInner,
    der: Vec<u8>,
    fingerprint: [u8; 32],
}

impl TrustedRoot {
    pub fn new(cert: CertificateInner) -> Result<Self, ConfigurationError> {
        let subject = cert.tbs_certificate.subject.to_string();
        let issuer = cert.tbs_certificate.issuer.to_string();
        if subject != issuer {
            return Err(ConfigurationError::InvalidTrustRoot(format!(
                "not self-issued: subject {subject}, issuer {issuer}"
            )));
        }

        let key = VerifyingKey::try_from(&cert).map_err(|e| {
            ConfigurationError::InvalidTrustRoot(format!("unsupported public key: {e}"))
        })?;
        key.verify_strict(&cert).map_err(|e| {
            ConfigurationError::InvalidTrustRoot(format!("self-signature did not verify: {e}"))
        })?;

        let der = cert
            .to_der()
            .map_err(|e| ConfigurationError::InvalidTrustRoot(e.to_string()))?;
        let fingerprint = Sha256::digest(&der).into();

        Ok(TrustedRoot {
            cert,
            der,
            fingerprint,
        })
    }

    /// Loads the first certificate of a PEM bundle as the pinned root.
    pub fn from_pem(pem: &str) -> Result<Self, ConfigurationError> {
        let certs = CertificateInner::load_pem_chain(pem.as_bytes())
            .map_err(|e| ConfigurationError::InvalidTrustRoot(e.to_string()))?;
        let cert = certs.into_iter().next().ok_or_else(|| {
            ConfigurationError::InvalidTrustRoot("no certificate in pem".to_string())
        })?;
        TrustedRoot::new(cert)
    }

    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// SHA-256 over the DER encoding of the root certificate.
    pub fn fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    fn matches(&self, cert: &CertificateInner) -> bool {
        cert.to_der().map(|der| der == self.der).unwrap_or(false)
    }
}

/// Walks a PCK certificate chain, leaf first as it appears in a quote.
/// The last certificate must be the pinned root byte for byte, every link
/// must be inside its validity window at `current_time`, and each
/// certificate must carry a valid signature by its successor.
pub fn verify_pck_chain(
    chain: &[CertificateInner],
    root: &TrustedRoot,
    current_time: SystemTime,
    max_depth: usize,
) -> Result<(), CryptoError> {
    if chain.is_empty() {
        return Err(CryptoError::ChainBroken {
            detail: "empty certificate chain".to_string(),
        });
    }

    if chain.len() > max_depth {
        return Err(CryptoError::ChainBroken {
            detail: format!("chain length {} exceeds limit {max_depth}", chain.len()),
        });
    }

    let anchor = &chain[chain.len() - 1];
    if !root.matches(anchor) {
        let subject = anchor.tbs_certificate.subject.to_string();
        return Err(CryptoError::ChainBroken {
            detail: format!("no path to the pinned root, chain anchored at {subject}"),
        });
    }

    for cert in chain {
        if !cert.valid_at(current_time) {
            return Err(CryptoError::CertificateExpired {
                subject: cert.tbs_certificate.subject.to_string(),
            });
        }
    }

    // Validate signatures from the root end down to the leaf.
    for (cert, issuer_cert) in chain.iter().zip(chain[1..].iter()).rev() {
        let issuer = cert.tbs_certificate.issuer.to_string();
        let signer_subject = issuer_cert.tbs_certificate.subject.to_string();
        if issuer != signer_subject {
            return Err(CryptoError::UnknownIssuer { issuer });
        }

        let key = VerifyingKey::try_from(issuer_cert).map_err(|e| CryptoError::ChainBroken {
            detail: format!("unsupported issuer public key: {e}"),
        })?;
        key.verify_strict(cert).map_err(|e| CryptoError::ChainBroken {
            detail: format!("signature by {signer_subject} did not verify: {e}"),
        })?;
    }

    Ok(())
}
