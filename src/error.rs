use std::fmt;

use crate::types::TcbStatus;

/// Structural failures while decoding a quote. The parser is total: any
/// input either produces a `Quote` or one of these, never a panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("quote truncated reading {context}")]
    Truncated { context: &'static str },
    #[error("length mismatch in {context}: declared {declared}, found {actual}")]
    LengthMismatch {
        context: &'static str,
        declared: usize,
        actual: usize,
    },
    #[error("unsupported quote version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported TEE type {0:#010x}")]
    UnsupportedTeeType(u32),
    #[error("unsupported attestation key type {0}")]
    UnsupportedKeyType(u16),
    #[error("unrecognized QE vendor id {}", hex::encode(.0))]
    UnsupportedQeVendor([u8; 16]),
    #[error("unsupported certification data type {0}")]
    UnsupportedCertDataType(u16),
    #[error("malformed ECDSA signature in {context}")]
    SignatureDecode { context: &'static str },
    #[error("failed to decode PCK certificate chain: {detail}")]
    CertificateDecode { detail: String },
    #[error("malformed SGX extension in PCK certificate: {detail}")]
    SgxExtension { detail: String },
}

/// Cryptographic failures while authenticating a quote. These reject the
/// quote rather than fault the call, so they surface inside
/// [`RejectionReason`](crate::RejectionReason).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("signature verification failed for {context}")]
    SignatureInvalid { context: &'static str },
    #[error("certificate chain broken: {detail}")]
    ChainBroken { detail: String },
    #[error("certificate expired or not yet valid: {subject}")]
    CertificateExpired { subject: String },
    #[error("issuer not trusted: {issuer}")]
    UnknownIssuer { issuer: String },
}

/// Bad inputs on the relying-party side: malformed or mismatched policy
/// documents and unusable trust roots. These fault the call, they say
/// nothing about the quote under verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("malformed policy document: {0}")]
    Json(String),
    #[error("unsupported policy version {found}, expected {expected}")]
    UnsupportedPolicyVersion { expected: u16, found: u16 },
    #[error("unsupported tcb type {0}")]
    UnsupportedTcbType(u16),
    #[error("tcb level format does not match document version")]
    MixedTcbVersions,
    #[error("policy contains no tcb levels")]
    EmptyTcbLevels,
    #[error("tcb levels not sorted highest first at index {0}")]
    UnsortedTcbLevels(usize),
    #[error("tcb info is for fmspc {policy}, quote platform reports {platform}")]
    FmspcMismatch { policy: String, platform: String },
    #[error("tcb info is for pce id {policy}, quote platform reports {platform}")]
    PceIdMismatch { policy: String, platform: String },
    #[error("invalid trust root: {0}")]
    InvalidTrustRoot(String),
}

/// The `Err` side of [`verify_quote`](crate::verify_quote): the call could
/// not be carried out. Verdicts about the quote itself are `Ok` with a
/// rejected [`AttestationResult`](crate::AttestationResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Why a structurally valid quote was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("enclave identity mismatch on {field}")]
    IdentityMismatch { field: IdentityField },
    #[error("tcb status {status} below acceptance threshold {threshold}")]
    StatusBelowThreshold {
        status: TcbStatus,
        threshold: TcbStatus,
    },
}

/// Identity policy field that failed to match the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    MrSigner,
    IsvProdId,
    MiscSelect,
    Attributes,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityField::MrSigner => "mrsigner",
            IdentityField::IsvProdId => "isvprodid",
            IdentityField::MiscSelect => "miscselect",
            IdentityField::Attributes => "attributes",
        };
        f.write_str(name)
    }
}
