pub mod chain;
pub mod constants;
pub mod error;
pub mod types;
pub mod utils;

use std::time::SystemTime;

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::VerifyingKey;
use tracing::{debug, warn};
use zerocopy::AsBytes;

pub use chain::{verify_pck_chain, TrustedRoot};
pub use error::{
    ConfigurationError, CryptoError, IdentityField, ParseError, RejectionReason, VerifyError,
};
pub use types::enclave_identity::{EnclaveIdentity, IdentityVerdict};
pub use types::quote::Quote;
pub use types::report::EnclaveReportBody;
pub use types::tcb_info::TcbInfo;
pub use types::{
    AttestationResult, CheckOutcome, TcbStatus, VerificationResult, VerifierOptions,
};
pub use utils::decode_quote_hex;

/// Verifies a serialized quote against the caller's policies and pinned
/// root certificate.
///
/// `Err` means the call could not be carried out: the policies failed
/// validation, or the quote does not decode. Every verdict about the quote
/// itself, including rejections, comes back as `Ok`.
pub fn verify_quote(
    current_time: SystemTime,
    quote_bytes: &[u8],
    identity: &EnclaveIdentity,
    tcb_info: &TcbInfo,
    trusted_root: &TrustedRoot,
    options: &VerifierOptions,
) -> Result<AttestationResult, VerifyError> {
    // 1. Validate the policy documents before touching the quote.
    identity.validate()?;
    tcb_info.validate()?;

    // 2. Decode the quote. Structural failures fault the call.
    let quote = Quote::parse(quote_bytes)?;
    debug!(
        version = quote.header.version.get(),
        fmspc = %hex::encode(quote.signature.pck_extension.fmspc),
        "quote parsed"
    );

    // 3. Authenticate the quote: PCK chain to the pinned root, the QE
    //    report binding, and both ECDSA signatures.
    if let Err(error) = verify_quote_signatures(&quote, trusted_root, current_time, options) {
        warn!(%error, "quote authentication failed");
        let reason = RejectionReason::Crypto(error);
        let result = VerificationResult {
            quote_version: quote.header.version.get(),
            signature: CheckOutcome::Fail,
            tcb: CheckOutcome::Indeterminate,
            identity: CheckOutcome::Indeterminate,
            status: TcbStatus::Revoked,
            matched_tcb_level: None,
            advisory_ids: Vec::new(),
            fmspc: None,
            reason: reason.to_string(),
        };
        return Ok(AttestationResult::Rejected(reason, result));
    }

    // 4. The TCB policy must be for this platform.
    let pck_extension = &quote.signature.pck_extension;
    if pck_extension.fmspc != tcb_info.fmspc {
        return Err(ConfigurationError::FmspcMismatch {
            policy: hex::encode(tcb_info.fmspc),
            platform: hex::encode(pck_extension.fmspc),
        }
        .into());
    }
    if pck_extension.pceid != tcb_info.pce_id {
        return Err(ConfigurationError::PceIdMismatch {
            policy: hex::encode(tcb_info.pce_id),
            platform: hex::encode(pck_extension.pceid),
        }
        .into());
    }

    // 5. Evaluate platform TCB and enclave identity. Both always run so a
    //    rejection reports everything that is known about the quote.
    let tcb = tcb_info.evaluate(pck_extension);
    debug!(status = %tcb.status, level = ?tcb.matched_level, "platform tcb evaluated");

    let verdict = identity.evaluate(&quote.isv_report);
    let identity_status = match &verdict {
        IdentityVerdict::Matched(status) => *status,
        IdentityVerdict::Mismatch(field) => {
            warn!(%field, "enclave identity mismatch");
            TcbStatus::Revoked
        }
    };

    // 6. Combine worst-of and apply the acceptance threshold.
    let status = tcb.status.max(identity_status);
    let result = VerificationResult {
        quote_version: quote.header.version.get(),
        signature: CheckOutcome::Pass,
        tcb: if tcb.matched_level.is_some() {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail
        },
        identity: if matches!(verdict, IdentityVerdict::Matched(_)) {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail
        },
        status,
        matched_tcb_level: tcb.matched_level,
        advisory_ids: tcb.advisory_ids,
        fmspc: Some(pck_extension.fmspc),
        reason: String::new(),
    };

    if let IdentityVerdict::Mismatch(field) = verdict {
        let reason = RejectionReason::IdentityMismatch { field };
        let result = VerificationResult {
            reason: reason.to_string(),
            ..result
        };
        return Ok(AttestationResult::Rejected(reason, result));
    }

    if status > options.max_acceptable_status {
        let reason = RejectionReason::StatusBelowThreshold {
            status,
            threshold: options.max_acceptable_status,
        };
        warn!(%reason, "quote rejected");
        let result = VerificationResult {
            reason: reason.to_string(),
            ..result
        };
        return Ok(AttestationResult::Rejected(reason, result));
    }

    debug!(%status, "quote accepted");
    Ok(AttestationResult::Accepted(VerificationResult {
        reason: format!("accepted with status {status}"),
        ..result
    }))
}

/// Authenticates every link from the quote back to the pinned root: the
/// PCK chain, the QE report signature under the PCK leaf key, the QE
/// report's binding of the attestation key, and the quote signature itself.
fn verify_quote_signatures(
    quote: &Quote,
    trusted_root: &TrustedRoot,
    current_time: SystemTime,
    options: &VerifierOptions,
) -> Result<(), CryptoError> {
    chain::verify_pck_chain(
        &quote.signature.pck_cert_chain,
        trusted_root,
        current_time,
        options.max_chain_depth,
    )?;

    let pck_leaf = &quote.signature.pck_cert_chain[0];
    let pck_pk_bytes = pck_leaf
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or(CryptoError::SignatureInvalid {
            context: "pck public key",
        })?;
    let pck_key =
        VerifyingKey::from_sec1_bytes(pck_pk_bytes).map_err(|_| CryptoError::SignatureInvalid {
            context: "pck public key",
        })?;

    pck_key
        .verify(
            quote.signature.qe_report_body.as_bytes(),
            &quote.signature.qe_report_signature,
        )
        .map_err(|_| CryptoError::SignatureInvalid {
            context: "qe report signature",
        })?;

    quote.signature.verify_qe_report()?;

    // The attestation key is stored as raw x || y, rebuild the SEC1 form.
    let mut key = [0u8; 65];
    key[0] = 4;
    key[1..].copy_from_slice(&quote.signature.attestation_pub_key);
    let attestation_key =
        VerifyingKey::from_sec1_bytes(&key).map_err(|_| CryptoError::SignatureInvalid {
            context: "attestation public key",
        })?;

    attestation_key
        .verify(&quote.signed_data(), &quote.signature.isv_signature)
        .map_err(|_| CryptoError::SignatureInvalid {
            context: "quote signature",
        })?;

    Ok(())
}
