use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, IdentityField};
use crate::types::report::EnclaveReportBody;
use crate::types::{TcbStatus, UInt32LE};
use crate::utils::u32_hex;

const ENCLAVE_IDENTITY_V2: u16 = 2;

/// The registry envelope an enclave identity document ships in. As with
/// [`TcbInfoDocument`](super::tcb_info::TcbInfoDocument), the signature is
/// carried for callers that pin the signing key themselves.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnclaveIdentityDocument {
    #[serde(rename = "enclaveIdentity")]
    pub enclave_identity: EnclaveIdentity,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// Expected launch identity of the attesting enclave, in the shape the
/// registry uses for its identity documents.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveIdentity {
    /// Identifier of the enclave this policy describes.
    pub id: String,

    /// Version of the structure. Only version 2 is supported.
    pub version: u16,

    /// The time the identity information was created. The time shall be in
    /// UTC and the encoding compliant to ISO 8601 (YYYY-MM-DDThh:mm:ssZ).
    pub issue_date: chrono::DateTime<Utc>,

    /// The time by which the next identity information will be issued.
    pub next_update: chrono::DateTime<Utc>,

    /// A monotonically increasing sequence number changed whenever the
    /// issuer updates the TCB evaluation data set this identity belongs to.
    pub tcb_evaluation_data_number: u16,

    /// Base 16-encoded string representing miscselect "golden" value (upon
    /// applying mask).
    #[serde(with = "u32_hex")]
    pub miscselect: UInt32LE,

    /// Base 16-encoded string representing mask to be applied to the
    /// miscselect value retrieved from the platform.
    #[serde(with = "u32_hex")]
    pub miscselect_mask: UInt32LE,

    /// Base 16-encoded string representing attributes "golden" value (upon
    /// applying mask).
    #[serde(with = "hex")]
    pub attributes: [u8; 16],

    /// Base 16-encoded string representing mask to be applied to the
    /// attributes value retrieved from the platform.
    #[serde(with = "hex")]
    pub attributes_mask: [u8; 16],

    /// Base 16-encoded string representing mrsigner hash.
    #[serde(with = "hex")]
    pub mrsigner: [u8; 32],

    /// Enclave Product ID.
    pub isvprodid: u16,

    /// Sorted list of supported enclave TCB levels, highest ISV SVN first.
    pub tcb_levels: Vec<IdentityTcbLevel>,
}

impl EnclaveIdentity {
    /// Parses a registry enclave identity document and validates its
    /// structure.
    pub fn from_document(json: &str) -> Result<EnclaveIdentity, ConfigurationError> {
        let document: EnclaveIdentityDocument =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Json(e.to_string()))?;
        let identity = document.enclave_identity;
        identity.validate()?;
        Ok(identity)
    }

    /// Structural checks every policy gets before evaluation.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.version != ENCLAVE_IDENTITY_V2 {
            return Err(ConfigurationError::UnsupportedPolicyVersion {
                expected: ENCLAVE_IDENTITY_V2,
                found: self.version,
            });
        }

        if self.tcb_levels.is_empty() {
            return Err(ConfigurationError::EmptyTcbLevels);
        }

        for (index, pair) in self.tcb_levels.windows(2).enumerate() {
            if pair[1].tcb.isvsvn >= pair[0].tcb.isvsvn {
                return Err(ConfigurationError::UnsortedTcbLevels(index + 1));
            }
        }

        Ok(())
    }

    /// Checks a report body against this identity. Fields are compared in a
    /// fixed order so callers get stable diagnostics. A report that matches
    /// every field still carries the TCB status its ISV SVN maps to; an ISV
    /// SVN below every level is treated as revoked.
    pub fn evaluate(&self, report: &EnclaveReportBody) -> IdentityVerdict {
        if report.mr_signer != self.mrsigner {
            return IdentityVerdict::Mismatch(IdentityField::MrSigner);
        }

        if report.isv_prod_id.get() != self.isvprodid {
            return IdentityVerdict::Mismatch(IdentityField::IsvProdId);
        }

        let mask = self.miscselect_mask.get();
        if report.miscselect.get() & mask != self.miscselect.get() & mask {
            return IdentityVerdict::Mismatch(IdentityField::MiscSelect);
        }

        let attributes_match = report
            .sgx_attributes
            .iter()
            .zip(self.attributes)
            .zip(self.attributes_mask)
            .all(|((&actual, golden), mask)| actual & mask == golden & mask);
        if !attributes_match {
            return IdentityVerdict::Mismatch(IdentityField::Attributes);
        }

        let status = self
            .tcb_levels
            .iter()
            .find(|level| level.tcb.isvsvn <= report.isv_svn.get())
            .map(|level| level.tcb_status)
            .unwrap_or(TcbStatus::Revoked);

        IdentityVerdict::Matched(status)
    }
}

/// Verdict of matching a report body against an identity policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityVerdict {
    /// Every identity field matched. The enclave's ISV SVN maps to this
    /// TCB status.
    Matched(TcbStatus),
    /// An identity field did not match the policy.
    Mismatch(IdentityField),
}

/// Enclave TCB level.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdentityTcbLevel {
    pub tcb: IdentityTcb,
    /// The time the TCB was evaluated, in UTC.
    pub tcb_date: chrono::DateTime<Utc>,
    pub tcb_status: TcbStatus,
    #[serde(default, rename = "advisoryIDs")]
    pub advisory_ids: Vec<String>,
}

/// The enclave's ISV SVN.
#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
pub struct IdentityTcb {
    pub isvsvn: u16,
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::constants::ENCLAVE_REPORT_LEN;
    use crate::types::UInt16LE;

    const IDENTITY_JSON: &str = include_str!("../../data/identity.json");

    fn sample_identity() -> EnclaveIdentity {
        EnclaveIdentity::from_document(IDENTITY_JSON).unwrap()
    }

    fn sample_report() -> EnclaveReportBody {
        let quote = include_bytes!("../../data/quote.bin");
        let raw: [u8; ENCLAVE_REPORT_LEN] = quote[48..48 + ENCLAVE_REPORT_LEN].try_into().unwrap();
        EnclaveReportBody::try_from(raw).unwrap()
    }

    #[test]
    fn parse_sample_document() {
        let identity = sample_identity();
        assert_eq!(identity.id, "APP");
        assert_eq!(identity.version, 2);
        assert_eq!(
            identity.mrsigner,
            hex!("ef69011f29043f084e99ce420bfebdfa410aee1e132014e7ceff29efa9659bd9")
        );
        assert_eq!(identity.isvprodid, 0);
        assert_eq!(identity.tcb_levels.len(), 2);
    }

    #[test]
    fn matching_report_takes_svn_status() {
        let identity = sample_identity();

        let report = sample_report();
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Matched(TcbStatus::UpToDate)
        );

        let mut stale = report;
        stale.isv_svn = UInt16LE::new(0);
        assert_eq!(
            identity.evaluate(&stale),
            IdentityVerdict::Matched(TcbStatus::OutOfDate)
        );
    }

    #[test]
    fn svn_below_every_level_is_revoked() {
        let mut identity = sample_identity();
        identity.tcb_levels[0].tcb.isvsvn = 3;
        identity.tcb_levels[1].tcb.isvsvn = 2;
        assert_eq!(
            identity.evaluate(&sample_report()),
            IdentityVerdict::Matched(TcbStatus::Revoked)
        );
    }

    #[test]
    fn field_mismatches_in_order() {
        let report = sample_report();

        let mut identity = sample_identity();
        identity.mrsigner[0] ^= 0xff;
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Mismatch(IdentityField::MrSigner)
        );

        // mrsigner wins over later mismatches
        identity.isvprodid = 7;
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Mismatch(IdentityField::MrSigner)
        );

        let mut identity = sample_identity();
        identity.isvprodid = 7;
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Mismatch(IdentityField::IsvProdId)
        );

        let mut identity = sample_identity();
        identity.miscselect = UInt32LE::new(0x0000_0001);
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Mismatch(IdentityField::MiscSelect)
        );

        let mut identity = sample_identity();
        identity.attributes[0] ^= 0x01;
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Mismatch(IdentityField::Attributes)
        );
    }

    #[test]
    fn masked_out_bits_are_ignored() {
        let report = sample_report();

        let mut identity = sample_identity();
        identity.miscselect = UInt32LE::new(0xdead_beef);
        identity.miscselect_mask = UInt32LE::new(0);
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Matched(TcbStatus::UpToDate)
        );

        // the sample mask covers only the flags half of the attributes
        let mut identity = sample_identity();
        identity.attributes[15] ^= 0xff;
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Matched(TcbStatus::UpToDate)
        );

        // an all-zero mask makes the attributes check vacuous
        let mut identity = sample_identity();
        identity.attributes_mask = [0u8; 16];
        identity.attributes = [0xa5; 16];
        assert_eq!(
            identity.evaluate(&report),
            IdentityVerdict::Matched(TcbStatus::UpToDate)
        );
    }

    #[test]
    fn structural_validation_failures() {
        let mut identity = sample_identity();
        identity.version = 3;
        assert_eq!(
            identity.validate().unwrap_err(),
            ConfigurationError::UnsupportedPolicyVersion {
                expected: 2,
                found: 3
            }
        );

        let mut identity = sample_identity();
        identity.tcb_levels.clear();
        assert_eq!(
            identity.validate().unwrap_err(),
            ConfigurationError::EmptyTcbLevels
        );

        let mut identity = sample_identity();
        identity.tcb_levels.swap(0, 1);
        assert_eq!(
            identity.validate().unwrap_err(),
            ConfigurationError::UnsortedTcbLevels(1)
        );

        let mut identity = sample_identity();
        identity.tcb_levels[1].tcb.isvsvn = identity.tcb_levels[0].tcb.isvsvn;
        assert_eq!(
            identity.validate().unwrap_err(),
            ConfigurationError::UnsortedTcbLevels(1)
        );
    }
}
