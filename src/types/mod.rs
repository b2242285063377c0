use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;

pub mod enclave_identity;
pub mod quote;
pub mod report;
pub mod sgx_x509;
pub mod tcb_info;

pub type UInt16LE = zerocopy::little_endian::U16;
pub type UInt32LE = zerocopy::little_endian::U32;

/// Patch posture of a platform or enclave, best to worst.
///
/// The declaration order is load-bearing: `Ord` follows it, and verdicts
/// from independent checks combine by taking the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TcbStatus {
    UpToDate,
    SWHardeningNeeded,
    ConfigurationNeeded,
    ConfigurationAndSWHardeningNeeded,
    OutOfDate,
    OutOfDateConfigurationNeeded,
    Revoked,
}

impl TcbStatus {
    /// Maps the registry status strings. Anything unrecognized is treated
    /// as `Revoked` so a new status introduced upstream can only make the
    /// verdict stricter.
    pub fn from_str(s: &str) -> Self {
        match s {
            "UpToDate" => TcbStatus::UpToDate,
            "SWHardeningNeeded" => TcbStatus::SWHardeningNeeded,
            "ConfigurationNeeded" => TcbStatus::ConfigurationNeeded,
            "ConfigurationAndSWHardeningNeeded" => TcbStatus::ConfigurationAndSWHardeningNeeded,
            "OutOfDate" => TcbStatus::OutOfDate,
            "OutOfDateConfigurationNeeded" => TcbStatus::OutOfDateConfigurationNeeded,
            "Revoked" => TcbStatus::Revoked,
            _ => TcbStatus::Revoked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcbStatus::UpToDate => "UpToDate",
            TcbStatus::SWHardeningNeeded => "SWHardeningNeeded",
            TcbStatus::ConfigurationNeeded => "ConfigurationNeeded",
            TcbStatus::ConfigurationAndSWHardeningNeeded => "ConfigurationAndSWHardeningNeeded",
            TcbStatus::OutOfDate => "OutOfDate",
            TcbStatus::OutOfDateConfigurationNeeded => "OutOfDateConfigurationNeeded",
            TcbStatus::Revoked => "Revoked",
        }
    }

    /// The binary collapse some relying parties report: only a fully
    /// patched platform counts.
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, TcbStatus::UpToDate)
    }
}

impl<'de> Deserialize<'de> for TcbStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(TcbStatus::from_str(&s))
    }
}

impl fmt::Display for TcbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one verification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckOutcome {
    Pass,
    Fail,
    /// The stage was never reached because an earlier one failed.
    Indeterminate,
}

/// Everything a verification run learned about a quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub quote_version: u16,
    /// Certificate chain and signature checks.
    pub signature: CheckOutcome,
    /// Platform TCB level evaluation.
    pub tcb: CheckOutcome,
    /// Enclave identity evaluation.
    pub identity: CheckOutcome,
    /// Worst status any evaluated check produced.
    pub status: TcbStatus,
    /// Index of the TCB policy level the platform matched.
    pub matched_tcb_level: Option<usize>,
    #[serde(rename = "advisoryIDs")]
    pub advisory_ids: Vec<String>,
    #[serde(serialize_with = "opt_hex")]
    pub fmspc: Option<[u8; 6]>,
    pub reason: String,
}

fn opt_hex<S: serde::Serializer>(value: &Option<[u8; 6]>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Final verdict over a quote.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationResult {
    Accepted(VerificationResult),
    Rejected(RejectionReason, VerificationResult),
}

impl AttestationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttestationResult::Accepted(_))
    }

    pub fn status(&self) -> TcbStatus {
        self.result().status
    }

    pub fn result(&self) -> &VerificationResult {
        match self {
            AttestationResult::Accepted(result) => result,
            AttestationResult::Rejected(_, result) => result,
        }
    }
}

/// Caller-tunable verification settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierOptions {
    /// Worst combined status still accepted. The default admits only a
    /// fully patched platform.
    pub max_acceptable_status: TcbStatus,
    /// Upper bound on the length of the PCK chain embedded in a quote.
    pub max_chain_depth: usize,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            max_acceptable_status: TcbStatus::UpToDate,
            max_chain_depth: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        assert!(TcbStatus::UpToDate < TcbStatus::SWHardeningNeeded);
        assert!(TcbStatus::SWHardeningNeeded < TcbStatus::ConfigurationNeeded);
        assert!(TcbStatus::ConfigurationNeeded < TcbStatus::ConfigurationAndSWHardeningNeeded);
        assert!(TcbStatus::ConfigurationAndSWHardeningNeeded < TcbStatus::OutOfDate);
        assert!(TcbStatus::OutOfDate < TcbStatus::OutOfDateConfigurationNeeded);
        assert!(TcbStatus::OutOfDateConfigurationNeeded < TcbStatus::Revoked);
    }

    #[test]
    fn worst_of_is_max() {
        let worst = TcbStatus::UpToDate
            .max(TcbStatus::OutOfDate)
            .max(TcbStatus::SWHardeningNeeded);
        assert_eq!(worst, TcbStatus::OutOfDate);
    }

    #[test]
    fn unknown_status_fails_closed() {
        assert_eq!(TcbStatus::from_str("UpToDate"), TcbStatus::UpToDate);
        assert_eq!(TcbStatus::from_str("Frobnicated"), TcbStatus::Revoked);
        assert_eq!(TcbStatus::from_str(""), TcbStatus::Revoked);

        let parsed: TcbStatus = serde_json::from_str("\"NotAStatus\"").unwrap();
        assert_eq!(parsed, TcbStatus::Revoked);
    }

    #[test]
    fn status_serde_round_trip() {
        for status in [
            TcbStatus::UpToDate,
            TcbStatus::SWHardeningNeeded,
            TcbStatus::ConfigurationNeeded,
            TcbStatus::ConfigurationAndSWHardeningNeeded,
            TcbStatus::OutOfDate,
            TcbStatus::OutOfDateConfigurationNeeded,
            TcbStatus::Revoked,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            let back: TcbStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn default_options_are_strict() {
        let options = VerifierOptions::default();
        assert_eq!(options.max_acceptable_status, TcbStatus::UpToDate);
        assert!(!TcbStatus::SWHardeningNeeded.is_up_to_date());
        assert!(TcbStatus::UpToDate.is_up_to_date());
    }
}
