use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::types::sgx_x509::SgxPckExtension;
use crate::types::TcbStatus;

/// The registry envelope a TCB info document ships in. The signature is
/// carried for callers that pin the signing key themselves; provenance of
/// policy documents is outside this crate.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TcbInfoDocument {
    #[serde(rename = "tcbInfo")]
    pub tcb_info: TcbInfo,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

/// Version of the TcbInfo JSON structure
///
/// In the PCS V3 API the TcbInfo version is V2, in the PCS V4 API the TcbInfo
/// version is V3. The V3 API includes advisoryIDs and changes the format of
/// the TcbLevel
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(try_from = "u16", into = "u16")]
pub(crate) enum TcbInfoVersion {
    V2 = 2,
    V3 = 3,
}

impl TryFrom<u16> for TcbInfoVersion {
    type Error = ConfigurationError;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(TcbInfoVersion::V2),
            3 => Ok(TcbInfoVersion::V3),
            _ => Err(ConfigurationError::UnsupportedPolicyVersion {
                expected: 2,
                found: value,
            }),
        }
    }
}

impl From<TcbInfoVersion> for u16 {
    fn from(version: TcbInfoVersion) -> u16 {
        version as u16
    }
}

/// The TCB policy for one platform family: which component SVN vectors
/// Intel still considers sound, and how degraded each one is.
#[derive(Debug, Eq, PartialEq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcbInfo {
    version: TcbInfoVersion,
    pub issue_date: chrono::DateTime<Utc>,
    pub next_update: chrono::DateTime<Utc>,
    #[serde(with = "hex")]
    pub fmspc: [u8; 6],
    #[serde(with = "hex")]
    pub pce_id: [u8; 2],
    tcb_type: u16,
    pub tcb_evaluation_data_number: u16,
    pub tcb_levels: Vec<TcbLevel>,
}

impl TcbInfo {
    /// Parses a registry TCB info document and validates its structure.
    pub fn from_document(json: &str) -> Result<TcbInfo, ConfigurationError> {
        let document: TcbInfoDocument =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Json(e.to_string()))?;
        let tcb_info = document.tcb_info;
        tcb_info.validate()?;
        Ok(tcb_info)
    }

    /// Structural checks every policy gets before evaluation, whether it
    /// came from [`TcbInfo::from_document`] or was built by the caller.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self
            .tcb_levels
            .iter()
            .any(|level| level.tcb.version() != self.version)
        {
            return Err(ConfigurationError::MixedTcbVersions);
        }

        // tcb_type determines how to compare tcb levels, only 0 is defined
        if self.tcb_type != 0 {
            return Err(ConfigurationError::UnsupportedTcbType(self.tcb_type));
        }

        if self.tcb_levels.is_empty() {
            return Err(ConfigurationError::EmptyTcbLevels);
        }

        // Levels must come highest first, or the scan below would hand a
        // degraded platform the status of a better level.
        for (index, pair) in self.tcb_levels.windows(2).enumerate() {
            if pair[1].tcb.dominates_or_equals(&pair[0].tcb) {
                return Err(ConfigurationError::UnsortedTcbLevels(index + 1));
            }
        }

        Ok(())
    }

    /// Walks the levels best first and returns the first one the platform
    /// satisfies. A platform below every level is treated as revoked.
    pub fn evaluate(&self, pck_extension: &SgxPckExtension) -> TcbEvaluation {
        let matched = self
            .tcb_levels
            .iter()
            .position(|level| Self::in_tcb_level(level, pck_extension));

        match matched {
            Some(index) => {
                let level = &self.tcb_levels[index];
                TcbEvaluation {
                    status: level.tcb_status,
                    matched_level: Some(index),
                    advisory_ids: level.advisory_ids.clone(),
                }
            }
            None => TcbEvaluation {
                status: TcbStatus::Revoked,
                matched_level: None,
                advisory_ids: Vec::new(),
            },
        }
    }

    /// A platform is in a level when every component SVN and the PCE SVN
    /// meet the level's minimums.
    fn in_tcb_level(level: &TcbLevel, pck_extension: &SgxPckExtension) -> bool {
        pck_extension.pcesvn >= level.tcb.pcesvn()
            && pck_extension
                .compsvn
                .iter()
                .zip(level.tcb.components())
                .all(|(&platform, level)| platform >= level)
    }
}

/// Verdict of matching a platform against a TCB info policy.
#[derive(Debug, Clone, PartialEq)]
pub struct TcbEvaluation {
    pub status: TcbStatus,
    /// Index of the first level the platform satisfied.
    pub matched_level: Option<usize>,
    pub advisory_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcbLevel {
    pub tcb: Tcb,
    pub tcb_date: chrono::DateTime<Utc>,
    pub tcb_status: TcbStatus,
    #[serde(default, rename = "advisoryIDs")]
    pub advisory_ids: Vec<String>,
}

/// Contains information identifying a TcbLevel.
#[derive(Deserialize, Serialize, PartialEq, Eq, Clone, Debug)]
#[serde(untagged)]
pub enum Tcb {
    V2(TcbV2),
    V3(TcbV3),
}

#[derive(Deserialize, Serialize, PartialEq, Eq, Clone, Debug)]
pub struct TcbV3 {
    sgxtcbcomponents: [TcbComponentV3; 16],
    pcesvn: u16,
}

#[derive(Deserialize, Serialize, PartialEq, Eq, Clone, Debug, Copy)]
pub struct TcbComponentV3 {
    svn: u8,
}

#[derive(Deserialize, Serialize, PartialEq, Eq, Clone, Debug)]
pub struct TcbV2 {
    sgxtcbcomp01svn: u8,
    sgxtcbcomp02svn: u8,
    sgxtcbcomp03svn: u8,
    sgxtcbcomp04svn: u8,
    sgxtcbcomp05svn: u8,
    sgxtcbcomp06svn: u8,
    sgxtcbcomp07svn: u8,
    sgxtcbcomp08svn: u8,
    sgxtcbcomp09svn: u8,
    sgxtcbcomp10svn: u8,
    sgxtcbcomp11svn: u8,
    sgxtcbcomp12svn: u8,
    sgxtcbcomp13svn: u8,
    sgxtcbcomp14svn: u8,
    sgxtcbcomp15svn: u8,
    sgxtcbcomp16svn: u8,
    pcesvn: u16,
}

impl Tcb {
    fn version(&self) -> TcbInfoVersion {
        match self {
            Tcb::V2(_) => TcbInfoVersion::V2,
            Tcb::V3(_) => TcbInfoVersion::V3,
        }
    }

    /// True when `self` sits at or above `other` in every component and
    /// the PCE SVN.
    fn dominates_or_equals(&self, other: &Tcb) -> bool {
        self.pcesvn() >= other.pcesvn()
            && self
                .components()
                .iter()
                .zip(other.components())
                .all(|(&mine, theirs)| mine >= theirs)
    }

    pub fn pcesvn(&self) -> u16 {
        match self {
            Self::V2(v2) => v2.pcesvn,
            Self::V3(v3) => v3.pcesvn,
        }
    }

    pub fn components(&self) -> [u8; 16] {
        match self {
            Self::V2(v2) => [
                v2.sgxtcbcomp01svn,
                v2.sgxtcbcomp02svn,
                v2.sgxtcbcomp03svn,
                v2.sgxtcbcomp04svn,
                v2.sgxtcbcomp05svn,
                v2.sgxtcbcomp06svn,
                v2.sgxtcbcomp07svn,
                v2.sgxtcbcomp08svn,
                v2.sgxtcbcomp09svn,
                v2.sgxtcbcomp10svn,
                v2.sgxtcbcomp11svn,
                v2.sgxtcbcomp12svn,
                v2.sgxtcbcomp13svn,
                v2.sgxtcbcomp14svn,
                v2.sgxtcbcomp15svn,
                v2.sgxtcbcomp16svn,
            ],
            Self::V3(v3) => v3.sgxtcbcomponents.map(|comp| comp.svn),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    const TCB_INFO_JSON: &str = include_str!("../../data/tcb_info.json");

    fn platform(compsvn: [u8; 16], pcesvn: u16) -> SgxPckExtension {
        SgxPckExtension {
            ppid: [0u8; 16],
            compsvn,
            pcesvn,
            cpusvn: [0u8; 16],
            pceid: [0u8; 2],
            fmspc: hex!("00606a000000"),
        }
    }

    fn sample_compsvn() -> [u8; 16] {
        [12, 12, 3, 3, 255, 255, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn parse_sample_document() {
        let tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        assert_eq!(tcb_info.fmspc, hex!("00606a000000"));
        assert_eq!(tcb_info.pce_id, [0, 0]);
        assert_eq!(tcb_info.tcb_levels.len(), 7);
        assert_eq!(tcb_info.tcb_levels[0].tcb_status, TcbStatus::UpToDate);
        assert_eq!(tcb_info.tcb_levels[6].tcb_status, TcbStatus::Revoked);
    }

    #[test]
    fn first_matching_level_wins() {
        let tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();

        let evaluation = tcb_info.evaluate(&platform(sample_compsvn(), 13));
        assert_eq!(evaluation.status, TcbStatus::UpToDate);
        assert_eq!(evaluation.matched_level, Some(0));

        let evaluation = tcb_info.evaluate(&platform(sample_compsvn(), 11));
        assert_eq!(evaluation.status, TcbStatus::SWHardeningNeeded);
        assert_eq!(evaluation.matched_level, Some(1));

        let mut no_comp7 = sample_compsvn();
        no_comp7[6] = 0;
        let evaluation = tcb_info.evaluate(&platform(no_comp7, 11));
        assert_eq!(evaluation.status, TcbStatus::ConfigurationNeeded);
        assert_eq!(evaluation.matched_level, Some(2));

        let degraded = [8, 8, 3, 3, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let evaluation = tcb_info.evaluate(&platform(degraded, 10));
        assert_eq!(evaluation.status, TcbStatus::OutOfDate);
        assert_eq!(evaluation.matched_level, Some(4));

        let revoked = [2, 2, 2, 2, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let evaluation = tcb_info.evaluate(&platform(revoked, 2));
        assert_eq!(evaluation.status, TcbStatus::Revoked);
        assert_eq!(evaluation.matched_level, Some(6));
    }

    #[test]
    fn below_every_level_is_revoked_unmatched() {
        let tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        let evaluation = tcb_info.evaluate(&platform([1; 16], 1));
        assert_eq!(evaluation.status, TcbStatus::Revoked);
        assert_eq!(evaluation.matched_level, None);
        assert!(evaluation.advisory_ids.is_empty());
    }

    #[test]
    fn raising_any_component_never_worsens_status() {
        let tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();

        let baselines = [
            (sample_compsvn(), 11u16),
            ([8, 8, 3, 3, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 10),
            ([4, 4, 3, 3, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], 5),
            ([1; 16], 1),
        ];

        for (compsvn, pcesvn) in baselines {
            let before = tcb_info.evaluate(&platform(compsvn, pcesvn)).status;
            for index in 0..compsvn.len() {
                let mut raised = compsvn;
                raised[index] = raised[index].saturating_add(1);
                let after = tcb_info.evaluate(&platform(raised, pcesvn)).status;
                assert!(after <= before, "component {index}: {after:?} > {before:?}");
            }
            let after = tcb_info.evaluate(&platform(compsvn, pcesvn + 1)).status;
            assert!(after <= before);
        }
    }

    #[test]
    fn unsorted_levels_are_rejected() {
        let mut tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        tcb_info.tcb_levels.swap(0, 1);
        assert_eq!(
            tcb_info.validate().unwrap_err(),
            ConfigurationError::UnsortedTcbLevels(1)
        );
    }

    #[test]
    fn v3_levels_carry_advisories() {
        let json = r#"{
            "version": 3,
            "issueDate": "2023-11-15T10:23:51Z",
            "nextUpdate": "2033-11-15T10:23:51Z",
            "fmspc": "00606a000000",
            "pceId": "0000",
            "tcbType": 0,
            "tcbEvaluationDataNumber": 16,
            "tcbLevels": [
                {
                    "tcb": {
                        "sgxtcbcomponents": [
                            {"svn": 12}, {"svn": 12}, {"svn": 3}, {"svn": 3},
                            {"svn": 255}, {"svn": 255}, {"svn": 1}, {"svn": 0},
                            {"svn": 0}, {"svn": 0}, {"svn": 0}, {"svn": 0},
                            {"svn": 0}, {"svn": 0}, {"svn": 0}, {"svn": 0}
                        ],
                        "pcesvn": 13
                    },
                    "tcbDate": "2023-08-09T00:00:00Z",
                    "tcbStatus": "SWHardeningNeeded",
                    "advisoryIDs": ["INTEL-SA-00615"]
                }
            ]
        }"#;

        let tcb_info: TcbInfo = serde_json::from_str(json).unwrap();
        tcb_info.validate().unwrap();

        let evaluation = tcb_info.evaluate(&platform(sample_compsvn(), 13));
        assert_eq!(evaluation.status, TcbStatus::SWHardeningNeeded);
        assert_eq!(evaluation.advisory_ids, vec!["INTEL-SA-00615".to_string()]);
    }

    #[test]
    fn structural_validation_failures() {
        let mut tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        tcb_info.tcb_levels.clear();
        assert_eq!(
            tcb_info.validate().unwrap_err(),
            ConfigurationError::EmptyTcbLevels
        );

        let mut tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        tcb_info.tcb_type = 1;
        assert_eq!(
            tcb_info.validate().unwrap_err(),
            ConfigurationError::UnsupportedTcbType(1)
        );

        let unsupported_version = TCB_INFO_JSON.replace("\"version\": 2", "\"version\": 5");
        assert!(matches!(
            TcbInfo::from_document(&unsupported_version),
            Err(ConfigurationError::Json(_))
        ));
    }

    #[test]
    fn v2_document_with_v3_levels_is_mixed() {
        let mut tcb_info = TcbInfo::from_document(TCB_INFO_JSON).unwrap();
        tcb_info.tcb_levels[0].tcb = Tcb::V3(TcbV3 {
            sgxtcbcomponents: [TcbComponentV3 { svn: 12 }; 16],
            pcesvn: 13,
        });
        assert_eq!(
            tcb_info.validate().unwrap_err(),
            ConfigurationError::MixedTcbVersions
        );
    }
}
