use asn1::{oid, ObjectIdentifier, SequenceOf};

use crate::error::ParseError;

pub const SGX_EXTENSIONS_OID: &str = "1.2.840.113741.1.13.1";
const _SGX_EXTENSIONS_OID_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1);
const PPID_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 1);

const TCB_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2);
const TCB_COMP01SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 1);
const TCB_COMP02SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 2);
const TCB_COMP03SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 3);
const TCB_COMP04SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 4);
const TCB_COMP05SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 5);
const TCB_COMP06SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 6);
const TCB_COMP07SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 7);
const TCB_COMP08SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 8);
const TCB_COMP09SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 9);
const TCB_COMP10SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 10);
const TCB_COMP11SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 11);
const TCB_COMP12SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 12);
const TCB_COMP13SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 13);
const TCB_COMP14SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 14);
const TCB_COMP15SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 15);
const TCB_COMP16SVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 16);
const TCB_PCESVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 17);
const TCB_CPUSVN_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 2, 18);

const PCE_ID_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 3);
const FMSPC_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 4);
//const SGX_TYPE_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 5);
//const PLATFORM_INSTANCE_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 6);
//const CONFIGURATION_OID: ObjectIdentifier = oid!(1, 2, 840, 113741, 1, 13, 1, 7);

const PPID_LEN: usize = 16;
const CPUSVN_LEN: usize = 16;
const PCEID_LEN: usize = 2;
const FMSPC_LEN: usize = 6;
const COMPSVN_LEN: usize = 16;

const COMP_SVN_OIDS: [ObjectIdentifier; COMPSVN_LEN] = [
    TCB_COMP01SVN_OID,
    TCB_COMP02SVN_OID,
    TCB_COMP03SVN_OID,
    TCB_COMP04SVN_OID,
    TCB_COMP05SVN_OID,
    TCB_COMP06SVN_OID,
    TCB_COMP07SVN_OID,
    TCB_COMP08SVN_OID,
    TCB_COMP09SVN_OID,
    TCB_COMP10SVN_OID,
    TCB_COMP11SVN_OID,
    TCB_COMP12SVN_OID,
    TCB_COMP13SVN_OID,
    TCB_COMP14SVN_OID,
    TCB_COMP15SVN_OID,
    TCB_COMP16SVN_OID,
];

/// The SGX extension Intel embeds in every PCK leaf certificate. It ties
/// the certificate to one platform: its provisioning identifier, the TCB
/// the PCK key was certified at, and the platform family.
///
/// The extension value is a DER sequence of (oid, value) pairs. Entries
/// this verifier has no use for (SGX type, platform instance id, the
/// configuration flags of multi-package platforms) are skipped.
#[derive(Debug, Clone)]
pub struct SgxPckExtension {
    /// Provisioning protocol identifier of the platform.
    pub ppid: [u8; PPID_LEN],

    /// Security version of each TCB component the PCK key was certified at.
    pub compsvn: [u8; COMPSVN_LEN],

    /// Security version of the provisioning certification enclave.
    pub pcesvn: u16,

    /// Security version of the CPU microcode.
    pub cpusvn: [u8; CPUSVN_LEN],

    /// Identifier of the PCE the platform provisions through.
    pub pceid: [u8; PCEID_LEN],

    /// Family-Model-Stepping-Platform-CustomSKU of the platform.
    pub fmspc: [u8; FMSPC_LEN],
}

impl SgxPckExtension {
    pub fn is_pck_ext(oid: String) -> bool {
        oid == SGX_EXTENSIONS_OID
    }

    pub fn from_der(der: &[u8]) -> Result<SgxPckExtension, ParseError> {
        let mut ppid = None;
        let mut compsvn = None;
        let mut pcesvn = None;
        let mut cpusvn = None;
        let mut pceid = None;
        let mut fmspc = None;

        asn1::parse(der, |outer| {
            let entries = outer.read_element::<SequenceOf<asn1::Sequence>>()?;
            for entry in entries {
                let parsed = entry.parse(|d| {
                    let oid = d.read_element::<ObjectIdentifier>()?;
                    if oid == PPID_OID {
                        Ok(ExtensionEntry::Ppid(read_octet_array::<PPID_LEN>(d)?))
                    } else if oid == TCB_OID {
                        let (comps, pce, cpu) = read_tcb(d)?;
                        Ok(ExtensionEntry::Tcb(comps, pce, cpu))
                    } else if oid == PCE_ID_OID {
                        Ok(ExtensionEntry::PceId(read_octet_array::<PCEID_LEN>(d)?))
                    } else if oid == FMSPC_OID {
                        Ok(ExtensionEntry::Fmspc(read_octet_array::<FMSPC_LEN>(d)?))
                    } else {
                        skip_remaining(d)?;
                        Ok(ExtensionEntry::Skipped)
                    }
                })?;
                match parsed {
                    ExtensionEntry::Ppid(value) => ppid = Some(value),
                    ExtensionEntry::Tcb(comps, pce, cpu) => {
                        compsvn = Some(comps);
                        pcesvn = Some(pce);
                        cpusvn = Some(cpu);
                    }
                    ExtensionEntry::PceId(value) => pceid = Some(value),
                    ExtensionEntry::Fmspc(value) => fmspc = Some(value),
                    ExtensionEntry::Skipped => {}
                }
            }
            Ok(())
        })
        .map_err(|e: asn1::ParseError| ParseError::SgxExtension {
            detail: e.to_string(),
        })?;

        Ok(SgxPckExtension {
            ppid: ppid.ok_or_else(|| missing_entry("ppid"))?,
            compsvn: compsvn.ok_or_else(|| missing_entry("tcb compsvn"))?,
            pcesvn: pcesvn.ok_or_else(|| missing_entry("tcb pcesvn"))?,
            cpusvn: cpusvn.ok_or_else(|| missing_entry("tcb cpusvn"))?,
            pceid: pceid.ok_or_else(|| missing_entry("pceid"))?,
            fmspc: fmspc.ok_or_else(|| missing_entry("fmspc"))?,
        })
    }
}

/// One (oid, value) pair of the extension sequence. `Sequence::parse`
/// takes a `Fn` closure, so each entry comes back as a value and is
/// recorded by the enclosing loop.
enum ExtensionEntry {
    Ppid([u8; PPID_LEN]),
    Tcb([u8; COMPSVN_LEN], u16, [u8; CPUSVN_LEN]),
    PceId([u8; PCEID_LEN]),
    Fmspc([u8; FMSPC_LEN]),
    Skipped,
}

enum TcbEntry {
    Comp(usize, u8),
    PceSvn(u16),
    CpuSvn([u8; CPUSVN_LEN]),
    Skipped,
}

fn missing_entry(name: &str) -> ParseError {
    ParseError::SgxExtension {
        detail: format!("missing {name} entry"),
    }
}

fn invalid_value() -> asn1::ParseError {
    asn1::ParseError::new(asn1::ParseErrorKind::InvalidValue)
}

fn read_octet_array<const N: usize>(d: &mut asn1::Parser) -> asn1::ParseResult<[u8; N]> {
    let bytes = d.read_element::<&[u8]>()?;
    bytes.try_into().map_err(|_| invalid_value())
}

/// The TCB entry nests another sequence of (oid, value) pairs: sixteen
/// component SVNs, the PCE SVN and the CPU SVN. All of them are required.
fn read_tcb(
    d: &mut asn1::Parser,
) -> asn1::ParseResult<([u8; COMPSVN_LEN], u16, [u8; CPUSVN_LEN])> {
    let mut compsvn = [0u8; COMPSVN_LEN];
    let mut seen = [false; COMPSVN_LEN];
    let mut pcesvn = None;
    let mut cpusvn = None;

    let entries = d.read_element::<SequenceOf<asn1::Sequence>>()?;
    for entry in entries {
        let parsed = entry.parse(|d| {
            let oid = d.read_element::<ObjectIdentifier>()?;
            if let Some(index) = COMP_SVN_OIDS.iter().position(|comp| *comp == oid) {
                let value = d.read_element::<u64>()?;
                let svn = u8::try_from(value).map_err(|_| invalid_value())?;
                Ok(TcbEntry::Comp(index, svn))
            } else if oid == TCB_PCESVN_OID {
                let value = d.read_element::<u64>()?;
                let svn = u16::try_from(value).map_err(|_| invalid_value())?;
                Ok(TcbEntry::PceSvn(svn))
            } else if oid == TCB_CPUSVN_OID {
                Ok(TcbEntry::CpuSvn(read_octet_array::<CPUSVN_LEN>(d)?))
            } else {
                skip_remaining(d)?;
                Ok(TcbEntry::Skipped)
            }
        })?;
        match parsed {
            TcbEntry::Comp(index, svn) => {
                compsvn[index] = svn;
                seen[index] = true;
            }
            TcbEntry::PceSvn(svn) => pcesvn = Some(svn),
            TcbEntry::CpuSvn(value) => cpusvn = Some(value),
            TcbEntry::Skipped => {}
        }
    }

    match (seen.iter().all(|c| *c), pcesvn, cpusvn) {
        (true, Some(pcesvn), Some(cpusvn)) => Ok((compsvn, pcesvn, cpusvn)),
        _ => Err(invalid_value()),
    }
}

fn skip_remaining(d: &mut asn1::Parser) -> asn1::ParseResult<()> {
    while !d.is_empty() {
        d.read_element::<asn1::Tlv>()?;
    }
    Ok(())
}
