use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::constants::ENCLAVE_REPORT_LEN;
use crate::error::ParseError;
use crate::types::{UInt16LE, UInt32LE};

/// Report of an enclave, the 384 byte structure the Intel docs call
/// `sgx_report_body_t`. Both the attested enclave's report and the quoting
/// enclave's report inside the signature block use this layout.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct EnclaveReportBody {
    /// Security version of the CPU at the time the report was generated.
    pub cpu_svn: [u8; 16],

    /// SSA frame extended feature set selector.
    pub miscselect: UInt32LE,

    reserved1: [u8; 28],

    /// Flags and XFRM attributes the enclave was launched with.
    pub sgx_attributes: [u8; 16],

    /// Measurement of the enclave's initial contents.
    pub mr_enclave: [u8; 32],

    reserved2: [u8; 32],

    /// Hash of the key that signed the enclave.
    pub mr_signer: [u8; 32],

    reserved3: [u8; 96],

    pub isv_prod_id: UInt16LE,

    pub isv_svn: UInt16LE,

    reserved4: [u8; 60],

    /// Data the enclave chose to bind into the report.
    pub user_report_data: [u8; 64],
}

impl TryFrom<[u8; ENCLAVE_REPORT_LEN]> for EnclaveReportBody {
    type Error = ParseError;

    fn try_from(value: [u8; ENCLAVE_REPORT_LEN]) -> Result<Self, Self::Error> {
        EnclaveReportBody::read_from(value.as_slice()).ok_or(ParseError::Truncated {
            context: "enclave report body",
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn report_body_layout() {
        assert_eq!(std::mem::size_of::<EnclaveReportBody>(), ENCLAVE_REPORT_LEN);
    }

    #[test]
    fn parse_sample_isv_report() {
        let quote = include_bytes!("../../data/quote.bin");
        let raw: [u8; ENCLAVE_REPORT_LEN] = quote[48..48 + ENCLAVE_REPORT_LEN].try_into().unwrap();
        let report = EnclaveReportBody::try_from(raw).unwrap();

        assert_eq!(
            report.mr_signer,
            hex!("ef69011f29043f084e99ce420bfebdfa410aee1e132014e7ceff29efa9659bd9")
        );
        assert_eq!(
            report.mr_enclave,
            hex!("46049af725ec3986eeb788693df7bc5f14d3f2705106a19cd09b9d89237db1a0")
        );
        assert_eq!(report.isv_prod_id.get(), 0);
        assert_eq!(report.isv_svn.get(), 1);
        assert_eq!(report.miscselect.get(), 0);
        assert_eq!(report.sgx_attributes[..8], hex!("0700000000000000"));
        assert_eq!(report.as_bytes(), raw);
    }
}
