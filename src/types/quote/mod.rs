mod cert_data;
mod header;
mod signature;

pub use cert_data::*;
pub use header::*;
pub use signature::*;

use zerocopy::AsBytes;

use crate::constants::{
    ECDSA_256_WITH_P256_CURVE, ENCLAVE_REPORT_LEN, HEADER_LEN, INTEL_QE_VENDOR_ID, SGX_TEE_TYPE,
};
use crate::error::ParseError;
use crate::types::report::EnclaveReportBody;
use crate::utils;

pub const QUOTE_V3: u16 = 3;

/// A V3 DCAP quote, decoded for verification.
///
/// Borrows the input buffer; the variable length regions of the signature
/// block are kept as slices into it.
#[derive(Debug)]
pub struct Quote<'a> {
    /// Header of the SGX Quote data structure.
    pub header: QuoteHeader,

    /// Report of the attested enclave.
    pub isv_report: EnclaveReportBody,

    /// Signature of the quote header and report.
    pub signature: QuoteSignatureData<'a>,
}

impl<'a> Quote<'a> {
    /// Decodes a whole quote. Fails on anything other than a well formed
    /// V3 SGX ECDSA quote whose declared lengths cover the input exactly.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let mut cursor = bytes;
        Self::read(&mut cursor)
    }

    pub fn read(bytes: &mut &'a [u8]) -> Result<Self, ParseError> {
        let header = utils::read_from_bytes::<QuoteHeader>(bytes).ok_or(
            ParseError::Truncated {
                context: "quote header",
            },
        )?;

        if header.version.get() != QUOTE_V3 {
            return Err(ParseError::UnsupportedVersion(header.version.get()));
        }
        if header.tee_type.get() != SGX_TEE_TYPE {
            return Err(ParseError::UnsupportedTeeType(header.tee_type.get()));
        }
        if header.attestation_key_type.get() != ECDSA_256_WITH_P256_CURVE {
            return Err(ParseError::UnsupportedKeyType(
                header.attestation_key_type.get(),
            ));
        }
        if header.qe_vendor_id != INTEL_QE_VENDOR_ID {
            return Err(ParseError::UnsupportedQeVendor(header.qe_vendor_id));
        }

        let isv_report = utils::read_from_bytes::<EnclaveReportBody>(bytes).ok_or(
            ParseError::Truncated {
                context: "enclave report body",
            },
        )?;

        let signature = QuoteSignatureData::read(bytes)?;

        Ok(Quote {
            header,
            isv_report,
            signature,
        })
    }

    /// The bytes the attestation key signed: the header followed by the
    /// attested enclave's report.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + ENCLAVE_REPORT_LEN);
        data.extend_from_slice(self.header.as_bytes());
        data.extend_from_slice(self.isv_report.as_bytes());
        data
    }

    /// Re-serializes the quote. Parsing is lossless, so this reproduces
    /// the input bytes exactly.
    pub fn to_bytes(&self) -> Vec<u8> {
        let signature_len = self.signature.serialized_len();
        let mut out = Vec::with_capacity(HEADER_LEN + ENCLAVE_REPORT_LEN + 4 + signature_len);
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(self.isv_report.as_bytes());
        out.extend_from_slice(&(signature_len as u32).to_le_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out
    }
}
