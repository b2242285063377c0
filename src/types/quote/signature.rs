use p256::ecdsa::Signature;
use sha2::{Digest, Sha256};
use x509_cert::certificate::CertificateInner;
use zerocopy::AsBytes;

use crate::{
    constants::ENCLAVE_REPORT_LEN,
    error::{CryptoError, ParseError},
    types::{quote::QuoteCertData, report::EnclaveReportBody, sgx_x509::SgxPckExtension, UInt16LE, UInt32LE},
    utils,
};

/// Signature data for SGX quotes.
///
/// In the Intel docs, this is A 4.4: "ECDSA 2560bit Quote Signature Data Structure"
///
/// This can be used to validate that the quoting enclave itself is valid, and then that
/// the quoting enclave has signed the ISV enclave report.
#[derive(Debug)]
pub struct QuoteSignatureData<'a> {
    /// Signature of the report header + report by the attestation key.
    pub isv_signature: Signature,

    /// The public key used to generate the isv_signature.
    pub attestation_pub_key: [u8; 64],

    /// Report of the quoting enclave.
    pub qe_report_body: EnclaveReportBody,

    /// Signature of the quoting enclave report using the PCK cert key.
    pub qe_report_signature: Signature,

    /// Auth data for the quote
    pub auth_data: &'a [u8],

    /// Type of the certification data trailing the signature block.
    pub cert_data_type: u16,

    /// Certification data exactly as it appeared in the quote.
    pub cert_data_raw: &'a [u8],

    /// PCK cert chain for the quote
    pub pck_cert_chain: Vec<CertificateInner>,

    /// PCK extension for the quote
    pub pck_extension: SgxPckExtension,
}

impl<'a> QuoteSignatureData<'a> {
    /// Reads the signature block off the back of a quote. The declared
    /// length must account for every remaining byte, and every inner
    /// length must stay inside it.
    pub fn read(bytes: &mut &'a [u8]) -> Result<Self, ParseError> {
        let signature_len = utils::read_from_bytes::<UInt32LE>(bytes)
            .ok_or(ParseError::Truncated {
                context: "signature length",
            })?
            .get() as usize;

        if bytes.len() != signature_len {
            return Err(ParseError::LengthMismatch {
                context: "signature block",
                declared: signature_len,
                actual: bytes.len(),
            });
        }

        let mut data = utils::read_bytes(bytes, signature_len);

        let signature_header: EcdsaSignatureHeader =
            utils::read_from_bytes(&mut data).ok_or(ParseError::Truncated {
                context: "signature header",
            })?;

        if data.len() < ENCLAVE_REPORT_LEN {
            return Err(ParseError::Truncated {
                context: "qe report",
            });
        }
        let qe_report_body = utils::read_array::<ENCLAVE_REPORT_LEN>(&mut data);
        let qe_report_body = EnclaveReportBody::try_from(qe_report_body)?;

        if data.len() < 64 {
            return Err(ParseError::Truncated {
                context: "qe report signature",
            });
        }
        let qe_report_signature = utils::read_bytes(&mut data, 64);
        let qe_report_signature =
            Signature::from_slice(qe_report_signature).map_err(|_| ParseError::SignatureDecode {
                context: "qe report signature",
            })?;

        let auth_data_size = utils::read_from_bytes::<UInt16LE>(&mut data)
            .ok_or(ParseError::Truncated {
                context: "auth data size",
            })?
            .get() as usize;

        if data.len() < auth_data_size {
            return Err(ParseError::Truncated { context: "auth data" });
        }
        let auth_data = utils::read_bytes(&mut data, auth_data_size);

        let cert_data = QuoteCertData::read(&mut data)?;

        if !data.is_empty() {
            return Err(ParseError::LengthMismatch {
                context: "signature block",
                declared: signature_len,
                actual: signature_len - data.len(),
            });
        }

        let pck_cert_chain_data = cert_data.as_pck_cert_chain_data()?;
        let isv_signature = Signature::from_slice(&signature_header.isv_signature).map_err(
            |_| ParseError::SignatureDecode {
                context: "isv signature",
            },
        )?;

        Ok(QuoteSignatureData {
            isv_signature,
            attestation_pub_key: signature_header.attestation_pub_key,
            qe_report_body,
            qe_report_signature,
            auth_data,
            cert_data_type: cert_data.cert_key_type.get(),
            cert_data_raw: cert_data.cert_data,
            pck_cert_chain: pck_cert_chain_data.pck_cert_chain,
            pck_extension: pck_cert_chain_data.pck_extension,
        })
    }

    /// Verify the report generated by the quoting enclave.
    ///
    /// By specification, the quoting enclave report data `sgx_report_data_bytes` must be
    /// SHA256(ECDSA Attestation Key || QE Authentication Data) || 32 0x00 bytes
    pub fn verify_qe_report(&self) -> Result<(), CryptoError> {
        let mut hasher = Sha256::new();
        hasher.update(&self.attestation_pub_key[..]);
        hasher.update(self.auth_data);
        let digest = hasher.finalize();

        if *digest != self.qe_report_body.user_report_data[..digest.len()] {
            return Err(CryptoError::SignatureInvalid {
                context: "qe report binding",
            });
        }

        if self.qe_report_body.user_report_data[digest.len()..] != [0u8; 32] {
            return Err(CryptoError::SignatureInvalid {
                context: "qe report binding padding",
            });
        }

        Ok(())
    }

    /// Re-serializes the signature block, without its length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.extend_from_slice(&self.isv_signature.to_bytes());
        out.extend_from_slice(&self.attestation_pub_key);
        out.extend_from_slice(self.qe_report_body.as_bytes());
        out.extend_from_slice(&self.qe_report_signature.to_bytes());
        out.extend_from_slice(&(self.auth_data.len() as u16).to_le_bytes());
        out.extend_from_slice(self.auth_data);
        out.extend_from_slice(&self.cert_data_type.to_le_bytes());
        out.extend_from_slice(&(self.cert_data_raw.len() as u32).to_le_bytes());
        out.extend_from_slice(self.cert_data_raw);
        out
    }

    pub fn serialized_len(&self) -> usize {
        64 + 64 + ENCLAVE_REPORT_LEN + 64 + 2 + self.auth_data.len() + 2 + 4 + self.cert_data_raw.len()
    }
}

#[derive(Debug, zerocopy::FromZeroes, zerocopy::FromBytes)]
#[repr(C)]
pub struct EcdsaSignatureHeader {
    pub isv_signature: [u8; 64],
    pub attestation_pub_key: [u8; 64],
}
