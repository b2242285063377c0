use x509_cert::certificate::CertificateInner;

use crate::{
    error::ParseError,
    types::{sgx_x509::SgxPckExtension, UInt16LE, UInt32LE},
    utils,
};

/// Certification data trailing the signature block. For V3 SGX quotes the
/// only supported form is type 5, a PEM encoded PCK certificate chain.
#[derive(Debug)]
pub struct QuoteCertData<'a> {
    /// Type of cert key
    pub cert_key_type: UInt16LE,

    /// Size of the cert data
    pub cert_data_size: UInt32LE,

    /// Cert data
    pub cert_data: &'a [u8],
}

impl<'a> QuoteCertData<'a> {
    pub fn read(bytes: &mut &'a [u8]) -> Result<Self, ParseError> {
        let cert_key_type = utils::read_from_bytes::<UInt16LE>(bytes).ok_or(
            ParseError::Truncated {
                context: "certification data type",
            },
        )?;

        let cert_data_size = utils::read_from_bytes::<UInt32LE>(bytes).ok_or(
            ParseError::Truncated {
                context: "certification data size",
            },
        )?;

        if bytes.len() < cert_data_size.get() as usize {
            return Err(ParseError::Truncated {
                context: "certification data",
            });
        }
        let cert_data = utils::read_bytes(bytes, cert_data_size.get() as usize);

        Ok(Self {
            cert_key_type,
            cert_data_size,
            cert_data,
        })
    }

    pub fn as_pck_cert_chain_data(&self) -> Result<PckCertChainData, ParseError> {
        if self.cert_key_type.get() != CertificationKeyType::PckCertChain as u16 {
            return Err(ParseError::UnsupportedCertDataType(
                self.cert_key_type.get(),
            ));
        }

        // The PEM chain inside a quote carries a trailing NUL
        let cert_data = self.cert_data.strip_suffix(&[0]).unwrap_or(self.cert_data);
        let pck_cert_chain =
            CertificateInner::load_pem_chain(cert_data).map_err(|e| {
                ParseError::CertificateDecode {
                    detail: e.to_string(),
                }
            })?;

        let leaf = pck_cert_chain
            .first()
            .ok_or_else(|| ParseError::CertificateDecode {
                detail: "empty pck certificate chain".to_string(),
            })?;

        let pck_extension = leaf
            .tbs_certificate
            .extensions
            .as_ref()
            .and_then(|extensions| {
                extensions
                    .iter()
                    .find(|ext| SgxPckExtension::is_pck_ext(ext.extn_id.to_string()))
            })
            .ok_or_else(|| ParseError::SgxExtension {
                detail: "pck certificate does not carry the sgx extension".to_string(),
            })?;

        let pck_extension = SgxPckExtension::from_der(pck_extension.extn_value.as_bytes())?;

        Ok(PckCertChainData {
            pck_cert_chain,
            pck_extension,
        })
    }
}

pub struct PckCertChainData {
    pub pck_cert_chain: Vec<CertificateInner>,

    pub pck_extension: SgxPckExtension,
}

#[derive(Debug, PartialEq)]
pub enum CertificationKeyType {
    _PpidClearText = 1,
    _PpidRsa2048Encrypted,
    _PpidRsa3072Encrypted,
    _PckCleartext,
    PckCertChain,
    _EcdsaSigAuxData,
}
