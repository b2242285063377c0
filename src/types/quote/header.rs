use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::types::{UInt16LE, UInt32LE};

/// Header of the quote data structure, A 4.3 in the Intel docs.
///
/// Fixed 48 bytes at the front of every quote, little endian throughout.
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
#[repr(C)]
pub struct QuoteHeader {
    /// Version of the quote data structure.
    pub version: UInt16LE,

    /// Type of the attestation key used by the quoting enclave.
    pub attestation_key_type: UInt16LE,

    /// TEE the quote was produced for. Zero for SGX.
    pub tee_type: UInt32LE,

    /// Security version of the quoting enclave.
    pub qe_svn: UInt16LE,

    /// Security version of the provisioning certification enclave.
    pub pce_svn: UInt16LE,

    /// Identifier of the QE vendor. Intel's is well known.
    pub qe_vendor_id: [u8; 16],

    /// Custom data the attestation key owner put in the quote.
    pub user_data: [u8; 20],
}

#[cfg(test)]
mod tests {
    use crate::constants::HEADER_LEN;

    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(std::mem::size_of::<QuoteHeader>(), HEADER_LEN);
    }
}
