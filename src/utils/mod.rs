use std::time::SystemTime;

use x509_cert::certificate::CertificateInner;

pub mod u32_hex {
    use serde::Serializer;
    use zerocopy::AsBytes;

    use crate::types::UInt32LE;

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<UInt32LE, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: [u8; 4] = hex::deserialize(deserializer)?;
        Ok(value.into())
    }
    pub fn serialize<S: Serializer>(value: &UInt32LE, serializer: S) -> Result<S::Ok, S::Error> {
        hex::serialize(value.as_bytes(), serializer)
    }
}

/// Decodes a quote from its hex transport form, tolerating an optional
/// `0x` prefix and surrounding whitespace.
pub fn decode_quote_hex(quote_hex: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = quote_hex.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(trimmed)
}

pub trait Expireable {
    fn valid_at(&self, timestamp: SystemTime) -> bool;
}

impl Expireable for CertificateInner {
    /// Validate a single certificate not_before/not_after
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        let nb = self.tbs_certificate.validity.not_before.to_system_time();
        let na = self.tbs_certificate.validity.not_after.to_system_time();
        !(timestamp <= nb || na <= timestamp)
    }
}

impl Expireable for &[CertificateInner] {
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.iter().all(|cert| cert.valid_at(timestamp))
    }
}

impl Expireable for Vec<CertificateInner> {
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.as_slice().valid_at(timestamp)
    }
}

/// Removes `std::mem::size_of<T>()` bytes from the front of `bytes` and returns it as a `T`.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_from_bytes<T: zerocopy::FromBytes>(bytes: &mut &[u8]) -> Option<T> {
    let front = T::read_from_prefix(bytes)?;
    *bytes = &bytes[std::mem::size_of::<T>()..];
    Some(front)
}

/// Removes a slice of `N` from the front of `bytes` and copies
/// it into an owned `[u8; N]`
///
/// Note: Caller must ensure the slice is large enough
pub fn read_array<const N: usize>(bytes: &mut &[u8]) -> [u8; N] {
    let mut res = [0u8; N];
    let (front, rest) = bytes.split_at(N);
    res.copy_from_slice(front);
    *bytes = rest;
    res
}

/// Removes a slice of `size` from the front of `bytes` and returns it
///
/// Note: Caller must ensure that the slice is large enough
pub fn read_bytes<'a>(bytes: &mut &'a [u8], size: usize) -> &'a [u8] {
    let (front, rest) = bytes.split_at(size);
    *bytes = rest;
    front
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_quote_hex_accepts_prefixed_and_bare() {
        assert_eq!(decode_quote_hex("0xdeadbeef").unwrap(), [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_quote_hex("deadbeef").unwrap(), [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_quote_hex("  0x00ff \n").unwrap(), [0x00, 0xff]);
        assert!(decode_quote_hex("0xabc").is_err());
        assert!(decode_quote_hex("zz").is_err());
    }

    #[test]
    fn certificate_validity_window() {
        use std::time::Duration;

        let certs =
            CertificateInner::load_pem_chain(include_bytes!("../../data/root_ca.pem")).unwrap();
        let root = &certs[0];

        let not_before = root.tbs_certificate.validity.not_before.to_system_time();
        let not_after = root.tbs_certificate.validity.not_after.to_system_time();

        assert!(root.valid_at(not_before + Duration::from_secs(1)));
        assert!(!root.valid_at(not_before - Duration::from_secs(1)));
        assert!(!root.valid_at(not_after + Duration::from_secs(1)));
        assert!(certs.valid_at(not_before + Duration::from_secs(1)));
    }

    #[test]
    fn cursor_readers_advance() {
        let data = [1u8, 0, 2, 0, 3, 4, 5];
        let mut bytes = &data[..];

        let first = read_from_bytes::<zerocopy::little_endian::U16>(&mut bytes).unwrap();
        assert_eq!(first.get(), 1);

        let arr = read_array::<2>(&mut bytes);
        assert_eq!(arr, [2, 0]);

        assert_eq!(read_bytes(&mut bytes, 2), &[3, 4]);
        assert_eq!(bytes, &[5]);

        let mut short = &data[..1];
        assert!(read_from_bytes::<zerocopy::little_endian::U16>(&mut short).is_none());
        assert_eq!(short.len(), 1);
    }
}
