use std::io::Read;
use std::str::FromStr;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use crate::{Bundle, BundleError, FinalizedBundleRecord};

/// Payload compression, as advertised by a record's `compression_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl FromStr for Compression {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Self::None),
            "1" => Ok(Self::Gzip),
            other => Err(BundleError::UnsupportedCompression(other.to_owned())),
        }
    }
}

/// Lowercase hex encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks a downloaded payload against the record's `data_hash`.
pub fn verify_checksum(record: &FinalizedBundleRecord, payload: &[u8]) -> Result<(), BundleError> {
    let actual = sha256_hex(payload);
    if actual.eq_ignore_ascii_case(record.data_hash.trim()) {
        Ok(())
    } else {
        Err(BundleError::ChecksumMismatch { bundle_id: record.id, expected: record.data_hash.clone(), actual })
    }
}

pub fn decompress(payload: &[u8], compression: Compression) -> Result<Vec<u8>, BundleError> {
    match compression {
        Compression::None => Ok(payload.to_vec()),
        Compression::Gzip => {
            let mut out = Vec::with_capacity(payload.len() * 4);
            GzDecoder::new(payload).read_to_end(&mut out).map_err(BundleError::Decompress)?;
            Ok(out)
        }
    }
}

/// Parses a decompressed payload: a JSON array of `{key, value}` objects.
pub fn decode_bundle(raw: &[u8]) -> Result<Bundle, BundleError> {
    serde_json::from_slice(raw).map_err(BundleError::Decode)
}

/// Verifies, decompresses and decodes the payload of `record`.
///
/// Records without a `data_hash` skip verification.
pub fn unpack_payload(record: &FinalizedBundleRecord, payload: &[u8]) -> Result<Bundle, BundleError> {
    if !record.data_hash.is_empty() {
        verify_checksum(record, payload)?;
    }
    let compression: Compression = record.compression_id.parse()?;
    decode_bundle(&decompress(payload, compression)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use flate2::{write::GzEncoder, Compression as GzLevel};
    use std::io::Write;

    const BUNDLE_JSON: &str = r#"[{"key":"10","value":{"block":{"height":"10"}}},{"key":"11","value":{"block":{"height":"11"}}}]"#;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn record_for(payload: &[u8], compression_id: &str) -> FinalizedBundleRecord {
        FinalizedBundleRecord {
            id: 3,
            storage_id: "storage".into(),
            storage_provider_id: 1,
            compression_id: compression_id.into(),
            from_key: "10".into(),
            to_key: "11".into(),
            data_hash: sha256_hex(payload),
        }
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(sha256_hex(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn unpacks_gzip_payload() {
        let payload = gzip(BUNDLE_JSON.as_bytes());
        let bundle = unpack_payload(&record_for(&payload, "1"), &payload).unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle[0].key, "10");
        assert_eq!(&bundle[1].value[..], br#"{"block":{"height":"11"}}"#);
    }

    #[test]
    fn unpacks_uncompressed_payload() {
        let payload = BUNDLE_JSON.as_bytes();
        let bundle = unpack_payload(&record_for(payload, "0"), payload).unwrap();
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn checksum_is_case_insensitive() {
        let payload = BUNDLE_JSON.as_bytes();
        let mut record = record_for(payload, "0");
        record.data_hash = record.data_hash.to_uppercase();
        assert!(verify_checksum(&record, payload).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = gzip(BUNDLE_JSON.as_bytes());
        let record = record_for(&payload, "1");
        let mut tampered = payload.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;

        assert_matches!(unpack_payload(&record, &tampered), Err(BundleError::ChecksumMismatch { bundle_id: 3, .. }));
    }

    #[test]
    fn rejects_unknown_compression() {
        let payload = BUNDLE_JSON.as_bytes();
        assert_matches!(
            unpack_payload(&record_for(payload, "7"), payload),
            Err(BundleError::UnsupportedCompression(id)) if id == "7"
        );
    }

    #[test]
    fn rejects_corrupted_gzip() {
        let payload = b"definitely not gzip".to_vec();
        assert_matches!(unpack_payload(&record_for(&payload, "1"), &payload), Err(BundleError::Decompress(_)));
    }

    #[test]
    fn rejects_non_array_payload() {
        let payload = br#"{"key":"1"}"#;
        assert_matches!(unpack_payload(&record_for(payload, "0"), payload), Err(BundleError::Decode(_)));
    }
}
