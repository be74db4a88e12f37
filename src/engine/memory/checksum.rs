//! CRC32 checksums over serialized records
//!
//! Every read verifies the checksum; a mismatch is `DataCorruption`.

use crc32fast::Hasher;

/// CRC32 (IEEE) over `data`
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_bit_flip() {
        let mut data = br#"{"_id":1,"x":"payload"}"#.to_vec();
        let original = compute_checksum(&data);
        assert!(verify_checksum(&data, original));
        data[3] ^= 0x01;
        assert!(!verify_checksum(&data, original));
    }
}
