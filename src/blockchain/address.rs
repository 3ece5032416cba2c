//! Base58check address inspection.
//!
//! Pool payouts are only sent to legacy base58check addresses
//! (`version || hash160 || checksum`, 25 bytes). The version byte tells which
//! network and script type the address belongs to, which is what the
//! `valid_address_versions` config list is checked against.

use sha2::{Digest, Sha256};
use tracing::debug;

const ADDRESS_LEN: usize = 25;
const CHECKSUM_LEN: usize = 4;

/// Version byte of a base58check address, or `None` if it fails to decode,
/// has the wrong length, or carries a bad checksum.
pub fn address_version(address: &str) -> Option<u8> {
    let decoded = match bs58::decode(address.trim()).into_vec() {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(address = %address, error = %e, "address is not base58");
            return None;
        }
    };
    if decoded.len() != ADDRESS_LEN {
        return None;
    }

    let (body, checksum) = decoded.split_at(ADDRESS_LEN - CHECKSUM_LEN);
    let digest = Sha256::digest(Sha256::digest(body));
    if &digest[..CHECKSUM_LEN] != checksum {
        return None;
    }
    Some(body[0])
}

/// True when `address` decodes and its version byte is in `versions`.
pub fn is_valid_for(address: &str, versions: &[u8]) -> bool {
    address_version(address).is_some_and(|v| versions.contains(&v))
}

/// Build a base58check string from a version byte and a 20 byte payload.
pub fn encode_address(version: u8, hash160: &[u8; 20]) -> String {
    let mut bytes = Vec::with_capacity(ADDRESS_LEN);
    bytes.push(version);
    bytes.extend_from_slice(hash160);
    let digest = Sha256::digest(Sha256::digest(&bytes));
    bytes.extend_from_slice(&digest[..CHECKSUM_LEN]);
    bs58::encode(bytes).into_string()
}
