use sha2::{Digest, Sha256};

use crate::constants::LOCAL_ID_LEN;

/// Derive the local client identifier from hardware addresses
///
/// Addresses are concatenated in the given order, hashed with SHA-256 and the
/// hex digest is truncated to 12 characters. Returns `None` when no address
/// is usable.
pub fn derive_local_id<I, S>(addresses: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let hardware_data: String = addresses
        .into_iter()
        .filter(|addr| is_usable_hardware_address(addr.as_ref()))
        .map(|addr| addr.as_ref().to_ascii_lowercase())
        .collect();

    if hardware_data.is_empty() {
        return None;
    }

    let digest = Sha256::digest(hardware_data.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(LOCAL_ID_LEN);
    Some(id)
}

/// Loopback and virtual adapters report an empty or all-zero address
pub fn is_usable_hardware_address(addr: &str) -> bool {
    addr.chars().any(|c| c.is_ascii_hexdigit() && c != '0')
}
