#![forbid(unsafe_code)]

use addrcheck_contracts::address::AddressRecord;
use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: &str = ", ";
const ADDRESS_SEPARATOR: &str = "|";

/// Cache key for a set of addresses submitted together; the orchestrator logs its digest per batch.
///
/// Order-sensitive: `street, city, state, zip` per address, lower-cased, joined with `|`. Missing
/// fields render as empty strings so every address always contributes four fields.
pub fn derive_cache_key(addresses: &[AddressRecord]) -> String {
    join_addresses(addresses.iter().map(|a| {
        [
            a.address_line_one.as_deref(),
            a.city.as_deref(),
            a.state.as_deref(),
            a.zip_code.as_deref(),
        ]
    }))
}

/// Fixed-width form of a derived key, lowercase SHA-256 hex.
pub fn cache_key_digest_hex(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn join_addresses<'a, I>(addresses: I) -> String
where
    I: Iterator<Item = [Option<&'a str>; 4]>,
{
    addresses
        .map(|fields| {
            fields
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect::<Vec<_>>()
                .join(FIELD_SEPARATOR)
                .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(ADDRESS_SEPARATOR)
}
