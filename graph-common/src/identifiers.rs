//! Local identifier minting
//!
//! Identifiers are `namespace + 16 base-36 characters`. Reproducible identifiers
//! are derived from input values so re-running a normalization over the same
//! data yields the same IRIs; random identifiers hash a fresh UUID the same way.

use crate::model::Iri;
use crate::vocab::local;
use sha2::{Digest, Sha256};

const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the checksum part of a local identifier
pub const LENGTH: usize = 16;

const CRC_CHARS: usize = 7;
const DIGEST_CHARS: usize = LENGTH - CRC_CHARS;

/// Identifier derived from the given values
pub fn reproducible(namespace: &str, parts: &[&str]) -> Iri {
    let input = parts.join("\u{1f}");
    Iri::new(format!("{}{}", namespace, checksum(input.as_bytes())))
}

/// Identifier derived from a fresh random seed
pub fn random(namespace: &str) -> Iri {
    let seed = uuid::Uuid::new_v4();
    Iri::new(format!("{}{}", namespace, checksum(seed.as_bytes())))
}

/// True if the IRI was minted under the local URN prefix
pub fn is_local(iri: &Iri) -> bool {
    iri.starts_with(local::URN_PREFIX)
}

fn checksum(input: &[u8]) -> String {
    let crc = crc32fast::hash(input) as u64;

    let digest = Sha256::digest(input);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let tail = u64::from_be_bytes(head);

    let mut out = encode_base36(crc, CRC_CHARS);
    out.push_str(&encode_base36(tail, DIGEST_CHARS));
    out
}

/// Fixed-width base-36 encoding, truncated to the lowest `width` digits
fn encode_base36(mut value: u64, width: usize) -> String {
    let mut digits = vec![ALPHABET[0]; width];
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    digits.into_iter().map(char::from).collect()
}
