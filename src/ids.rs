//! Resource identity helpers.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

/// Split a composite `"<parent>:<child>"` identifier on the first `:`.
///
/// Both halves must be non-empty.
pub fn parse_composite(id: &str, expected: &str) -> Result<(String, String), ProviderError> {
    match id.split_once(':') {
        Some((parent, child)) if !parent.is_empty() && !child.is_empty() => {
            Ok((parent.to_string(), child.to_string()))
        },
        _ => Err(ProviderError::Validation(format!(
            "Unexpected import identifier \"{}\", expected \"{}\"",
            id, expected
        ))),
    }
}

/// Join a parent and child into a composite identifier.
pub fn composite(parent: &str, child: &str) -> String {
    format!("{}:{}", parent, child)
}

/// Generate a throwaway identifier of the form `t-<18 random chars>`.
pub fn generate_identifier() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(18)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("t-{}", suffix)
}

/// Stable content identifier: SHA-256 hex of the parts, NUL-separated so
/// that moving bytes across a part boundary changes the id.
pub fn content_id<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
