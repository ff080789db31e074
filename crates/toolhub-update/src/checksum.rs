// crates/toolhub-update/src/checksum.rs
// ============================================================================
// Module: Checksum Manifest
// Description: SHA-256 digests and `sha256sum`-style manifest parsing.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Manifests hold one `<hex>  <name>` line per asset, the format `sha256sum`
//! writes. A `*` before the name (binary mode) is accepted. Blank lines,
//! comments, and malformed lines are skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Release asset holding the checksum manifest.
pub const CHECKSUM_ASSET: &str = "checksums.txt";

/// Length of a hex-encoded SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Parses a manifest into lowercase digests keyed by asset name.
#[must_use]
pub fn parse_manifest(text: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((digest, name)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let name = name.trim_start();
        let name = name.strip_prefix('*').unwrap_or(name);
        if digest.len() != SHA256_HEX_LEN
            || !digest.bytes().all(|byte| byte.is_ascii_hexdigit())
            || name.is_empty()
        {
            continue;
        }
        entries.insert(name.to_string(), digest.to_ascii_lowercase());
    }
    entries
}

/// Incremental SHA-256 over streamed bytes.
#[derive(Default)]
pub struct StreamDigest {
    /// Running hasher.
    hasher: Sha256,
}

impl StreamDigest {
    /// Feeds a chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        hex_encode(&self.hasher.finalize())
    }
}

/// Returns the lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut digest = StreamDigest::default();
    digest.update(bytes);
    digest.finish()
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}
