//! Rule fingerprinting
//!
//! Rules are identified by an xxHash64 over their effect and selector. The
//! fingerprint keys the applied-element registry and, rendered as a hex
//! token, the idempotency marker written onto affected elements.

use std::hash::Hasher;

use twox_hash::XxHash64;

const SEED: u64 = 0x5048_5553; // "PHUS"

/// Hash a string to a stable 64-bit fingerprint.
pub fn fingerprint(data: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(data.as_bytes());
    hasher.finish()
}

/// Render a fingerprint as the fixed-width token used in marker attributes.
pub fn hex_token(fp: u64) -> String {
    format!("{fp:016x}")
}

/// Alias kept for call sites that fingerprint and render in one step.
pub fn marker_token(data: &str) -> String {
    hex_token(fingerprint(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("hide|.ad"), fingerprint("hide|.ad"));
        assert_ne!(fingerprint("hide|.ad"), fingerprint("blank|.ad"));
    }

    #[test]
    fn test_hex_token_width() {
        assert_eq!(hex_token(0).len(), 16);
        assert_eq!(hex_token(u64::MAX).len(), 16);
        assert_eq!(hex_token(0xabc), "0000000000000abc");
    }
}
