//! Canonical token-id encoding.
//!
//! Token ids are 256-bit integers. On chain they arrive as `uint256`, from the
//! Gamma registry as decimal strings. Both sides are rendered through
//! [`encode`] so store lookups compare like with like: lowercase hex, `0x`
//! prefix, no leading zeros (`0` renders as `0x0`).

use alloy::primitives::U256;

pub fn encode(id: &U256) -> String {
    format!("0x{id:x}")
}

/// Parse a decimal or `0x`-prefixed hex token id into its canonical form.
pub fn normalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let (digits, radix) = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (raw, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let value = U256::from_str_radix(digits, radix as u64).ok()?;
    Some(encode(&value))
}
