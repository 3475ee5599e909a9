//! Service-to-service authentication via shared API key.

/// Compare a presented internal key against the configured one without
/// short-circuiting on the first mismatched byte.
pub fn verify_internal_key(expected: &str, presented: &str) -> bool {
    let expected = expected.as_bytes();
    let presented = presented.as_bytes();
    if expected.len() != presented.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(presented) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_internal_key() {
        assert!(verify_internal_key("shared-key", "shared-key"));
        assert!(!verify_internal_key("shared-key", "shared-keY"));
        assert!(!verify_internal_key("shared-key", "shared-key "));
        assert!(!verify_internal_key("shared-key", ""));
    }
}
