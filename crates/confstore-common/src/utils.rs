//! Utility functions for confstore
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::CommonError;

/// Regex pattern for SQL identifiers that are safe to quote into DDL
static IDENTIFIER_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-z_][a-z0-9_]{0,62}$").expect("Invalid regex pattern"));

/// Check whether a string is a lowercase SQL identifier of at most 63 bytes
///
/// # Examples
///
/// ```
/// use confstore_common::is_identifier;
///
/// assert!(is_identifier("mytablecache"));
/// assert!(is_identifier("_tmp_1"));
/// assert!(!is_identifier("1abc"));
/// assert!(!is_identifier("drop table"));
/// ```
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(s)
}

/// Encode binary content for storage in a config entry value
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 config entry value
pub fn decode_base64(value: &str) -> Result<Vec<u8>, CommonError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| CommonError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier_accepts_lowercase() {
        assert!(is_identifier("config_data"));
        assert!(is_identifier("harvard_mod_configuration"));
        assert!(is_identifier("a"));
    }

    #[test]
    fn test_is_identifier_rejects_unsafe() {
        assert!(!is_identifier(""));
        assert!(!is_identifier("Upper"));
        assert!(!is_identifier("x;drop"));
        assert!(!is_identifier("with space"));
        assert!(!is_identifier("quote\"d"));
        assert!(!is_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_base64_decode_binary() {
        let encoded = encode_base64(&[0u8, 159, 146, 150]);
        assert_eq!(decode_base64(&encoded).unwrap(), vec![0u8, 159, 146, 150]);
        assert!(decode_base64("not base64!").is_err());
    }

    mod prop {
        use proptest::prelude::*;

        use super::super::is_identifier;

        proptest! {
            #[test]
            fn generated_identifiers_are_accepted(s in "[a-z_][a-z0-9_]{0,62}") {
                prop_assert!(is_identifier(&s));
            }

            #[test]
            fn quotes_and_semicolons_are_rejected(prefix in "[a-z]{1,8}", bad in "[\"';. -]") {
                let candidate = format!("{}{}", prefix, bad);
                prop_assert!(!is_identifier(&candidate));
            }
        }
    }
}
