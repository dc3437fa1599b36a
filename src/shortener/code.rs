//! Random short code generation.

use rand::Rng;

use crate::error::{Result, TinyUrlError};
use crate::ratelimit::COUNTER_PREFIX;

/// Symbols a generated code is drawn from.
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a generated code.
pub const CODE_LENGTH: usize = 10;

/// Generate a code using the thread-local RNG.
pub fn generate() -> String {
    generate_with(&mut rand::thread_rng())
}

/// Generate a code by sampling each character uniformly from [`ALPHABET`].
///
/// Codes are not checked against existing ones here.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes shadowed by fixed routes.
const RESERVED_CODES: &[&str] = &["healthz", "tinyurl"];

/// Reject a caller-chosen code that could not be served back as `/{code}`
/// or that would land on a rate limit counter.
pub fn check_requested(code: &str) -> Result<()> {
    if code
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(TinyUrlError::InvalidInput(
            "short_code must not contain '/', '?', '#', '%' or whitespace".to_string(),
        ));
    }
    if RESERVED_CODES.contains(&code) || code.starts_with(COUNTER_PREFIX) {
        return Err(TinyUrlError::InvalidInput(format!(
            "short_code '{}' is reserved",
            code
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn is_generated_shape(code: &str) -> bool {
        code.len() == CODE_LENGTH && code.bytes().all(|b| ALPHABET.contains(&b))
    }

    #[test]
    fn test_alphabet_has_62_unique_symbols() {
        let unique: HashSet<u8> = ALPHABET.iter().copied().collect();
        assert_eq!(ALPHABET.len(), 62);
        assert_eq!(unique.len(), 62);
        assert!(ALPHABET.iter().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..1000 {
            let code = generate();
            assert!(is_generated_shape(&code), "bad code: {}", code);
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = generate_with(&mut StdRng::seed_from_u64(7));
        let b = generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_codes_vary() {
        let codes: HashSet<String> = (0..100).map(|_| generate()).collect();
        assert!(codes.len() > 95);
    }

    #[test]
    fn test_check_requested() {
        assert!(check_requested("my-link").is_ok());
        assert!(check_requested("Promo_2024.v2").is_ok());
        assert!(check_requested(&generate()).is_ok());

        for bad in ["a/b", "a?b", "a#b", "a%2Fb", "has space", "tab\there"] {
            assert!(
                matches!(check_requested(bad), Err(TinyUrlError::InvalidInput(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_reserved_codes_rejected() {
        assert!(check_requested("healthz").is_err());
        assert!(check_requested("tinyurl").is_err());
        assert!(check_requested("rate_limit:203.0.113.7").is_err());
        // Only an exact or prefix match is reserved
        assert!(check_requested("healthz2").is_ok());
        assert!(check_requested("my_rate_limit:x").is_ok());
    }

    #[test]
    fn test_is_generated_shape() {
        assert!(is_generated_shape("X7gP2kQa3Z"));
        assert!(!is_generated_shape("short"));
        assert!(!is_generated_shape("X7gP2kQa3-"));
        assert!(!is_generated_shape("X7gP2kQa3Zz"));
    }
}
