//! Transfer code generation.
//!
//! Codes are 3 characters from a 32-symbol alphabet without the look-alikes
//! `I`, `O`, `0` and `1`, so they can be read aloud and typed by hand.
//! Uniqueness is the registry's job; generators only draw.

use rand::Rng;

/// Symbols a transfer code is drawn from.
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of every transfer code
pub const CODE_LENGTH: usize = 3;

/// Source of candidate transfer codes.
pub trait CodeSource: Send + Sync {
    /// Draw the next candidate code.
    fn next_code(&self) -> String;
}

/// Uniform random draw from [`CODE_ALPHABET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        generate_transfer_code()
    }
}

/// Generate a random transfer code
pub fn generate_transfer_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Bring user input into the alphabet's case. Surrounding whitespace is dropped.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// True if `code` could have been issued (right length, alphabet only).
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_transfer_code_format() {
        for _ in 0..1000 {
            let code = generate_transfer_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(is_well_formed(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_alphabet_has_no_confusables() {
        for c in [b'I', b'O', b'0', b'1'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
        let unique: HashSet<_> = CODE_ALPHABET.iter().collect();
        assert_eq!(unique.len(), 32);
    }

    #[test]
    fn test_codes_vary() {
        let codes: HashSet<String> = (0..200).map(|_| RandomCodes.next_code()).collect();
        // 200 draws from 32768 codes; a handful of repeats at most
        assert!(codes.len() > 150);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("7k9"), "7K9");
        assert_eq!(normalize_code("  abc \n"), "ABC");
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("7K9"));
        assert!(!is_well_formed("7k9"));
        assert!(!is_well_formed("7K"));
        assert!(!is_well_formed("7K9A"));
        assert!(!is_well_formed("10O"));
        assert!(!is_well_formed(""));
    }
}
