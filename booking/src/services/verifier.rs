//! Confirmation codes, cancel tokens and check-in URLs.
//!
//! Codes are short and meant to be read aloud or typed from a ticket, so the
//! alphabet leaves out `0`, `O`, `1` and `I`. Cancel tokens are independent
//! of the code and carry 256 bits of entropy.

use crate::types::{Booking, CancelToken, ConfirmationCode};
use base64::Engine;
use rand::{Rng, RngCore};
use serde::Serialize;

/// Characters a confirmation code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const TOKEN_BYTES: usize = 32;

/// A random confirmation code of `length` characters.
///
/// Uniqueness is not checked here; the store refuses codes already issued.
#[must_use]
pub fn generate_confirmation_code(length: usize) -> ConfirmationCode {
    let mut rng = rand::thread_rng();
    let code: String = (0..length.max(1))
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect();
    ConfirmationCode::new(code)
}

/// A fresh cancel token: 32 random bytes, base64url without padding.
#[must_use]
pub fn generate_cancel_token() -> CancelToken {
    let mut random_bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    CancelToken::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes))
}

/// URL a check-in QR code encodes, with the code as the `code` query parameter.
#[must_use]
pub fn check_in_url(base_url: &str, code: &ConfirmationCode) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}code={code}")
}

/// Result of a check-in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckInOutcome {
    /// The booking after the call
    pub booking: Booking,
    /// The booking was already checked in; nothing changed
    pub already_checked_in: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cancel_token_shape() {
        let token = generate_cancel_token();
        assert_eq!(token.expose().len(), 43);
        assert!(
            token
                .expose()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(token, generate_cancel_token());
    }

    #[test]
    fn test_check_in_url() {
        let code = ConfirmationCode::new("ABCD2345");
        assert_eq!(
            check_in_url("https://tickets.example.com/check-in", &code),
            "https://tickets.example.com/check-in?code=ABCD2345"
        );
        assert_eq!(
            check_in_url("https://example.com/scan?venue=main", &code),
            "https://example.com/scan?venue=main&code=ABCD2345"
        );
    }

    proptest! {
        #[test]
        fn prop_codes_use_unambiguous_alphabet(length in 1usize..32) {
            let code = generate_confirmation_code(length);
            prop_assert_eq!(code.as_str().len(), length);
            prop_assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
            prop_assert!(!code.as_str().contains(['0', 'O', '1', 'I']));
        }
    }
}
