//! Manual confirmation codes.
//!
//! An out-of-band alternative to the identity provider's email-link flow:
//! a short-lived 6-digit numeric code stored on the user row and compared by
//! exact string equality.

use chrono::{DateTime, Utc};
use rand::prelude::RngExt;
use rand::rng;

/// Inclusive code range; every code is a 6-digit numeric string.
pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Generate a confirmation code, uniform over [`CODE_MIN`]..=[`CODE_MAX`].
pub fn generate_code() -> String {
    let mut rng = rng();
    rng.random_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Outcome of checking a submitted code against the stored state.
#[derive(Debug, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    Expired,
    Invalid,
}

/// Check a submitted code.
///
/// Mismatch is checked before expiry, so an expired-and-wrong code reads as
/// invalid while an expired-but-matching code reads as expired.
pub fn check_code(
    stored_code: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    submitted: &str,
    now: DateTime<Utc>,
) -> CodeCheck {
    match stored_code {
        Some(code) if code == submitted => match expires_at {
            Some(expiry) if now < expiry => CodeCheck::Valid,
            _ => CodeCheck::Expired,
        },
        _ => CodeCheck::Invalid,
    }
}
