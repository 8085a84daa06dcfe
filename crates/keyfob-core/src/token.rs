//! Bearer token claim decoding.
//!
//! These helpers read the expiry claim out of a JWT-shaped bearer token
//! without verifying its signature - verification is the server's job.
//! Any decode failure is treated as "no expiry", which callers must
//! interpret as already expired (fail closed).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Seconds subtracted from the expiry claim before comparing against now.
/// Avoids presenting a token the server will reject moments later due to
/// clock drift between client and server.
pub const CLOCK_SKEW_SECS: i64 = 30;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Decode the expiry instant from a bearer token.
///
/// Splits on the structural `.` separators, base64-decodes the payload
/// segment and reads the `exp` claim. Returns `None` on any failure -
/// wrong segment count, bad base64, bad JSON, missing or out-of-range
/// claim. No error ever escapes.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return None,
    };

    // Tokens in the wild sometimes carry padding; the no-pad engine rejects it.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.exp?;

    Utc.timestamp_opt(exp, 0).single()
}

/// Whether a token is expired (or close enough to expiry that it should
/// not be used), with the default clock-skew window.
///
/// A token whose expiry cannot be decoded is reported as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, CLOCK_SKEW_SECS, Utc::now())
}

/// `is_expired` with an explicit skew window.
pub fn is_expired_with_skew(token: &str, skew_secs: i64) -> bool {
    is_expired_at(token, skew_secs, Utc::now())
}

/// Clock-injectable core of the expiry check.
pub(crate) fn is_expired_at(token: &str, skew_secs: i64, now: DateTime<Utc>) -> bool {
    match decode_expiry(token) {
        Some(expiry) => expiry - Duration::seconds(skew_secs) <= now,
        None => true,
    }
}

/// Seconds until the token's expiry claim, if it has one in the future.
pub(crate) fn seconds_until_expiry(token: &str) -> Option<i64> {
    let expiry = decode_expiry(token)?;
    let remaining = (expiry - Utc::now()).num_seconds();
    (remaining > 0).then_some(remaining)
}

// ============================================================================
// Tests
// ============================================================================
