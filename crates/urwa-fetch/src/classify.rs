//! Response classification: map status + body to success or a failure kind.

use urwa_types::FailureKind;

// Markers of interactive or JS-based gating (Cloudflare challenges,
// Turnstile, reCAPTCHA, hCaptcha, PerimeterX).
const CHALLENGE_MARKERS: [&str; 9] = [
    "cf-chl",
    "_cf_chl_opt",
    "cf-browser-verification",
    "challenge-platform",
    "turnstile",
    "g-recaptcha",
    "grecaptcha",
    "hcaptcha",
    "perimeterx",
];

/// Scan a body prefix for challenge markers. Only the first 16 KiB is
/// examined; interstitials are small.
pub fn looks_like_challenge(body: &[u8]) -> bool {
    let window = &body[..body.len().min(16 * 1024)];
    let text = String::from_utf8_lossy(window).to_lowercase();
    CHALLENGE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn body_is_empty(body: &[u8]) -> bool {
    String::from_utf8_lossy(body).trim().is_empty()
}

/// Classify a completed HTTP exchange.
///
/// Returns `None` for a usable success, or the failure kind otherwise.
pub fn classify_response(status: u16, body: &[u8]) -> Option<FailureKind> {
    match status {
        200..=299 => {
            if looks_like_challenge(body) {
                Some(FailureKind::Challenge)
            } else if body_is_empty(body) {
                Some(FailureKind::ParseEmpty)
            } else {
                None
            }
        }
        401 | 403 | 451 => {
            if looks_like_challenge(body) {
                Some(FailureKind::Challenge)
            } else {
                Some(FailureKind::Http4xxBlocked)
            }
        }
        429 => Some(FailureKind::Http429),
        500..=599 => {
            // Cloudflare serves challenges under 503.
            if looks_like_challenge(body) {
                Some(FailureKind::Challenge)
            } else {
                Some(FailureKind::Http5xx)
            }
        }
        400..=499 => Some(FailureKind::Unknown),
        _ => Some(FailureKind::Unknown),
    }
}
