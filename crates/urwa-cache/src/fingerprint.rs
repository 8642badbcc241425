//! Request fingerprinting.

use sha2::{Digest, Sha256};
use url::Url;
use urwa_types::Strategy;

/// Normalized URL form used for fingerprinting: scheme and host come
/// lowercased from the parser, default ports are elided, fragments are
/// dropped, path and query are preserved byte-for-byte.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized.into()
}

/// Stable fingerprint over the normalized URL and the option fields that
/// affect the fetched bytes.
pub fn fingerprint(url: &Url, force_strategy: Option<Strategy>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url(url).as_bytes());
    hasher.update(b"\x00");
    hasher.update(
        force_strategy
            .map(|s| s.name())
            .unwrap_or("auto")
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn fragments_do_not_change_fingerprint() {
        assert_eq!(
            fingerprint(&url("https://example.com/page#top"), None),
            fingerprint(&url("https://example.com/page"), None)
        );
    }

    #[test]
    fn case_of_host_is_normalized_by_parser() {
        assert_eq!(
            fingerprint(&url("https://EXAMPLE.com/page"), None),
            fingerprint(&url("https://example.com/page"), None)
        );
    }

    #[test]
    fn default_port_elided() {
        assert_eq!(
            fingerprint(&url("https://example.com:443/page"), None),
            fingerprint(&url("https://example.com/page"), None)
        );
    }

    #[test]
    fn query_matters() {
        assert_ne!(
            fingerprint(&url("https://example.com/page?a=1"), None),
            fingerprint(&url("https://example.com/page?a=2"), None)
        );
    }

    #[test]
    fn forced_strategy_changes_fingerprint() {
        assert_ne!(
            fingerprint(&url("https://example.com/"), Some(Strategy::Ultra)),
            fingerprint(&url("https://example.com/"), None)
        );
    }
}
