//! Domain key extraction.
//!
//! All per-site state (profiles, circuits, rate slots, stats) keys on the
//! registered domain of the request URL, so `shop.example.com` and
//! `www.example.com` share pacing and circuit state.

use url::Url;

// Second-level labels that act as public suffixes under two-letter ccTLDs
// (example.co.uk registers at three labels, not two).
const SECOND_LEVEL_SUFFIXES: [&str; 7] = ["co", "com", "net", "org", "gov", "ac", "edu"];

/// Registered domain (eTLD+1 approximation) for a parsed URL.
///
/// IP literals and single-label hosts are returned as-is. Multi-label hosts
/// keep the last two labels, or three when the penultimate label is a known
/// second-level suffix under a two-letter ccTLD.
pub fn domain_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();

    if host.parse::<std::net::IpAddr>().is_ok() {
        return Some(host);
    }

    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return Some(host);
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let take = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };
    Some(labels[labels.len() - take.min(labels.len())..].join("."))
}
