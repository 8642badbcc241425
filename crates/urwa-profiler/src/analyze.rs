//! Probe response analysis: the classification ladder.

use std::collections::BTreeSet;
use urwa_types::{FetchOutcome, Protection, Risk, Strategy};

/// Classification of one probe response.
#[derive(Debug, Clone)]
pub struct ProbeAnalysis {
    pub risk: Risk,
    pub risk_score: u8,
    pub protections: BTreeSet<Protection>,
    pub recommended_strategy: Strategy,
}

const CHALLENGE_MARKERS: [&str; 3] = ["challenge", "cf-chl", "turnstile"];

fn header<'a>(outcome: &'a FetchOutcome, name: &str) -> Option<&'a str> {
    outcome.header(name)
}

fn is_cloudflare(outcome: &FetchOutcome) -> bool {
    header(outcome, "cf-ray").is_some()
        || header(outcome, "server")
            .map(|s| s.to_lowercase().contains("cloudflare"))
            .unwrap_or(false)
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Visible text length in bytes: body content outside tags, scripts, and
/// styles. A heuristic, not a parser; good enough to tell a shell page
/// from an article.
fn visible_text_len(html: &str) -> usize {
    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut len = 0usize;
    let mut i = 0usize;
    let mut in_tag = false;

    while i < bytes.len() {
        if !in_tag && bytes[i..].starts_with(b"<script") {
            match find_sub(&bytes[i..], b"</script>") {
                Some(pos) => {
                    i += pos + b"</script>".len();
                    continue;
                }
                None => break,
            }
        }
        if !in_tag && bytes[i..].starts_with(b"<style") {
            match find_sub(&bytes[i..], b"</style>") {
                Some(pos) => {
                    i += pos + b"</style>".len();
                    continue;
                }
                None => break,
            }
        }
        match bytes[i] {
            b'<' => in_tag = true,
            b'>' => in_tag = false,
            b if !in_tag && !b.is_ascii_whitespace() => len += 1,
            _ => {}
        }
        i += 1;
    }
    len
}

/// Bytes of inline script content plus the number of script tags.
fn script_footprint(html: &str) -> (usize, usize) {
    let lower = html.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut inline_bytes = 0usize;
    let mut script_count = 0usize;
    let mut i = 0usize;

    while let Some(open) = find_sub(&bytes[i..], b"<script") {
        let open = i + open;
        script_count += 1;
        let content_start = match find_sub(&bytes[open..], b">") {
            Some(pos) => open + pos + 1,
            None => break,
        };
        match find_sub(&bytes[content_start..], b"</script>") {
            Some(close) => {
                inline_bytes += close;
                i = content_start + close + b"</script>".len();
            }
            None => break,
        }
    }
    (inline_bytes, script_count)
}

fn weight(protection: Protection) -> u32 {
    match protection {
        Protection::CloudflareLike => 35,
        Protection::CaptchaLikely => 30,
        Protection::JsRequired => 15,
        Protection::RateLimitSignal => 15,
        Protection::LoginWall => 10,
    }
}

fn score(risk: Risk, protections: &BTreeSet<Protection>) -> u8 {
    let base: u32 = match risk {
        Risk::Low => 5,
        Risk::Medium => 35,
        Risk::High => 60,
        Risk::Extreme => 85,
    };
    let total = base + protections.iter().map(|p| weight(*p)).sum::<u32>();
    total.min(100) as u8
}

/// Apply the classification ladder to a probe outcome. Rules are checked
/// in order; the first match decides the risk tier.
pub fn classify_probe(outcome: &FetchOutcome) -> ProbeAnalysis {
    let body = outcome
        .content
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();
    let body_lower = body.to_lowercase();
    let status = outcome.http_status.unwrap_or(0);

    let mut protections = BTreeSet::new();

    // Rule 1: tiny challenge interstitial.
    if body.len() < 512 && CHALLENGE_MARKERS.iter().any(|m| body_lower.contains(m)) {
        protections.insert(Protection::CaptchaLikely);
        if is_cloudflare(outcome) || body_lower.contains("cf-chl") {
            protections.insert(Protection::CloudflareLike);
        }
        return ProbeAnalysis {
            risk: Risk::Extreme,
            risk_score: score(Risk::Extreme, &protections),
            protections,
            recommended_strategy: Strategy::Ultra,
        };
    }

    // Rule 2: Cloudflare front door actively refusing.
    if is_cloudflare(outcome) && matches!(status, 403 | 503) {
        protections.insert(Protection::CloudflareLike);
        return ProbeAnalysis {
            risk: Risk::High,
            risk_score: score(Risk::High, &protections),
            protections,
            recommended_strategy: Strategy::Ultra,
        };
    }

    // Rule 3: rate limiting already visible on first contact.
    if status == 429 || header(outcome, "retry-after").is_some() {
        protections.insert(Protection::RateLimitSignal);
        return ProbeAnalysis {
            risk: Risk::High,
            risk_score: score(Risk::High, &protections),
            protections,
            recommended_strategy: Strategy::Stealth,
        };
    }

    // Rule 4: an empty shell page that ships its content via JS.
    let text_len = visible_text_len(&body);
    let (inline_script_bytes, script_count) = script_footprint(&body);
    let text_ratio = if body.is_empty() {
        0.0
    } else {
        text_len as f64 / body.len() as f64
    };
    if !body.is_empty()
        && text_ratio < 0.05
        && (inline_script_bytes > 100 * 1024 || script_count >= 5)
    {
        protections.insert(Protection::JsRequired);
        return ProbeAnalysis {
            risk: Risk::Medium,
            risk_score: score(Risk::Medium, &protections),
            protections,
            recommended_strategy: Strategy::Stealth,
        };
    }

    // Rule 5: a healthy, text-bearing page.
    if (200..=299).contains(&status) && text_len >= 2 * 1024 {
        return ProbeAnalysis {
            risk: Risk::Low,
            risk_score: score(Risk::Low, &protections),
            protections,
            recommended_strategy: Strategy::Light,
        };
    }

    // Rule 6: any other client error.
    if (400..=499).contains(&status) {
        if status == 401 {
            protections.insert(Protection::LoginWall);
        }
        return ProbeAnalysis {
            risk: Risk::Medium,
            risk_score: score(Risk::Medium, &protections),
            protections,
            recommended_strategy: Strategy::Stealth,
        };
    }

    // Thin 200s, server errors, and failed probes share the middle tier.
    ProbeAnalysis {
        risk: Risk::Medium,
        risk_score: score(Risk::Medium, &protections),
        protections,
        recommended_strategy: Strategy::Stealth,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn outcome(status: u16, body: &str, headers: Vec<(String, String)>) -> FetchOutcome {
        FetchOutcome {
            success: (200..300).contains(&status),
            content: Some(Bytes::from(body.to_string())),
            http_status: Some(status),
            headers,
            elapsed_ms: 50,
            ..Default::default()
        }
    }

    #[test]
    fn tiny_challenge_body_is_extreme() {
        let probe = outcome(503, "<html>cf-chl challenge</html>", vec![]);
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::Extreme);
        assert_eq!(analysis.recommended_strategy, Strategy::Ultra);
        assert!(analysis.protections.contains(&Protection::CaptchaLikely));
    }

    #[test]
    fn cloudflare_refusal_is_high() {
        let probe = outcome(
            403,
            &"<html><body>blocked, go away, nothing here</body></html>".repeat(20),
            vec![("cf-ray".to_string(), "8d2-IAD".to_string())],
        );
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::High);
        assert_eq!(analysis.recommended_strategy, Strategy::Ultra);
        assert!(analysis.protections.contains(&Protection::CloudflareLike));
    }

    #[test]
    fn rate_limit_signal_is_high_stealth() {
        let probe = outcome(429, "slow down please, you are making too many requests", vec![]);
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::High);
        assert_eq!(analysis.recommended_strategy, Strategy::Stealth);
        assert!(analysis.protections.contains(&Protection::RateLimitSignal));
    }

    #[test]
    fn js_shell_page_is_medium_stealth() {
        let scripts = "<script>var x=1;</script>".repeat(6);
        let body = format!("<html><head>{}</head><body><div id=\"root\"></div></body></html>", scripts);
        let probe = outcome(200, &body, vec![]);
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::Medium);
        assert!(analysis.protections.contains(&Protection::JsRequired));
    }

    #[test]
    fn substantial_text_is_low_light() {
        let paragraph = "<p>Plenty of meaningful article text in this paragraph right here.</p>";
        let body = format!("<html><body>{}</body></html>", paragraph.repeat(60));
        let probe = outcome(200, &body, vec![]);
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::Low);
        assert_eq!(analysis.recommended_strategy, Strategy::Light);
    }

    #[test]
    fn other_4xx_is_medium() {
        let probe = outcome(404, "not found", vec![]);
        let analysis = classify_probe(&probe);
        assert_eq!(analysis.risk, Risk::Medium);
        assert_eq!(analysis.recommended_strategy, Strategy::Stealth);
    }

    #[test]
    fn login_wall_flagged_on_401() {
        let probe = outcome(401, "please sign in", vec![]);
        let analysis = classify_probe(&probe);
        assert!(analysis.protections.contains(&Protection::LoginWall));
    }

    #[test]
    fn ladder_order_challenge_beats_text() {
        // A tiny body with a challenge marker wins over everything else.
        let probe = outcome(200, "turnstile check", vec![]);
        assert_eq!(classify_probe(&probe).risk, Risk::Extreme);
    }

    #[test]
    fn scores_stay_clipped() {
        let probe = outcome(503, "<html>cf-chl turnstile challenge</html>", vec![
            ("server".to_string(), "cloudflare".to_string()),
        ]);
        let analysis = classify_probe(&probe);
        assert!(analysis.risk_score <= 100);
        assert!(analysis.risk_score >= 85);
    }
}
