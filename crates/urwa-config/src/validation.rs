//! Request URL validation with SSRF guarding.

use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid URL format: {0}")]
    Malformed(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    Scheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Private or local addresses are not allowed: {0}")]
    PrivateAddress(String),
}

/// Validates inbound scrape URLs before any state is touched.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    allow_private: bool,
}

impl RequestValidator {
    pub fn new(allow_private: bool) -> Self {
        Self { allow_private }
    }

    /// Parse and vet a URL: http/https only, host present, and no
    /// loopback / link-local / CGNAT / RFC-1918 targets unless private
    /// addresses were explicitly enabled.
    pub fn validate(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = Url::parse(raw)?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                warn!(scheme = scheme, "Rejecting unsupported URL scheme");
                return Err(ValidationError::Scheme(scheme.to_string()));
            }
        }

        let host = url.host_str().ok_or(ValidationError::MissingHost)?;

        if !self.allow_private && is_private_or_local_address(host) {
            warn!(host = host, "Rejecting private or local address");
            return Err(ValidationError::PrivateAddress(host.to_string()));
        }

        Ok(url)
    }
}

/// Check if address is private or local.
fn is_private_or_local_address(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }

    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<std::net::IpAddr>() {
        match ip {
            std::net::IpAddr::V4(ipv4) => {
                let octets = ipv4.octets();
                match octets[0] {
                    10 => true,                                        // 10.0.0.0/8
                    127 => true,                                       // loopback
                    0 => true,                                         // 0.0.0.0/8
                    172 if (16..=31).contains(&octets[1]) => true,     // 172.16.0.0/12
                    192 if octets[1] == 168 => true,                   // 192.168.0.0/16
                    169 if octets[1] == 254 => true,                   // link-local
                    100 if (64..=127).contains(&octets[1]) => true,    // CGNAT 100.64.0.0/10
                    _ => false,
                }
            }
            std::net::IpAddr::V6(ipv6) => {
                ipv6.is_loopback()
                    || ipv6.is_unspecified()
                    || (ipv6.segments()[0] & 0xffc0) == 0xfe80 // link-local
                    || (ipv6.segments()[0] & 0xfe00) == 0xfc00 // unique-local
            }
        }
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_urls() {
        let validator = RequestValidator::new(false);
        assert!(validator.validate("https://example.com/page").is_ok());
        assert!(validator.validate("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn rejects_bad_schemes() {
        let validator = RequestValidator::new(false);
        assert!(matches!(
            validator.validate("ftp://example.com/"),
            Err(ValidationError::Scheme(_))
        ));
        assert!(matches!(
            validator.validate("file:///etc/passwd"),
            Err(ValidationError::Scheme(_)) | Err(ValidationError::MissingHost)
        ));
    }

    #[test]
    fn rejects_private_ranges() {
        let validator = RequestValidator::new(false);
        for url in [
            "http://localhost:8080/",
            "http://127.0.0.1/",
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://192.168.1.1/",
            "http://169.254.1.1/",
            "http://100.64.0.1/",
            "http://[::1]/",
        ] {
            assert!(
                matches!(
                    validator.validate(url),
                    Err(ValidationError::PrivateAddress(_))
                ),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn private_allowed_when_enabled() {
        let validator = RequestValidator::new(true);
        assert!(validator.validate("http://127.0.0.1:8080/dev").is_ok());
    }

    #[test]
    fn malformed_urls_rejected() {
        let validator = RequestValidator::new(false);
        assert!(matches!(
            validator.validate("not a url"),
            Err(ValidationError::Malformed(_))
        ));
    }
}
