use std::fmt;

/// How the TCP channel is secured. `Tls` is implicit TLS on connect
/// (submissions, port 465), `StartTls` upgrades a plain connection
/// (submission, port 587).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Tls,
    StartTls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub security: Security,
}

impl Endpoint {
    fn new(host: &str, port: u16, security: Security) -> Self {
        Self {
            host: host.to_string(),
            port,
            security,
        }
    }

    /// The port/security combination tried when the primary handshake
    /// fails: 465/TLS flips to 587/STARTTLS and back.
    pub fn alternate(&self) -> Endpoint {
        match self.security {
            Security::Tls => Endpoint::new(&self.host, 587, Security::StartTls),
            Security::StartTls => Endpoint::new(&self.host, 465, Security::Tls),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Submission endpoint for a sender domain. Domains outside the table get
/// the default (gmail) endpoint rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Known(Endpoint),
    Default,
}

fn gmail() -> Endpoint {
    Endpoint::new("smtp.gmail.com", 465, Security::Tls)
}

impl Provider {
    pub fn for_address(address: &str) -> Self {
        let domain = address
            .rsplit('@')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match domain.as_str() {
            "gmail.com" => Provider::Known(gmail()),
            "outlook.com" | "hotmail.com" => Provider::Known(Endpoint::new(
                "smtp-mail.outlook.com",
                587,
                Security::StartTls,
            )),
            "yahoo.com" => {
                Provider::Known(Endpoint::new("smtp.mail.yahoo.com", 465, Security::Tls))
            }
            "zoho.com" => Provider::Known(Endpoint::new("smtp.zoho.com", 465, Security::Tls)),
            _ => Provider::Default,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Provider::Known(endpoint) => endpoint.clone(),
            Provider::Default => gmail(),
        }
    }
}

/// Maps a sender address to its submission endpoint.
pub fn resolve(address: &str) -> Endpoint {
    Provider::for_address(address).endpoint()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlook_resolves_to_starttls_submission() {
        let endpoint = resolve("x@outlook.com");
        assert_eq!(endpoint.host, "smtp-mail.outlook.com");
        assert_eq!(endpoint.port, 587);
        assert_eq!(endpoint.security, Security::StartTls);
    }

    #[test]
    fn hotmail_shares_the_outlook_endpoint() {
        assert_eq!(resolve("x@hotmail.com"), resolve("y@outlook.com"));
    }

    #[test]
    fn unknown_domain_falls_back_to_gmail() {
        let endpoint = resolve("x@example.org");
        assert_eq!(endpoint.host, "smtp.gmail.com");
        assert_eq!(endpoint.port, 465);
        assert_eq!(endpoint.security, Security::Tls);
        assert!(matches!(Provider::for_address("x@example.org"), Provider::Default));
    }

    #[test]
    fn alternate_flips_port_and_security_both_ways() {
        let primary = resolve("x@gmail.com");
        let fallback = primary.alternate();
        assert_eq!(fallback.port, 587);
        assert_eq!(fallback.security, Security::StartTls);
        assert_eq!(fallback.host, primary.host);
        assert_eq!(fallback.alternate(), primary);
    }

    #[test]
    fn domain_match_is_case_insensitive() {
        assert_eq!(resolve("x@Yahoo.COM").host, "smtp.mail.yahoo.com");
    }
}
