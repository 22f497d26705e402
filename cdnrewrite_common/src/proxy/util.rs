use std::fmt;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A `scheme://host[:port]` origin with no path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// The scheme of the origin
    scheme: Scheme,
    /// The host of the origin
    host: String,
    /// The port of the origin, when given explicitly
    port: Option<u16>,
}

impl Origin {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `host[:port]`, suitable for a `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())
    }
}

/// Parse an origin. A single trailing slash is tolerated; any other path is rejected.
pub fn parse_origin(origin: &str) -> Result<Origin, ConfigError> {
    let invalid = || ConfigError::InvalidOrigin(origin.to_string());

    let trimmed = origin.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut parts = trimmed.splitn(2, "://");
    let scheme = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("http") => Scheme::Http,
        Some("https") => Scheme::Https,
        _ => return Err(invalid()),
    };

    let rest = parts.next().ok_or_else(invalid)?;
    if rest.contains('/') || rest.contains('?') || rest.contains('#') {
        return Err(invalid());
    }

    let mut parts = rest.splitn(2, ':');
    let host = parts.next().ok_or_else(invalid)?.to_string();
    if host.is_empty() {
        return Err(invalid());
    }

    let port = parts
        .next()
        .map(|port| port.parse::<u16>().map_err(|_| invalid()))
        .transpose()?;

    Ok(Origin { scheme, host, port })
}
