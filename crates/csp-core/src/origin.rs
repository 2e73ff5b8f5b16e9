//! Protected origin of the document a policy governs.

use url::Url;

use crate::url::default_port;

/// Scheme/host/port triple. `'self'` and scheme-less sources resolve against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    /// Explicit, non-default port.
    port: Option<u16>,
}

impl Origin {
    pub fn new(scheme: &str, host: &str, port: Option<u16>) -> Self {
        let scheme = scheme.to_ascii_lowercase();
        let port = port.filter(|&p| default_port(&scheme) != Some(p));
        Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
        }
    }

    /// Origin of a document URL. Opaque URLs yield an empty host.
    pub fn from_url(url: &Url) -> Self {
        Self::new(url.scheme(), url.host_str().unwrap_or_default(), url.port())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether `url` shares this origin's scheme, host and effective port.
    pub fn same_origin(&self, url: &Url) -> bool {
        if self.host.is_empty() {
            return false;
        }

        let Some(host) = url.host_str() else {
            return false;
        };

        url.scheme() == self.scheme
            && host.eq_ignore_ascii_case(&self.host)
            && url.port_or_known_default() == self.port.or_else(|| default_port(&self.scheme))
    }

    /// `scheme://host[:port]`
    pub fn serialize(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialize())
    }
}
