use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Forward proxy used for a provider's outbound requests
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// Proxy URL (`http://`, `https://` or `socks5://`)
    pub url: Url,
    /// Basic-auth user name
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl ProxyConfig {
    /// Key identifying this proxy for client reuse
    ///
    /// Credentials take part as a digest so proxies differing only by
    /// password never share a client.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        if let Some(password) = &self.password {
            hasher.update(password.expose_secret().as_bytes());
        }
        format!("{}#{:x}", self.url, hasher.finalize())
    }
}
