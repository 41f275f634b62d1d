use async_trait::async_trait;
use converse_config::ProxyConfig;
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::{Client, Proxy};
use secrecy::ExposeSecret;

use super::{StreamRequest, StreamResponse, Transport};
use crate::error::LlmError;

/// Default transport backed by `reqwest`
///
/// Keeps one client per distinct proxy so connection pools are reused across
/// requests.
#[derive(Debug, Default)]
pub struct HttpTransport {
    direct: Client,
    proxied: DashMap<String, Client>,
}

impl HttpTransport {
    /// Transport with a fresh connection pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client for direct requests
    pub fn with_client(client: Client) -> Self {
        Self {
            direct: client,
            proxied: DashMap::new(),
        }
    }

    fn client_for(&self, proxy: Option<&ProxyConfig>) -> Result<Client, LlmError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let key = proxy.cache_key();
        if let Some(client) = self.proxied.get(&key) {
            return Ok(client.clone());
        }

        let mut reqwest_proxy = Proxy::all(proxy.url.as_str())
            .map_err(|e| LlmError::InvalidRequest(format!("invalid proxy {}: {e}", proxy.url)))?;
        if let Some(username) = &proxy.username {
            let password = proxy.password.as_ref().map_or("", |p| p.expose_secret());
            reqwest_proxy = reqwest_proxy.basic_auth(username, password);
        }

        let client = Client::builder()
            .proxy(reqwest_proxy)
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build proxied client: {e}")))?;

        tracing::debug!(proxy = %proxy.url, "created proxied http client");
        self.proxied.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json_stream(&self, request: StreamRequest) -> Result<StreamResponse, LlmError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let send = client
            .post(&request.url)
            .headers(request.headers)
            .json(&request.body)
            .send();

        let response = tokio::select! {
            biased;
            () = request.cancel.cancelled() => return Err(LlmError::Aborted),
            response = send => response.map_err(|e| {
                tracing::error!(url = %request.url, error = %e, "upstream request failed");
                LlmError::from(e)
            })?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(LlmError::from));

        Ok(StreamResponse::new(status, headers, Box::pin(body)))
    }
}
