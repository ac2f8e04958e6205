//! `reqwest` implementation of [`RemoteCartService`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use tokio::sync::watch;
use tracing::{debug, instrument};
use url::Url;

use petstore_core::{ItemId, UserId};

use super::types::{CartResponse, LineUpsertRequest};
use super::{RemoteCartService, ServiceError, classify_status, token_for};
use crate::cart::CartLine;
use crate::config::ApiConfig;
use crate::models::AuthState;

/// Client for the storefront cart endpoints.
///
/// Requests are authorized with the session token of the user they are made
/// for. If that user is no longer the one signed in when the request is
/// sent, the call fails with [`ServiceError::IdentityChanged`] (or
/// [`ServiceError::Unauthorized`] after a logout) without touching the
/// network.
#[derive(Clone)]
pub struct CartApiClient {
    inner: Arc<CartApiClientInner>,
}

struct CartApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    auth: watch::Receiver<AuthState>,
}

impl CartApiClient {
    /// Create a new cart API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ApiConfig, auth: watch::Receiver<AuthState>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        // `Url::join` replaces the last segment unless the base ends in '/'.
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(CartApiClientInner {
                client,
                base_url,
                auth,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ServiceError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Send a request and return the response body of a successful call.
    async fn send(
        &self,
        user: &UserId,
        method: Method,
        path: &str,
        body: Option<&LineUpsertRequest<'_>>,
    ) -> Result<String, ServiceError> {
        let token = token_for(&self.inner.auth.borrow(), user)?;
        let url = self.endpoint(path)?;

        let mut request = self
            .inner
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ServiceError::Transport(format!(
                "rate limited, retry after {retry_after} seconds"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %text.chars().take(200).collect::<String>(),
                "Cart API returned non-success status"
            );
            return Err(classify_status(status.as_u16(), &text));
        }

        Ok(text)
    }
}

fn product_path(product_id: &ItemId) -> String {
    format!("cart/{}", urlencoding::encode(product_id.as_str()))
}

#[async_trait]
impl RemoteCartService for CartApiClient {
    #[instrument(skip(self), fields(user = %user))]
    async fn get_cart(&self, user: &UserId) -> Result<Vec<CartLine>, ServiceError> {
        let text = self.send(user, Method::GET, "cart", None).await?;
        let response: CartResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse cart response"
            );
            ServiceError::Transport(format!("malformed cart response: {e}"))
        })?;

        let lines = response.into_cart_lines();
        debug!(lines = lines.len(), "Fetched remote cart");
        Ok(lines)
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product_id))]
    async fn add_or_update_line(
        &self,
        user: &UserId,
        product_id: &ItemId,
        quantity: u32,
    ) -> Result<(), ServiceError> {
        let body = LineUpsertRequest {
            product_id: product_id.as_str(),
            quantity,
        };
        self.send(user, Method::POST, "cart", Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product_id))]
    async fn remove_line(&self, user: &UserId, product_id: &ItemId) -> Result<(), ServiceError> {
        self.send(user, Method::DELETE, &product_path(product_id), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn clear(&self, user: &UserId) -> Result<(), ServiceError> {
        self.send(user, Method::DELETE, "cart", None).await?;
        Ok(())
    }
}
