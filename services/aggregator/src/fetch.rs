//! HTTP fetch helper with the service-wide retry policy.
//!
//! Default per-request timeout is 3.5 s with up to 3 retries and quadratic
//! backoff (`attempt²` seconds). Callers with stricter budgets (token
//! exchange, session start: 1; session close on shutdown: 0) pass their
//! own `max_retries`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::errors::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3500);
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// GET and deserialize a JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        max_retries: u32,
    ) -> Result<T, FetchError> {
        let response = self
            .execute(max_retries, || self.client.get(url))
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// GET raw bytes (used for the intensity GIF).
    pub async fn get_bytes(&self, url: &str, max_retries: u32) -> Result<Vec<u8>, FetchError> {
        let response = self
            .execute(max_retries, || self.client.get(url))
            .await?;
        Ok(response
            .bytes()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?
            .to_vec())
    }

    /// POST a form body, returning the raw response text. The caller
    /// decides how to interpret success vs. error envelopes.
    pub async fn post_form<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        max_retries: u32,
    ) -> Result<String, FetchError> {
        let response = self
            .execute(max_retries, || self.client.post(url).form(body))
            .await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// POST a JSON body with bearer auth, returning the raw response text.
    pub async fn post_json_bearer<B: Serialize>(
        &self,
        url: &str,
        token: &str,
        body: &B,
        max_retries: u32,
    ) -> Result<String, FetchError> {
        let response = self
            .execute(max_retries, || {
                self.client.post(url).bearer_auth(token).json(body)
            })
            .await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// DELETE with bearer auth; only the status matters.
    pub async fn delete_bearer(
        &self,
        url: &str,
        token: &str,
        max_retries: u32,
    ) -> Result<(), FetchError> {
        self.execute(max_retries, || self.client.delete(url).bearer_auth(token))
            .await?;
        Ok(())
    }

    /// Run a request, retrying transport errors and 5xx responses with
    /// quadratic backoff. Non-5xx error statuses fail immediately.
    async fn execute<F>(&self, max_retries: u32, build: F) -> Result<reqwest::Response, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = build().send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    // Error envelopes from the vendor come with 4xx and a
                    // JSON body the caller wants to see.
                    if status.is_client_error() {
                        return Ok(response);
                    }
                    if attempt >= max_retries {
                        return Err(FetchError::Status(status.as_u16()));
                    }
                    warn!(%status, attempt, "server error, retrying");
                }
                Err(e) => {
                    if attempt >= max_retries {
                        return if e.is_timeout() {
                            Err(FetchError::Timeout(DEFAULT_TIMEOUT))
                        } else {
                            Err(FetchError::Transport(e.to_string()))
                        };
                    }
                    warn!(error = %e, attempt, "request failed, retrying");
                }
            }
            attempt += 1;
            tokio::time::sleep(Duration::from_secs(u64::from(attempt * attempt))).await;
        }
    }
}
