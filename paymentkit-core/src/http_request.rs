use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::PaymentKitError;

/// A thin wrapper on an HTTP client for API requests. Applies sensible
/// defaults (timeout, user-agent, HTTPS enforcement) and retries transient
/// failures with exponential backoff.
///
/// This is the only place transient-failure retry happens; the confirmation
/// engine above it never re-issues a failed request on its own.
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    pub(crate) fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3, // total attempts = 4
        }
    }

    /// Creates a request builder with defaults applied.
    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        #[cfg(not(test))]
        assert!(url.starts_with("https"), "API requests must use HTTPS");

        self.client.request(method, url).timeout(self.timeout).header(
            "User-Agent",
            format!("paymentkit-core/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.req(Method::GET, url)
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.req(Method::POST, url)
    }

    /// Sends a request built by `get`/`post`, retrying transient failures
    /// (connect/timeout errors, HTTP 429 and 5xx). Returns the first
    /// non-transient response or the final failure.
    pub(crate) async fn send(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, PaymentKitError> {
        // A builder holding a streaming body cannot be cloned for retries;
        // send it once.
        let Some(template) = request_builder.try_clone() else {
            return execute(request_builder).await.map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                SendFailure::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute(request_builder).await
        })
        .retry(backoff)
        .when(SendFailure::is_transient)
        .await
        .map_err(Into::into)
    }

    /// Sends a request and decodes a JSON body of type `T` from a success
    /// response. Non-success statuses that survived retry become transport
    /// errors carrying the response body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<T, PaymentKitError> {
        let response = self.send(request_builder).await?;
        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentKitError::Transport {
                url,
                status: Some(status.as_u16()),
                error: format!("request failed: {body}"),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PaymentKitError::Decode {
                error: format!("failed to decode response body: {e}"),
            })
    }
}

#[derive(Debug)]
struct SendFailure {
    url: String,
    status: Option<u16>,
    error: String,
    transient: bool,
}

impl SendFailure {
    const fn transient(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            transient: true,
        }
    }

    const fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            transient: false,
        }
    }

    const fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<SendFailure> for PaymentKitError {
    fn from(value: SendFailure) -> Self {
        Self::Transport {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute(request_builder: RequestBuilder) -> Result<Response, SendFailure> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        SendFailure::permanent(
            err.url().map_or_else(|| "<unknown>".to_string(), ToString::to_string),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(SendFailure::transient(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(resp)
        }
        Err(err) if err.is_timeout() || err.is_connect() => Err(SendFailure::transient(
            url,
            None,
            format!("request timeout/connect error: {err}"),
        )),
        Err(err) => Err(SendFailure::permanent(
            url,
            None,
            format!("request failed: {err}"),
        )),
    }
}
