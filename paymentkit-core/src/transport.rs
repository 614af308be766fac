//! The API seam the confirmation engine talks through.
//!
//! The engine only ever needs two operations: confirm an intent and re-fetch
//! it. Both are expressed on [`IntentTransport`] so tests (and alternative
//! backends) can swap the wire client out; [`ApiClient`] is the production
//! implementation.

use async_trait::async_trait;
use serde::Serialize;

use crate::defaults::api_base;
use crate::error::PaymentKitError;
use crate::http_request::Request;
use crate::intent::{IntentKind, IntentSnapshot};
use crate::Environment;

/// Data the host supplies when confirming an intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct ConfirmParams {
    /// Identifier of the payment method to confirm with, when the intent
    /// does not already carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// App return URL for redirect-based authentication. Overrides the
    /// handler-level return URL for this confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// Transport operations the confirmation engine consumes.
///
/// Implementations must be safe to retry on transient network failure;
/// transient-retry policy itself lives inside the transport (see
/// `http_request`), never in the engine.
#[async_trait]
pub trait IntentTransport: Send + Sync {
    /// Confirms the intent with the given payment method data and returns
    /// the resulting snapshot.
    ///
    /// # Errors
    /// Returns [`PaymentKitError::Transport`] on network failure or a bad
    /// HTTP status, and [`PaymentKitError::Decode`] when the response body
    /// is not a valid intent object.
    async fn confirm_intent(
        &self,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<IntentSnapshot, PaymentKitError>;

    /// Re-fetches the intent's current state.
    ///
    /// # Errors
    /// Same failure modes as
    /// [`confirm_intent`](IntentTransport::confirm_intent).
    async fn fetch_intent(
        &self,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
    ) -> Result<IntentSnapshot, PaymentKitError>;
}

/// Production [`IntentTransport`] over the PaymentKit HTTP API.
pub struct ApiClient {
    base_url: String,
    request: Request,
}

impl ApiClient {
    /// Creates a client for the given environment's API host.
    #[must_use]
    pub fn new(environment: &Environment) -> Self {
        Self {
            base_url: api_base(environment).to_string(),
            request: Request::new(),
        }
    }

    /// Creates a client against a custom base URL (for testing).
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            request: Request::new(),
        }
    }

    fn intent_url(&self, kind: IntentKind, intent_id: &str) -> String {
        format!("{}/v1/{}/{intent_id}", self.base_url, kind.path_segment())
    }
}

#[derive(Serialize)]
struct ConfirmBody<'a> {
    client_secret: &'a str,
    #[serde(flatten)]
    params: &'a ConfirmParams,
}

#[async_trait]
impl IntentTransport for ApiClient {
    async fn confirm_intent(
        &self,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
        params: &ConfirmParams,
    ) -> Result<IntentSnapshot, PaymentKitError> {
        let url = format!("{}/confirm", self.intent_url(kind, intent_id));
        let body = ConfirmBody {
            client_secret,
            params,
        };
        self.request
            .send_json(self.request.post(&url).json(&body))
            .await
    }

    async fn fetch_intent(
        &self,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
    ) -> Result<IntentSnapshot, PaymentKitError> {
        let url = self.intent_url(kind, intent_id);
        self.request
            .send_json(
                self.request
                    .get(&url)
                    .query(&[("client_secret", client_secret)]),
            )
            .await
    }
}
