//! Server-reported intent state.
//!
//! A snapshot is decoded from a server response and then never mutated; each
//! fresh response replaces the previous snapshot wholesale, and the
//! confirmation engine always acts on the latest one.

use serde::{Deserialize, Deserializer};

use crate::error::PaymentKitError;

/// Whether a confirmation drives a payment intent or a setup intent.
///
/// The two share the whole confirmation engine; the kind only selects the
/// API endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum IntentKind {
    /// A payment intent: money moves on success.
    Payment,
    /// A setup intent: a payment method is attached for future use.
    Setup,
}

impl IntentKind {
    /// API path segment for this intent family.
    #[must_use]
    pub(crate) const fn path_segment(self) -> &'static str {
        match self {
            Self::Payment => "payment_intents",
            Self::Setup => "setup_intents",
        }
    }
}

/// Server-reported status of an intent.
///
/// Statuses unknown to this SDK version decode to [`IntentStatus::Unknown`]
/// rather than failing the whole snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display, uniffi::Enum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    /// The intent needs a payment method before it can be confirmed.
    RequiresPaymentMethod,
    /// The intent has a payment method and awaits confirmation.
    RequiresConfirmation,
    /// The client must perform the declared next action.
    RequiresAction,
    /// The payment network is settling the intent asynchronously.
    Processing,
    /// Authentication succeeded; the merchant must capture the funds.
    RequiresCapture,
    /// The intent settled successfully.
    Succeeded,
    /// The intent was canceled.
    Canceled,
    /// A status this SDK version does not recognize.
    #[serde(other)]
    Unknown,
}

/// Parameters for a strong-authentication challenge, as declared by the
/// intent's next action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, uniffi::Record)]
pub struct ChallengeParams {
    /// Identifier of the directory server coordinating the challenge.
    pub directory_server_id: String,
    /// Transaction identifier issued by the authentication server.
    pub server_transaction_id: String,
    /// Signed content blob the challenge service verifies, when present.
    #[serde(default)]
    pub acs_signed_content: Option<String>,
    /// The payment source the challenge authenticates, when present.
    #[serde(default)]
    pub source: Option<String>,
}

/// The action the server requires from the client before the intent can
/// proceed.
///
/// Decoding is total: a tag or payload this SDK version does not recognize
/// becomes [`NextAction::Unknown`] carrying the raw JSON, never an error.
/// The classifier decides what to do with it.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum NextAction {
    /// Present a strong-authentication challenge through the challenge
    /// service.
    SdkChallenge {
        /// Parameters for the challenge transaction.
        params: ChallengeParams,
    },
    /// Send the customer to an external authentication surface.
    RedirectToUrl {
        /// The URL to open.
        url: String,
        /// Return URL signalling completion, when the server supplies one.
        return_url: Option<String>,
    },
    /// No user-facing step; re-fetch the intent until its status settles.
    StatusPoll,
    /// A next-action shape this SDK version does not recognize.
    Unknown {
        /// The raw next-action JSON.
        raw: String,
    },
}

impl NextAction {
    /// Maps a raw next-action payload to a variant. Total: anything that
    /// does not match a known shape lands in [`NextAction::Unknown`].
    fn from_value(value: &serde_json::Value) -> Self {
        let unknown = || Self::Unknown {
            raw: value.to_string(),
        };
        let Some(kind) = value.get("type").and_then(serde_json::Value::as_str) else {
            return unknown();
        };
        match kind {
            "sdk_challenge" => value
                .get("sdk_challenge")
                .cloned()
                .and_then(|params| serde_json::from_value(params).ok())
                .map_or_else(unknown, |params| Self::SdkChallenge { params }),
            "redirect_to_url" => {
                let Some(detail) = value.get("redirect_to_url") else {
                    return unknown();
                };
                let Some(url) = detail.get("url").and_then(serde_json::Value::as_str)
                else {
                    return unknown();
                };
                let return_url = detail
                    .get("return_url")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string);
                Self::RedirectToUrl {
                    url: url.to_string(),
                    return_url,
                }
            }
            "status_poll" => Self::StatusPoll,
            _ => unknown(),
        }
    }
}

impl<'de> Deserialize<'de> for NextAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// Immutable view of an intent's server-reported state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, uniffi::Record)]
pub struct IntentSnapshot {
    /// Opaque identifier, stable for the intent's lifetime.
    pub id: String,
    /// Current status.
    pub status: IntentStatus,
    /// The action the client must perform next, if any.
    #[serde(default)]
    pub next_action: Option<NextAction>,
    /// Whether the intent was created against the live API. `false` selects
    /// the challenge service's test-mode configuration.
    #[serde(default)]
    pub livemode: bool,
}

impl IntentSnapshot {
    /// Decodes a snapshot from a server response body.
    ///
    /// # Errors
    /// Returns [`PaymentKitError::Decode`] if the body is not a valid
    /// intent object. Unknown statuses and next-action shapes are not
    /// decode errors; they decode to their `Unknown` variants.
    pub fn from_json(json: &str) -> Result<Self, PaymentKitError> {
        serde_json::from_str(json).map_err(|e| PaymentKitError::Decode {
            error: format!("invalid intent object: {e}"),
        })
    }
}
