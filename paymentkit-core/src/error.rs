use thiserror::Error;

/// Error outputs from `PaymentKit`.
///
/// Every variant terminates the confirmation attempt it occurs in; nothing
/// is swallowed. `UserCanceled` is deliberately distinct from the failure
/// variants because host UX differs between the two.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum PaymentKitError {
    /// Network connection error or bad HTTP status from the API.
    #[error("transport_error: {url}: {error}")]
    Transport {
        /// The URL of the failed request.
        url: String,
        /// HTTP status code, when a response was received.
        status: Option<u16>,
        /// Details of the failure.
        error: String,
    },
    /// A server response could not be decoded into an intent snapshot.
    #[error("decode_error: {error}")]
    Decode {
        /// Details of the decode failure.
        error: String,
    },
    /// The intent declared a next action this SDK version does not
    /// recognize. Proceeding would be unsafe.
    #[error("unsupported_next_action: {raw}")]
    UnsupportedAction {
        /// The raw next-action payload, for diagnostics.
        raw: String,
    },
    /// The challenge service could not be initialized.
    #[error("challenge_service_unavailable: {error}")]
    ServiceUnavailable {
        /// Details of the initialization failure.
        error: String,
    },
    /// The user dismissed the challenge or redirect surface.
    #[error("user_canceled")]
    UserCanceled,
    /// An authentication step exceeded its configured time bound.
    #[error("authentication_timeout: exceeded {seconds}s")]
    Timeout {
        /// The configured bound, in seconds.
        seconds: u32,
    },
    /// The authentication protocol declined the cardholder.
    #[error("not_authenticated: {reason}")]
    NotAuthenticated {
        /// Reason reported by the challenge service.
        reason: String,
    },
    /// Polling retries were exhausted without the intent reaching a
    /// terminal status. The payment may still settle later.
    #[error("polling_exhausted: still processing after {attempts} attempts")]
    PollingExhausted {
        /// Number of fetch attempts made.
        attempts: u32,
    },
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input '{attribute}': {reason}")]
    InvalidInput {
        /// Name of the invalid attribute.
        attribute: String,
        /// Description of the issue.
        reason: String,
    },
    /// Unexpected internal error.
    #[error("generic_error: {error}")]
    Generic {
        /// Details of the error.
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_snake_cased_and_carries_context() {
        let err = PaymentKitError::Transport {
            url: "https://api.sandbox.paymentkit.dev/v1/payment_intents/pi_1".to_string(),
            status: Some(503),
            error: "bad status".to_string(),
        };
        assert!(format!("{err}").starts_with("transport_error"));

        let err = PaymentKitError::PollingExhausted { attempts: 5 };
        assert_eq!(
            format!("{err}"),
            "polling_exhausted: still processing after 5 attempts"
        );

        let err = PaymentKitError::Timeout { seconds: 60 };
        assert!(format!("{err}").contains("60s"));
    }

    #[test]
    fn cancellation_is_not_a_failure_message() {
        assert_eq!(format!("{}", PaymentKitError::UserCanceled), "user_canceled");
    }
}
