//! Strong-authentication challenges.
//!
//! The underlying authentication protocol (a 3-D Secure style challenge) is
//! implemented by a host-supplied challenge service. The SDK creates one
//! transaction per challenge, hands it the presentation surface and a
//! [`ChallengeResultSink`], and reduces whatever the service reports to a
//! single outcome.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PaymentKitError;
use crate::intent::ChallengeParams;
use crate::settled::Settled;
use crate::surface::PresentationSurface;

/// Host preferences for challenge UI and pacing.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct ChallengeCustomization {
    /// Upper bound for a single authentication step, in seconds. `None`
    /// leaves the step user-paced.
    pub timeout_seconds: Option<u32>,
    /// BCP 47 locale tag for challenge UI, when the host wants to override
    /// the device default.
    pub locale: Option<String>,
}

/// Configuration handed to the challenge service when it is created.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ChallengeServiceConfig {
    /// Host UI and pacing preferences.
    pub customization: ChallengeCustomization,
    /// Whether the service should run against its test-mode directory
    /// servers. Derived from the intent's `livemode`.
    pub test_mode: bool,
}

/// Creates the challenge service for a confirmation attempt.
///
/// The SDK calls this lazily, at most once per confirmation attempt, and
/// treats a failure here as "service unavailable" rather than a hard error.
#[uniffi::export(with_foreign)]
pub trait ChallengeServiceFactory: Send + Sync {
    /// Builds a challenge service with the given configuration.
    ///
    /// # Errors
    /// Any error is downgraded by the SDK to
    /// [`PaymentKitError::ServiceUnavailable`].
    fn create_service(
        &self,
        config: ChallengeServiceConfig,
    ) -> Result<Arc<dyn ChallengeService>, PaymentKitError>;
}

/// A configured challenge service able to open challenge transactions.
#[uniffi::export(with_foreign)]
pub trait ChallengeService: Send + Sync {
    /// Creates a transaction for one challenge.
    ///
    /// # Errors
    /// Any error is downgraded by the SDK to
    /// [`PaymentKitError::ServiceUnavailable`].
    fn create_transaction(
        &self,
        params: ChallengeParams,
    ) -> Result<Arc<dyn ChallengeTransaction>, PaymentKitError>;
}

/// One in-flight challenge, driven by the challenge service.
#[uniffi::export(with_foreign)]
pub trait ChallengeTransaction: Send + Sync {
    /// Presents the challenge UI through `surface` and reports the outcome
    /// into `sink`. May signal the sink more than once; only the first
    /// signal counts.
    fn begin(&self, surface: Arc<dyn PresentationSurface>, sink: Arc<ChallengeResultSink>);

    /// Releases the transaction's resources. Called exactly once by the SDK
    /// after an outcome (or timeout) is reached.
    fn close(&self);
}

/// Collects the outcome of one challenge transaction.
///
/// First signal wins: challenge surfaces are known to fire completion
/// callbacks more than once, so every signal after the first is ignored.
#[derive(uniffi::Object)]
pub struct ChallengeResultSink {
    signal: Settled<Result<(), PaymentKitError>>,
}

#[uniffi::export]
impl ChallengeResultSink {
    /// The cardholder authenticated successfully.
    pub fn completed(&self) {
        self.deliver(Ok(()));
    }

    /// The authentication protocol declined the cardholder.
    pub fn failed(&self, reason: String) {
        self.deliver(Err(PaymentKitError::NotAuthenticated { reason }));
    }

    /// The user abandoned the challenge.
    pub fn canceled(&self) {
        self.deliver(Err(PaymentKitError::UserCanceled));
    }

    /// The challenge could not run to completion.
    pub fn errored(&self, error: String) {
        self.deliver(Err(PaymentKitError::Generic { error }));
    }
}

impl ChallengeResultSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            signal: Settled::new(),
        })
    }

    fn deliver(&self, outcome: Result<(), PaymentKitError>) {
        if !self.signal.settle(outcome) {
            log::debug!("challenge signal arrived after completion; ignored");
        }
    }

    pub(crate) async fn outcome(&self) -> Result<(), PaymentKitError> {
        self.signal.wait().await
    }
}

/// Drives one challenge to a single outcome.
pub(crate) struct ChallengeAuthenticator {
    service: Arc<dyn ChallengeService>,
    timeout_seconds: Option<u32>,
}

impl ChallengeAuthenticator {
    pub(crate) fn new(service: Arc<dyn ChallengeService>, timeout_seconds: Option<u32>) -> Self {
        Self {
            service,
            timeout_seconds,
        }
    }

    /// Runs the challenge described by `params` through the host surface.
    ///
    /// # Errors
    /// - [`PaymentKitError::ServiceUnavailable`] when the transaction could
    ///   not be created.
    /// - [`PaymentKitError::NotAuthenticated`] on a protocol-level decline.
    /// - [`PaymentKitError::UserCanceled`] when the user abandons the
    ///   challenge.
    /// - [`PaymentKitError::Timeout`] when the configured bound elapses.
    pub(crate) async fn authenticate(
        &self,
        params: ChallengeParams,
        surface: Arc<dyn PresentationSurface>,
    ) -> Result<(), PaymentKitError> {
        let transaction = self.service.create_transaction(params).map_err(|err| {
            match err {
                unavailable @ PaymentKitError::ServiceUnavailable { .. } => unavailable,
                other => PaymentKitError::ServiceUnavailable {
                    error: other.to_string(),
                },
            }
        })?;

        let sink = ChallengeResultSink::new();
        transaction.begin(Arc::clone(&surface), Arc::clone(&sink));

        let outcome = match self.timeout_seconds {
            Some(seconds) => {
                let bound = Duration::from_secs(u64::from(seconds));
                match tokio::time::timeout(bound, sink.outcome()).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        log::warn!("challenge timed out after {seconds}s");
                        transaction.close();
                        surface.dismiss();
                        return Err(PaymentKitError::Timeout { seconds });
                    }
                }
            }
            None => sink.outcome().await,
        };
        transaction.close();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSurface {
        dismissals: AtomicU32,
    }

    impl PresentationSurface for RecordingSurface {
        fn present_redirect(&self, _url: String, _session: Arc<crate::redirect::RedirectSession>) {}

        fn dismiss(&self) {
            self.dismissals.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A transaction that fires a scripted sequence of signals on `begin`.
    struct ScriptedTransaction {
        signals: Mutex<Vec<Signal>>,
        closes: AtomicU32,
    }

    #[derive(Clone, Copy)]
    enum Signal {
        Completed,
        Failed,
        Canceled,
        Errored,
    }

    impl ScriptedTransaction {
        fn new(signals: Vec<Signal>) -> Arc<Self> {
            Arc::new(Self {
                signals: Mutex::new(signals),
                closes: AtomicU32::new(0),
            })
        }
    }

    impl ChallengeTransaction for ScriptedTransaction {
        fn begin(
            &self,
            _surface: Arc<dyn PresentationSurface>,
            sink: Arc<ChallengeResultSink>,
        ) {
            let signals = self.signals.lock().unwrap().clone();
            for signal in signals {
                match signal {
                    Signal::Completed => sink.completed(),
                    Signal::Failed => sink.failed("declined by issuer".to_string()),
                    Signal::Canceled => sink.canceled(),
                    Signal::Errored => sink.errored("protocol failure".to_string()),
                }
            }
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct OneTransactionService(Arc<ScriptedTransaction>);

    impl ChallengeService for OneTransactionService {
        fn create_transaction(
            &self,
            _params: ChallengeParams,
        ) -> Result<Arc<dyn ChallengeTransaction>, PaymentKitError> {
            Ok(Arc::clone(&self.0) as Arc<dyn ChallengeTransaction>)
        }
    }

    struct BrokenService;

    impl ChallengeService for BrokenService {
        fn create_transaction(
            &self,
            _params: ChallengeParams,
        ) -> Result<Arc<dyn ChallengeTransaction>, PaymentKitError> {
            Err(PaymentKitError::Generic {
                error: "no directory server certificates".to_string(),
            })
        }
    }

    fn params() -> ChallengeParams {
        ChallengeParams {
            directory_server_id: "ds_test".to_string(),
            server_transaction_id: "txn_test".to_string(),
            acs_signed_content: None,
            source: None,
        }
    }

    #[tokio::test]
    async fn a_completed_challenge_authenticates() {
        let transaction = ScriptedTransaction::new(vec![Signal::Completed]);
        let authenticator = ChallengeAuthenticator::new(
            Arc::new(OneTransactionService(Arc::clone(&transaction))),
            None,
        );
        let surface = Arc::new(RecordingSurface::default());
        authenticator
            .authenticate(params(), surface)
            .await
            .unwrap();
        assert_eq!(transaction.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_decline_is_not_authenticated() {
        let transaction = ScriptedTransaction::new(vec![Signal::Failed]);
        let authenticator = ChallengeAuthenticator::new(
            Arc::new(OneTransactionService(transaction)),
            None,
        );
        let err = authenticator
            .authenticate(params(), Arc::new(RecordingSurface::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentKitError::NotAuthenticated { .. }));
    }

    #[tokio::test]
    async fn cancellation_is_distinct_from_failure() {
        let transaction = ScriptedTransaction::new(vec![Signal::Canceled]);
        let authenticator = ChallengeAuthenticator::new(
            Arc::new(OneTransactionService(transaction)),
            None,
        );
        let err = authenticator
            .authenticate(params(), Arc::new(RecordingSurface::default()))
            .await
            .unwrap_err();
        assert_eq!(err, PaymentKitError::UserCanceled);
    }

    #[tokio::test]
    async fn the_first_of_multiple_signals_wins() {
        // A flaky challenge surface fires "canceled" after "completed"; the
        // outcome must be the first signal.
        let transaction =
            ScriptedTransaction::new(vec![Signal::Completed, Signal::Canceled, Signal::Errored]);
        let authenticator = ChallengeAuthenticator::new(
            Arc::new(OneTransactionService(transaction)),
            None,
        );
        authenticator
            .authenticate(params(), Arc::new(RecordingSurface::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn a_broken_service_downgrades_to_service_unavailable() {
        let authenticator = ChallengeAuthenticator::new(Arc::new(BrokenService), None);
        let err = authenticator
            .authenticate(params(), Arc::new(RecordingSurface::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentKitError::ServiceUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn a_silent_challenge_times_out_and_dismisses_the_surface() {
        let transaction = ScriptedTransaction::new(vec![]);
        let authenticator = ChallengeAuthenticator::new(
            Arc::new(OneTransactionService(Arc::clone(&transaction))),
            Some(60),
        );
        let surface = Arc::new(RecordingSurface::default());
        let err = authenticator
            .authenticate(params(), Arc::clone(&surface) as Arc<dyn PresentationSurface>)
            .await
            .unwrap_err();
        assert_eq!(err, PaymentKitError::Timeout { seconds: 60 });
        assert_eq!(surface.dismissals.load(Ordering::SeqCst), 1);
        assert_eq!(transaction.closes.load(Ordering::SeqCst), 1);
    }
}
