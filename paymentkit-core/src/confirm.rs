//! The confirmation state machine.
//!
//! `PaymentHandler` is the component hosts interact with: it confirms the
//! intent over the transport, classifies the server's declared next action,
//! dispatches to the challenge or redirect authenticator or to the status
//! poller, and loops until a terminal outcome is reached. The outcome is
//! delivered exactly once per `confirm` call no matter which path produced
//! it.

use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::action::{classify, ActionDisposition};
use crate::challenge::{
    ChallengeAuthenticator, ChallengeCustomization, ChallengeService,
    ChallengeServiceConfig, ChallengeServiceFactory,
};
use crate::error::PaymentKitError;
use crate::intent::{IntentKind, IntentSnapshot, IntentStatus};
use crate::poller::{PollObserver, StatusPoller};
use crate::redirect::RedirectAuthenticator;
use crate::settled::Settled;
use crate::surface::PresentationSurface;
use crate::transport::{ApiClient, ConfirmParams, IntentTransport};
use crate::Environment;

/// After a successful authentication the intent is re-fetched and
/// re-classified; a misbehaving server could declare a fresh action every
/// time, so the loop is bounded.
const MAX_RECONFIRM_CYCLES: u32 = 3;

/// Backstop on the classify→dispatch loop as a whole, covering status
/// flapping that does not consume the re-confirmation budget.
const MAX_FLOW_STEPS: u32 = 10;

/// Default fetch budget for one polling session.
const DEFAULT_MAX_POLL_RETRIES: u32 = 5;

/// Why a confirmation ended in `Failed`.
///
/// `PollingExhausted` deserves "check back later" messaging rather than
/// "payment failed"; the other reasons are genuine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FailureReason {
    /// Network failure or bad HTTP status.
    Transport,
    /// The server response could not be decoded.
    Decode,
    /// The intent declared a next action this SDK does not support.
    UnsupportedAction,
    /// The challenge service could not be initialized.
    ServiceUnavailable,
    /// The authentication protocol declined the cardholder.
    NotAuthenticated,
    /// An authentication step exceeded its configured time bound.
    Timeout,
    /// Polling retries ran out while the intent was still settling.
    PollingExhausted,
    /// The payment method was declined; a new one is required.
    Declined,
    /// A request input was invalid.
    InvalidRequest,
    /// An internal invariant failed.
    Internal,
}

impl FailureReason {
    fn from_error(err: &PaymentKitError) -> Self {
        match err {
            PaymentKitError::Transport { .. } => Self::Transport,
            PaymentKitError::Decode { .. } => Self::Decode,
            PaymentKitError::UnsupportedAction { .. } => Self::UnsupportedAction,
            PaymentKitError::ServiceUnavailable { .. } => Self::ServiceUnavailable,
            PaymentKitError::NotAuthenticated { .. } => Self::NotAuthenticated,
            PaymentKitError::Timeout { .. } => Self::Timeout,
            PaymentKitError::PollingExhausted { .. } => Self::PollingExhausted,
            PaymentKitError::InvalidInput { .. } => Self::InvalidRequest,
            // Cancellation produces a `Canceled` outcome before reason
            // mapping; mapping it here keeps the function total.
            PaymentKitError::UserCanceled | PaymentKitError::Generic { .. } => {
                Self::Internal
            }
        }
    }
}

/// Terminal result of one `confirm` call.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum ConfirmationOutcome {
    /// The intent settled successfully (or awaits merchant capture).
    Succeeded {
        /// The final snapshot.
        intent: IntentSnapshot,
    },
    /// The confirmation failed.
    Failed {
        /// The last snapshot observed, when one was decoded.
        intent: Option<IntentSnapshot>,
        /// Machine-readable failure category.
        reason: FailureReason,
        /// Human-readable detail for logs and support tickets.
        message: String,
    },
    /// The user backed out of an authentication step.
    Canceled {
        /// The last snapshot observed, when one was decoded.
        intent: Option<IntentSnapshot>,
    },
}

/// Optional host callback for intermediate status changes observed while
/// polling. Invoked once per distinct status.
#[uniffi::export(with_foreign)]
pub trait StatusDelegate: Send + Sync {
    /// The intent's status moved to a new value.
    fn on_status_change(&self, snapshot: IntentSnapshot);
}

/// Handler-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct HandlerConfig {
    /// Target API environment.
    pub environment: Environment,
    /// Fallback app return URL for redirect authentication, used when the
    /// confirm parameters and the server supply none.
    pub return_url: Option<String>,
    /// Challenge UI and pacing preferences.
    pub customization: ChallengeCustomization,
    /// Fetch budget for one polling session.
    pub max_poll_retries: u32,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            return_url: None,
            customization: ChallengeCustomization::default(),
            max_poll_retries: DEFAULT_MAX_POLL_RETRIES,
        }
    }
}

/// Drives payment and setup intents through confirmation, customer
/// authentication, and settlement.
#[derive(uniffi::Object)]
pub struct PaymentHandler {
    config: HandlerConfig,
    transport: Arc<dyn IntentTransport>,
    challenge_factory: Arc<dyn ChallengeServiceFactory>,
}

#[uniffi::export(async_runtime = "tokio")]
impl PaymentHandler {
    /// Creates a handler against the configured environment's API.
    ///
    /// The challenge factory wraps the platform's strong-authentication
    /// SDK; it is only invoked when an intent actually requires a
    /// challenge.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        config: HandlerConfig,
        challenge_factory: Arc<dyn ChallengeServiceFactory>,
    ) -> Self {
        let transport = Arc::new(ApiClient::new(&config.environment));
        Self {
            config,
            transport,
            challenge_factory,
        }
    }

    /// Confirms a payment intent and resolves every required next action.
    ///
    /// Resolves exactly once, with the terminal outcome, regardless of
    /// which path (authentication, polling, failure) produced it.
    pub async fn confirm_payment(
        &self,
        intent_id: String,
        client_secret: String,
        params: ConfirmParams,
        surface: Arc<dyn PresentationSurface>,
        delegate: Option<Arc<dyn StatusDelegate>>,
    ) -> ConfirmationOutcome {
        self.confirm(
            IntentKind::Payment,
            &intent_id,
            &client_secret,
            params,
            surface,
            delegate,
        )
        .await
    }

    /// Confirms a setup intent. Identical to
    /// [`confirm_payment`](Self::confirm_payment) apart from the endpoint
    /// family.
    pub async fn confirm_setup(
        &self,
        intent_id: String,
        client_secret: String,
        params: ConfirmParams,
        surface: Arc<dyn PresentationSurface>,
        delegate: Option<Arc<dyn StatusDelegate>>,
    ) -> ConfirmationOutcome {
        self.confirm(
            IntentKind::Setup,
            &intent_id,
            &client_secret,
            params,
            surface,
            delegate,
        )
        .await
    }
}

impl PaymentHandler {
    /// Creates a handler with an injected transport. This is the seam tests
    /// and alternative backends use; FFI callers go through
    /// [`PaymentHandler::new`].
    #[must_use]
    pub fn with_transport(
        config: HandlerConfig,
        transport: Arc<dyn IntentTransport>,
        challenge_factory: Arc<dyn ChallengeServiceFactory>,
    ) -> Self {
        Self {
            config,
            transport,
            challenge_factory,
        }
    }

    async fn confirm(
        &self,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
        params: ConfirmParams,
        surface: Arc<dyn PresentationSurface>,
        delegate: Option<Arc<dyn StatusDelegate>>,
    ) -> ConfirmationOutcome {
        let attempt = Uuid::new_v4();
        log::info!("[{attempt}] confirming {} {intent_id}", kind.path_segment());

        let completion: Settled<ConfirmationOutcome> = Settled::new();
        let outcome = match self
            .transport
            .confirm_intent(kind, intent_id, client_secret, &params)
            .await
        {
            Err(err) => outcome_for_error(None, &err),
            Ok(snapshot) => {
                let mut ctx = ActionContext::new(
                    snapshot,
                    surface,
                    delegate,
                    params.return_url.or_else(|| self.config.return_url.clone()),
                    completion.clone(),
                );
                let outcome = self.drive(&mut ctx, kind, intent_id, client_secret).await;
                ctx.finish(outcome);
                ctx.outcome().await
            }
        };
        // Terminal states are never re-entered: whatever settled first is
        // what every observer sees.
        completion.settle(outcome);
        let outcome = completion.wait().await;
        log::info!("[{attempt}] terminal outcome: {}", outcome_name(&outcome));
        outcome
    }

    async fn drive(
        &self,
        ctx: &mut ActionContext,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
    ) -> ConfirmationOutcome {
        for _ in 0..MAX_FLOW_STEPS {
            match classify(&ctx.snapshot) {
                ActionDisposition::Complete => return terminal_outcome(&ctx.snapshot),
                ActionDisposition::Unsupported { raw } => {
                    return outcome_for_error(
                        Some(&ctx.snapshot),
                        &PaymentKitError::UnsupportedAction { raw },
                    );
                }
                ActionDisposition::Challenge { params } => {
                    log::info!("intent {intent_id} requires a challenge");
                    let service = match ctx.challenge_service(
                        &self.challenge_factory,
                        self.service_config(&ctx.snapshot),
                    ) {
                        Ok(service) => service,
                        Err(err) => return outcome_for_error(Some(&ctx.snapshot), &err),
                    };
                    let authenticator = ChallengeAuthenticator::new(
                        service,
                        self.config.customization.timeout_seconds,
                    );
                    let result = authenticator
                        .authenticate(params, Arc::clone(&ctx.surface))
                        .await;
                    match result {
                        Ok(()) => {
                            if let Err(outcome) =
                                self.refetch(ctx, kind, intent_id, client_secret).await
                            {
                                return outcome;
                            }
                        }
                        Err(err) => return outcome_for_error(Some(&ctx.snapshot), &err),
                    }
                }
                ActionDisposition::Redirect { url, return_url } => {
                    log::info!("intent {intent_id} requires redirect authentication");
                    let Some(expected) =
                        return_url.or_else(|| ctx.return_url.clone())
                    else {
                        return outcome_for_error(
                            Some(&ctx.snapshot),
                            &PaymentKitError::InvalidInput {
                                attribute: "return_url".to_string(),
                                reason: "redirect authentication requires a return URL"
                                    .to_string(),
                            },
                        );
                    };
                    let authenticator = RedirectAuthenticator::new(
                        self.config.customization.timeout_seconds,
                    );
                    let result = authenticator
                        .authenticate(&url, &expected, Arc::clone(&ctx.surface))
                        .await;
                    match result {
                        Ok(()) => {
                            if let Err(outcome) =
                                self.refetch(ctx, kind, intent_id, client_secret).await
                            {
                                return outcome;
                            }
                        }
                        Err(err) => return outcome_for_error(Some(&ctx.snapshot), &err),
                    }
                }
                ActionDisposition::Poll => {
                    log::info!("intent {intent_id} is settling asynchronously");
                    match self.poll(ctx, kind, intent_id, client_secret).await {
                        PollEnd::StatusChanged(snapshot) => ctx.snapshot = snapshot,
                        PollEnd::Exhausted { attempts } => {
                            return outcome_for_error(
                                Some(&ctx.snapshot),
                                &PaymentKitError::PollingExhausted { attempts },
                            );
                        }
                    }
                }
            }
        }
        outcome_for_error(
            Some(&ctx.snapshot),
            &PaymentKitError::Generic {
                error: format!(
                    "no terminal state within {MAX_FLOW_STEPS} resolution steps"
                ),
            },
        )
    }

    /// Re-fetches the intent after a successful authentication step;
    /// authentication alone does not guarantee a terminal status.
    async fn refetch(
        &self,
        ctx: &mut ActionContext,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
    ) -> Result<(), ConfirmationOutcome> {
        if !ctx.consume_reconfirm_cycle() {
            return Err(outcome_for_error(
                Some(&ctx.snapshot),
                &PaymentKitError::Generic {
                    error: format!(
                        "authentication loop exceeded {MAX_RECONFIRM_CYCLES} cycles"
                    ),
                },
            ));
        }
        match self
            .transport
            .fetch_intent(kind, intent_id, client_secret)
            .await
        {
            Ok(snapshot) => {
                ctx.snapshot = snapshot;
                Ok(())
            }
            Err(err) => Err(outcome_for_error(Some(&ctx.snapshot), &err)),
        }
    }

    async fn poll(
        &self,
        ctx: &ActionContext,
        kind: IntentKind,
        intent_id: &str,
        client_secret: &str,
    ) -> PollEnd {
        let end: Settled<PollEnd> = Settled::new();
        let observer = Arc::new(DriverPollObserver {
            end: end.clone(),
            delegate: ctx.delegate.clone(),
        });
        let poller = StatusPoller::new(
            Arc::clone(&self.transport),
            kind,
            intent_id.to_string(),
            client_secret.to_string(),
            self.config.max_poll_retries,
            Some(ctx.snapshot.status),
            observer,
        );
        poller.begin_polling();
        let end_value = end.wait().await;
        poller.suspend_polling();
        end_value
    }

    fn service_config(&self, snapshot: &IntentSnapshot) -> ChallengeServiceConfig {
        ChallengeServiceConfig {
            customization: self.config.customization.clone(),
            test_mode: !snapshot.livemode,
        }
    }
}

/// State owned by one in-flight confirmation attempt. Never shared across
/// concurrent confirmations; dropped once the terminal outcome settles.
struct ActionContext {
    /// Latest server-reported state; replaced wholesale on every response.
    snapshot: IntentSnapshot,
    surface: Arc<dyn PresentationSurface>,
    delegate: Option<Arc<dyn StatusDelegate>>,
    return_url: Option<String>,
    /// The challenge service is created lazily, at most once per attempt,
    /// and a creation failure is remembered rather than retried.
    challenge_service: OnceLock<Result<Arc<dyn ChallengeService>, PaymentKitError>>,
    reconfirm_cycles: u32,
    completion: Settled<ConfirmationOutcome>,
}

impl ActionContext {
    fn new(
        snapshot: IntentSnapshot,
        surface: Arc<dyn PresentationSurface>,
        delegate: Option<Arc<dyn StatusDelegate>>,
        return_url: Option<String>,
        completion: Settled<ConfirmationOutcome>,
    ) -> Self {
        Self {
            snapshot,
            surface,
            delegate,
            return_url,
            challenge_service: OnceLock::new(),
            reconfirm_cycles: 0,
            completion,
        }
    }

    fn challenge_service(
        &self,
        factory: &Arc<dyn ChallengeServiceFactory>,
        config: ChallengeServiceConfig,
    ) -> Result<Arc<dyn ChallengeService>, PaymentKitError> {
        self.challenge_service
            .get_or_init(|| {
                factory.create_service(config).map_err(|err| match err {
                    unavailable @ PaymentKitError::ServiceUnavailable { .. } => {
                        unavailable
                    }
                    other => PaymentKitError::ServiceUnavailable {
                        error: other.to_string(),
                    },
                })
            })
            .clone()
    }

    /// Consumes one re-confirmation cycle; `false` once the budget is gone.
    fn consume_reconfirm_cycle(&mut self) -> bool {
        self.reconfirm_cycles += 1;
        self.reconfirm_cycles <= MAX_RECONFIRM_CYCLES
    }

    /// Settles the terminal outcome; later settlements are no-ops.
    fn finish(&self, outcome: ConfirmationOutcome) -> bool {
        let won = self.completion.settle(outcome);
        if !won {
            if let Some(existing) = self.completion.peek() {
                log::debug!(
                    "terminal outcome already {}; ignoring late event",
                    outcome_name(&existing)
                );
            }
        }
        won
    }

    async fn outcome(&self) -> ConfirmationOutcome {
        self.completion.wait().await
    }
}

#[derive(Clone, Debug)]
enum PollEnd {
    StatusChanged(IntentSnapshot),
    Exhausted { attempts: u32 },
}

struct DriverPollObserver {
    end: Settled<PollEnd>,
    delegate: Option<Arc<dyn StatusDelegate>>,
}

impl PollObserver for DriverPollObserver {
    fn status_changed(&self, snapshot: &IntentSnapshot) {
        if let Some(delegate) = &self.delegate {
            delegate.on_status_change(snapshot.clone());
        }
        self.end.settle(PollEnd::StatusChanged(snapshot.clone()));
    }

    fn exhausted(&self, attempts: u32) {
        self.end.settle(PollEnd::Exhausted { attempts });
    }
}

/// Maps a settled status to the terminal outcome.
fn terminal_outcome(snapshot: &IntentSnapshot) -> ConfirmationOutcome {
    match snapshot.status {
        IntentStatus::Succeeded | IntentStatus::RequiresCapture => {
            ConfirmationOutcome::Succeeded {
                intent: snapshot.clone(),
            }
        }
        IntentStatus::Canceled => ConfirmationOutcome::Canceled {
            intent: Some(snapshot.clone()),
        },
        IntentStatus::RequiresPaymentMethod => ConfirmationOutcome::Failed {
            intent: Some(snapshot.clone()),
            reason: FailureReason::Declined,
            message: "the payment method was declined; a new payment method is required"
                .to_string(),
        },
        status => ConfirmationOutcome::Failed {
            intent: Some(snapshot.clone()),
            reason: FailureReason::Internal,
            message: format!("intent settled in unexpected state {status}"),
        },
    }
}

fn outcome_for_error(
    intent: Option<&IntentSnapshot>,
    err: &PaymentKitError,
) -> ConfirmationOutcome {
    if matches!(err, PaymentKitError::UserCanceled) {
        log::info!("confirmation canceled by the user");
        return ConfirmationOutcome::Canceled {
            intent: intent.cloned(),
        };
    }
    log::warn!("confirmation failed: {err}");
    ConfirmationOutcome::Failed {
        intent: intent.cloned(),
        reason: FailureReason::from_error(err),
        message: err.to_string(),
    }
}

const fn outcome_name(outcome: &ConfirmationOutcome) -> &'static str {
    match outcome {
        ConfirmationOutcome::Succeeded { .. } => "succeeded",
        ConfirmationOutcome::Failed { .. } => "failed",
        ConfirmationOutcome::Canceled { .. } => "canceled",
    }
}
