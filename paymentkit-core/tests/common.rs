//! Common test utilities shared across integration tests: in-memory
//! implementations of the transport and host capabilities.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use paymentkit_core::{
    ChallengeParams, ChallengeResultSink, ChallengeService, ChallengeServiceConfig,
    ChallengeServiceFactory, ChallengeTransaction, ConfirmParams, IntentKind,
    IntentSnapshot, IntentStatus, IntentTransport, NextAction, PaymentKitError,
    PresentationSurface, RedirectSession, StatusDelegate,
};

pub fn snapshot(status: IntentStatus) -> IntentSnapshot {
    IntentSnapshot {
        id: "pi_test".to_string(),
        status,
        next_action: None,
        livemode: false,
    }
}

pub fn snapshot_with_action(status: IntentStatus, next_action: NextAction) -> IntentSnapshot {
    IntentSnapshot {
        id: "pi_test".to_string(),
        status,
        next_action: Some(next_action),
        livemode: false,
    }
}

#[allow(dead_code, reason = "used in tests")]
pub fn challenge_action() -> NextAction {
    NextAction::SdkChallenge {
        params: ChallengeParams {
            directory_server_id: "ds_test".to_string(),
            server_transaction_id: "txn_test".to_string(),
            acs_signed_content: None,
            source: None,
        },
    }
}

#[allow(dead_code, reason = "used in tests")]
pub fn redirect_action() -> NextAction {
    NextAction::RedirectToUrl {
        url: "https://bank.example/authorize".to_string(),
        return_url: Some("myapp://payment-return".to_string()),
    }
}

type Scripted = Result<IntentSnapshot, PaymentKitError>;

struct Script {
    items: VecDeque<Scripted>,
    last: Option<Scripted>,
}

impl Script {
    fn new(items: Vec<Scripted>) -> Self {
        Self {
            items: items.into(),
            last: None,
        }
    }

    fn next(&mut self) -> Scripted {
        if let Some(item) = self.items.pop_front() {
            self.last = Some(item.clone());
            return item;
        }
        self.last
            .clone()
            .unwrap_or_else(|| panic!("transport script is empty"))
    }
}

/// An [`IntentTransport`] that replays scripted responses. When a script
/// runs out its last response repeats, which is what a server settling
/// slowly looks like.
pub struct ScriptedTransport {
    confirm_script: Mutex<Script>,
    fetch_script: Mutex<Script>,
    pub confirms: AtomicU32,
    pub fetches: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(confirms: Vec<Scripted>, fetches: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            confirm_script: Mutex::new(Script::new(confirms)),
            fetch_script: Mutex::new(Script::new(fetches)),
            confirms: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl IntentTransport for ScriptedTransport {
    async fn confirm_intent(
        &self,
        _kind: IntentKind,
        _intent_id: &str,
        _client_secret: &str,
        _params: &ConfirmParams,
    ) -> Result<IntentSnapshot, PaymentKitError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        self.confirm_script.lock().unwrap().next()
    }

    async fn fetch_intent(
        &self,
        _kind: IntentKind,
        _intent_id: &str,
        _client_secret: &str,
    ) -> Result<IntentSnapshot, PaymentKitError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_script.lock().unwrap().next()
    }
}

/// How a [`ScriptableSurface`] reacts when a redirect is presented.
#[allow(dead_code, reason = "used in tests")]
#[derive(Clone)]
pub enum RedirectReaction {
    /// The customer authenticates and the surface reaches this URL.
    NavigateTo(String),
    /// The customer closes the surface.
    Dismiss,
    /// Nothing ever happens in the surface.
    Nothing,
}

pub struct ScriptableSurface {
    reaction: RedirectReaction,
    pub presents: AtomicU32,
    pub dismissals: AtomicU32,
}

impl ScriptableSurface {
    pub fn new(reaction: RedirectReaction) -> Arc<Self> {
        Arc::new(Self {
            reaction,
            presents: AtomicU32::new(0),
            dismissals: AtomicU32::new(0),
        })
    }
}

impl PresentationSurface for ScriptableSurface {
    fn present_redirect(&self, _url: String, session: Arc<RedirectSession>) {
        self.presents.fetch_add(1, Ordering::SeqCst);
        match &self.reaction {
            RedirectReaction::NavigateTo(url) => {
                session.handle_navigation("https://bank.example/interstitial");
                session.handle_navigation(url);
            }
            RedirectReaction::Dismiss => session.handle_dismissal(),
            RedirectReaction::Nothing => {}
        }
    }

    fn dismiss(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a scripted challenge transaction signals into the sink.
#[allow(dead_code, reason = "used in tests")]
#[derive(Clone, Copy)]
pub enum ChallengeBehavior {
    Complete,
    /// Fires `completed` and then a spurious `canceled`; only the first
    /// signal may count.
    CompleteThenCancel,
    Decline,
    Cancel,
}

struct ScriptedChallengeTransaction {
    behavior: ChallengeBehavior,
}

impl ChallengeTransaction for ScriptedChallengeTransaction {
    fn begin(&self, _surface: Arc<dyn PresentationSurface>, sink: Arc<ChallengeResultSink>) {
        match self.behavior {
            ChallengeBehavior::Complete => sink.completed(),
            ChallengeBehavior::CompleteThenCancel => {
                sink.completed();
                sink.canceled();
            }
            ChallengeBehavior::Decline => sink.failed("declined by issuer".to_string()),
            ChallengeBehavior::Cancel => sink.canceled(),
        }
    }

    fn close(&self) {}
}

struct ScriptedChallengeService {
    behavior: ChallengeBehavior,
    transactions: Arc<AtomicU32>,
}

impl ChallengeService for ScriptedChallengeService {
    fn create_transaction(
        &self,
        _params: ChallengeParams,
    ) -> Result<Arc<dyn ChallengeTransaction>, PaymentKitError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedChallengeTransaction {
            behavior: self.behavior,
        }))
    }
}

/// A challenge factory whose transactions follow one scripted behavior.
pub struct ScriptedChallengeFactory {
    behavior: ChallengeBehavior,
    pub services_created: AtomicU32,
    pub transactions: Arc<AtomicU32>,
    pub last_config: Mutex<Option<ChallengeServiceConfig>>,
}

impl ScriptedChallengeFactory {
    pub fn new(behavior: ChallengeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            services_created: AtomicU32::new(0),
            transactions: Arc::new(AtomicU32::new(0)),
            last_config: Mutex::new(None),
        })
    }
}

impl ChallengeServiceFactory for ScriptedChallengeFactory {
    fn create_service(
        &self,
        config: ChallengeServiceConfig,
    ) -> Result<Arc<dyn ChallengeService>, PaymentKitError> {
        self.services_created.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = Some(config);
        Ok(Arc::new(ScriptedChallengeService {
            behavior: self.behavior,
            transactions: Arc::clone(&self.transactions),
        }))
    }
}

/// A challenge factory that cannot initialize its service.
pub struct UnavailableChallengeFactory;

impl ChallengeServiceFactory for UnavailableChallengeFactory {
    fn create_service(
        &self,
        _config: ChallengeServiceConfig,
    ) -> Result<Arc<dyn ChallengeService>, PaymentKitError> {
        Err(PaymentKitError::Generic {
            error: "protocol runtime missing".to_string(),
        })
    }
}

/// Records every status-changed notification.
#[derive(Default)]
pub struct RecordingDelegate {
    pub statuses: Mutex<Vec<IntentStatus>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl StatusDelegate for RecordingDelegate {
    fn on_status_change(&self, snapshot: IntentSnapshot) {
        self.statuses.lock().unwrap().push(snapshot.status);
    }
}
