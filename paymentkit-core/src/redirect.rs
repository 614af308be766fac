//! Redirect-based authentication.
//!
//! The host opens an external browser surface at the redirect URL and
//! reports what happens to the [`RedirectSession`]: navigation events while
//! the customer authenticates, or dismissal when they give up. The session
//! recognizes arrival at the return URL and settles the outcome exactly
//! once.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::PaymentKitError;
use crate::settled::Settled;
use crate::surface::PresentationSurface;

/// One redirect authentication in flight.
///
/// Handed to the host through
/// [`PresentationSurface::present_redirect`]; the host calls
/// [`handle_navigation`](Self::handle_navigation) for every navigation the
/// external surface performs and
/// [`handle_dismissal`](Self::handle_dismissal) when the user closes it.
#[derive(uniffi::Object)]
pub struct RedirectSession {
    return_url: String,
    signal: Settled<Result<(), PaymentKitError>>,
}

#[uniffi::export]
impl RedirectSession {
    /// Reports a navigation observed in the external surface. Returns
    /// `true` when `url` matched the return URL and the session completed;
    /// the host should dismiss the surface then.
    pub fn handle_navigation(&self, url: &str) -> bool {
        if !matches_return_url(url, &self.return_url) {
            return false;
        }
        log::debug!("redirect returned to app");
        self.deliver(Ok(()));
        true
    }

    /// Reports that the user dismissed the external surface without
    /// reaching the return URL.
    pub fn handle_dismissal(&self) {
        self.deliver(Err(PaymentKitError::UserCanceled));
    }

    /// The return URL this session is watching for.
    #[must_use]
    pub fn return_url(&self) -> String {
        self.return_url.clone()
    }
}

impl RedirectSession {
    pub(crate) fn new(return_url: &str) -> Arc<Self> {
        Arc::new(Self {
            return_url: return_url.to_string(),
            signal: Settled::new(),
        })
    }

    fn deliver(&self, outcome: Result<(), PaymentKitError>) {
        if !self.signal.settle(outcome) {
            log::debug!("redirect signal arrived after completion; ignored");
        }
    }

    pub(crate) fn settled(&self) -> &Settled<Result<(), PaymentKitError>> {
        &self.signal
    }
}

/// Whether `candidate` counts as arriving at `expected`.
///
/// Compares scheme, host and path prefix so that query parameters appended
/// by the authentication server still match; falls back to a plain prefix
/// comparison when either side does not parse as a URL.
fn matches_return_url(candidate: &str, expected: &str) -> bool {
    match (Url::parse(candidate), Url::parse(expected)) {
        (Ok(candidate), Ok(expected)) => {
            candidate.scheme().eq_ignore_ascii_case(expected.scheme())
                && candidate.host_str().map(str::to_ascii_lowercase)
                    == expected.host_str().map(str::to_ascii_lowercase)
                && candidate.path().starts_with(expected.path())
        }
        _ => candidate.starts_with(expected),
    }
}

/// Drives one redirect authentication to a single outcome.
pub(crate) struct RedirectAuthenticator {
    timeout_seconds: Option<u32>,
}

impl RedirectAuthenticator {
    pub(crate) const fn new(timeout_seconds: Option<u32>) -> Self {
        Self { timeout_seconds }
    }

    /// Opens `url` through the host surface and waits for the session to
    /// settle.
    ///
    /// # Errors
    /// - [`PaymentKitError::UserCanceled`] when the surface is dismissed
    ///   before reaching the return URL.
    /// - [`PaymentKitError::Timeout`] when the surface never navigates to
    ///   the return URL within the configured bound.
    pub(crate) async fn authenticate(
        &self,
        url: &str,
        return_url: &str,
        surface: Arc<dyn PresentationSurface>,
    ) -> Result<(), PaymentKitError> {
        let session = RedirectSession::new(return_url);
        log::info!("presenting redirect authentication surface");
        surface.present_redirect(url.to_string(), Arc::clone(&session));

        // Once the return URL is reached the surface is the SDK's to take
        // down; on dismissal the user already closed it.
        let dismiss_surface = Arc::clone(&surface);
        let settled = session
            .settled()
            .and_then(|()| async move {
                dismiss_surface.dismiss();
                Ok(())
            });

        match self.timeout_seconds {
            Some(seconds) => {
                let bound = Duration::from_secs(u64::from(seconds));
                match tokio::time::timeout(bound, settled).await {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => {
                        log::warn!("redirect authentication timed out after {seconds}s");
                        surface.dismiss();
                        Err(PaymentKitError::Timeout { seconds })
                    }
                }
            }
            None => settled.await,
        }
    }
}
