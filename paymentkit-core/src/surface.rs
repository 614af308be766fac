use std::sync::Arc;

use crate::redirect::RedirectSession;

/// The host-supplied capability for putting authentication UI on screen.
///
/// The SDK never constructs UI itself; it only asks the host to present or
/// dismiss a surface. For redirect authentication the host receives the
/// [`RedirectSession`] it must report navigation and dismissal events into.
#[uniffi::export(with_foreign)]
pub trait PresentationSurface: Send + Sync {
    /// Opens an external browser surface at `url` and keeps `session`
    /// informed of navigation events and user dismissal.
    fn present_redirect(&self, url: String, session: Arc<RedirectSession>);

    /// Dismisses whatever authentication surface is currently presented.
    /// Must be a no-op when nothing is presented.
    fn dismiss(&self);
}
