//! Classification of an intent snapshot into the next step to take.

use crate::intent::{ChallengeParams, IntentSnapshot, IntentStatus, NextAction};

/// What the confirmation engine should do with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDisposition {
    /// Nothing further for the client to do; map the status to a terminal
    /// outcome.
    Complete,
    /// Drive a strong-authentication challenge.
    Challenge {
        /// Parameters for the challenge transaction.
        params: ChallengeParams,
    },
    /// Open an external authentication surface.
    Redirect {
        /// The URL to open.
        url: String,
        /// Return URL declared by the server, when present.
        return_url: Option<String>,
    },
    /// Re-fetch the intent until its status settles.
    Poll,
    /// The declared next action is not safe to act on.
    Unsupported {
        /// The raw next-action payload, for the error surfaced to the host.
        raw: String,
    },
}

/// Maps a snapshot's declared next action (and status) to a disposition.
///
/// Pure and total: every well-formed or malformed payload yields a
/// disposition, never a panic. Unrecognized shapes land in
/// [`ActionDisposition::Unsupported`] so they surface as an error instead of
/// being silently ignored.
#[must_use]
pub fn classify(snapshot: &IntentSnapshot) -> ActionDisposition {
    match &snapshot.next_action {
        Some(NextAction::SdkChallenge { params }) => ActionDisposition::Challenge {
            params: params.clone(),
        },
        Some(NextAction::RedirectToUrl { url, return_url }) => {
            ActionDisposition::Redirect {
                url: url.clone(),
                return_url: return_url.clone(),
            }
        }
        Some(NextAction::StatusPoll) => ActionDisposition::Poll,
        Some(NextAction::Unknown { raw }) => {
            ActionDisposition::Unsupported { raw: raw.clone() }
        }
        // Absent next action: `processing` resolves by waiting on the
        // server; every other status has nothing left for the client to do.
        None => match snapshot.status {
            IntentStatus::Processing => ActionDisposition::Poll,
            _ => ActionDisposition::Complete,
        },
    }
}
