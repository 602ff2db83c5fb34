//! Registration state machine
//!
//! Tracks one credentials handshake:
//! - Idle → ResolvingEndpoint (handshake started)
//! - ResolvingEndpoint → PostingCredentials (credentials endpoint known)
//! - PostingCredentials → Committing (peer answered with Token C)
//! - Committing → Registered (trust record, version and token switched)
//!
//! Any failure moves a running handshake to Failed. Events that do not fit
//! the current state are ignored.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use url::Url;

use super::types::VersionId;
use crate::party::PartyKey;

/// Phase of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Nothing sent yet, Token A in use
    Idle,
    /// Looking up the credentials endpoint
    ResolvingEndpoint,
    /// Own credentials (Token B) posted, awaiting peer credentials
    PostingCredentials,
    /// Peer credentials received, persisting the trust record
    Committing,
    /// Token C in use
    Registered,
    /// Handshake aborted, nothing changed locally
    Failed,
}

impl RegistrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationState::Registered | RegistrationState::Failed)
    }
}

/// Events that drive a registration
#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    Started { version: Option<VersionId> },
    EndpointResolved { version: VersionId, url: Url },
    CredentialsAccepted { peer: PartyKey },
    Committed,
    CommitFailed { reason: String },
    Failed { reason: String },
}

/// One credentials handshake
#[derive(Debug, Clone)]
pub struct Registration {
    pub state: RegistrationState,
    pub version: Option<VersionId>,
    pub credentials_url: Option<Url>,
    pub peer: Option<PartyKey>,
    pub failure: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Idle,
            version: None,
            credentials_url: None,
            peer: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Apply `event`. Returns false when the event was ignored.
    pub fn handle_event(&mut self, event: RegistrationEvent) -> bool {
        debug!("Registration event: {:?}", event);

        match (self.state, event) {
            (RegistrationState::Idle, RegistrationEvent::Started { version }) => {
                self.state = RegistrationState::ResolvingEndpoint;
                self.version = version;
                self.started_at = Some(Utc::now());
            }

            (RegistrationState::ResolvingEndpoint, RegistrationEvent::EndpointResolved { version, url }) => {
                info!("Registering at {} (version {})", url, version);
                self.state = RegistrationState::PostingCredentials;
                self.version = Some(version);
                self.credentials_url = Some(url);
            }

            (RegistrationState::PostingCredentials, RegistrationEvent::CredentialsAccepted { peer }) => {
                debug!("Peer {} accepted our credentials", peer);
                self.state = RegistrationState::Committing;
                self.peer = Some(peer);
            }

            (RegistrationState::Committing, RegistrationEvent::Committed) => {
                self.state = RegistrationState::Registered;
                self.finished_at = Some(Utc::now());
                if let Some(peer) = &self.peer {
                    info!("Registered with {}", peer);
                }
            }

            (RegistrationState::Committing, RegistrationEvent::CommitFailed { reason }) => {
                warn!("Registration not committed: {}", reason);
                self.fail(reason);
            }

            (state, RegistrationEvent::Failed { reason }) if !state.is_terminal() => {
                warn!("Registration failed in {:?}: {}", state, reason);
                self.fail(reason);
            }

            (state, event) => {
                warn!("Ignoring registration event {:?} in state {:?}", event, state);
                return false;
            }
        }
        true
    }

    fn fail(&mut self, reason: String) {
        self.state = RegistrationState::Failed;
        self.failure = Some(reason);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }
}
