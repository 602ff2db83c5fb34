//! Configuration for the OCPI credentials client
//!
//! Combines what we know about the peer, how we describe ourselves, and how
//! remote calls are transmitted.

use std::time::Duration;

use url::Url;

use crate::ocpi::retry::RetryPolicy;
use crate::ocpi::types::{AccessToken, BusinessDetails, CountryCode, InterfaceRole, PartyId, Role};
use crate::party::PartyKey;

/// Default length of generated tokens
pub const DEFAULT_TOKEN_LENGTH: usize = 40;

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // Remote side
    pub peer: PeerConfig,

    // Our own party
    pub own: OwnPartyConfig,

    // Retry and timeout settings
    pub transmission: TransmissionConfig,
}

/// The peer we bootstrap against
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Peer versions URL
    pub versions_url: Url,

    /// Bearer token used until registration completes (Token A)
    pub initial_token: AccessToken,

    /// Role recorded for the peer on registration
    pub remote_role: Role,

    /// Already registered peer, if any (enables rotation without registering first)
    pub remote_party: Option<PartyKey>,

    /// Interface role filter for the credentials endpoint (2.2+)
    pub credentials_role: Option<InterfaceRole>,

    /// Send tokens base64-encoded in the Authorization header
    pub base64_tokens: bool,
}

/// How we describe ourselves to the peer
#[derive(Debug, Clone)]
pub struct OwnPartyConfig {
    /// Our versions URL, handed to the peer in Credentials
    pub versions_url: Url,

    pub country_code: CountryCode,

    pub party_id: PartyId,

    pub business_details: BusinessDetails,

    /// Length of generated Token B
    pub token_length: usize,
}

/// Transmission settings
#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    /// Per-attempt timeout unless a call overrides it
    pub request_timeout: Duration,

    /// Retransmission policy
    pub retry: RetryPolicy,

    /// User-Agent of the default transport
    pub user_agent: String,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            user_agent: format!("ocpi-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl OwnPartyConfig {
    pub fn new(
        versions_url: Url,
        country_code: impl Into<String>,
        party_id: impl Into<String>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            versions_url,
            country_code: CountryCode::new(country_code),
            party_id: PartyId::new(party_id),
            business_details: BusinessDetails::new(business_name),
            token_length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Create config with basic parameters
    pub fn new(peer_versions_url: Url, initial_token: impl Into<String>, own: OwnPartyConfig) -> Self {
        Self {
            peer: PeerConfig {
                versions_url: peer_versions_url,
                initial_token: AccessToken::new(initial_token),
                remote_role: Role::Cpo,
                remote_party: None,
                credentials_role: None,
                base64_tokens: false,
            },
            own,
            transmission: TransmissionConfig::default(),
        }
    }

    /// Set the role recorded for the peer
    pub fn with_remote_role(mut self, role: Role) -> Self {
        self.peer.remote_role = role;
        self
    }

    /// Start from an existing registration
    pub fn with_remote_party(mut self, key: PartyKey) -> Self {
        self.peer.remote_party = Some(key);
        self
    }

    /// Only accept credentials endpoints with this interface role
    pub fn with_credentials_role(mut self, role: InterfaceRole) -> Self {
        self.peer.credentials_role = Some(role);
        self
    }

    /// Encode tokens as base64 on the wire
    pub fn with_base64_tokens(mut self, enabled: bool) -> Self {
        self.peer.base64_tokens = enabled;
        self
    }

    /// Set per-attempt timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.transmission.request_timeout = timeout;
        self
    }

    /// Set retransmission policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.transmission.retry = retry;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transmission.user_agent = user_agent.into();
        self
    }

    /// Set generated token length
    pub fn with_token_length(mut self, length: usize) -> Self {
        self.own.token_length = length;
        self
    }

    /// Token A as it goes on the wire
    pub fn initial_token(&self) -> AccessToken {
        self.peer
            .initial_token
            .clone()
            .with_base64(self.peer.base64_tokens)
    }
}
