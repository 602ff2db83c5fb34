//! Trust record kept for each remote party
//!
//! A record is created by a successful registration and afterwards only
//! changed by credential rotation. Identity (country code + party id) is
//! fixed once the record exists.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ocpi::types::{
    AccessToken, BusinessDetails, CountryCode, Credentials, PartyId, Role, VersionId,
};

/// Identity of a remote party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyKey {
    pub country_code: CountryCode,
    pub party_id: PartyId,
}

impl PartyKey {
    pub fn new(country_code: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self {
            country_code: CountryCode::new(country_code),
            party_id: PartyId::new(party_id),
        }
    }

    pub fn of(credentials: &Credentials) -> Self {
        Self {
            country_code: credentials.country_code.clone(),
            party_id: credentials.party_id.clone(),
        }
    }

    /// Whether `credentials` belong to this party
    pub fn matches(&self, credentials: &Credentials) -> bool {
        self.country_code == credentials.country_code && self.party_id == credentials.party_id
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.country_code, self.party_id)
    }
}

/// Whether the remote party may use our token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

/// Whether the relationship is administratively enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyStatus {
    Enabled,
    Disabled,
}

/// Last known reachability of the remote party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Online,
    Offline,
}

/// Combined status of a trust relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustStatus {
    pub access: AccessStatus,
    pub party: PartyStatus,
    pub connection: ConnectionStatus,
}

impl TrustStatus {
    /// Status after a successful handshake
    pub fn active() -> Self {
        Self {
            access: AccessStatus::Allowed,
            party: PartyStatus::Enabled,
            connection: ConnectionStatus::Online,
        }
    }

    pub fn is_active(&self) -> bool {
        *self == Self::active()
    }
}

/// Negotiated relationship with one remote party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteParty {
    pub country_code: CountryCode,
    pub party_id: PartyId,
    pub role: Role,
    pub business_details: BusinessDetails,
    /// Token we handed out; the peer uses it to call us
    pub local_token: AccessToken,
    /// Token the peer handed us; we use it to call the peer
    pub remote_token: AccessToken,
    pub remote_versions_url: Url,
    pub selected_version: VersionId,
    pub status: TrustStatus,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RemoteParty {
    /// Record produced by a completed registration
    pub fn registered(
        peer: &Credentials,
        role: Role,
        local_token: AccessToken,
        selected_version: VersionId,
    ) -> Self {
        let now = Utc::now();
        Self {
            country_code: peer.country_code.clone(),
            party_id: peer.party_id.clone(),
            role,
            business_details: peer.business_details.clone(),
            local_token,
            remote_token: peer.token.clone(),
            remote_versions_url: peer.url.clone(),
            selected_version,
            status: TrustStatus::active(),
            created: now,
            last_updated: now,
        }
    }

    /// Copy of this record after a rotation.
    ///
    /// Identity and selected version are carried over untouched.
    pub fn rotated(
        &self,
        local_token: AccessToken,
        peer: &Credentials,
        role: Option<Role>,
    ) -> Self {
        Self {
            role: role.unwrap_or(self.role),
            business_details: peer.business_details.clone(),
            local_token,
            remote_token: peer.token.clone(),
            status: TrustStatus::active(),
            last_updated: Utc::now(),
            ..self.clone()
        }
    }

    pub fn key(&self) -> PartyKey {
        PartyKey {
            country_code: self.country_code.clone(),
            party_id: self.party_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_credentials(token: &str) -> Credentials {
        Credentials {
            token: AccessToken::new(token),
            url: Url::parse("https://peer.example/ocpi/versions").unwrap(),
            business_details: BusinessDetails::new("Peer Operator"),
            party_id: PartyId::new("PEE"),
            country_code: CountryCode::new("DE"),
        }
    }

    #[test]
    fn test_registered_record() {
        let record = RemoteParty::registered(
            &peer_credentials("token-c"),
            Role::Cpo,
            AccessToken::new("token-b"),
            VersionId::from("2.1.1"),
        );

        assert_eq!(record.key(), PartyKey::new("DE", "PEE"));
        assert_eq!(record.remote_token.expose(), "token-c");
        assert_eq!(record.local_token.expose(), "token-b");
        assert!(record.status.is_active());
        assert_eq!(record.key().to_string(), "DE*PEE");
    }

    #[test]
    fn test_rotation_keeps_identity() {
        let record = RemoteParty::registered(
            &peer_credentials("token-c"),
            Role::Cpo,
            AccessToken::new("token-b"),
            VersionId::from("2.1.1"),
        );

        let mut rotated_peer = peer_credentials("token-c2");
        rotated_peer.business_details = BusinessDetails::new("Peer Operator GmbH");

        let rotated = record.rotated(AccessToken::new("token-b2"), &rotated_peer, None);
        assert_eq!(rotated.key(), record.key());
        assert_eq!(rotated.role, Role::Cpo);
        assert_eq!(rotated.selected_version, record.selected_version);
        assert_eq!(rotated.created, record.created);
        assert_eq!(rotated.business_details.name, "Peer Operator GmbH");
        assert_eq!(rotated.remote_token.expose(), "token-c2");
        assert_eq!(rotated.local_token.expose(), "token-b2");

        let with_role = record.rotated(AccessToken::new("token-b3"), &rotated_peer, Some(Role::Hub));
        assert_eq!(with_role.role, Role::Hub);
    }
}
