//! OCPI data types used during bootstrap
//!
//! Covers the records exchanged by the versions and credentials modules:
//! - Version discovery (VersionInformation, VersionDetail, Endpoint)
//! - Party identity (CountryCode, PartyId, Role, BusinessDetails)
//! - Credentials and the AccessToken they carry

use std::cmp::Ordering;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

// ============================================================================
// Identifiers
// ============================================================================

/// Protocol version identifier, e.g. "2.1.1"
///
/// Ordering compares dot-separated segments numerically where both sides are
/// numeric, so "2.10" sorts above "2.9". Ties fall back to the raw string so
/// that ordering stays consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.0.split('.');
        let mut right = other.0.split('.');

        loop {
            match (left.next(), right.next()) {
                (None, None) => return self.0.cmp(&other.0),
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => {
                    let ord = match (a.parse::<u64>(), b.parse::<u64>()) {
                        (Ok(x), Ok(y)) => x.cmp(&y),
                        _ => a.cmp(b),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Module identifier as published in a version detail ("credentials", "locations", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(module: impl Into<String>) -> Self {
        Self(module.into())
    }

    pub fn credentials() -> Self {
        Self::new("credentials")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// ISO-3166 alpha-2 country code of a party
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-character party identifier (eMI3 / ISO-15118)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Role a party plays in the charging network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Cpo,
    Emsp,
    Hub,
    Nap,
    Nsp,
    Scsp,
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Cpo => "CPO",
            Role::Emsp => "EMSP",
            Role::Hub => "HUB",
            Role::Nap => "NAP",
            Role::Nsp => "NSP",
            Role::Scsp => "SCSP",
            Role::Other => "OTHER",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPO" => Ok(Role::Cpo),
            "EMSP" => Ok(Role::Emsp),
            "HUB" => Ok(Role::Hub),
            "NAP" => Ok(Role::Nap),
            "NSP" => Ok(Role::Nsp),
            "SCSP" => Ok(Role::Scsp),
            "OTHER" => Ok(Role::Other),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Side of a module interface an endpoint implements
///
/// Absent on 2.1.1 endpoints, which publish one URL per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceRole {
    Sender,
    Receiver,
}

/// Category of a business logo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageCategory {
    Charger,
    Entrance,
    Location,
    Network,
    Operator,
    Other,
    Owner,
}

// ============================================================================
// Version discovery
// ============================================================================

/// One entry of the versions list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInformation {
    pub version: VersionId,
    pub url: Url,
}

/// Module endpoint within a version detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub identifier: ModuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<InterfaceRole>,
    pub url: Url,
}

impl Endpoint {
    /// Whether this endpoint serves `module`, optionally restricted to `role`.
    ///
    /// Endpoints without a role (2.1.1) match any role filter.
    pub fn matches(&self, module: &ModuleId, role: Option<InterfaceRole>) -> bool {
        if &self.identifier != module {
            return false;
        }
        match (role, self.role) {
            (Some(wanted), Some(published)) => wanted == published,
            _ => true,
        }
    }
}

/// Endpoints published for one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetail {
    pub version: VersionId,
    pub endpoints: Vec<Endpoint>,
}

impl VersionDetail {
    /// First endpoint serving `module` (first match wins when no role is given)
    pub fn endpoint(&self, module: &ModuleId, role: Option<InterfaceRole>) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.matches(module, role))
    }
}

// ============================================================================
// Party description
// ============================================================================

/// Logo or other image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Url>,
    pub category: ImageCategory,
    #[serde(rename = "type")]
    pub image_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Business details of a party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessDetails {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Image>,
}

impl BusinessDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            website: None,
            logo: None,
        }
    }

    pub fn with_website(mut self, website: Url) -> Self {
        self.website = Some(website);
        self
    }
}

// ============================================================================
// Tokens and credentials
// ============================================================================

/// Bearer token handed between parties
///
/// Serializes as the bare secret. `Debug` and `Display` never print it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken {
    secret: String,
    #[serde(skip)]
    base64: bool,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base64: false,
        }
    }

    /// Generate a random alphanumeric token of `length` characters
    pub fn generate(length: usize) -> Self {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        Self::new(secret)
    }

    /// Mark the token as base64-encoded on the wire
    pub fn with_base64(mut self, base64: bool) -> Self {
        self.base64 = base64;
        self
    }

    pub fn is_base64(&self) -> bool {
        self.base64
    }

    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// The raw secret. Only the transport and persistence layers should need this.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        if self.base64 {
            format!("Token {}", BASE64.encode(self.secret.as_bytes()))
        } else {
            format!("Token {}", self.secret)
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("base64", &self.base64)
            .finish()
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Credentials object exchanged during registration and rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: AccessToken,
    /// Versions URL of the party that owns these credentials
    pub url: Url,
    pub business_details: BusinessDetails,
    pub party_id: PartyId,
    pub country_code: CountryCode,
}
