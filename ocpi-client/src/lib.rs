//! # OCPI Bootstrap Client
//!
//! Client side of the OCPI bootstrap handshake: version discovery, endpoint
//! resolution and the credentials exchange that establishes mutual tokens
//! between two charging-network parties.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ CredentialsClient                         │
//! │  register / rotate / fetch / revoke       │
//! │        │                                  │
//! │        ▼                                  │
//! │  ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Endpoint     │◄─►│ Version / Detail │  │
//! │  │ Directory    │   │ fetchers         │  │
//! │  └──────────────┘   └────────┬─────────┘  │
//! │                              ▼            │
//! │                    ┌──────────────────┐   │
//! │                    │ Transmission loop│   │
//! │                    └────────┬─────────┘   │
//! └─────────────────────────────┼─────────────┘
//!        ▲ observers            │ HttpTransport
//!        │                      ▼
//!   RequestObserver       Peer (CPO / eMSP / Hub)
//! ```
//!
//! ## Handshake
//!
//! | Step | Request | Token used |
//! |------|---------|------------|
//! | Discover versions | `GET {versions_url}` | A |
//! | Discover endpoints | `GET {version_url}` | A |
//! | Register | `POST {credentials}` with Token B | A |
//! | Afterwards | any module | C |
//! | Rotate | `PUT {credentials}` with new token | C |
//! | Revoke | `DELETE {credentials}` | C |
//!
//! ## Usage
//!
//! ```no_run
//! use ocpi_client::{CallOptions, ClientConfig, CredentialsClient, OwnPartyConfig, RegisterOptions};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let own = OwnPartyConfig::new(
//!         Url::parse("https://emsp.example/ocpi/versions")?,
//!         "NL",
//!         "EKM",
//!         "Elektrokombinacija",
//!     );
//!     let config = ClientConfig::new(
//!         Url::parse("https://cpo.example/ocpi/versions")?,
//!         "token-a",
//!         own,
//!     );
//!
//!     let client = CredentialsClient::builder(config).build()?;
//!     let peer = client
//!         .register(RegisterOptions::default(), &CallOptions::default())
//!         .await?;
//!     println!("Registered with {}*{}", peer.country_code, peer.party_id);
//!
//!     Ok(())
//! }
//! ```

pub mod ocpi;
pub mod party;
pub mod transport;
pub mod observer;
pub mod config;

pub use config::{ClientConfig, OwnPartyConfig, PeerConfig, TransmissionConfig};
pub use observer::{
    ClientCounters, Operation, RequestEvent, RequestObserver, ResponseEvent, ResponseOutcome,
    TracingObserver,
};
pub use party::{InMemoryPartyStore, JsonFilePartyStore, PartyKey, PartyStore, RemoteParty};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

// Re-export key types
pub use ocpi::{
    AccessToken, CallOptions, ClientBuilder, Credentials, CredentialsClient, ModuleId, OcpiError,
    RegisterOptions, RetryPolicy, Role, VersionId,
};
