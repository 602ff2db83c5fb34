//! Remote party trust records
//!
//! - `record`: the negotiated relationship with one peer
//! - `store`: persistence seam for those records

pub mod record;
pub mod store;

pub use record::{AccessStatus, ConnectionStatus, PartyKey, PartyStatus, RemoteParty, TrustStatus};
pub use store::{InMemoryPartyStore, JsonFilePartyStore, PartyStore, StoreError};
