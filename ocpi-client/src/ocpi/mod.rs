//! OCPI bootstrap protocol
//!
//! This module provides the client side of the OCPI bootstrap modules:
//! - `types`: versions, endpoints, tokens and credentials
//! - `messages`: response envelope, status codes and errors
//! - `retry`: transmission loop with retransmission classification
//! - `directory`: cache of advertised versions and endpoints
//! - `registration`: credentials handshake state machine
//! - `client`: the `CredentialsClient` tying them together

pub mod types;
pub mod messages;
pub mod retry;
pub mod directory;
pub mod registration;
pub mod client;

pub use types::*;
pub use messages::*;
pub use retry::{transmit, RetryPolicy, RetryResult};
pub use directory::EndpointDirectory;
pub use registration::{Registration, RegistrationEvent, RegistrationState};
pub use client::{CallOptions, ClientBuilder, CredentialsClient, RegisterOptions};
