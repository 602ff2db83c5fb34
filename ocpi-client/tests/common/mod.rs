//! Scripted peer for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use url::Url;

use ocpi_client::ocpi::messages::{TransportError, TransportErrorKind};
use ocpi_client::party::{PartyKey, PartyStore, RemoteParty, StoreError};
use ocpi_client::{
    ClientConfig, CredentialsClient, HttpRequest, HttpResponse, HttpTransport,
    InMemoryPartyStore, Method, OwnPartyConfig, RetryPolicy,
};

pub const VERSIONS_URL: &str = "https://cpo.example/ocpi/versions";
pub const DETAIL_URL: &str = "https://cpo.example/ocpi/2.1.1";
pub const CREDENTIALS_URL: &str = "https://cpo.example/ocpi/2.1.1/credentials";

type Reply = Result<HttpResponse, TransportError>;

/// Transport answering from per-route queues. The last reply of a route is
/// repeated once the queue runs dry.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: Method, url: &str, reply: Reply) {
        self.routes
            .lock()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn on_json(&self, method: Method, url: &str, status: u16, body: Value) {
        self.on(method, url, Ok(HttpResponse::new(status, body.to_string())));
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.as_str() == url)
            .count()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last(&self) -> Option<HttpRequest> {
        self.sent.lock().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let key = (request.method, request.url.to_string());
        self.sent.lock().push(request);

        let mut routes = self.routes.lock();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(unrouted),
            Some(queue) => queue.front().cloned().unwrap_or_else(unrouted),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

fn unrouted() -> Reply {
    Err(TransportError::new(TransportErrorKind::Other, "no scripted reply"))
}

/// Store that refuses every write
#[derive(Default)]
pub struct BrokenStore;

#[async_trait]
impl PartyStore for BrokenStore {
    async fn get(&self, _key: &PartyKey) -> Result<Option<RemoteParty>, StoreError> {
        Ok(None)
    }

    async fn upsert(&self, _party: RemoteParty) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("read-only volume".into()))
    }

    async fn list(&self) -> Result<Vec<RemoteParty>, StoreError> {
        Ok(Vec::new())
    }
}

/// In-memory store whose writes can be switched off mid-test
#[derive(Default)]
pub struct SwitchableStore {
    inner: InMemoryPartyStore,
    fail_writes: AtomicBool,
}

impl SwitchableStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartyStore for SwitchableStore {
    async fn get(&self, key: &PartyKey) -> Result<Option<RemoteParty>, StoreError> {
        self.inner.get(key).await
    }

    async fn upsert(&self, party: RemoteParty) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read-only volume".into()));
        }
        self.inner.upsert(party).await
    }

    async fn list(&self) -> Result<Vec<RemoteParty>, StoreError> {
        self.inner.list().await
    }
}

pub fn versions_body() -> Value {
    json!({
        "data": [{ "version": "2.1.1", "url": DETAIL_URL }],
        "status_code": 1000,
        "status_message": "Success",
        "timestamp": "2026-10-17T10:00:00Z"
    })
}

pub fn detail_body() -> Value {
    json!({
        "data": {
            "version": "2.1.1",
            "endpoints": [
                { "identifier": "credentials", "url": CREDENTIALS_URL },
                { "identifier": "locations", "url": "https://cpo.example/ocpi/2.1.1/locations" }
            ]
        },
        "status_code": 1000
    })
}

pub fn credentials_body(token: &str, country_code: &str, party_id: &str) -> Value {
    json!({
        "data": {
            "token": token,
            "url": VERSIONS_URL,
            "business_details": { "name": "Charge Point Operator" },
            "party_id": party_id,
            "country_code": country_code
        },
        "status_code": 1000
    })
}

/// Peer that advertises 2.1.1 with a credentials endpoint
pub fn discovery_peer() -> Arc<ScriptedTransport> {
    let transport = ScriptedTransport::new();
    transport.on_json(Method::Get, VERSIONS_URL, 200, versions_body());
    transport.on_json(Method::Get, DETAIL_URL, 200, detail_body());
    transport
}

pub fn config() -> ClientConfig {
    let own = OwnPartyConfig::new(
        Url::parse("https://emsp.example/ocpi/versions").unwrap(),
        "NL",
        "EKM",
        "Elektrokombinacija",
    );
    ClientConfig::new(Url::parse(VERSIONS_URL).unwrap(), "token-a", own)
        .with_retry(RetryPolicy::default().with_max_retries(2))
}

pub fn client(transport: Arc<ScriptedTransport>) -> CredentialsClient {
    client_with(config(), transport)
}

pub fn client_with(config: ClientConfig, transport: Arc<ScriptedTransport>) -> CredentialsClient {
    CredentialsClient::builder(config)
        .transport(transport)
        .build()
        .unwrap()
}

pub fn header(request: &HttpRequest, name: &str) -> Option<String> {
    request.header_value(name).map(str::to_string)
}
