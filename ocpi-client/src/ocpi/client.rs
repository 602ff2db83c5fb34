//! OCPI credentials client
//!
//! Drives the bootstrap modules against one peer:
//! - version discovery (`list_versions`, `get_version_detail`)
//! - endpoint resolution backed by the `EndpointDirectory`
//! - credential operations (GET/POST/PUT/DELETE on the credentials module)
//! - registration (Token A → Token B → Token C)
//!
//! Every remote call goes through `execute`, which attaches the bearer token
//! and correlation headers, runs the transmission loop, decodes the envelope
//! and notifies observers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::directory::EndpointDirectory;
use super::messages::{
    OcpiError, OcpiResponse, ResolutionError, ValidationError, AUTHORIZATION_HEADER,
    CORRELATION_ID_HEADER, REQUEST_ID_HEADER,
};
use super::registration::{Registration, RegistrationEvent};
use super::retry;
use super::types::{
    AccessToken, Credentials, InterfaceRole, ModuleId, Role, VersionDetail, VersionId,
    VersionInformation,
};
use crate::config::ClientConfig;
use crate::observer::{
    ClientCounters, ObserverList, Operation, RequestEvent, RequestObserver, ResponseEvent,
    ResponseOutcome,
};
use crate::party::{InMemoryPartyStore, PartyKey, PartyStore, RemoteParty, StoreError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// `X-Request-ID` of the operation's own request (generated if absent)
    pub request_id: Option<String>,
    /// `X-Correlation-ID` shared by every request of the operation (generated if absent)
    pub correlation_id: Option<String>,
    /// Per-attempt timeout, overriding the configured one
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Inputs of a registration
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Version to register under (negotiated when absent)
    pub version: Option<VersionId>,
    /// Select the version on success
    pub set_as_default: bool,
    /// Role recorded for the peer (configured role when absent)
    pub remote_role: Option<Role>,
    /// Token B to hand out (generated when absent)
    pub token_b: Option<AccessToken>,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            version: None,
            set_as_default: true,
            remote_role: None,
            token_b: None,
        }
    }
}

impl RegisterOptions {
    pub fn with_version(mut self, version: impl Into<VersionId>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_remote_role(mut self, role: Role) -> Self {
        self.remote_role = Some(role);
        self
    }

    pub fn with_token_b(mut self, token: AccessToken) -> Self {
        self.token_b = Some(token);
        self
    }

    pub fn without_default(mut self) -> Self {
        self.set_as_default = false;
        self
    }
}

/// Ids, timeout and cancellation shared by the requests of one operation
#[derive(Debug, Clone)]
struct CallContext {
    correlation_id: String,
    request_id: Option<String>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallContext {
    /// Context for discovery requests issued on behalf of the operation
    fn discovery(&self) -> Self {
        Self {
            request_id: None,
            ..self.clone()
        }
    }
}

/// Client for the OCPI bootstrap modules of one peer
pub struct CredentialsClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn PartyStore>,
    directory: EndpointDirectory,
    auth: RwLock<AccessToken>,
    remote_party: RwLock<Option<PartyKey>>,
    last_registration: RwLock<Option<Registration>>,
    observers: ObserverList,
    counters: ClientCounters,
}

impl std::fmt::Debug for CredentialsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsClient")
            .field("peer", &self.config.peer.versions_url.as_str())
            .field("directory", &self.directory)
            .field("remote_party", &*self.remote_party.read())
            .field("observers", &self.observers)
            .finish()
    }
}

impl CredentialsClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn directory(&self) -> &EndpointDirectory {
        &self.directory
    }

    pub fn counters(&self) -> &ClientCounters {
        &self.counters
    }

    pub fn store(&self) -> &Arc<dyn PartyStore> {
        &self.store
    }

    pub fn add_observer(&self, observer: Arc<dyn RequestObserver>) {
        self.observers.add(observer);
    }

    /// Peer we hold a trust record for, if any
    pub fn remote_party(&self) -> Option<PartyKey> {
        self.remote_party.read().clone()
    }

    pub fn selected_version(&self) -> Option<VersionId> {
        self.directory.selected_version()
    }

    /// State of the most recent registration
    pub fn last_registration(&self) -> Option<Registration> {
        self.last_registration.read().clone()
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Fetch the versions the peer supports and replace the version cache
    pub async fn list_versions(
        &self,
        options: &CallOptions,
    ) -> Result<Vec<VersionInformation>, OcpiError> {
        let ctx = self.context(options);
        self.list_versions_in(&ctx).await
    }

    /// Fetch the endpoints of `version` (negotiated when absent) and cache them
    pub async fn get_version_detail(
        &self,
        version: Option<&VersionId>,
        set_as_default: bool,
        options: &CallOptions,
    ) -> Result<VersionDetail, OcpiError> {
        let ctx = self.context(options);
        let version = match version {
            Some(v) => v.clone(),
            None => self.choose_version(&ctx).await?,
        };
        let detail = self.version_detail_in(&version, set_as_default, &ctx).await?;
        Ok(detail.as_ref().clone())
    }

    /// URL of `module`, fetching versions and detail only when not cached.
    ///
    /// The first endpoint published for the module wins.
    pub async fn resolve_endpoint_url(
        &self,
        module: &ModuleId,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<Url, OcpiError> {
        self.resolve_endpoint_url_for_role(module, None, version, options)
            .await
    }

    /// Like `resolve_endpoint_url`, restricted to endpoints with `role`
    /// (role-less endpoints always qualify)
    pub async fn resolve_endpoint_url_for_role(
        &self,
        module: &ModuleId,
        role: Option<InterfaceRole>,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<Url, OcpiError> {
        let ctx = self.context(options);
        let (url, _) = self.resolve_in(module, role, version, &ctx).await?;
        Ok(url)
    }

    async fn list_versions_in(&self, ctx: &CallContext) -> Result<Vec<VersionInformation>, OcpiError> {
        let url = self.config.peer.versions_url.clone();
        let versions: Vec<VersionInformation> = self
            .execute(Operation::ListVersions, Method::Get, url, None, ctx)
            .await?
            .ok_or(OcpiError::MissingData)?;

        if versions.is_empty() {
            warn!("Peer advertised no versions, keeping cached list");
        } else {
            self.directory.replace_versions(&versions);
        }
        Ok(versions)
    }

    /// Selected version, else highest cached, else highest advertised
    async fn choose_version(&self, ctx: &CallContext) -> Result<VersionId, OcpiError> {
        if let Some(version) = self.directory.preferred_version() {
            return Ok(version);
        }

        let versions = self.list_versions_in(&ctx.discovery()).await?;
        versions
            .into_iter()
            .map(|v| v.version)
            .max()
            .ok_or_else(|| ResolutionError::NoVersions.into())
    }

    async fn version_detail_in(
        &self,
        version: &VersionId,
        set_as_default: bool,
        ctx: &CallContext,
    ) -> Result<Arc<VersionDetail>, OcpiError> {
        let url = match self.directory.version_url(version) {
            Some(url) => url,
            None => {
                debug!("No URL cached for version {}, listing versions", version);
                self.list_versions_in(&ctx.discovery()).await?;
                self.directory
                    .version_url(version)
                    .ok_or_else(|| ResolutionError::UnknownVersion(version.clone()))?
            }
        };

        let detail: VersionDetail = self
            .execute(Operation::GetVersionDetail, Method::Get, url, None, ctx)
            .await?
            .ok_or(OcpiError::MissingData)?;

        if &detail.version != version {
            warn!("Detail for version {} reports version {}", version, detail.version);
        }
        Ok(self
            .directory
            .upsert_version_detail(version.clone(), detail, set_as_default))
    }

    async fn resolve_in(
        &self,
        module: &ModuleId,
        role: Option<InterfaceRole>,
        version: Option<&VersionId>,
        ctx: &CallContext,
    ) -> Result<(Url, VersionId), OcpiError> {
        let version = match version {
            Some(v) => v.clone(),
            None => self.choose_version(ctx).await?,
        };

        if let Some(url) = self.directory.cached_endpoint(module, &version, role) {
            return Ok((url, version));
        }

        let detail = match self.directory.version_detail(&version) {
            Some(detail) => detail,
            None => {
                self.version_detail_in(&version, false, &ctx.discovery())
                    .await?
            }
        };

        match detail.endpoint(module, role) {
            Some(endpoint) => Ok((endpoint.url.clone(), version)),
            None => Err(ResolutionError::NoEndpoint {
                module: module.clone(),
                version,
            }
            .into()),
        }
    }

    async fn credentials_url(
        &self,
        version: Option<&VersionId>,
        ctx: &CallContext,
    ) -> Result<(Url, VersionId), OcpiError> {
        self.resolve_in(
            &ModuleId::credentials(),
            self.config.peer.credentials_role,
            version,
            ctx,
        )
        .await
    }

    // ========================================================================
    // Credentials module
    // ========================================================================

    /// GET the credentials the peer holds for us
    pub async fn fetch_credentials(
        &self,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<Credentials, OcpiError> {
        let ctx = self.context(options);
        let (url, _) = self.credentials_url(version, &ctx).await?;
        self.execute(Operation::GetCredentials, Method::Get, url, None, &ctx)
            .await?
            .ok_or(OcpiError::MissingData)
    }

    /// POST `credentials` and return the peer's. Changes nothing locally.
    pub async fn publish_credentials(
        &self,
        credentials: &Credentials,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<Credentials, OcpiError> {
        let ctx = self.context(options);
        let (url, _) = self.credentials_url(version, &ctx).await?;
        let body = serde_json::to_vec(credentials)?;
        self.execute(Operation::PostCredentials, Method::Post, url, Some(body), &ctx)
            .await?
            .ok_or(OcpiError::MissingData)
    }

    /// PUT new `credentials` for an already registered peer.
    ///
    /// The peer must answer with the same country code and party id as the
    /// stored record; otherwise nothing is changed locally. If the peer
    /// accepts but the record cannot be stored, `OcpiError::Uncommitted`
    /// carries the returned credentials and the old token stays in use.
    pub async fn rotate_credentials(
        &self,
        credentials: &Credentials,
        remote_role: Option<Role>,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<Credentials, OcpiError> {
        let ctx = self.context(options);

        let key = self.remote_party().ok_or(ResolutionError::NoRemoteParty)?;
        let existing = self
            .store
            .get(&key)
            .await?
            .ok_or(ResolutionError::NoRemoteParty)?;

        let (url, _) = self.credentials_url(version, &ctx).await?;
        let body = serde_json::to_vec(credentials)?;
        let returned: Credentials = self
            .execute(Operation::PutCredentials, Method::Put, url, Some(body), &ctx)
            .await?
            .ok_or(OcpiError::MissingData)?;

        if !key.matches(&returned) {
            warn!(
                "Rotation answered by {}*{}, expected {}; keeping trust record",
                returned.country_code, returned.party_id, key
            );
            return Err(ValidationError::IdentityMismatch {
                expected: key,
                actual_country_code: returned.country_code,
                actual_party_id: returned.party_id,
            }
            .into());
        }

        let updated = existing.rotated(credentials.token.clone(), &returned, remote_role);
        if let Err(source) = self.commit(updated, None, &returned.token).await {
            return Err(OcpiError::Uncommitted {
                credentials: Box::new(returned),
                source,
            });
        }
        info!("Rotated credentials with {}", key);
        Ok(returned)
    }

    /// DELETE our registration at the peer
    pub async fn revoke_credentials(
        &self,
        version: Option<&VersionId>,
        options: &CallOptions,
    ) -> Result<(), OcpiError> {
        let ctx = self.context(options);
        let (url, _) = self.credentials_url(version, &ctx).await?;
        self.execute::<serde_json::Value>(Operation::DeleteCredentials, Method::Delete, url, None, &ctx)
            .await?;
        info!("Credentials revoked at peer");
        Ok(())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Run the credentials handshake.
    ///
    /// Posts our credentials with a fresh Token B under the current token
    /// (Token A) and, on success, stores the trust record, selects the
    /// version and switches to the peer's Token C. If the trust record
    /// cannot be stored, the peer's credentials are still returned but
    /// nothing is switched.
    pub async fn register(
        &self,
        options: RegisterOptions,
        call: &CallOptions,
    ) -> Result<Credentials, OcpiError> {
        let ctx = self.context(call);
        let mut registration = Registration::new();
        registration.handle_event(RegistrationEvent::Started {
            version: options.version.clone(),
        });

        let result = self.run_registration(&options, &ctx, &mut registration).await;
        if let Err(e) = &result {
            registration.handle_event(RegistrationEvent::Failed {
                reason: e.to_string(),
            });
        }

        self.counters.record(Operation::Register, result.is_ok());
        *self.last_registration.write() = Some(registration);
        result
    }

    async fn run_registration(
        &self,
        options: &RegisterOptions,
        ctx: &CallContext,
        registration: &mut Registration,
    ) -> Result<Credentials, OcpiError> {
        let (url, version) = self
            .credentials_url(options.version.as_ref(), ctx)
            .await?;
        registration.handle_event(RegistrationEvent::EndpointResolved {
            version: version.clone(),
            url: url.clone(),
        });

        let token_b = options
            .token_b
            .clone()
            .unwrap_or_else(|| AccessToken::generate(self.config.own.token_length));
        let body = serde_json::to_vec(&self.own_credentials(token_b.clone()))?;

        let peer: Credentials = self
            .execute(Operation::PostCredentials, Method::Post, url, Some(body), ctx)
            .await?
            .ok_or(OcpiError::MissingData)?;
        registration.handle_event(RegistrationEvent::CredentialsAccepted {
            peer: PartyKey::of(&peer),
        });

        let role = options.remote_role.unwrap_or(self.config.peer.remote_role);
        let record = RemoteParty::registered(&peer, role, token_b, version.clone());
        let select = options.set_as_default.then_some(version);

        match self.commit(record, select, &peer.token).await {
            Ok(()) => registration.handle_event(RegistrationEvent::Committed),
            Err(e) => registration.handle_event(RegistrationEvent::CommitFailed {
                reason: e.to_string(),
            }),
        };
        Ok(peer)
    }

    /// Credentials describing us, carrying `token`
    pub fn own_credentials(&self, token: AccessToken) -> Credentials {
        let own = &self.config.own;
        Credentials {
            token,
            url: own.versions_url.clone(),
            business_details: own.business_details.clone(),
            party_id: own.party_id.clone(),
            country_code: own.country_code.clone(),
        }
    }

    /// Persist `record`, then switch version and token.
    ///
    /// Nothing is switched when the store rejects the record.
    async fn commit(
        &self,
        record: RemoteParty,
        select: Option<VersionId>,
        remote_token: &AccessToken,
    ) -> Result<(), StoreError> {
        let key = record.key();
        if let Err(e) = self.store.upsert(record).await {
            error!("Failed to store trust record for {}: {}", key, e);
            self.counters.record_commit_failure();
            return Err(e);
        }

        if let Some(version) = select {
            self.directory.select_version(version);
        }
        *self.auth.write() = remote_token
            .clone()
            .with_base64(self.config.peer.base64_tokens);
        *self.remote_party.write() = Some(key);
        Ok(())
    }

    // ========================================================================
    // Transmission
    // ========================================================================

    fn context(&self, options: &CallOptions) -> CallContext {
        CallContext {
            correlation_id: options
                .correlation_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            request_id: options.request_id.clone(),
            timeout: options
                .timeout
                .unwrap_or(self.config.transmission.request_timeout),
            cancel: options.cancel.clone().unwrap_or_else(CancellationToken::new),
        }
    }

    /// One logical remote call: headers, retries, envelope decoding, observers
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        ctx: &CallContext,
    ) -> Result<Option<T>, OcpiError> {
        let request_id = ctx
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let token = self.auth.read().clone();

        let mut request = HttpRequest::new(method, url.clone(), ctx.timeout)
            .header(AUTHORIZATION_HEADER, token.authorization_header())
            .header(REQUEST_ID_HEADER, request_id.clone())
            .header(CORRELATION_ID_HEADER, ctx.correlation_id.clone());
        if let Some(body) = body {
            request = request.json_body(body);
        }

        self.observers.notify_request(&RequestEvent {
            operation,
            method,
            url,
            request_id: request_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let outcome = retry::transmit(
            &self.config.transmission.retry,
            ctx.timeout,
            &ctx.cancel,
            |_| {
                let transport = Arc::clone(&self.transport);
                let request = request.clone();
                async move {
                    let response = transport.send(request).await?;
                    decode_envelope::<T>(response)
                }
            },
        )
        .await;
        let attempts = outcome.attempts();
        let result = outcome.into_result();

        self.counters.record(operation, result.is_ok());
        self.observers.notify_response(&ResponseEvent {
            operation,
            request_id,
            correlation_id: ctx.correlation_id.clone(),
            outcome: match &result {
                Ok(_) => ResponseOutcome::Success,
                Err(e) => ResponseOutcome::Failure {
                    error: e.to_string(),
                    status_code: e.status_code(),
                },
            },
            attempts,
            elapsed: started.elapsed(),
            timestamp: Utc::now(),
        });

        result
    }
}

/// Map an HTTP response onto the OCPI result model
fn decode_envelope<T: DeserializeOwned>(response: HttpResponse) -> Result<Option<T>, OcpiError> {
    if !response.is_success() {
        let envelope = serde_json::from_slice::<OcpiResponse<serde_json::Value>>(&response.body).ok();
        let message = envelope
            .as_ref()
            .and_then(|e| e.status_message.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(&response.body).trim().to_string());
        return Err(OcpiError::Http {
            status: response.status,
            status_code: envelope.map(|e| e.status_code),
            message,
        });
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let envelope: OcpiResponse<T> = serde_json::from_slice(&response.body)?;
    envelope.into_result()
}

/// Builder for `CredentialsClient`
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn PartyStore>>,
    observers: Vec<Arc<dyn RequestObserver>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
            observers: Vec::new(),
        }
    }

    /// Use `transport` instead of the reqwest one
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `store` instead of an in-memory one
    pub fn store(mut self, store: Arc<dyn PartyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<CredentialsClient, OcpiError> {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config.transmission.user_agent)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPartyStore::new()));

        let observers = ObserverList::new();
        for observer in self.observers {
            observers.add(observer);
        }

        Ok(CredentialsClient {
            auth: RwLock::new(self.config.initial_token()),
            remote_party: RwLock::new(self.config.peer.remote_party.clone()),
            config: self.config,
            transport,
            store,
            directory: EndpointDirectory::new(),
            last_registration: RwLock::new(None),
            observers,
            counters: ClientCounters::new(),
        })
    }
}
