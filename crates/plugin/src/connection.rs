//! Validated, authenticated connections to datasources.
//!
//! A live connection is a pooled HTTP client plus an immutable credential
//! snapshot. Cached connections hold their snapshot in an [`ArcSwap`]: an
//! execution loads the whole snapshot once and keeps using it even if a
//! concurrent refresh swaps in a newer version.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use conduit_core::{
    ApiKeyLocation, Authentication, AuthenticationResponse, AuthenticationType,
    DatasourceConfiguration, ExposeSecret, HttpMethod, PluginError, Property, REDACTED,
    RedactionPolicy, SecretString,
};
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::classifier::RawResponse;
use crate::command::{HttpRequestSpec, RequestBody};
use crate::config::SharedConfig;
use crate::error::TransportError;
use crate::executor::DynPluginExecutor;

/// One immutable version of a datasource's credential.
#[derive(Debug)]
pub struct CredentialSnapshot {
    version: u64,
    authentication: Option<Authentication>,
}

impl CredentialSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn authentication(&self) -> Option<&Authentication> {
        self.authentication.as_ref()
    }
}

/// Cached state for one `(plugin, datasource)` pair.
struct DatasourceConnection {
    fingerprint: u64,
    snapshot: ArcSwap<CredentialSnapshot>,
    refresh: tokio::sync::Mutex<()>,
}

/// A connection handed to one execution.
///
/// Cloning is cheap; the credential snapshot never changes for the lifetime of
/// this value.
#[derive(Debug, Clone)]
pub struct PluginConnection {
    client: Client,
    credentials: Arc<CredentialSnapshot>,
}

impl PluginConnection {
    /// A connection outside any cache, for callers managing credentials
    /// themselves.
    pub fn new(client: Client, authentication: Option<Authentication>) -> Self {
        Self {
            client,
            credentials: Arc::new(CredentialSnapshot {
                version: 0,
                authentication,
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.credentials.version
    }

    pub fn authentication(&self) -> Option<&Authentication> {
        self.credentials.authentication()
    }

    pub fn redaction_policy(&self) -> RedactionPolicy {
        RedactionPolicy::for_authentication(self.authentication())
    }

    /// The URL actually requested, including an API key sent as a query
    /// parameter.
    pub fn outbound_url(&self, spec: &HttpRequestSpec) -> Url {
        let mut url = spec.url.clone();
        if let Some(Authentication::ApiKey {
            key,
            value,
            add_to: ApiKeyLocation::QueryParams,
            ..
        }) = self.authentication()
        {
            url.query_pairs_mut()
                .append_pair(key.trim(), value.expose_secret());
        }
        url
    }

    /// Headers as they will be sent, with credential-derived values already
    /// masked. Used only for the audit snapshot.
    pub fn audit_headers(&self, spec: &HttpRequestSpec) -> Vec<Property> {
        let mut headers: Vec<Property> = spec
            .headers
            .iter()
            .filter(|h| !(is_multipart(spec) && is_content_type(&h.key)))
            .cloned()
            .collect();
        match self.authentication() {
            Some(
                Authentication::BearerToken { .. }
                | Authentication::Basic { .. }
                | Authentication::OAuth2 { .. },
            ) => headers.push(Property::new("Authorization", REDACTED)),
            Some(Authentication::ApiKey {
                key,
                add_to: ApiKeyLocation::Header,
                ..
            }) => headers.push(Property::new(key.trim(), REDACTED)),
            _ => {}
        }
        headers
    }

    /// Send exactly one request and read its response.
    ///
    /// The whole exchange, body included, is bounded by `timeout`. Dropping the
    /// returned future, or hitting the deadline, releases the underlying
    /// connection.
    pub async fn send(
        &self,
        spec: &HttpRequestSpec,
        timeout: Duration,
        max_response_size: usize,
    ) -> Result<RawResponse, TransportError> {
        let request = self.request_builder(spec);
        let exchange = async {
            let response = request.send().await?;
            read_response(response, max_response_size).await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    fn request_builder(&self, spec: &HttpRequestSpec) -> RequestBuilder {
        let mut builder = self
            .client
            .request(to_reqwest_method(spec.method), self.outbound_url(spec));

        for header in &spec.headers {
            if is_multipart(spec) && is_content_type(&header.key) {
                continue;
            }
            builder = builder.header(header.key.trim(), header.value.as_str());
        }

        builder = self.apply_authentication(builder);

        match &spec.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Text(text) => builder.body(text.clone()),
            RequestBody::FormUrlEncoded(fields) => {
                let pairs: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|p| (p.key.as_str(), p.value.as_str()))
                    .collect();
                builder.form(&pairs)
            }
            RequestBody::Multipart(fields) => {
                let form = fields
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, p| {
                        form.text(p.key.clone(), p.value.clone())
                    });
                builder.multipart(form)
            }
        }
    }

    fn apply_authentication(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.authentication() {
            None | Some(Authentication::None) => builder,
            Some(Authentication::BearerToken { bearer_token }) => {
                builder.bearer_auth(bearer_token.expose_secret())
            }
            Some(Authentication::Basic { username, password }) => {
                builder.basic_auth(username, Some(password.expose_secret()))
            }
            Some(Authentication::ApiKey {
                key,
                value,
                add_to: ApiKeyLocation::Header,
                header_prefix,
            }) => {
                let value = match header_prefix.as_deref().map(str::trim) {
                    Some(prefix) if !prefix.is_empty() => {
                        format!("{prefix} {}", value.expose_secret())
                    }
                    _ => value.expose_secret().clone(),
                };
                builder.header(key.trim(), value)
            }
            // Added to the URL by `outbound_url`.
            Some(Authentication::ApiKey { .. }) => builder,
            Some(Authentication::OAuth2 {
                authentication_response,
                ..
            }) => match authentication_response {
                Some(token) => builder.bearer_auth(token.token.expose_secret()),
                None => builder,
            },
        }
    }
}

fn is_multipart(spec: &HttpRequestSpec) -> bool {
    matches!(spec.body, RequestBody::Multipart(_))
}

fn is_content_type(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case("content-type")
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

async fn read_response(
    mut response: reqwest::Response,
    max_size: usize,
) -> Result<RawResponse, TransportError> {
    let status = response.status().as_u16();

    let mut headers = std::collections::BTreeMap::new();
    for (name, value) in response.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_owned())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_owned());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > max_size {
            return Err(TransportError::ResponseTooLarge { limit: max_size });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

/// Obtains OAuth2 access tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(
        &self,
        client: &Client,
        authentication: &Authentication,
    ) -> Result<AuthenticationResponse, PluginError>;
}

/// The OAuth2 client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentialsFetcher {
    timeout: Duration,
}

impl ClientCredentialsFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenFetcher for ClientCredentialsFetcher {
    #[instrument(skip_all)]
    async fn fetch(
        &self,
        client: &Client,
        authentication: &Authentication,
    ) -> Result<AuthenticationResponse, PluginError> {
        let Authentication::OAuth2 {
            client_id,
            client_secret,
            access_token_url,
            scope,
            ..
        } = authentication
        else {
            return Err(PluginError::invalid_configuration(
                "client-credentials grant requires an OAuth2 credential",
            ));
        };

        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.expose_secret().as_str()),
        ];
        if let Some(scope) = scope.as_deref().filter(|s| !s.trim().is_empty()) {
            form.push(("scope", scope));
        }

        let exchange = async {
            let response = client.post(access_token_url).form(&form).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| PluginError::timeout(self.timeout))?
            .map_err(|e| {
                PluginError::authentication(format!("token request failed: {e}"))
            })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "token endpoint rejected the client");
            return Err(PluginError::authentication(format!(
                "token endpoint returned status {}",
                status.as_u16()
            ))
            .with_detail(serde_json::Value::String(body)));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            PluginError::authentication(format!(
                "token endpoint returned a malformed response: {e}"
            ))
        })?;

        let issued_at = Utc::now();
        Ok(AuthenticationResponse {
            token: SecretString::new(token.access_token),
            expires_at: token
                .expires_in
                .map(|secs| issued_at + chrono::Duration::seconds(secs)),
            issued_at,
        })
    }
}

/// Result of [`ConnectionManager::connect`].
#[derive(Debug, Clone)]
pub struct Connected {
    pub connection: PluginConnection,
    /// The credential with freshly obtained OAuth2 state, for the caller to
    /// persist. `None` when nothing was refreshed.
    pub refreshed: Option<Authentication>,
}

/// Produces validated connections and amortizes them per datasource.
pub struct ConnectionManager {
    client: Client,
    token_fetcher: Arc<dyn TokenFetcher>,
    expiry_skew: chrono::Duration,
    cache: DashMap<String, Arc<DatasourceConnection>>,
    next_version: AtomicU64,
}

impl ConnectionManager {
    /// Build a manager with a pooled client configured from `config`.
    pub fn new(config: &SharedConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Build a manager around an existing client, e.g. to share its pool.
    pub fn with_client(client: Client, config: &SharedConfig) -> Self {
        Self {
            client,
            token_fetcher: Arc::new(ClientCredentialsFetcher::new(config.default_timeout())),
            expiry_skew: config.token_expiry_skew(),
            cache: DashMap::new(),
            next_version: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_token_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.token_fetcher = fetcher;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of cached datasource connections.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Check the credential against the plugin's requirement and the
    /// plugin's own rules, without any network call.
    pub fn validate(
        plugin: &dyn DynPluginExecutor,
        datasource: &DatasourceConfiguration,
    ) -> Result<(), PluginError> {
        check_authentication(plugin.auth_requirement(), datasource)?;

        let invalids = plugin.validate_datasource(datasource);
        if !invalids.is_empty() {
            let detail = serde_json::Value::Array(
                invalids
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            );
            return Err(PluginError::invalid_configuration(format!(
                "datasource is invalid: {}",
                invalids.into_iter().collect::<Vec<_>>().join("; ")
            ))
            .with_detail(detail));
        }
        Ok(())
    }

    /// Check a caller-held connection's credential snapshot against the
    /// plugin's requirement. Nothing is sent.
    pub fn validate_connection(
        plugin: &dyn DynPluginExecutor,
        connection: &PluginConnection,
    ) -> Result<(), PluginError> {
        check_credential(plugin.auth_requirement(), connection.authentication())
    }

    /// Validate the datasource and return a live connection for it, refreshing
    /// an expired OAuth2 token first.
    #[instrument(skip_all, fields(plugin = plugin.name(), datasource = datasource.id.as_deref()))]
    pub async fn connect(
        &self,
        plugin: &dyn DynPluginExecutor,
        datasource: &DatasourceConfiguration,
    ) -> Result<Connected, PluginError> {
        Self::validate(plugin, datasource)?;

        let Some(id) = datasource.id.as_deref() else {
            return self.connect_transient(datasource).await;
        };

        let entry = self.entry(plugin.name(), id, datasource);
        let refreshed = self.refresh_if_needed(&entry, false).await?;
        Ok(Connected {
            connection: PluginConnection {
                client: self.client.clone(),
                credentials: entry.snapshot.load_full(),
            },
            refreshed,
        })
    }

    /// Force a fresh credential for a cached datasource and swap it in.
    ///
    /// Executions that already hold a connection keep their old snapshot.
    #[instrument(skip_all, fields(plugin = plugin.name(), datasource = datasource.id.as_deref()))]
    pub async fn revalidate(
        &self,
        plugin: &dyn DynPluginExecutor,
        datasource: &DatasourceConfiguration,
    ) -> Result<Connected, PluginError> {
        Self::validate(plugin, datasource)?;

        let Some(id) = datasource.id.as_deref() else {
            return self.connect_transient(datasource).await;
        };

        let entry = self.entry(plugin.name(), id, datasource);
        let refreshed = self.refresh_if_needed(&entry, true).await?;
        if refreshed.is_none() {
            let current = entry.snapshot.load_full();
            entry.snapshot.store(Arc::new(CredentialSnapshot {
                version: self.bump(),
                authentication: current.authentication.clone(),
            }));
        }
        Ok(Connected {
            connection: PluginConnection {
                client: self.client.clone(),
                credentials: entry.snapshot.load_full(),
            },
            refreshed,
        })
    }

    /// Validate and connect without touching the cache.
    pub async fn connect_uncached(
        &self,
        plugin: &dyn DynPluginExecutor,
        datasource: &DatasourceConfiguration,
    ) -> Result<Connected, PluginError> {
        Self::validate(plugin, datasource)?;
        self.connect_transient(datasource).await
    }

    /// Drop the cached connection for a datasource.
    pub fn invalidate(&self, plugin: &str, datasource_id: &str) -> bool {
        let removed = self
            .cache
            .remove(&cache_key(plugin, datasource_id))
            .is_some();
        if removed {
            debug!(plugin, datasource = datasource_id, "cached connection invalidated");
        }
        removed
    }

    async fn connect_transient(
        &self,
        datasource: &DatasourceConfiguration,
    ) -> Result<Connected, PluginError> {
        let mut authentication = datasource.authentication.clone();
        let mut refreshed = None;
        if let Some(auth) = authentication.as_ref().filter(|a| self.needs_refresh(a)) {
            let updated = self.refreshed(auth).await?;
            refreshed = Some(updated.clone());
            authentication = Some(updated);
        }
        Ok(Connected {
            connection: PluginConnection {
                client: self.client.clone(),
                credentials: Arc::new(CredentialSnapshot {
                    version: 0,
                    authentication,
                }),
            },
            refreshed,
        })
    }

    fn entry(
        &self,
        plugin: &str,
        id: &str,
        datasource: &DatasourceConfiguration,
    ) -> Arc<DatasourceConnection> {
        let key = cache_key(plugin, id);
        let fingerprint = fingerprint(datasource.authentication.as_ref());

        if let Some(existing) = self.cache.get(&key) {
            if existing.fingerprint == fingerprint {
                return Arc::clone(existing.value());
            }
        }

        let fresh = Arc::new(DatasourceConnection {
            fingerprint,
            snapshot: ArcSwap::from_pointee(CredentialSnapshot {
                version: self.bump(),
                authentication: datasource.authentication.clone(),
            }),
            refresh: tokio::sync::Mutex::new(()),
        });

        let mut slot = self.cache.entry(key).or_insert_with(|| Arc::clone(&fresh));
        if slot.fingerprint != fingerprint {
            debug!(plugin, datasource = id, "credential changed, replacing cached connection");
            *slot = Arc::clone(&fresh);
        }
        Arc::clone(slot.value())
    }

    async fn refresh_if_needed(
        &self,
        entry: &DatasourceConnection,
        force: bool,
    ) -> Result<Option<Authentication>, PluginError> {
        let is_oauth = |snapshot: &CredentialSnapshot| {
            matches!(snapshot.authentication, Some(Authentication::OAuth2 { .. }))
        };

        let current = entry.snapshot.load_full();
        if !is_oauth(&current) {
            return Ok(None);
        }
        if !force && !current.authentication.as_ref().is_some_and(|a| self.needs_refresh(a)) {
            return Ok(None);
        }

        let _guard = entry.refresh.lock().await;

        // Another task may have refreshed while we waited.
        let latest = entry.snapshot.load_full();
        if latest.version != current.version && !force {
            return Ok(None);
        }
        let Some(auth) = latest.authentication.as_ref() else {
            return Ok(None);
        };

        let updated = self.refreshed(auth).await?;
        let version = self.bump();
        entry.snapshot.store(Arc::new(CredentialSnapshot {
            version,
            authentication: Some(updated.clone()),
        }));
        info!(version, "OAuth2 token refreshed");
        Ok(Some(updated))
    }

    fn needs_refresh(&self, authentication: &Authentication) -> bool {
        match authentication {
            Authentication::OAuth2 {
                authentication_response: None,
                ..
            } => true,
            Authentication::OAuth2 {
                authentication_response: Some(response),
                ..
            } => response.is_expired(Utc::now(), self.expiry_skew),
            _ => false,
        }
    }

    async fn refreshed(
        &self,
        authentication: &Authentication,
    ) -> Result<Authentication, PluginError> {
        let response = self.token_fetcher.fetch(&self.client, authentication).await?;
        let mut updated = authentication.clone();
        if let Authentication::OAuth2 {
            authentication_response,
            ..
        } = &mut updated
        {
            *authentication_response = Some(response);
        }
        Ok(updated)
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }
}

fn cache_key(plugin: &str, datasource_id: &str) -> String {
    format!("{plugin}:{datasource_id}")
}

/// Identity of a credential, ignoring token state obtained at runtime.
fn fingerprint(authentication: Option<&Authentication>) -> u64 {
    let mut stable = authentication.cloned();
    if let Some(Authentication::OAuth2 {
        authentication_response,
        ..
    }) = stable.as_mut()
    {
        *authentication_response = None;
    }
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&stable)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

/// Check that the datasource carries a usable credential of an accepted kind.
///
/// A required credential that is absent or blank is an authentication error;
/// a credential of the wrong kind is a configuration error.
pub fn check_authentication(
    accepted: &[AuthenticationType],
    datasource: &DatasourceConfiguration,
) -> Result<(), PluginError> {
    check_credential(accepted, datasource.authentication.as_ref())
}

/// [`check_authentication`] for a credential held outside a datasource, such
/// as the snapshot of a caller-supplied connection.
pub fn check_credential(
    accepted: &[AuthenticationType],
    authentication: Option<&Authentication>,
) -> Result<(), PluginError> {
    let actual =
        authentication.map_or(AuthenticationType::None, Authentication::authentication_type);
    if accepted.is_empty() {
        return authentication.map_or(Ok(()), check_credential_present);
    }

    if actual == AuthenticationType::None && !accepted.contains(&AuthenticationType::None) {
        let names: Vec<String> = accepted.iter().map(ToString::to_string).collect();
        return Err(PluginError::authentication(format!(
            "datasource has no credential; expected one of: {}",
            names.join(", ")
        )));
    }

    if !accepted.contains(&actual) {
        return Err(PluginError::invalid_configuration(format!(
            "authentication type `{actual}` is not supported by this plugin"
        )));
    }

    authentication.map_or(Ok(()), check_credential_present)
}

fn check_credential_present(authentication: &Authentication) -> Result<(), PluginError> {
    let blank = |s: &str| s.trim().is_empty();
    let missing = match authentication {
        Authentication::None => None,
        Authentication::BearerToken { bearer_token } => {
            blank(bearer_token.expose_secret()).then_some("bearer token")
        }
        Authentication::Basic { username, .. } => blank(username).then_some("username"),
        Authentication::ApiKey { key, value, .. } => {
            if blank(key) {
                Some("API key name")
            } else if blank(value.expose_secret()) {
                Some("API key value")
            } else {
                None
            }
        }
        Authentication::OAuth2 {
            client_id,
            client_secret,
            ..
        } => {
            if blank(client_id) {
                Some("client id")
            } else if blank(client_secret.expose_secret()) {
                Some("client secret")
            } else {
                None
            }
        }
    };
    match missing {
        Some(what) => Err(PluginError::authentication(format!("{what} is missing"))),
        None => Ok(()),
    }
}
