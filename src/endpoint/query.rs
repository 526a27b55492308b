//! Query endpoints: subscription-shaped handles for GET operations.
//!
//! A [`QueryEndpoint`] continuously reflects the cache state for one
//! operation + parameter source. Consuming [`QueryEndpoint::stream`] yields
//! [`QueryStatus`] transitions:
//!
//! 1. While required path parameters are unresolved (or an `enabled`
//!    override reads false), the endpoint is `Disabled`.
//! 2. Once enabled, cached data is emitted immediately; stale or missing
//!    data triggers a fetch.
//! 3. When the cache is invalidated under the endpoint's key, or the
//!    parameter source changes the key, the query refetches.
//!
//! Parameter resolution is re-run from the source's *current* value before
//! every dispatch, so requests are built from the values at dispatch time,
//! not at construction time.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::client::{CacheEntry, Notification, QueryClient};
use crate::endpoint::{EndpointOptions, OnLoad, Refetch};
use crate::error::Error;
use crate::key::{self, QueryKey};
use crate::path::{self, ResolvedPath};
use crate::registry::OperationInfo;
use crate::source::{ParamSource, Params};
use crate::transport::{HttpTransport, RequestConfig, ResponseEnvelope};

/// The state of a query endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus<T> {
    /// Required parameters are unresolved or enablement is overridden off.
    Disabled,
    /// A fetch is in flight and no data is cached yet.
    Loading,
    /// Data is available.
    Success {
        /// The decoded body payload.
        data: T,
        /// Whether the data is stale and a refetch is due.
        is_stale: bool,
    },
    /// The last fetch failed.
    Error(String),
}

impl<T> QueryStatus<T> {
    /// The data, if available.
    pub const fn data(&self) -> Option<&T> {
        match self {
            QueryStatus::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns `true` while the endpoint is disabled.
    pub const fn is_disabled(&self) -> bool {
        matches!(self, QueryStatus::Disabled)
    }

    /// Returns `true` while a fetch is in flight without cached data.
    pub const fn is_loading(&self) -> bool {
        matches!(self, QueryStatus::Loading)
    }

    /// Returns `true` if data is available.
    pub const fn is_success(&self) -> bool {
        matches!(self, QueryStatus::Success { .. })
    }

    /// Returns `true` if the last fetch failed.
    pub const fn is_error(&self) -> bool {
        matches!(self, QueryStatus::Error(_))
    }

    /// Returns `true` if available data is stale.
    pub const fn is_stale(&self) -> bool {
        matches!(self, QueryStatus::Success { is_stale: true, .. })
    }
}

/// A reactive handle for one GET operation bound to a parameter source.
///
/// Cloning is cheap; clones share cache, parameter source, and the one-shot
/// `on_load` edge.
pub struct QueryEndpoint<T> {
    id: Arc<str>,
    info: OperationInfo,
    params: ParamSource,
    options: EndpointOptions,
    client: Arc<QueryClient>,
    transport: Arc<dyn HttpTransport>,
    defaults: RequestConfig,
    on_load: Arc<Mutex<Option<OnLoad>>>,
    loaded: Arc<AtomicBool>,
    last_key: Arc<Mutex<Option<QueryKey>>>,
    last_error: Arc<Mutex<Option<String>>>,
    _result: PhantomData<fn() -> T>,
}

impl<T> QueryEndpoint<T> {
    pub(crate) fn new(
        id: &str,
        info: OperationInfo,
        params: ParamSource,
        options: EndpointOptions,
        client: Arc<QueryClient>,
        transport: Arc<dyn HttpTransport>,
        defaults: RequestConfig,
    ) -> Self {
        let on_load = Arc::new(Mutex::new(options.on_load.clone()));
        Self {
            id: Arc::from(id),
            info,
            params,
            options,
            client,
            transport,
            defaults,
            on_load,
            loaded: Arc::new(AtomicBool::new(false)),
            last_key: Arc::new(Mutex::new(None)),
            last_error: Arc::new(Mutex::new(None)),
            _result: PhantomData,
        }
    }

    /// The operation id this endpoint is bound to.
    pub fn operation_id(&self) -> &str {
        &self.id
    }

    /// The registry info for the bound operation.
    pub const fn info(&self) -> &OperationInfo {
        &self.info
    }

    /// The parameter source's current value.
    pub fn path_params(&self) -> Option<Params> {
        self.params.get()
    }

    /// The path template substituted with the current parameter values.
    pub fn resolved_path(&self) -> ResolvedPath {
        path::resolve(&self.info.path, self.params.get().as_ref())
    }

    /// The cache key derived from the current parameter values. Parameters
    /// that are not path placeholders count as query parameters and form the
    /// key's trailing structured part.
    pub fn query_key(&self) -> QueryKey {
        let params = self.params.get();
        let query = self.query_params(params.as_ref());
        key::derive_key(&self.info.path, params.as_ref(), query.as_ref())
    }

    /// Whether the endpoint is currently enabled: every path placeholder has
    /// a defined value and no `enabled` override reads false.
    pub fn is_enabled(&self) -> bool {
        let overridden_on = self
            .options
            .enabled
            .as_ref()
            .map_or(true, |source| source.get());
        overridden_on && self.resolved_path().is_fully_resolved
    }

    /// The message of the last failed fetch, if the most recent outcome was
    /// a failure.
    pub fn error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers (or replaces) the one-shot first-success callback.
    pub fn on_load(&self, f: impl Fn(&Value) + Send + Sync + 'static) {
        *self
            .on_load
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    /// Fetches now, bypassing staleness, and returns the transport envelope
    /// unmodified. The cache receives only the body payload.
    ///
    /// Refetching ignores the `enabled` override but still requires every
    /// path placeholder to resolve.
    pub async fn refetch(&self) -> Result<ResponseEnvelope, Error> {
        self.execute().await
    }

    fn effective_stale_time(&self) -> Duration {
        self.options
            .stale_time
            .unwrap_or(self.client.config().stale_time)
    }

    /// Parameters that are not consumed by path placeholders.
    fn query_params(&self, params: Option<&Params>) -> Option<Params> {
        let params = params?;
        let names: BTreeSet<&str> = path::placeholders(&self.info.path).into_iter().collect();
        let query: Params = params
            .iter()
            .filter(|(name, _)| !names.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        (!query.is_empty()).then_some(query)
    }

    fn apply_select(&self, body: Value) -> Value {
        match &self.options.select {
            Some(select) => select(body),
            None => body,
        }
    }

    /// Fires the `on_load` edge if this is the first success since the last
    /// cold start.
    fn fire_on_load(&self, body: &Value) {
        if !self.loaded.swap(true, Ordering::SeqCst) {
            let slot = self
                .on_load
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(callback) = slot.as_ref() {
                callback(body);
            }
        }
    }

    /// Tracks the current key; a key change is a cold start and re-arms the
    /// `on_load` edge.
    fn note_key(&self, key: &QueryKey) {
        let mut last = self
            .last_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() != Some(key) {
            if last.is_some() {
                self.loaded.store(false, Ordering::SeqCst);
            }
            *last = Some(key.clone());
        }
    }

    /// A pass through the disabled state is a cold start and re-arms the
    /// `on_load` edge.
    fn note_disabled(&self) {
        self.loaded.store(false, Ordering::SeqCst);
    }

    fn set_error(&self, message: Option<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// Builds and dispatches the request from the parameter values current
    /// at this moment, writes the body through the cache, and returns the
    /// transport envelope.
    async fn execute(&self) -> Result<ResponseEnvelope, Error> {
        let params = self.params.get();
        let resolved = path::resolve(&self.info.path, params.as_ref());
        if !resolved.is_fully_resolved {
            return Err(Error::MissingPathParams {
                operation: self.id.to_string(),
                missing: path::unresolved(&self.info.path, params.as_ref()),
            });
        }
        let query = self.query_params(params.as_ref());
        let key = key::derive_key(&self.info.path, params.as_ref(), query.as_ref());
        self.note_key(&key);

        let mut config = self.defaults.merge(&self.options.request);
        config.method = Some(self.info.method);
        config.url = Some(build_url(&resolved, query.as_ref()));

        let attempts = self.options.retry.unwrap_or(0);
        let mut attempt = 0;
        loop {
            debug!(
                operation = %self.id,
                url = config.url.as_deref().unwrap_or(""),
                "dispatching query"
            );
            match self.transport.request(config.clone()).await {
                Ok(envelope) => {
                    self.client.set_query_data(key.clone(), envelope.data.clone());
                    self.set_error(None);
                    self.fire_on_load(&self.apply_select(envelope.data.clone()));
                    return Ok(envelope);
                }
                Err(err) if attempt < attempts => {
                    attempt += 1;
                    debug!(operation = %self.id, error = %err, attempt, "retrying query");
                }
                Err(err) => {
                    if let Some(handler) = &self.options.error_handler {
                        handler.handle(err.clone()).await;
                    }
                    self.set_error(Some(err.to_string()));
                    return Err(Error::Transport(err));
                }
            }
        }
    }
}

impl<T> QueryEndpoint<T>
where
    T: DeserializeOwned,
{
    /// The decoded data currently cached under the endpoint's key.
    pub fn data(&self) -> Option<T> {
        let entry = self.client.get(&self.query_key())?;
        self.decode(self.apply_select(entry.body)).ok()
    }

    /// A snapshot of the endpoint's current state.
    pub fn status(&self) -> QueryStatus<T> {
        if !self.is_enabled() {
            return QueryStatus::Disabled;
        }
        match self.client.get(&self.query_key()) {
            Some(entry) => {
                let is_stale = entry.is_stale_after(self.effective_stale_time());
                match self.decode(self.apply_select(entry.body)) {
                    Ok(data) => QueryStatus::Success { data, is_stale },
                    Err(err) => QueryStatus::Error(err.to_string()),
                }
            }
            None => match self.error() {
                Some(message) => QueryStatus::Error(message),
                None => QueryStatus::Loading,
            },
        }
    }

    /// Returns `true` while a fetch would be needed and no data is cached.
    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    /// Fetches now and decodes the (selected) body payload.
    pub async fn fetch(&self) -> Result<T, Error> {
        let envelope = self.execute().await?;
        self.decode(self.apply_select(envelope.data))
    }

    fn decode(&self, body: Value) -> Result<T, Error> {
        serde_json::from_value(body).map_err(|source| Error::Decode {
            operation: self.id.to_string(),
            source,
        })
    }

    fn cached_status(&self, entry: CacheEntry) -> QueryStatus<T> {
        let is_stale = entry.is_stale_after(self.effective_stale_time());
        let selected = self.apply_select(entry.body);
        match self.decode(selected.clone()) {
            Ok(data) => {
                self.fire_on_load(&selected);
                QueryStatus::Success { data, is_stale }
            }
            Err(err) => QueryStatus::Error(err.to_string()),
        }
    }
}

/// Internal state machine for the query stream.
enum StreamState {
    Start,
    Fetch,
    Watch { key: QueryKey },
    Idle,
}

impl<T> QueryEndpoint<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// A stream of state transitions, driven by cache notifications and
    /// parameter-cell changes. The subscription is released when the stream
    /// is dropped.
    pub fn stream(&self) -> BoxStream<'static, QueryStatus<T>> {
        let endpoint = self.clone();
        let notify = Some(endpoint.client.subscribe());
        let params_cell = endpoint.params.changes();
        let enabled_cell = endpoint
            .options
            .enabled
            .as_ref()
            .and_then(|source| source.changes());

        stream::unfold(
            (StreamState::Start, notify, params_cell, enabled_cell),
            move |(state, mut notify, mut params_cell, mut enabled_cell)| {
                let endpoint = endpoint.clone();
                async move {
                    let mut state = state;
                    loop {
                        match state {
                            StreamState::Start => {
                                if !endpoint.is_enabled() {
                                    endpoint.note_disabled();
                                    return Some((
                                        QueryStatus::Disabled,
                                        (StreamState::Idle, notify, params_cell, enabled_cell),
                                    ));
                                }
                                let key = endpoint.query_key();
                                endpoint.note_key(&key);
                                match endpoint.client.get(&key) {
                                    Some(entry) => {
                                        let status = endpoint.cached_status(entry);
                                        let next = if status.is_stale() {
                                            StreamState::Fetch
                                        } else {
                                            StreamState::Watch { key }
                                        };
                                        return Some((
                                            status,
                                            (next, notify, params_cell, enabled_cell),
                                        ));
                                    }
                                    None => {
                                        return Some((
                                            QueryStatus::Loading,
                                            (StreamState::Fetch, notify, params_cell, enabled_cell),
                                        ));
                                    }
                                }
                            }

                            StreamState::Fetch => {
                                if !endpoint.is_enabled() {
                                    endpoint.note_disabled();
                                    return Some((
                                        QueryStatus::Disabled,
                                        (StreamState::Idle, notify, params_cell, enabled_cell),
                                    ));
                                }
                                let key = endpoint.query_key();
                                let fetch = endpoint.execute();
                                tokio::pin!(fetch);
                                let status = loop {
                                    tokio::select! {
                                        result = &mut fetch => {
                                            break match result {
                                                Ok(envelope) => {
                                                    let selected =
                                                        endpoint.apply_select(envelope.data);
                                                    match endpoint.decode(selected) {
                                                        Ok(data) => QueryStatus::Success {
                                                            data,
                                                            is_stale: false,
                                                        },
                                                        Err(err) => {
                                                            QueryStatus::Error(err.to_string())
                                                        }
                                                    }
                                                }
                                                Err(err) => QueryStatus::Error(err.to_string()),
                                            };
                                        }
                                        notification = next_notification(&mut notify) => {
                                            match notification {
                                                Ok(Notification::Cancelled(prefix))
                                                    if key.starts_with(&prefix) =>
                                                {
                                                    // Fetch dropped; fall back to whatever
                                                    // the cache holds now.
                                                    break match endpoint.client.get(&key) {
                                                        Some(entry) => {
                                                            endpoint.cached_status(entry)
                                                        }
                                                        None => QueryStatus::Loading,
                                                    };
                                                }
                                                Ok(_) | Err(RecvError::Lagged(_)) => {}
                                                Err(RecvError::Closed) => {
                                                    notify = None;
                                                }
                                            }
                                        }
                                    }
                                };
                                // Drain the backlog so the fetch's own cache-write
                                // echo is not replayed; an invalidation that landed
                                // mid-fetch still forces another round.
                                let key = endpoint.query_key();
                                let mut refetch_needed = false;
                                let mut closed = false;
                                if let Some(rx) = notify.as_mut() {
                                    loop {
                                        match rx.try_recv() {
                                            Ok(Notification::Invalidated(prefix))
                                                if key.starts_with(&prefix) =>
                                            {
                                                refetch_needed = true;
                                            }
                                            Ok(_) => {}
                                            Err(TryRecvError::Empty) => break,
                                            Err(TryRecvError::Lagged(_)) => {}
                                            Err(TryRecvError::Closed) => {
                                                closed = true;
                                                break;
                                            }
                                        }
                                    }
                                }
                                if closed {
                                    notify = None;
                                }
                                let next = if refetch_needed {
                                    StreamState::Fetch
                                } else {
                                    StreamState::Watch { key }
                                };
                                return Some((status, (next, notify, params_cell, enabled_cell)));
                            }

                            StreamState::Watch { key } => {
                                if notify.is_none()
                                    && params_cell.is_none()
                                    && enabled_cell.is_none()
                                {
                                    return None;
                                }
                                tokio::select! {
                                    notification = next_notification(&mut notify) => {
                                        match notification {
                                            Ok(Notification::Invalidated(prefix))
                                                if key.starts_with(&prefix) =>
                                            {
                                                if !endpoint.is_enabled() {
                                                    endpoint.note_disabled();
                                                    return Some((
                                                        QueryStatus::Disabled,
                                                        (StreamState::Idle, notify, params_cell, enabled_cell),
                                                    ));
                                                }
                                                return Some((
                                                    QueryStatus::Loading,
                                                    (StreamState::Fetch, notify, params_cell, enabled_cell),
                                                ));
                                            }
                                            Ok(Notification::Updated(updated)) if updated == key => {
                                                if let Some(entry) = endpoint.client.get(&key) {
                                                    let status = endpoint.cached_status(entry);
                                                    return Some((
                                                        status,
                                                        (StreamState::Watch { key }, notify, params_cell, enabled_cell),
                                                    ));
                                                }
                                                state = StreamState::Watch { key };
                                            }
                                            Ok(_) => {
                                                state = StreamState::Watch { key };
                                            }
                                            Err(RecvError::Lagged(_)) => {
                                                // Missed notifications; resync from scratch.
                                                state = StreamState::Start;
                                            }
                                            Err(RecvError::Closed) => {
                                                notify = None;
                                                state = StreamState::Watch { key };
                                            }
                                        }
                                    }
                                    changed = cell_changed(&mut params_cell) => {
                                        if !changed {
                                            params_cell = None;
                                            state = StreamState::Watch { key };
                                            continue;
                                        }
                                        match endpoint.reevaluate(&key) {
                                            Reevaluation::Disabled => {
                                                return Some((
                                                    QueryStatus::Disabled,
                                                    (StreamState::Idle, notify, params_cell, enabled_cell),
                                                ));
                                            }
                                            Reevaluation::KeyChanged => {
                                                return Some((
                                                    QueryStatus::Loading,
                                                    (StreamState::Fetch, notify, params_cell, enabled_cell),
                                                ));
                                            }
                                            Reevaluation::Unchanged => {
                                                state = StreamState::Watch { key };
                                            }
                                        }
                                    }
                                    changed = cell_changed(&mut enabled_cell) => {
                                        if !changed {
                                            enabled_cell = None;
                                            state = StreamState::Watch { key };
                                            continue;
                                        }
                                        match endpoint.reevaluate(&key) {
                                            Reevaluation::Disabled => {
                                                return Some((
                                                    QueryStatus::Disabled,
                                                    (StreamState::Idle, notify, params_cell, enabled_cell),
                                                ));
                                            }
                                            Reevaluation::KeyChanged => {
                                                return Some((
                                                    QueryStatus::Loading,
                                                    (StreamState::Fetch, notify, params_cell, enabled_cell),
                                                ));
                                            }
                                            Reevaluation::Unchanged => {
                                                state = StreamState::Watch { key };
                                            }
                                        }
                                    }
                                }
                            }

                            StreamState::Idle => {
                                if notify.is_none()
                                    && params_cell.is_none()
                                    && enabled_cell.is_none()
                                {
                                    return None;
                                }
                                tokio::select! {
                                    notification = next_notification(&mut notify) => {
                                        match notification {
                                            Ok(_) | Err(RecvError::Lagged(_)) => {}
                                            Err(RecvError::Closed) => {
                                                notify = None;
                                            }
                                        }
                                    }
                                    changed = cell_changed(&mut params_cell) => {
                                        if !changed {
                                            params_cell = None;
                                        }
                                    }
                                    changed = cell_changed(&mut enabled_cell) => {
                                        if !changed {
                                            enabled_cell = None;
                                        }
                                    }
                                }
                                state = if endpoint.is_enabled() {
                                    StreamState::Start
                                } else {
                                    StreamState::Idle
                                };
                            }
                        }
                    }
                }
            },
        )
        .boxed()
    }

    fn reevaluate(&self, key: &QueryKey) -> Reevaluation {
        if !self.is_enabled() {
            self.note_disabled();
            return Reevaluation::Disabled;
        }
        let current = self.query_key();
        if current != *key {
            self.note_key(&current);
            Reevaluation::KeyChanged
        } else {
            Reevaluation::Unchanged
        }
    }
}

enum Reevaluation {
    Disabled,
    KeyChanged,
    Unchanged,
}

async fn next_notification(
    rx: &mut Option<broadcast::Receiver<Notification>>,
) -> Result<Notification, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves when the cell changes; `false` means the sender is gone.
async fn cell_changed<T>(cell: &mut Option<watch::Receiver<T>>) -> bool {
    match cell {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

fn build_url(resolved: &ResolvedPath, query: Option<&Params>) -> String {
    let Some(query) = query else {
        return resolved.url.clone();
    };
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in query {
        if let Some(rendered) = path::scalar(value) {
            serializer.append_pair(name, &rendered);
        }
    }
    let encoded = serializer.finish();
    if encoded.is_empty() {
        resolved.url.clone()
    } else {
        format!("{}?{}", resolved.url, encoded)
    }
}

impl<T> Clone for QueryEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            info: self.info.clone(),
            params: self.params.clone(),
            options: self.options.clone(),
            client: self.client.clone(),
            transport: self.transport.clone(),
            defaults: self.defaults.clone(),
            on_load: self.on_load.clone(),
            loaded: self.loaded.clone(),
            last_key: self.last_key.clone(),
            last_error: self.last_error.clone(),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for QueryEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEndpoint")
            .field("operation", &self.id)
            .field("path", &self.info.path)
            .finish_non_exhaustive()
    }
}

impl<T> Refetch for QueryEndpoint<T>
where
    T: Send + Sync + 'static,
{
    fn refetch(&self) -> BoxFuture<'static, Result<ResponseEnvelope, Error>> {
        let endpoint = self.clone();
        Box::pin(async move { QueryEndpoint::refetch(&endpoint).await })
    }

    fn operation_id(&self) -> &str {
        &self.id
    }
}
