/*!
 * # Rate Limiting Module
 *
 * Throttles API requests per (client, endpoint) pair.
 *
 * - Sliding-window counting (current window plus a weighted share of the previous one)
 * - Exponential backoff blocks for clients that keep exceeding the limit
 * - Per-prefix overrides parsed from `prefix:limit:window_secs` lists
 * - Standard rate limit headers (X-RateLimit-*) and `Retry-After` on 429s
 *
 * State lives in a `DashMap` or in the `rate_limit_trackers` table. The
 * database backend degrades to the in-memory map when a query fails.
 *
 * ## Usage
 *
 * ```ignore
 * let limiter = RateLimiter::new(RateLimitConfig::from(&settings), RateLimitBackend::InMemory);
 * let app = Router::new()
 *     .route("/", get(handler))
 *     .layer(RateLimitLayer::from_settings(limiter, &settings));
 * ```
 */
mod policy;
mod window;

pub use policy::{
    client_key, endpoint_key, normalize_endpoint, parse_path_policies, parse_path_policy,
    PathPolicy, PolicyParseError, CLIENT_ID_HEADER,
};
pub use window::{block_duration, evaluate, Decision, LimitPolicy, WindowState};

use crate::{
    config::RateLimitSettings,
    errors::ServiceError,
    events::{Event, EventSender},
    models::rate_limit_tracker,
};
use axum::{
    extract::Request,
    http::{HeaderMap, Response},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    Set,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Numeric strings are always valid header values.
fn num_to_header_value<T: ToString>(n: T) -> http::HeaderValue {
    http::HeaderValue::from_str(&n.to_string())
        .unwrap_or_else(|_| http::HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DbErr),
}

impl From<RateLimitError> for ServiceError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::InvalidConfig(msg) => ServiceError::InternalError(msg),
            RateLimitError::Storage(e) => ServiceError::DatabaseError(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub base_block: Duration,
    pub max_block: Duration,
    pub violation_decay: Duration,
    pub enable_headers: bool,
    /// Longest window among the default and every path policy
    pub longest_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        let window_duration = Duration::from_secs(settings.window_secs);
        let (policies, _) = settings
            .path_policies
            .as_deref()
            .map(parse_path_policies)
            .unwrap_or_default();
        let longest_window = policies
            .iter()
            .map(|p| p.window_duration)
            .fold(window_duration, Duration::max);
        Self {
            requests_per_window: settings.requests_per_window,
            window_duration,
            base_block: Duration::from_secs(settings.base_block_secs),
            max_block: Duration::from_secs(settings.max_block_secs),
            violation_decay: Duration::from_secs(settings.violation_decay_secs),
            enable_headers: settings.enable_headers,
            longest_window,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.requests_per_window == 0 {
            return Err(RateLimitError::InvalidConfig(
                "requests_per_window must be at least 1".into(),
            ));
        }
        if self.window_duration.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "window duration must be positive".into(),
            ));
        }
        if self.max_block < self.base_block {
            return Err(RateLimitError::InvalidConfig(
                "max block must not be shorter than the base block".into(),
            ));
        }
        Ok(())
    }

    /// How long a tracker may sit unused before cleanup drops it. Covers
    /// the longest configured window so no policy loses its previous count.
    pub fn idle_after(&self) -> Duration {
        (self.longest_window.max(self.window_duration) * 2).max(self.violation_decay)
    }

    /// The effective limits, with a path override taking precedence.
    pub fn policy(&self, path_policy: Option<&PathPolicy>) -> LimitPolicy {
        let (limit, window) = match path_policy {
            Some(p) => (p.requests_per_window, p.window_duration),
            None => (self.requests_per_window, self.window_duration),
        };
        LimitPolicy {
            limit,
            window,
            base_block: self.base_block,
            max_block: self.max_block,
            violation_decay: self.violation_decay,
        }
    }
}

#[derive(Clone)]
pub enum RateLimitBackend {
    InMemory,
    Database(Arc<DatabaseConnection>),
}

type TrackerKey = (String, String);
type TrackerMap = Arc<DashMap<TrackerKey, WindowState>>;

#[derive(Clone)]
enum RateLimitStore {
    InMemory(TrackerMap),
    Database {
        db: Arc<DatabaseConnection>,
        fallback: TrackerMap,
    },
}

impl RateLimitStore {
    fn memory(&self) -> &TrackerMap {
        match self {
            RateLimitStore::InMemory(map) => map,
            RateLimitStore::Database { fallback, .. } => fallback,
        }
    }
}

/// A client currently serving a block.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockedClient {
    pub client_id: String,
    pub endpoint: String,
    pub blocked_until: DateTime<Utc>,
    pub violation_count: u32,
    pub retry_after_secs: u64,
}

impl BlockedClient {
    fn from_state(key: &TrackerKey, state: &WindowState, now: DateTime<Utc>) -> Option<Self> {
        let until = state.blocked_until.filter(|until| *until > now)?;
        Some(Self {
            client_id: key.0.clone(),
            endpoint: key.1.clone(),
            blocked_until: until,
            violation_count: state.violation_count,
            retry_after_secs: window::ceil_secs(
                (until - now).to_std().unwrap_or(Duration::ZERO),
            ),
        })
    }
}

fn to_db_count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn from_db_count(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

impl From<&rate_limit_tracker::Model> for WindowState {
    fn from(row: &rate_limit_tracker::Model) -> Self {
        Self {
            request_count: from_db_count(row.request_count),
            previous_count: from_db_count(row.previous_count),
            window_start: row.window_start,
            violation_count: from_db_count(row.violation_count),
            blocked_until: row.blocked_until,
            last_violation_at: row.last_violation_at,
            last_request_at: row.last_request_at,
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
    events: Option<Arc<EventSender>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let fallback: TrackerMap = Arc::new(DashMap::new());
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory(fallback),
            RateLimitBackend::Database(db) => RateLimitStore::Database { db, fallback },
        };
        Self {
            store,
            config,
            events: None,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings, db: Arc<DatabaseConnection>) -> Self {
        let backend = if settings.uses_database() {
            RateLimitBackend::Database(db)
        } else {
            RateLimitBackend::InMemory
        };
        Self::new(RateLimitConfig::from(settings), backend)
    }

    pub fn with_events(mut self, events: Arc<EventSender>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts one request for `client_id` on `endpoint`.
    pub async fn check(
        &self,
        client_id: &str,
        endpoint: &str,
        policy: &LimitPolicy,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = match &self.store {
            RateLimitStore::InMemory(map) => check_in_memory(map, client_id, endpoint, policy, now),
            RateLimitStore::Database { db, fallback } => {
                match check_in_database(db, client_id, endpoint, policy, now).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warn!(error = %e, "Rate limit store unavailable, using in-memory state");
                        counter!("sales_api_rate_limit_store_errors_total", 1);
                        check_in_memory(fallback, client_id, endpoint, policy, now)
                    }
                }
            }
        };

        if let Decision::Denied {
            newly_blocked: true,
            blocked_until,
            ..
        } = decision
        {
            counter!("sales_api_rate_limit_blocks_total", 1);
            if let Some(events) = &self.events {
                events
                    .send_or_log(Event::ClientBlocked {
                        client_id: client_id.to_string(),
                        endpoint: endpoint.to_string(),
                        until: blocked_until,
                    })
                    .await;
            }
        }
        decision
    }

    /// Clients with an unexpired block, longest block first.
    pub async fn list_blocked(&self, now: DateTime<Utc>) -> Result<Vec<BlockedClient>, RateLimitError> {
        let mut blocked: Vec<BlockedClient> = self
            .store
            .memory()
            .iter()
            .filter_map(|entry| BlockedClient::from_state(entry.key(), entry.value(), now))
            .collect();

        if let RateLimitStore::Database { db, .. } = &self.store {
            let rows = rate_limit_tracker::Entity::find()
                .filter(rate_limit_tracker::Column::BlockedUntil.gt(now))
                .all(db.as_ref())
                .await?;
            for row in rows {
                let key = (row.client_id.clone(), row.endpoint.clone());
                if blocked
                    .iter()
                    .any(|b| b.client_id == key.0 && b.endpoint == key.1)
                {
                    continue;
                }
                if let Some(client) = BlockedClient::from_state(&key, &WindowState::from(&row), now) {
                    blocked.push(client);
                }
            }
        }

        blocked.sort_by(|a, b| b.blocked_until.cmp(&a.blocked_until));
        Ok(blocked)
    }

    /// Forgets every tracker for `client_id`, lifting any block. Returns the
    /// number of trackers removed.
    pub async fn reset_client(&self, client_id: &str) -> Result<u64, RateLimitError> {
        let memory = self.store.memory();
        let before = memory.len();
        memory.retain(|key, _| key.0 != client_id);
        let mut removed = (before - memory.len()) as u64;

        if let RateLimitStore::Database { db, .. } = &self.store {
            let result = rate_limit_tracker::Entity::delete_many()
                .filter(rate_limit_tracker::Column::ClientId.eq(client_id))
                .exec(db.as_ref())
                .await?;
            removed += result.rows_affected;
        }

        info!(%client_id, removed, "Rate limit state reset");
        Ok(removed)
    }

    /// Drops trackers that are neither blocked nor recently used.
    pub async fn cleanup_idle(&self, now: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let idle_after = self.config.idle_after();
        let memory = self.store.memory();
        let before = memory.len();
        memory.retain(|_, state| !state.is_idle(now, idle_after));
        let mut removed = (before - memory.len()) as u64;

        if let RateLimitStore::Database { db, .. } = &self.store {
            let cutoff = now
                - chrono::Duration::from_std(idle_after)
                    .map_err(|e| RateLimitError::InvalidConfig(e.to_string()))?;
            let result = rate_limit_tracker::Entity::delete_many()
                .filter(rate_limit_tracker::Column::LastRequestAt.lt(cutoff))
                .filter(
                    Condition::any()
                        .add(rate_limit_tracker::Column::BlockedUntil.is_null())
                        .add(rate_limit_tracker::Column::BlockedUntil.lte(now)),
                )
                .exec(db.as_ref())
                .await?;
            removed += result.rows_affected;
        }
        Ok(removed)
    }

    pub fn tracked_entries(&self) -> usize {
        self.store.memory().len()
    }
}

fn check_in_memory(
    map: &DashMap<TrackerKey, WindowState>,
    client_id: &str,
    endpoint: &str,
    policy: &LimitPolicy,
    now: DateTime<Utc>,
) -> Decision {
    let mut entry = map
        .entry((client_id.to_string(), endpoint.to_string()))
        .or_insert_with(|| WindowState::new(now));
    evaluate(entry.value_mut(), policy, now)
}

async fn check_in_database(
    db: &DatabaseConnection,
    client_id: &str,
    endpoint: &str,
    policy: &LimitPolicy,
    now: DateTime<Utc>,
) -> Result<Decision, DbErr> {
    let existing = rate_limit_tracker::Entity::find()
        .filter(rate_limit_tracker::Column::ClientId.eq(client_id))
        .filter(rate_limit_tracker::Column::Endpoint.eq(endpoint))
        .one(db)
        .await?;

    let mut state = existing
        .as_ref()
        .map(WindowState::from)
        .unwrap_or_else(|| WindowState::new(now));
    let decision = evaluate(&mut state, policy, now);

    match existing {
        Some(row) => {
            let mut active: rate_limit_tracker::ActiveModel = row.into();
            active.request_count = Set(to_db_count(state.request_count));
            active.previous_count = Set(to_db_count(state.previous_count));
            active.window_start = Set(state.window_start);
            active.violation_count = Set(to_db_count(state.violation_count));
            active.blocked_until = Set(state.blocked_until);
            active.last_violation_at = Set(state.last_violation_at);
            active.last_request_at = Set(state.last_request_at);
            active.update(db).await?;
        }
        None => {
            rate_limit_tracker::ActiveModel {
                id: Set(Uuid::new_v4()),
                client_id: Set(client_id.to_string()),
                endpoint: Set(endpoint.to_string()),
                request_count: Set(to_db_count(state.request_count)),
                previous_count: Set(to_db_count(state.previous_count)),
                window_start: Set(state.window_start),
                violation_count: Set(to_db_count(state.violation_count)),
                blocked_until: Set(state.blocked_until),
                last_violation_at: Set(state.last_violation_at),
                last_request_at: Set(state.last_request_at),
            }
            .insert(db)
            .await?;
        }
    }
    Ok(decision)
}

fn apply_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    let _ = headers.insert("X-RateLimit-Limit", num_to_header_value(limit));
    let _ = headers.insert("X-RateLimit-Remaining", num_to_header_value(remaining));
    let _ = headers.insert("X-RateLimit-Reset", num_to_header_value(reset_secs));
}

// Layer implementation for tower
#[derive(Clone)]
pub struct RateLimitLayer {
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
    exempt_prefixes: Arc<Vec<String>>,
}

impl RateLimitLayer {
    pub fn new(rate_limiter: RateLimiter) -> Self {
        Self {
            rate_limiter,
            path_policies: Arc::new(Vec::new()),
            exempt_prefixes: Arc::new(Vec::new()),
        }
    }

    /// Builds the layer from settings; malformed path policies are logged and skipped.
    pub fn from_settings(rate_limiter: RateLimiter, settings: &RateLimitSettings) -> Self {
        let (policies, warnings) = settings
            .path_policies
            .as_deref()
            .map(parse_path_policies)
            .unwrap_or_default();
        for warning in &warnings {
            warn!("{}", warning);
        }
        if !policies.is_empty() {
            info!(count = policies.len(), "Loaded rate limit path policies");
        }
        Self::new(rate_limiter)
            .with_policies(policies)
            .with_exempt_prefixes(settings.exempt_prefixes())
    }

    pub fn with_policies(mut self, policies: Vec<PathPolicy>) -> Self {
        self.path_policies = Arc::new(policies);
        self
    }

    pub fn with_exempt_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.exempt_prefixes = Arc::new(prefixes);
        self
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            rate_limiter: self.rate_limiter.clone(),
            path_policies: self.path_policies.clone(),
            exempt_prefixes: self.exempt_prefixes.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    rate_limiter: RateLimiter,
    path_policies: Arc<Vec<PathPolicy>>,
    exempt_prefixes: Arc<Vec<String>>,
}

impl<S> tower::Service<Request> for RateLimitService<S>
where
    S: tower::Service<Request, Response = Response<axum::body::Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<axum::body::Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let rate_limiter = self.rate_limiter.clone();
        let mut inner = self.inner.clone();
        let policies = self.path_policies.clone();
        let exempt = self.exempt_prefixes.clone();

        Box::pin(async move {
            let path = request.uri().path().to_string();
            if exempt.iter().any(|prefix| path.starts_with(prefix.as_str())) {
                return inner.call(request).await;
            }

            let client = client_key(request.headers());
            let (endpoint, path_policy) = endpoint_key(&path, &policies);
            let policy = rate_limiter.config().policy(path_policy);
            let enable_headers = rate_limiter.config().enable_headers;

            match rate_limiter.check(&client, &endpoint, &policy, Utc::now()).await {
                Decision::Allowed {
                    limit,
                    remaining,
                    reset_after,
                } => {
                    counter!("sales_api_rate_limit_allowed_total", 1, "endpoint" => endpoint.clone());
                    let mut response = inner.call(request).await?;
                    if enable_headers {
                        apply_headers(
                            response.headers_mut(),
                            limit,
                            remaining,
                            window::ceil_secs(reset_after),
                        );
                    }
                    Ok(response)
                }
                denied @ Decision::Denied { limit, .. } => {
                    let retry_after_secs = denied.retry_after_secs();
                    warn!(%client, %endpoint, retry_after_secs, "Rate limit exceeded");
                    counter!("sales_api_rate_limit_denied_total", 1, "endpoint" => endpoint.clone());

                    let mut response =
                        ServiceError::RateLimited { retry_after_secs }.into_response();
                    if enable_headers {
                        apply_headers(response.headers_mut(), limit, 0, retry_after_secs);
                    }
                    Ok(response)
                }
            }
        })
    }
}

// Background cleanup task
pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        interval_timer.tick().await;
        match rate_limiter.cleanup_idle(Utc::now()).await {
            Ok(removed) => debug!(removed, "Rate limiter cleanup completed"),
            Err(e) => warn!(error = %e, "Rate limiter cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn limiter(limit: u32) -> RateLimiter {
        let config = RateLimitConfig {
            requests_per_window: limit,
            window_duration: Duration::from_secs(60),
            base_block: Duration::from_secs(30),
            max_block: Duration::from_secs(600),
            violation_decay: Duration::from_secs(3600),
            enable_headers: true,
            longest_window: Duration::from_secs(60),
        };
        RateLimiter::new(config, RateLimitBackend::InMemory)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn counters_are_per_client_and_endpoint() {
        let limiter = limiter(2);
        let policy = limiter.config().policy(None);

        assert!(limiter.check("a", "/x", &policy, at(0)).await.is_allowed());
        assert!(limiter.check("a", "/x", &policy, at(0)).await.is_allowed());
        assert!(!limiter.check("a", "/x", &policy, at(0)).await.is_allowed());

        assert!(limiter.check("a", "/y", &policy, at(0)).await.is_allowed());
        assert!(limiter.check("b", "/x", &policy, at(0)).await.is_allowed());
        assert_eq!(limiter.tracked_entries(), 3);
    }

    #[tokio::test]
    async fn blocked_clients_are_listed_and_can_be_reset() {
        let limiter = limiter(1);
        let policy = limiter.config().policy(None);
        limiter.check("desk-1", "/api/v1/sales", &policy, at(0)).await;
        limiter.check("desk-1", "/api/v1/sales", &policy, at(0)).await;
        limiter.check("desk-2", "/api/v1/sales", &policy, at(0)).await;

        let blocked = limiter.list_blocked(at(10)).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].client_id, "desk-1");
        assert_eq!(blocked[0].retry_after_secs, 20);
        assert_eq!(blocked[0].violation_count, 1);

        assert_eq!(limiter.reset_client("desk-1").await.unwrap(), 1);
        assert!(limiter.list_blocked(at(10)).await.unwrap().is_empty());
        assert!(limiter
            .check("desk-1", "/api/v1/sales", &policy, at(10))
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn cleanup_keeps_blocked_entries() {
        let limiter = limiter(1);
        let policy = limiter.config().policy(None);
        limiter.check("quiet", "/x", &policy, at(0)).await;
        limiter.check("noisy", "/x", &policy, at(3590)).await;
        limiter.check("noisy", "/x", &policy, at(3590)).await;

        let removed = limiter.cleanup_idle(at(3601)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_entries(), 1);
    }

    #[tokio::test]
    async fn cleanup_waits_for_the_longest_policy_window() {
        let settings = RateLimitSettings {
            window_secs: 60,
            violation_decay_secs: 600,
            path_policies: Some("/api/v1/reports:5:3600".to_string()),
            ..RateLimitSettings::default()
        };
        let limiter = RateLimiter::new(RateLimitConfig::from(&settings), RateLimitBackend::InMemory);
        assert_eq!(limiter.config().idle_after(), Duration::from_secs(7200));

        let reports = PathPolicy {
            prefix: "/api/v1/reports".into(),
            requests_per_window: 5,
            window_duration: Duration::from_secs(3600),
        };
        let policy = limiter.config().policy(Some(&reports));
        limiter.check("analyst", "/api/v1/reports", &policy, at(0)).await;

        // Still inside the next hour-long window, so the count must survive.
        assert_eq!(limiter.cleanup_idle(at(3700)).await.unwrap(), 0);
        assert_eq!(limiter.tracked_entries(), 1);
        assert_eq!(limiter.cleanup_idle(at(7201)).await.unwrap(), 1);
    }

    #[test]
    fn path_policy_overrides_limit_and_window() {
        let config = RateLimitConfig::default();
        let policy = PathPolicy {
            prefix: "/api/v1/reports".into(),
            requests_per_window: 7,
            window_duration: Duration::from_secs(10),
        };
        let effective = config.policy(Some(&policy));
        assert_eq!(effective.limit, 7);
        assert_eq!(effective.window, Duration::from_secs(10));
        assert_eq!(effective.base_block, config.base_block);
    }

    #[test]
    fn config_validation() {
        let mut config = RateLimitConfig::default();
        assert!(config.validate().is_ok());
        config.max_block = Duration::ZERO;
        assert_matches!(config.validate(), Err(RateLimitError::InvalidConfig(_)));
    }
}
