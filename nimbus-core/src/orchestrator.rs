//! Sequencing of one weather lookup: resolve, fetch conditions, fetch the
//! forecast, cache, and fall back to the cached snapshot when fresh data
//! cannot be had.
//!
//! A run moves through [`RunPhase`]s:
//!
//! ```text
//! Idle -> Resolving -> FetchingConditions -> FetchingForecast -> Succeeded
//!              \________________\___________> Degraded | Failed
//! ```
//!
//! A by-name lookup already carries the current conditions, so it skips
//! `FetchingConditions`. A failed forecast still yields `Succeeded` with an
//! empty forecast; only a failure to get conditions falls back to the cache.
//!
//! Only the most recently triggered run may commit. Triggering a run cancels
//! the one in flight, and runs never overlap.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Config,
    cache::SnapshotCache,
    error::{FailureReason, NoDataAvailable},
    location::{LocationResolver, locator_from_config},
    model::{CurrentConditions, FavoritesList, ForecastEntry, Snapshot},
    provider::{default_provider_from_config, http_client},
};

/// What started a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// Auto-locate. When the device cannot answer and `fallback_place` is a
    /// non-blank name, that name is looked up instead.
    Device { fallback_place: Option<String> },
    /// A place name submitted by the user.
    Place(String),
}

impl LookupRequest {
    pub fn device() -> Self {
        LookupRequest::Device { fallback_place: None }
    }

    pub fn place(name: impl Into<String>) -> Self {
        LookupRequest::Place(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Resolving,
    FetchingConditions,
    FetchingForecast,
    Succeeded,
    Degraded,
    Failed,
}

/// Terminal result of a run. This is all a caller ever sees; provider and
/// location errors stop here.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Fresh conditions. The forecast is empty if it could not be fetched.
    Succeeded(Snapshot),
    /// Fresh data failed; this is the cached snapshot, marked stale.
    Degraded { snapshot: Snapshot, reason: FailureReason },
    /// Fresh data failed and nothing was cached.
    Failed(NoDataAvailable),
}

impl RunOutcome {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            RunOutcome::Succeeded(snapshot) | RunOutcome::Degraded { snapshot, .. } => Some(snapshot),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            RunOutcome::Succeeded(_) => None,
            RunOutcome::Degraded { reason, .. } => Some(*reason),
            RunOutcome::Failed(no_data) => Some(no_data.reason),
        }
    }

    pub fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Succeeded(_) => RunPhase::Succeeded,
            RunOutcome::Degraded { .. } => RunPhase::Degraded,
            RunOutcome::Failed(_) => RunPhase::Failed,
        }
    }
}

/// What the front end renders. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    Loading { sequence: u64 },
    Ready { sequence: u64, outcome: RunOutcome },
}

/// What happened to one call of [`FetchOrchestrator::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Committed(RunOutcome),
    /// A later trigger took over; this run's result was discarded.
    Superseded { sequence: u64 },
}

impl RunResult {
    pub fn outcome(&self) -> Option<&RunOutcome> {
        match self {
            RunResult::Committed(outcome) => Some(outcome),
            RunResult::Superseded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteChange {
    Added(String),
    AlreadyPresent(String),
}

#[derive(Debug, Default)]
struct TriggerState {
    sequence: u64,
    token: CancellationToken,
    last_request: Option<LookupRequest>,
}

#[derive(Debug)]
pub struct FetchOrchestrator {
    resolver: LocationResolver,
    cache: SnapshotCache,
    trigger: Mutex<TriggerState>,
    run_lock: tokio::sync::Mutex<()>,
    favorites_lock: Mutex<()>,
    state: watch::Sender<ViewState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FetchOrchestrator {
    pub fn new(resolver: LocationResolver, cache: SnapshotCache) -> Self {
        let (state, _) = watch::channel(ViewState::Idle);
        Self {
            resolver,
            cache,
            trigger: Mutex::new(TriggerState::default()),
            run_lock: tokio::sync::Mutex::new(()),
            favorites_lock: Mutex::new(()),
            state,
        }
    }

    /// Wire up the default provider, device locator and file cache from config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = default_provider_from_config(config)?;
        let locator = locator_from_config(&config.location, http_client(config.http.timeout())?)?;
        let resolver = LocationResolver::new(locator, provider, config.location.device_timeout());

        Ok(Self::new(resolver, SnapshotCache::from_config(config)?))
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Start a run, cancelling any run in flight, and wait for it to settle.
    pub async fn run(&self, request: LookupRequest) -> RunResult {
        let (sequence, token) = {
            let mut trigger = lock(&self.trigger);
            trigger.sequence += 1;
            trigger.token.cancel();
            trigger.token = CancellationToken::new();
            trigger.last_request = Some(request.clone());
            self.state.send_replace(ViewState::Loading { sequence: trigger.sequence });
            (trigger.sequence, trigger.token.clone())
        };
        debug!(sequence, ?request, "Run triggered");

        let _running = tokio::select! {
            biased;
            _ = token.cancelled() => return self.superseded(sequence),
            guard = self.run_lock.lock() => guard,
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return self.superseded(sequence),
            outcome = self.execute(&request) => outcome,
        };

        self.commit(sequence, outcome)
    }

    /// Run the last request again; auto-locate if there was none.
    pub async fn retry(&self) -> RunResult {
        let request = lock(&self.trigger)
            .last_request
            .clone()
            .unwrap_or_else(LookupRequest::device);
        self.run(request).await
    }

    pub fn favorites(&self) -> FavoritesList {
        self.cache.load_favorites()
    }

    /// The place currently shown, or before any run the cached one.
    pub fn current_place(&self) -> Option<String> {
        let shown = match &*self.state.borrow() {
            ViewState::Ready { outcome, .. } => {
                outcome.snapshot().map(|s| s.place_name().to_string())
            }
            _ => None,
        };
        shown.or_else(|| self.cache.load().map(|s| s.place_name().to_string()))
    }

    /// Add [`current_place`](Self::current_place) to the favorites. `None`
    /// when there is no place to add.
    pub fn add_current_favorite(&self) -> Option<FavoriteChange> {
        let place = self.current_place()?;

        let _guard = lock(&self.favorites_lock);
        let mut favorites = self.cache.load_favorites();
        if favorites.add(place.clone()) {
            self.cache.save_favorites(&favorites);
            info!(%place, "Added favorite");
            Some(FavoriteChange::Added(place))
        } else {
            Some(FavoriteChange::AlreadyPresent(place))
        }
    }

    fn superseded(&self, sequence: u64) -> RunResult {
        debug!(sequence, "Run superseded before completing");
        RunResult::Superseded { sequence }
    }

    fn commit(&self, sequence: u64, outcome: RunOutcome) -> RunResult {
        {
            // Checked and published under the trigger lock so a newer
            // trigger's `Loading` can't be overwritten by this result.
            let trigger = lock(&self.trigger);
            if trigger.sequence != sequence {
                warn!(sequence, "Discarding result of a superseded run");
                return RunResult::Superseded { sequence };
            }
            self.state.send_replace(ViewState::Ready { sequence, outcome: outcome.clone() });
        }

        if let RunOutcome::Succeeded(snapshot) = &outcome {
            self.cache.save(snapshot);
        }

        match &outcome {
            RunOutcome::Succeeded(s) => info!(
                sequence,
                place = %s.conditions.place_name,
                forecast_len = s.forecast.len(),
                "Fresh weather committed"
            ),
            RunOutcome::Degraded { snapshot, reason } => info!(
                sequence,
                place = %snapshot.conditions.place_name,
                %reason,
                "Showing cached weather"
            ),
            RunOutcome::Failed(no_data) => info!(sequence, reason = %no_data.reason, "No weather data"),
        }

        RunResult::Committed(outcome)
    }

    async fn execute(&self, request: &LookupRequest) -> RunOutcome {
        debug!(phase = ?RunPhase::Resolving, "Run phase");

        let conditions = match request {
            LookupRequest::Place(name) => match self.resolver.resolve_by_name(name).await {
                Ok(place) => place.conditions,
                Err(e) => {
                    warn!(error = %e, place = %name, "Place lookup failed");
                    return self.fall_back((&e).into());
                }
            },
            LookupRequest::Device { fallback_place } => match self.resolver.resolve_by_device().await {
                Ok(coordinates) => {
                    debug!(phase = ?RunPhase::FetchingConditions, %coordinates, "Run phase");
                    match self.resolver.provider().current_by_coordinates(coordinates).await {
                        Ok(conditions) => conditions,
                        Err(e) => {
                            warn!(error = %e, "Current conditions request failed");
                            return self.fall_back((&e).into());
                        }
                    }
                }
                Err(location_err) => {
                    let fallback = fallback_place.as_deref().map(str::trim).filter(|p| !p.is_empty());
                    let Some(name) = fallback else {
                        return self.fall_back((&location_err).into());
                    };
                    debug!(place = name, "Falling back to named place");
                    match self.resolver.resolve_by_name(name).await {
                        Ok(place) => place.conditions,
                        Err(e) => {
                            warn!(error = %e, place = name, "Fallback place lookup failed");
                            return self.fall_back((&e).into());
                        }
                    }
                }
            },
        };

        debug!(phase = ?RunPhase::FetchingForecast, place = %conditions.place_name, "Run phase");
        let forecast = self.fetch_forecast(&conditions).await;

        RunOutcome::Succeeded(Snapshot::fresh(conditions, forecast, Utc::now().timestamp()))
    }

    /// Forecast for the place `conditions` describe. Any failure, or a
    /// forecast the provider reports for somewhere else, gives an empty list.
    async fn fetch_forecast(&self, conditions: &CurrentConditions) -> Vec<ForecastEntry> {
        let expected = conditions.coordinates;
        match self.resolver.provider().forecast_by_coordinates(expected).await {
            Ok(forecast) => match forecast.coordinates {
                Some(actual) if !actual.is_same_place(&expected) => {
                    warn!(%expected, %actual, "Forecast is for a different place; dropping it");
                    Vec::new()
                }
                _ => forecast.entries,
            },
            Err(e) => {
                warn!(error = %e, "Forecast request failed; keeping fresh conditions only");
                Vec::new()
            }
        }
    }

    fn fall_back(&self, reason: FailureReason) -> RunOutcome {
        match self.cache.load() {
            Some(snapshot) => RunOutcome::Degraded { snapshot, reason },
            None => RunOutcome::Failed(NoDataAvailable { reason }),
        }
    }
}
