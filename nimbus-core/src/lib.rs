//! Core library for the `nimbus` weather widget.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers
//! - Device and by-name location resolution
//! - The snapshot/favorites cache
//! - The fetch orchestrator that ties them together
//!
//! It is used by `nimbus-cli`, but any front end can drive a
//! [`FetchOrchestrator`] and render the [`ViewState`] it publishes.

pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod provider;

pub use cache::{FileStore, KeyValueStore, MemoryStore, SnapshotCache};
pub use config::{Config, ProviderConfig};
pub use error::{FailureReason, LocationError, NoDataAvailable, ProviderError};
pub use location::{DeviceLocator, LocationResolver, ResolvedPlace};
pub use model::{
    ConditionCategory, Coordinates, CurrentConditions, FavoritesList, Forecast, ForecastEntry,
    Snapshot,
};
pub use orchestrator::{
    FavoriteChange, FetchOrchestrator, LookupRequest, RunOutcome, RunPhase, RunResult, ViewState,
};
pub use provider::{ProviderId, WeatherProvider};
