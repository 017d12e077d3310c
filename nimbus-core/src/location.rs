//! Turning "where am I" or a typed place name into coordinates.

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{
    config::LocationConfig,
    error::{LocationError, ProviderError},
    model::{Coordinates, CurrentConditions},
    provider::WeatherProvider,
};

/// The platform's "current position" capability.
#[async_trait]
pub trait DeviceLocator: Send + Sync + Debug {
    async fn locate(&self) -> Result<Coordinates, LocationError>;
}

/// A locator for a user who declined to share their position.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeniedLocator;

#[async_trait]
impl DeviceLocator for DeniedLocator {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::PermissionDenied)
    }
}

/// Always answers the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator(pub Coordinates);

#[async_trait]
impl DeviceLocator for FixedLocator {
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Approximate position from the public IP address (ip-api.com JSON format).
#[derive(Debug, Clone)]
pub struct IpLocator {
    http: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLocator {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }
}

#[async_trait]
impl DeviceLocator for IpLocator {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn locate(&self) -> Result<Coordinates, LocationError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LocationError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LocationError::Unavailable(format!(
                "lookup returned HTTP {}",
                response.status()
            )));
        }

        let body: IpLookupResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Unavailable(format!("unreadable lookup response: {e}")))?;

        if body.status != "success" {
            let reason = body.message.unwrap_or_else(|| body.status.clone());
            return Err(LocationError::Unavailable(reason));
        }

        match (body.lat, body.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon)
                .map_err(|e| LocationError::Unavailable(e.to_string())),
            _ => Err(LocationError::Unavailable("lookup response had no position".into())),
        }
    }
}

/// Build the device locator described by `[location]`.
pub fn locator_from_config(
    config: &LocationConfig,
    http: Client,
) -> anyhow::Result<Arc<dyn DeviceLocator>> {
    if !config.allow_device {
        return Ok(Arc::new(DeniedLocator));
    }
    if let Some(coordinates) = config.fixed_coordinates()? {
        return Ok(Arc::new(FixedLocator(coordinates)));
    }
    Ok(Arc::new(IpLocator::new(http, config.lookup_url.clone())))
}

/// Result of a by-name lookup. The provider answers a search with the current
/// conditions for the match, so those are kept instead of fetched again.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub coordinates: Coordinates,
    pub canonical_place_name: String,
    pub conditions: CurrentConditions,
}

#[derive(Debug, Clone)]
pub struct LocationResolver {
    locator: Arc<dyn DeviceLocator>,
    provider: Arc<dyn WeatherProvider>,
    device_timeout: Duration,
}

impl LocationResolver {
    pub fn new(
        locator: Arc<dyn DeviceLocator>,
        provider: Arc<dyn WeatherProvider>,
        device_timeout: Duration,
    ) -> Self {
        Self { locator, provider, device_timeout }
    }

    /// Ask the device for its position. No answer within the timeout counts
    /// as `Unavailable`.
    pub async fn resolve_by_device(&self) -> Result<Coordinates, LocationError> {
        match tokio::time::timeout(self.device_timeout, self.locator.locate()).await {
            Ok(Ok(coordinates)) => {
                debug!(%coordinates, "Device location resolved");
                Ok(coordinates)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Device location failed");
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?self.device_timeout, "Device location timed out");
                Err(LocationError::Unavailable(format!(
                    "no answer within {}s",
                    self.device_timeout.as_secs_f32()
                )))
            }
        }
    }

    /// Look a place up by name. Blank names are `NotFound` without a request.
    pub async fn resolve_by_name(&self, place_name: &str) -> Result<ResolvedPlace, ProviderError> {
        let place_name = place_name.trim();
        if place_name.is_empty() {
            return Err(ProviderError::NotFound(String::new()));
        }

        let conditions = self.provider.current_by_name(place_name).await?;
        debug!(
            query = place_name,
            canonical = %conditions.place_name,
            coordinates = %conditions.coordinates,
            "Place resolved"
        );

        Ok(ResolvedPlace {
            coordinates: conditions.coordinates,
            canonical_place_name: conditions.place_name.clone(),
            conditions,
        })
    }

    pub fn provider(&self) -> &Arc<dyn WeatherProvider> {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Forecast;

    #[derive(Debug)]
    struct SlowLocator;

    #[async_trait]
    impl DeviceLocator for SlowLocator {
        async fn locate(&self) -> Result<Coordinates, LocationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(LocationError::Unavailable("unreachable".into()))
        }
    }

    #[derive(Debug)]
    struct EchoProvider;

    #[async_trait]
    impl WeatherProvider for EchoProvider {
        async fn current_by_coordinates(
            &self,
            _coordinates: Coordinates,
        ) -> Result<CurrentConditions, ProviderError> {
            Err(ProviderError::Network("not used".into()))
        }

        async fn current_by_name(&self, name: &str) -> Result<CurrentConditions, ProviderError> {
            if name != "springfield" {
                return Err(ProviderError::NotFound(name.to_string()));
            }
            Ok(CurrentConditions {
                place_name: "Springfield".into(),
                country_code: "US".into(),
                temperature_celsius: 21.0,
                humidity_percent: 40,
                wind_speed_kph: 7.2,
                condition_code: "01d".into(),
                condition_text: "clear sky".into(),
                coordinates: Coordinates::new(39.8, -89.65).unwrap(),
            })
        }

        async fn forecast_by_coordinates(
            &self,
            _coordinates: Coordinates,
        ) -> Result<Forecast, ProviderError> {
            Err(ProviderError::Network("not used".into()))
        }
    }

    fn resolver(locator: Arc<dyn DeviceLocator>) -> LocationResolver {
        LocationResolver::new(locator, Arc::new(EchoProvider), Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn device_timeout_is_unavailable() {
        let err = resolver(Arc::new(SlowLocator)).resolve_by_device().await.unwrap_err();
        assert!(matches!(err, LocationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn denied_locator_reports_permission_denied() {
        let err = resolver(Arc::new(DeniedLocator)).resolve_by_device().await.unwrap_err();
        assert_eq!(err, LocationError::PermissionDenied);
    }

    #[tokio::test]
    async fn fixed_locator_answers_its_position() {
        let here = Coordinates::new(1.0, 2.0).unwrap();
        let got = resolver(Arc::new(FixedLocator(here))).resolve_by_device().await.unwrap();
        assert_eq!(got, here);
    }

    #[tokio::test]
    async fn name_lookup_keeps_provider_canonical_name() {
        let place = resolver(Arc::new(DeniedLocator))
            .resolve_by_name("  springfield ")
            .await
            .unwrap();

        assert_eq!(place.canonical_place_name, "Springfield");
        assert_eq!(place.coordinates, place.conditions.coordinates);
    }

    #[tokio::test]
    async fn blank_name_is_not_found() {
        let err = resolver(Arc::new(DeniedLocator)).resolve_by_name("   ").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn config_without_permission_builds_denied_locator() {
        let config = LocationConfig { allow_device: false, ..Default::default() };
        let locator = locator_from_config(&config, Client::new()).unwrap();
        assert!(format!("{locator:?}").contains("DeniedLocator"));
    }
}
