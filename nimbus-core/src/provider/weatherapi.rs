use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    error::ProviderError,
    model::{Coordinates, CurrentConditions, Forecast, ForecastEntry},
    provider::{fetch_text, parse_json, status_error},
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// WeatherAPI.com error code for "No matching location found."
const NO_MATCHING_LOCATION: u32 = 1006;

/// Days requested from forecast.json; hourly entries of all days are returned.
const FORECAST_DAYS: u8 = 2;

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), http }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_current(&self, q: &str) -> Result<CurrentConditions, ProviderError> {
        let url = format!("{}/current.json", self.base_url);
        debug!(url = %url, "Fetching WeatherAPI current conditions");

        let request = self.http.get(&url).query(&[("key", self.api_key.as_str()), ("q", q)]);
        let (status, body) = fetch_text(request).await?;

        if !status.is_success() {
            return Err(error_from_body(status, &body, q));
        }

        let parsed: WaResponse = parse_json(&body, "WeatherAPI current JSON")?;
        let coordinates = parsed.location.to_coordinates()?;

        Ok(CurrentConditions {
            place_name: parsed.location.name,
            // WeatherAPI reports the country by name only.
            country_code: parsed.location.country,
            temperature_celsius: parsed.current.temp_c,
            humidity_percent: parsed.current.humidity.min(100),
            wind_speed_kph: parsed.current.wind_kph,
            condition_code: parsed.current.condition.code.to_string(),
            condition_text: parsed.current.condition.text,
            coordinates,
        })
    }
}

/// Map a non-success response. WeatherAPI answers 400 with code 1006 for
/// unknown places.
fn error_from_body(status: reqwest::StatusCode, body: &str, q: &str) -> ProviderError {
    match serde_json::from_str::<WaErrorResponse>(body) {
        Ok(err) if err.error.code == NO_MATCHING_LOCATION => ProviderError::NotFound(q.to_string()),
        _ => status_error(status, body),
    }
}

fn coordinate_query(coordinates: Coordinates) -> String {
    format!("{},{}", coordinates.latitude(), coordinates.longitude())
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
}

impl WaLocation {
    fn to_coordinates(&self) -> Result<Coordinates, ProviderError> {
        Ok(Coordinates::new(self.lat, self.lon)?)
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: u8,
    wind_kph: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaForecastHour {
    time_epoch: i64,
    temp_c: f64,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    #[serde(default)]
    hour: Vec<WaForecastHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    #[serde(default)]
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    location: Option<WaLocation>,
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaErrorDetail {
    code: u32,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaErrorDetail,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    #[instrument(skip(self), fields(lat = coordinates.latitude(), lon = coordinates.longitude()))]
    async fn current_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<CurrentConditions, ProviderError> {
        self.fetch_current(&coordinate_query(coordinates)).await
    }

    #[instrument(skip(self))]
    async fn current_by_name(&self, name: &str) -> Result<CurrentConditions, ProviderError> {
        self.fetch_current(name).await
    }

    #[instrument(skip(self), fields(lat = coordinates.latitude(), lon = coordinates.longitude()))]
    async fn forecast_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<Forecast, ProviderError> {
        let url = format!("{}/forecast.json", self.base_url);
        debug!(url = %url, "Fetching WeatherAPI forecast");

        let q = coordinate_query(coordinates);
        let days = FORECAST_DAYS.to_string();
        let request = self.http.get(&url).query(&[
            ("key", self.api_key.as_str()),
            ("q", q.as_str()),
            ("days", days.as_str()),
        ]);
        let (status, body) = fetch_text(request).await?;

        if !status.is_success() {
            return Err(error_from_body(status, &body, &q));
        }

        let parsed: WaForecastResponse = parse_json(&body, "WeatherAPI forecast JSON")?;

        let echoed = match &parsed.location {
            Some(location) => Some(location.to_coordinates()?),
            None => None,
        };

        let entries = parsed
            .forecast
            .forecastday
            .into_iter()
            .flat_map(|day| day.hour)
            .map(|hour| ForecastEntry {
                timestamp_unix_seconds: hour.time_epoch,
                temperature_celsius: hour.temp_c,
                condition_code: hour.condition.code.to_string(),
                condition_text: hour.condition.text,
            })
            .collect();

        Ok(Forecast { coordinates: echoed, entries })
    }
}
