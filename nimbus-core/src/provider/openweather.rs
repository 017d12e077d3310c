use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    error::ProviderError,
    model::{Coordinates, CurrentConditions, Forecast, ForecastEntry},
    provider::{fetch_text, parse_json, status_error},
};

use super::WeatherProvider;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_current(
        &self,
        query: &[(&str, String)],
        subject: &str,
    ) -> Result<CurrentConditions, ProviderError> {
        let url = format!("{}/weather", self.base_url);
        debug!(url = %url, "Fetching OpenWeather current conditions");

        let request = self
            .http
            .get(&url)
            .query(query)
            .query(&[("units", "metric"), ("appid", self.api_key.as_str())]);
        let (status, body) = fetch_text(request).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: OwCurrentResponse = parse_json(&body, "OpenWeather current JSON")?;
        parsed.into_conditions()
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

impl OwCoord {
    fn to_coordinates(&self) -> Result<Coordinates, ProviderError> {
        Ok(Coordinates::new(self.lat, self.lon)?)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    #[serde(default)]
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    /// Metres per second with `units=metric`.
    speed: f64,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    coord: OwCoord,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    sys: OwSys,
}

impl OwCurrentResponse {
    fn into_conditions(self) -> Result<CurrentConditions, ProviderError> {
        let coordinates = self.coord.to_coordinates()?;
        let (condition_code, condition_text) = first_condition(self.weather);

        Ok(CurrentConditions {
            place_name: self.name,
            country_code: self.sys.country.unwrap_or_default(),
            temperature_celsius: self.main.temp,
            humidity_percent: self.main.humidity.min(100),
            wind_speed_kph: self.wind.speed * 3.6,
            condition_code,
            condition_text,
            coordinates,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwCity {
    coord: Option<OwCoord>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: Option<OwCity>,
    #[serde(default)]
    list: Vec<OwForecastEntry>,
}

fn first_condition(weather: Vec<OwWeather>) -> (String, String) {
    weather
        .into_iter()
        .next()
        .map(|w| (w.icon, w.description))
        .unwrap_or_else(|| (String::new(), "Unknown".to_string()))
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    #[instrument(skip(self), fields(lat = coordinates.latitude(), lon = coordinates.longitude()))]
    async fn current_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<CurrentConditions, ProviderError> {
        let query = [
            ("lat", coordinates.latitude().to_string()),
            ("lon", coordinates.longitude().to_string()),
        ];
        self.fetch_current(&query, &coordinates.to_string()).await
    }

    #[instrument(skip(self))]
    async fn current_by_name(&self, name: &str) -> Result<CurrentConditions, ProviderError> {
        self.fetch_current(&[("q", name.to_string())], name).await
    }

    #[instrument(skip(self), fields(lat = coordinates.latitude(), lon = coordinates.longitude()))]
    async fn forecast_by_coordinates(
        &self,
        coordinates: Coordinates,
    ) -> Result<Forecast, ProviderError> {
        let url = format!("{}/forecast", self.base_url);
        debug!(url = %url, "Fetching OpenWeather forecast");

        let request = self.http.get(&url).query(&[
            ("lat", coordinates.latitude().to_string()),
            ("lon", coordinates.longitude().to_string()),
            ("units", "metric".to_string()),
            ("appid", self.api_key.clone()),
        ]);
        let (status, body) = fetch_text(request).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(coordinates.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: OwForecastResponse = parse_json(&body, "OpenWeather forecast JSON")?;

        let echoed = match parsed.city.and_then(|c| c.coord) {
            Some(coord) => Some(coord.to_coordinates()?),
            None => None,
        };

        let entries = parsed
            .list
            .into_iter()
            .map(|entry| {
                let (condition_code, condition_text) = first_condition(entry.weather);
                ForecastEntry {
                    timestamp_unix_seconds: entry.dt,
                    temperature_celsius: entry.main.temp,
                    condition_code,
                    condition_text,
                }
            })
            .collect();

        Ok(Forecast { coordinates: echoed, entries })
    }
}
