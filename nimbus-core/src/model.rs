use serde::{Deserialize, Serialize};

use crate::error::InvalidCoordinates;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = InvalidCoordinates;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinates {
    /// Degrees two coordinate pairs may differ by and still name the same place.
    /// Providers echo coordinates back rounded to a few decimals.
    pub const SAME_PLACE_TOLERANCE: f64 = 0.01;

    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinates> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidCoordinates { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn is_same_place(&self, other: &Coordinates) -> bool {
        (self.latitude - other.latitude).abs() <= Self::SAME_PLACE_TOLERANCE
            && (self.longitude - other.longitude).abs() <= Self::SAME_PLACE_TOLERANCE
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// One point-in-time reading for a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Canonical place name as returned by the provider.
    pub place_name: String,
    pub country_code: String,
    pub temperature_celsius: f64,
    pub humidity_percent: u8,
    pub wind_speed_kph: f64,
    pub condition_code: String,
    pub condition_text: String,
    pub coordinates: Coordinates,
}

/// One step of a short-term forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub timestamp_unix_seconds: i64,
    pub temperature_celsius: f64,
    pub condition_code: String,
    pub condition_text: String,
}

/// Forecast entries as returned by a provider, in provider order.
///
/// `coordinates` is the location the provider says the forecast is for, when
/// it reports one.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub coordinates: Option<Coordinates>,
    pub entries: Vec<ForecastEntry>,
}

/// The unit handed to the UI and persisted to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub conditions: CurrentConditions,
    pub forecast: Vec<ForecastEntry>,
    pub captured_at_unix_seconds: i64,
    pub is_stale: bool,
}

impl Snapshot {
    /// A snapshot built from a fresh provider response.
    pub fn fresh(
        conditions: CurrentConditions,
        forecast: Vec<ForecastEntry>,
        captured_at_unix_seconds: i64,
    ) -> Self {
        Self {
            conditions,
            forecast,
            captured_at_unix_seconds,
            is_stale: false,
        }
    }

    pub fn into_stale(mut self) -> Self {
        self.is_stale = true;
        self
    }

    pub fn place_name(&self) -> &str {
        &self.conditions.place_name
    }
}

/// Saved place names. Insertion order is kept and duplicates (exact,
/// case-sensitive match) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FavoritesList {
    places: Vec<String>,
}

impl FavoritesList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the place was already present.
    pub fn add(&mut self, place: impl Into<String>) -> bool {
        let place = place.into();
        if self.contains(&place) {
            return false;
        }
        self.places.push(place);
        true
    }

    pub fn contains(&self, place: &str) -> bool {
        self.places.iter().any(|p| p == place)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.places.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl From<Vec<String>> for FavoritesList {
    fn from(places: Vec<String>) -> Self {
        let mut list = Self::new();
        for place in places {
            list.add(place);
        }
        list
    }
}

impl From<FavoritesList> for Vec<String> {
    fn from(list: FavoritesList) -> Self {
        list.places
    }
}

/// Display category for a provider condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionCategory {
    Clear,
    PartlyCloudy,
    #[default]
    Cloudy,
    Rain,
    Thunderstorm,
    Snow,
    Mist,
}

impl ConditionCategory {
    /// Map a provider condition code to a category.
    ///
    /// Accepts OpenWeather icon codes (`"01d"`, `"10n"`, ...) and WeatherAPI
    /// numeric condition codes (`"1000"`, `"1189"`, ...). Anything else is
    /// `Cloudy`.
    pub fn from_condition_code(code: &str) -> Self {
        let code = code.trim();
        if code.len() == 4 {
            if let Ok(numeric) = code.parse::<u16>() {
                return Self::from_weatherapi_code(numeric);
            }
        }
        Self::from_openweather_icon(code)
    }

    fn from_openweather_icon(icon: &str) -> Self {
        match icon.get(..2) {
            Some("01") => Self::Clear,
            Some("02") => Self::PartlyCloudy,
            Some("03") | Some("04") => Self::Cloudy,
            Some("09") | Some("10") => Self::Rain,
            Some("11") => Self::Thunderstorm,
            Some("13") => Self::Snow,
            Some("50") => Self::Mist,
            _ => Self::default(),
        }
    }

    fn from_weatherapi_code(code: u16) -> Self {
        match code {
            1000 => Self::Clear,
            1003 => Self::PartlyCloudy,
            1006 | 1009 => Self::Cloudy,
            1030 | 1135 | 1147 => Self::Mist,
            1063 | 1072 | 1150 | 1153 | 1168 | 1171 | 1180..=1201 | 1240..=1246 => Self::Rain,
            1066 | 1069 | 1114 | 1117 | 1204..=1237 | 1249..=1264 => Self::Snow,
            1087 | 1273..=1282 => Self::Thunderstorm,
            _ => Self::default(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly cloudy",
            Self::Cloudy => "Cloudy",
            Self::Rain => "Rain",
            Self::Thunderstorm => "Thunderstorm",
            Self::Snow => "Snow",
            Self::Mist => "Mist",
        }
    }
}
