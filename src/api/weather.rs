//! Current conditions from the third-party weather API.
//!
//! Unlike the safety backend, this API signals failure with HTTP status codes,
//! so anything other than 200 is treated as an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::envelope::message_of_bytes;
use super::error::{ApiError, ApiResult};
use super::transport::{HttpRequest, Method, Transport};
use crate::config::WeatherConfig;

const WEATHER_FAILED: &str = "An error occurred while fetching weather data.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: u32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: f64,
    #[serde(default)]
    pub sea_level: Option<f64>,
    #[serde(default)]
    pub grnd_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
    #[serde(default)]
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clouds {
    pub all: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunTimes {
    #[serde(default)]
    pub country: Option<String>,
    pub sunrise: i64,
    pub sunset: i64,
}

/// Current weather at a coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub coord: Coord,
    pub weather: Vec<Condition>,
    #[serde(default)]
    pub base: String,
    pub main: MainReadings,
    #[serde(default)]
    pub visibility: Option<u32>,
    pub wind: Wind,
    pub clouds: Clouds,
    pub dt: i64,
    pub sys: SunTimes,
    pub timezone: i32,
    pub id: u64,
    pub name: String,
    pub cod: u32,
}

impl WeatherReport {
    /// Short description of the first reported condition.
    pub fn summary(&self) -> Option<&str> {
        self.weather.first().map(|c| c.description.as_str())
    }
}

/// Client for the current-weather API.
pub struct WeatherClient {
    base_url: String,
    units: String,
    transport: Arc<dyn Transport>,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            units: config.units.clone(),
            transport,
        }
    }

    /// Fetch current conditions at (`lat`, `lon`).
    pub async fn fetch_weather(&self, lat: f64, lon: f64, api_key: &str) -> ApiResult<WeatherReport> {
        let request = HttpRequest::new(Method::Get, &self.base_url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .query("lat", lat)
            .query("lon", lon)
            .query("appid", api_key)
            .query("units", &self.units);

        let response = self.transport.send(request).await.map_err(|e| {
            warn!(error = %e, "Weather request failed");
            ApiError::network(None, WEATHER_FAILED)
        })?;

        if !response.is_ok() {
            let reason = message_of_bytes(&response.body)
                .or_else(|| response.reason.clone())
                .unwrap_or_else(|| response.status.to_string());
            return Err(ApiError::Application(format!(
                "Error fetching weather data: {}",
                reason
            )));
        }

        let report: WeatherReport = serde_json::from_slice(&response.body).map_err(|e| {
            debug!(error = %e, "Weather response did not match the expected shape");
            ApiError::network(message_of_bytes(&response.body), WEATHER_FAILED)
        })?;
        debug!(place = %report.name, "Fetched weather");
        Ok(report)
    }
}
