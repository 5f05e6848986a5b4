use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::AppContext;
use crate::error::ServiceError;

/// Resultado del geocoder de OpenWeather.
#[derive(Debug, Clone, Deserialize)]
struct GeoResult {
    lat: f64,
    lon: f64,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    main: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    #[serde(default)]
    weather: Vec<WeatherCondition>,
    main: WeatherMain,
    name: Option<String>,
    timezone: Option<i64>,
}

/// Reporte normalizado que se cachea y se devuelve al widget.
#[derive(Debug, Serialize)]
struct WeatherReport {
    weather: String,
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    icon: String,
    city: Option<String>,
    country: Option<String>,
    state: Option<String>,
    timezone: Option<i64>,
}

fn icon_url(site_url: &str, code: &str) -> String {
    format!("{}/img/wn/{}@2x.png", site_url, code)
}

async fn geocode(ctx: &AppContext, location: &str) -> Result<GeoResult, ServiceError> {
    let url = format!("{}/geo/1.0/direct", ctx.config.openweather_api_url);
    let params = [
        ("q", location.to_string()),
        ("limit", "1".to_string()),
        ("appid", ctx.config.openweather_api_key.clone()),
    ];

    let response = ctx
        .client
        .request(Method::GET, &url, Some(&params), None, None)
        .await
        .map_err(|e| {
            warn!("geocoder falló: {}", e);
            ServiceError::NotFound("No location found".to_string())
        })?;

    let results: Vec<GeoResult> = response
        .json()
        .await
        .map_err(|_| ServiceError::Upstream("Invalid JSON response".to_string()))?;

    results
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::NotFound("No location found".to_string()))
}

async fn fetch_weather(
    ctx: &AppContext,
    lat: f64,
    lon: f64,
) -> Result<WeatherResponse, ServiceError> {
    let url = format!("{}/data/2.5/weather", ctx.config.openweather_api_url);
    let params = [
        ("lat", lat.to_string()),
        ("lon", lon.to_string()),
        ("appid", ctx.config.openweather_api_key.clone()),
    ];

    let response = ctx
        .client
        .request(Method::GET, &url, Some(&params), None, None)
        .await
        .map_err(|e| {
            warn!("consulta de clima falló: {}", e);
            ServiceError::NotFound("No weather found".to_string())
        })?;

    response
        .json()
        .await
        .map_err(|_| ServiceError::Upstream("Invalid JSON response".to_string()))
}

fn build_report(geo: &GeoResult, weather: &WeatherResponse, site_url: &str) -> Option<WeatherReport> {
    let condition = weather.weather.first()?;
    Some(WeatherReport {
        weather: condition.main.clone(),
        temp: weather.main.temp,
        temp_min: weather.main.temp_min,
        temp_max: weather.main.temp_max,
        icon: icon_url(site_url, &condition.icon),
        city: weather.name.clone(),
        country: geo.country.clone(),
        state: geo.state.clone(),
        timezone: weather.timezone,
    })
}

/// Lectura read-through del clima actual para la ubicación configurada.
/// Mismo patrón que "current playing": cache, fetch, repoblado con TTL.
pub async fn current_weather(ctx: &AppContext) -> Result<Value, ServiceError> {
    let location = ctx.config.weather_location.clone();
    let key = format!("weather-{}", location);
    if let Some(cached) = ctx.cache.get(&key) {
        return Ok(cached);
    }

    let geo = geocode(ctx, &location).await?;
    let weather = fetch_weather(ctx, geo.lat, geo.lon).await?;

    let report = build_report(&geo, &weather, &ctx.config.openweather_site_url)
        .ok_or_else(|| ServiceError::NotFound("No weather found".to_string()))?;
    let value = serde_json::to_value(&report).map_err(|e| ServiceError::Internal(e.into()))?;

    ctx.cache.set(
        key,
        value.clone(),
        Some(Duration::from_secs(ctx.config.weather_ttl_secs)),
    );

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_normalizes_first_condition() {
        let geo = GeoResult {
            lat: 52.52,
            lon: 13.40,
            state: Some("Berlin".to_string()),
            country: Some("DE".to_string()),
        };
        let weather = WeatherResponse {
            weather: vec![
                WeatherCondition {
                    main: "Clouds".to_string(),
                    icon: "04d".to_string(),
                },
                WeatherCondition {
                    main: "Mist".to_string(),
                    icon: "50d".to_string(),
                },
            ],
            main: WeatherMain {
                temp: 290.1,
                temp_min: 288.0,
                temp_max: 292.3,
            },
            name: Some("Berlin".to_string()),
            timezone: Some(7200),
        };

        let report = build_report(&geo, &weather, "https://openweathermap.org").unwrap();
        assert_eq!(report.weather, "Clouds");
        assert_eq!(
            report.icon,
            "https://openweathermap.org/img/wn/04d@2x.png"
        );
        assert_eq!(report.city.as_deref(), Some("Berlin"));
        assert_eq!(report.country.as_deref(), Some("DE"));
        assert_eq!(report.timezone, Some(7200));
    }

    #[test]
    fn test_report_without_conditions_is_none() {
        let geo = GeoResult {
            lat: 0.0,
            lon: 0.0,
            state: None,
            country: None,
        };
        let weather = WeatherResponse {
            weather: vec![],
            main: WeatherMain {
                temp: 0.0,
                temp_min: 0.0,
                temp_max: 0.0,
            },
            name: None,
            timezone: None,
        };
        assert!(build_report(&geo, &weather, "https://openweathermap.org").is_none());
    }
}
