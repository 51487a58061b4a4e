//! Weather report for `!wx`.
//!
//! The report is fetched from OpenWeatherMap by the server's housekeeping tick and kept
//! in a shared cache; the command handler only ever reads the cache, so a slow API never
//! delays the routing pipeline.

use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[cfg(feature = "weather")]
use crate::config::WeatherConfig;
#[cfg(feature = "weather")]
use tokio::task::JoinHandle;

/// Cached, already formatted report.
#[derive(Debug, Clone)]
pub struct WeatherCacheEntry {
    pub fetched_at: Instant,
    pub text: String,
}

/// Shared between the fetcher and the `!wx` handler.
#[derive(Debug, Clone, Default)]
pub struct WeatherCache {
    inner: Arc<Mutex<Option<WeatherCacheEntry>>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, text: String, now: Instant) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(WeatherCacheEntry {
            fetched_at: now,
            text,
        });
    }

    pub fn get(&self) -> Option<WeatherCacheEntry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(feature = "weather")]
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct WeatherResponse {
        pub name: String,
        pub main: WeatherMain,
        pub weather: Vec<WeatherCondition>,
        pub wind: Option<WeatherWind>,
    }

    #[derive(Debug, Deserialize)]
    pub struct WeatherMain {
        pub temp: f64,
        pub humidity: i32,
        pub pressure: i32,
    }

    #[derive(Debug, Deserialize)]
    pub struct WeatherCondition {
        pub description: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct WeatherWind {
        pub speed: f64,
    }
}

#[cfg(feature = "weather")]
pub use api::WeatherResponse;

/// Format an API response as a single radio line.
#[cfg(feature = "weather")]
pub fn format_report(r: &WeatherResponse) -> String {
    let condition = r
        .weather
        .first()
        .map(|w| w.description.as_str())
        .unwrap_or("n/a");
    let mut out = format!(
        "WX {}: {}, {:.1}°C, {}% rH, {}hPa",
        r.name, condition, r.main.temp, r.main.humidity, r.main.pressure
    );
    if let Some(w) = &r.wind {
        out.push_str(&format!(", wind {:.1}m/s", w.speed));
    }
    out
}

/// Periodic fetcher feeding a [`WeatherCache`]. Fetches run in their own task.
#[cfg(feature = "weather")]
pub struct WeatherService {
    config: WeatherConfig,
    cache: WeatherCache,
    client: reqwest::Client,
    last_attempt: Option<Instant>,
    in_flight: Option<JoinHandle<()>>,
}

#[cfg(feature = "weather")]
impl WeatherService {
    pub fn new(config: WeatherConfig, cache: WeatherCache) -> Self {
        Self {
            config,
            cache,
            client: reqwest::Client::new(),
            last_attempt: None,
            in_flight: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.api_key.is_empty()
    }

    /// True when a refresh should be attempted at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        if !self.is_configured() {
            return false;
        }
        let every = std::time::Duration::from_secs(self.config.refresh_minutes.max(1) as u64 * 60);
        self.last_attempt
            .map(|t| now.saturating_duration_since(t) >= every)
            .unwrap_or(true)
    }

    /// Start a fetch in the background and return at once. The report is stored when it
    /// arrives; on failure the previous report stays cached. Returns false while the
    /// previous fetch is still running.
    pub fn spawn_refresh(&mut self, now: Instant) -> bool {
        if self.in_flight.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }
        self.last_attempt = Some(now);
        let client = self.client.clone();
        let config = self.config.clone();
        let cache = self.cache.clone();
        self.in_flight = Some(tokio::spawn(async move {
            match fetch(&client, &config).await {
                Ok(response) => {
                    let text = format_report(&response);
                    log::debug!("Weather refreshed for {}: {}", config.location, text);
                    cache.store(text, Instant::now());
                }
                Err(e) => log::warn!("Weather refresh failed: {}", e),
            }
        }));
        true
    }
}

#[cfg(feature = "weather")]
async fn fetch(client: &reqwest::Client, config: &WeatherConfig) -> anyhow::Result<WeatherResponse> {
    use anyhow::anyhow;

    let request = client.get(&config.endpoint).query(&[
        ("q", config.location.as_str()),
        ("appid", config.api_key.as_str()),
        ("units", "metric"),
    ]);
    let timeout = std::time::Duration::from_secs(config.timeout_seconds.max(1) as u64);
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| anyhow!("Request timeout after {}s", config.timeout_seconds))?
        .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow!("API returned status: {}", response.status()));
    }
    response
        .json::<WeatherResponse>()
        .await
        .map_err(|e| anyhow!("Failed to parse JSON response: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keeps_latest_report() {
        let cache = WeatherCache::new();
        assert!(cache.get().is_none());
        let now = Instant::now();
        cache.store("WX Munich: clear".into(), now);
        cache.store("WX Munich: rain".into(), now);
        assert_eq!(cache.get().map(|e| e.text), Some("WX Munich: rain".to_string()));
    }

    #[cfg(feature = "weather")]
    #[test]
    fn formats_api_response() {
        let json = r#"{"name":"Munich","main":{"temp":12.34,"humidity":71,"pressure":1013},
            "weather":[{"description":"light rain"}],"wind":{"speed":3.2}}"#;
        let r: WeatherResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            format_report(&r),
            "WX Munich: light rain, 12.3°C, 71% rH, 1013hPa, wind 3.2m/s"
        );
    }

    #[cfg(feature = "weather")]
    fn service(endpoint: String, cache: WeatherCache) -> WeatherService {
        let config = WeatherConfig {
            api_key: "k".into(),
            endpoint,
            enabled: true,
            ..WeatherConfig::default()
        };
        WeatherService::new(config, cache)
    }

    #[cfg(feature = "weather")]
    #[tokio::test]
    async fn refresh_returns_before_a_slow_api_answers() {
        // Accepts the connection and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            drop(sock);
        });

        let cache = WeatherCache::new();
        let mut svc = service(format!("http://{}/weather", addr), cache.clone());
        let now = Instant::now();
        assert!(svc.is_due(now));
        assert!(svc.spawn_refresh(now));
        assert!(!svc.is_due(now));
        // Still waiting on the first fetch.
        assert!(!svc.spawn_refresh(now));
        assert!(cache.get().is_none());
        hold.abort();
    }

    #[cfg(feature = "weather")]
    #[tokio::test]
    async fn background_refresh_fills_the_cache() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = sock.read(&mut buf).await;
            let body = r#"{"name":"Munich","main":{"temp":8.0,"humidity":80,"pressure":1009},"weather":[{"description":"fog"}]}"#;
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
        });

        let cache = WeatherCache::new();
        let mut svc = service(format!("http://{}/weather", addr), cache.clone());
        assert!(svc.spawn_refresh(Instant::now()));
        for _ in 0..100 {
            if cache.get().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(
            cache.get().map(|e| e.text),
            Some("WX Munich: fog, 8.0°C, 80% rH, 1009hPa".to_string())
        );
    }
}
