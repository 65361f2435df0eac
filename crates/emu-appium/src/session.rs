//! W3C WebDriver session handling against an Appium server

use emu_types::DeviceDescriptor;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{AppiumError, Result};

/// An attached automation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppiumSession {
    pub id: String,
    pub device_name: String,
}

/// HTTP client for one Appium server.
#[derive(Debug, Clone)]
pub struct AppiumClient {
    http: reqwest::Client,
    base_url: String,
    port: u16,
}

impl AppiumClient {
    /// Client for a server listening on `localhost:<port>`
    pub fn new(port: u16) -> Result<Self> {
        Self::with_base_url(&format!("http://localhost:{}", port), port)
    }

    pub fn with_base_url(base_url: &str, port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .no_proxy()
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            port,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether `GET /status` answers with a success code
    pub async fn is_ready(&self) -> bool {
        match self.http.get(format!("{}/status", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(port = self.port, error = %e, "status probe failed");
                false
            }
        }
    }

    pub async fn wait_until_ready(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if self.is_ready().await {
                debug!(port = self.port, elapsed = ?start.elapsed(), "Appium server ready");
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }

        Err(AppiumError::NotReady {
            port: self.port,
            timeout,
        })
    }

    pub async fn create_session(&self, device: &DeviceDescriptor) -> Result<AppiumSession> {
        let response = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(&session_capabilities(device))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Proxies and misrouted ports answer with HTML, not a WebDriver body.
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(AppiumError::Session(webdriver_error_message(&body, status)));
        }

        let body: Value = response.json().await?;

        let id = body
            .pointer("/value/sessionId")
            .or_else(|| body.get("sessionId"))
            .and_then(Value::as_str)
            .ok_or_else(|| AppiumError::Session("response carried no session id".to_owned()))?
            .to_owned();

        info!(device = %device.device_name, session = %id, "automation session attached");
        Ok(AppiumSession {
            id,
            device_name: device.device_name.clone(),
        })
    }

    pub async fn delete_session(&self, session: &AppiumSession) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/session/{}", self.base_url, session.id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(AppiumError::Session(webdriver_error_message(&body, status)));
        }

        info!(device = %session.device_name, session = %session.id, "automation session ended");
        Ok(())
    }
}

/// New-session payload for a device.
pub fn session_capabilities(device: &DeviceDescriptor) -> Value {
    json!({
        "capabilities": {
            "alwaysMatch": {
                "platformName": device.platform,
                "appium:platformVersion": device.platform_version,
                "appium:deviceName": device.device_name,
                "appium:automationName": device.automation_framework,
            },
            "firstMatch": [{}],
        }
    })
}

fn webdriver_error_message(body: &Value, status: reqwest::StatusCode) -> String {
    let error = body.pointer("/value/error").and_then(Value::as_str);
    let message = body.pointer("/value/message").and_then(Value::as_str);

    match (error, message) {
        (Some(error), Some(message)) => format!("{} ({}): {}", error, status, message),
        (Some(error), None) => format!("{} ({})", error, status),
        _ => format!("server answered {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_payload() {
        let device = DeviceDescriptor::new("http://localhost:4725", "Android", "11.0", "dev1", "UiAutomator2");
        let caps = session_capabilities(&device);

        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["platformName"], "Android");
        assert_eq!(always["appium:platformVersion"], "11.0");
        assert_eq!(always["appium:deviceName"], "dev1");
        assert_eq!(always["appium:automationName"], "UiAutomator2");
    }

    #[test]
    fn test_error_message_from_webdriver_body() {
        let body = json!({
            "value": {
                "error": "session not created",
                "message": "Could not find a connected Android device"
            }
        });
        let message = webdriver_error_message(&body, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.starts_with("session not created"));
        assert!(message.contains("Could not find a connected Android device"));

        let message = webdriver_error_message(&Value::Null, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(message, "server answered 404 Not Found");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = AppiumClient::with_base_url("http://127.0.0.1:4723/", 4723).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:4723");
    }
}
