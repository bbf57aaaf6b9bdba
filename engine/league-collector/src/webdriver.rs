//! W3C WebDriver automation backend
//!
//! Talks to a WebDriver server (Selenium, chromedriver, geckodriver) over
//! HTTP. Only the commands the page adapters need are implemented.

use crate::config::AutomationConfig;
use crate::error::DriverError;
use crate::session::{Automation, Connector, ElementHandle};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Key under which W3C element references are returned
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Map a W3C error payload onto [`DriverError`]
fn map_error(value: &Value) -> DriverError {
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default().to_string();

    match error {
        "no such element" => DriverError::NoSuchElement { selector: message },
        "stale element reference" => DriverError::StaleElement(message),
        "timeout" | "script timeout" => DriverError::Timeout(message),
        "invalid session id" | "session not created" | "no such window" => {
            DriverError::Connection(format!("{error}: {message}"))
        }
        "invalid selector" => DriverError::InvalidSelector { selector: String::new(), reason: message },
        "unknown command" | "unsupported operation" => DriverError::Unsupported(message),
        other => DriverError::Protocol(format!("{other}: {message}")),
    }
}

fn element_ids(value: &Value) -> Result<Vec<ElementHandle>, DriverError> {
    let items = value
        .as_array()
        .ok_or_else(|| DriverError::Protocol(format!("expected element list, got {value}")))?;

    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .ok_or_else(|| DriverError::Protocol(format!("malformed element reference {item}")))
        })
        .collect()
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, DriverError> {
    let response = request.send().await?;
    let status = response.status();

    let payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("unreadable response ({status}): {e}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(map_error(&value))
    }
}

/// One WebDriver session
pub struct WebDriverClient {
    http: Client,
    session_url: String,
}

impl WebDriverClient {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.session_url, path);
        let request = self.http.request(method, &url);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };
        send(request).await
    }

    fn string_value(value: Value, what: &str) -> Result<String, DriverError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(DriverError::Protocol(format!("expected {what} string, got {other}"))),
        }
    }
}

#[async_trait::async_trait]
impl Automation for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await.map(|_| ())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/url", None).await?;
        Self::string_value(value, "url")
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementHandle>,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let path = match scope {
            Some(element) => format!("/element/{}/elements", element.0),
            None => "/elements".to_string(),
        };
        let body = json!({ "using": "css selector", "value": selector });

        match self.command(Method::POST, &path, Some(body)).await {
            Ok(value) => element_ids(&value),
            Err(DriverError::InvalidSelector { reason, .. }) => {
                Err(DriverError::InvalidSelector { selector: selector.to_string(), reason })
            }
            Err(e) => Err(e),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self.command(Method::GET, &format!("/element/{}/text", element.0), None).await?;
        Self::string_value(value, "text")
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, DriverError> {
        // textContent is a DOM property, not an attribute
        let path = if name == "textContent" {
            format!("/element/{}/property/{name}", element.0)
        } else {
            format!("/element/{}/attribute/{name}", element.0)
        };

        match self.command(Method::GET, &path, None).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(json!({}))).await.map(|_| ())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let path = format!("/element/{}/value", element.0);
        self.command(Method::POST, &path, Some(json!({ "text": text }))).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.command(Method::DELETE, "", None).await?;
        debug!("Deleted WebDriver session {}", self.session_url);
        Ok(())
    }
}

/// Opens sessions on a WebDriver server
#[derive(Debug, Default, Clone)]
pub struct WebDriverConnector;

#[async_trait::async_trait]
impl Connector for WebDriverConnector {
    async fn connect(&self, config: &AutomationConfig) -> Result<Box<dyn Automation>, DriverError> {
        let http = Client::builder()
            .timeout(config.command_timeout())
            .build()
            .map_err(|e| DriverError::Connection(format!("failed to create HTTP client: {e}")))?;

        let endpoint = config.endpoint.trim_end_matches('/');
        let body = json!({ "capabilities": { "alwaysMatch": config.capabilities } });

        let value = send(http.post(format!("{endpoint}/session")).json(&body))
            .await
            .map_err(|e| match e {
                DriverError::Connection(msg) => DriverError::Connection(msg),
                other => DriverError::Connection(format!("new session rejected: {other}")),
            })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Connection(format!("no sessionId in {value}")))?;

        info!("Opened WebDriver session {} at {}", session_id, endpoint);

        Ok(Box::new(WebDriverClient {
            http,
            session_url: format!("{endpoint}/session/{session_id}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_w3c_errors() {
        let err = map_error(&json!({"error": "no such element", "message": "#teamDetail"}));
        assert!(matches!(err, DriverError::NoSuchElement { .. }));

        let err = map_error(&json!({"error": "timeout", "message": "page load"}));
        assert!(matches!(err, DriverError::Timeout(_)));

        let err = map_error(&json!({"error": "invalid session id", "message": "gone"}));
        assert!(matches!(err, DriverError::Connection(_)));

        let err = map_error(&json!({"error": "javascript error", "message": "boom"}));
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_element_ids() {
        let value = json!([{ ELEMENT_KEY: "a1" }, { ELEMENT_KEY: "b2" }]);
        let ids = element_ids(&value).unwrap();
        assert_eq!(ids, vec![ElementHandle("a1".into()), ElementHandle("b2".into())]);

        assert!(element_ids(&json!([{"ELEMENT": "legacy"}])).is_err());
        assert!(element_ids(&json!({"not": "a list"})).is_err());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_is_connection_error() {
        let config = AutomationConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            command_timeout_ms: 500,
            ..AutomationConfig::default()
        };

        let err = WebDriverConnector.connect(&config).await.err().unwrap();
        assert!(matches!(err, DriverError::Connection(_)));
    }
}
