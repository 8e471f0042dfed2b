//! Elasticsearch REST endpoint.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};
use strata_core::{Connector, ConnectorContext, DaoError, ErrorKey, Result};
use tracing::debug;

/// Status and decoded body of one Elasticsearch call
#[derive(Debug, Clone)]
pub struct EsResponse {
    pub status: StatusCode,
    /// `Null` when the body is empty or not JSON
    pub body: Value,
}

impl EsResponse {
    /// Fail unless the status is one of `accepted`
    pub fn check_status(self, accepted: &[u16]) -> Result<Self> {
        if accepted.contains(&self.status.as_u16()) {
            return Ok(self);
        }
        let reason = self
            .body
            .pointer("/error/reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.body.to_string());
        Err(DaoError::technical(
            ErrorKey::IndexRequestError,
            format!("ElasticSearch answered {}: {reason}", self.status),
        ))
    }
}

pub struct ElasticHttpConnector {
    client: Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
    version: RwLock<Option<String>>,
}

impl ElasticHttpConnector {
    /// Build from the index options (`host`, `port`, `https`, `user`, `password`)
    pub fn from_context(context: &ConnectorContext) -> Result<Self> {
        let options = context.own_options();
        let host = options
            .get_str("host")
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DaoError::missing_field("ElasticSearch: \"options.host\" is required"))?;
        let port = match options.get("port") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => {
                return Err(DaoError::missing_field(
                    "ElasticSearch: \"options.port\" is required",
                ))
            }
        };
        let scheme = if options.get_bool("https").unwrap_or(false) {
            "https"
        } else {
            "http"
        };

        let client = Client::builder()
            .connect_timeout(context.connect_timeout)
            .build()
            .map_err(|e| {
                DaoError::technical(
                    ErrorKey::Critical,
                    format!("Cannot build the ElasticSearch HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            url: format!("{scheme}://{host}:{port}"),
            user: options.get_str("user").map(str::to_string),
            password: options.get_str("password").map(str::to_string),
            version: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Version reported by the last successful connection
    pub fn version(&self) -> Option<String> {
        self.version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &self.user {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    /// Send `body` as JSON; any status is returned
    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<EsResponse> {
        debug!(%method, path, "elasticsearch request");
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        execute(builder).await
    }

    /// Send newline-delimited JSON to `_bulk`
    pub async fn bulk(&self, path: &str, lines: String) -> Result<EsResponse> {
        debug!(path, bytes = lines.len(), "elasticsearch bulk");
        let builder = self
            .request(Method::POST, path)
            .header("Content-Type", "application/x-ndjson")
            .body(lines);
        execute(builder).await
    }

    async fn root(&self) -> Result<Value> {
        Ok(self.send(Method::GET, "", None).await?.check_status(&[200])?.body)
    }
}

async fn execute(builder: reqwest::RequestBuilder) -> Result<EsResponse> {
    let response = builder.send().await.map_err(|e| {
        DaoError::technical(
            ErrorKey::IndexUnreachable,
            format!("Cannot reach ElasticSearch: {e}"),
        )
    })?;
    let status = response.status();
    let text = response.text().await.map_err(|e| {
        DaoError::technical(
            ErrorKey::UnexpectedResponse,
            format!("Failed to read the ElasticSearch response: {e}"),
        )
    })?;
    let body = serde_json::from_str(&text).unwrap_or(Value::Null);
    Ok(EsResponse { status, body })
}

#[async_trait]
impl Connector for ElasticHttpConnector {
    async fn connect(&self) -> Result<String> {
        let root = self.root().await.map_err(|e| {
            debug!(error = %e, "elasticsearch connection failed");
            DaoError::technical(ErrorKey::IndexUnreachable, "Cannot connect to ElasticSearch.")
        })?;
        let version = root
            .pointer("/version/number")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DaoError::technical(ErrorKey::Critical, "Cannot get ElasticSearch version.")
            })?
            .to_string();

        *self.version.write().unwrap_or_else(PoisonError::into_inner) = Some(version.clone());
        Ok(version)
    }

    async fn disconnect(&self) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn check_up(&self) -> Result<()> {
        self.root().await.map(|_| ()).map_err(|_| {
            DaoError::technical(ErrorKey::IndexUnreachable, "Cannot reach ElasticSearch.")
        })
    }

    async fn store_id(&self) -> Result<String> {
        let root = self.root().await?;
        ["/cluster_uuid", "/cluster_name"]
            .iter()
            .find_map(|pointer| root.pointer(pointer).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                DaoError::technical(
                    ErrorKey::UnexpectedResponse,
                    "ElasticSearch did not report a cluster id",
                )
            })
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strata_core::DaoOptions;

    fn context(index: DaoOptions) -> ConnectorContext {
        ConnectorContext::index(DaoOptions::new(), index, Duration::from_secs(1))
    }

    #[test]
    fn test_url_from_options() {
        let options = DaoOptions::new()
            .with("host", "search.local")
            .with("port", 9243)
            .with("https", true);
        let connector = ElasticHttpConnector::from_context(&context(options)).unwrap();
        assert_eq!(connector.url(), "https://search.local:9243");

        let options = DaoOptions::new().with("host", "localhost").with("port", "9200");
        let connector = ElasticHttpConnector::from_context(&context(options)).unwrap();
        assert_eq!(connector.url(), "http://localhost:9200");
    }

    #[test]
    fn test_missing_host() {
        let options = DaoOptions::new().with("port", 9200);
        let err = ElasticHttpConnector::from_context(&context(options))
            .err()
            .unwrap();
        assert_eq!(err.key(), ErrorKey::MissingField);
    }

    #[test]
    fn test_check_status_reports_reason() {
        let response = EsResponse {
            status: StatusCode::BAD_REQUEST,
            body: serde_json::json!({"error": {"reason": "bad query"}}),
        };
        let err = response.check_status(&[200]).unwrap_err();
        assert_eq!(err.key(), ErrorKey::IndexRequestError);
        assert!(err.message().contains("bad query"));
    }
}
