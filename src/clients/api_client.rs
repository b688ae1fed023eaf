use crate::consumers::correlation::{current_correlation_id, new_correlation_id};
use crate::consumers::HandlerError;
use anyhow::Context;
use redact::Secret;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Header propagating the correlation id of the message being processed to downstream APIs.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// An HTTP client bound to the base URL of one downstream API.
///
/// Every request carries:
/// - a bearer token;
/// - an `X-Request-ID` header, the current correlation id (or a fresh one outside of message
///   processing);
/// - the default headers registered with [`ApiClient::with_default_header`].
///
/// Failures are classified for the dispatcher (see [`ApiClient::send`]).
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Secret<String>,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        bearer_token: Secret<String>,
        timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            bearer_token,
            timeout,
            default_headers: HeaderMap::new(),
        }
    }

    /// Send `name: value` with every request.
    pub fn with_default_header(
        mut self,
        name: &'static str,
        value: &str,
    ) -> Result<Self, anyhow::Error> {
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header '{}'", name))?;
        self.default_headers
            .insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Perform `request`.
    ///
    /// - connection errors and timeouts are transient: [`HandlerError::requeue`];
    /// - `503 Service Unavailable` is transient too;
    /// - any other non-2xx status is terminal: [`HandlerError::reject`].
    ///
    /// If the request was marked with [`ApiRequest::allow_http_error`], responses are returned
    /// to the caller whatever their status code.
    #[tracing::instrument(
        name = "api_request",
        skip_all,
        fields(http.method = %request.method, http.url = tracing::field::Empty)
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<Response, HandlerError> {
        let ApiRequest {
            method,
            path,
            query,
            payload,
            allow_http_error,
        } = request;
        let url = self.url(&path);
        tracing::Span::current().record("http.url", url.as_str());

        let request_id = current_correlation_id().unwrap_or_else(new_correlation_id);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .timeout(self.timeout)
            .headers(self.default_headers.clone())
            .header(REQUEST_ID_HEADER, request_id)
            .bearer_auth(self.bearer_token.expose_secret());
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(payload) = &payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| {
            HandlerError::requeue(
                anyhow::Error::from(e)
                    .context(format!("Error when connecting to API ({} {})", method, url)),
            )
        })?;
        let status = response.status();
        tracing::debug!(
            "Request completed with HTTP status code {}",
            status.as_u16()
        );
        if !allow_http_error {
            check_status(status).map_err(|e| {
                let context = format!("{} {}", method, url);
                HandlerError {
                    inner_error: e.inner_error.context(context),
                    error_type: e.error_type,
                }
            })?;
        }
        Ok(response)
    }

    /// Perform `request` and decode the JSON body of the response.
    ///
    /// A body that cannot be decoded as a `T` is a terminal failure.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, HandlerError> {
        let response = self.send(request).await?;
        json_body(response).await
    }
}

/// Decode the JSON body of a response.
pub async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T, HandlerError> {
    let url = response.url().to_string();
    response.json().await.map_err(|e| {
        HandlerError::reject(
            anyhow::Error::from(e).context(format!("Unexpected response body from {}", url)),
        )
    })
}

/// Classify a response status code.
pub fn check_status(status: StatusCode) -> Result<(), HandlerError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::SERVICE_UNAVAILABLE {
        Err(HandlerError::requeue(anyhow::anyhow!(
            "API temporarily unavailable (HTTP {})",
            status.as_u16()
        )))
    } else {
        Err(HandlerError::reject(anyhow::anyhow!(
            "Unexpected response from API (HTTP {})",
            status.as_u16()
        )))
    }
}

/// Serialize a request payload.
pub fn to_json(payload: &impl Serialize) -> Result<Value, HandlerError> {
    serde_json::to_value(payload)
        .context("Failed to serialize request payload")
        .map_err(HandlerError::from)
}

/// A request to a downstream API, relative to the base URL of an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    payload: Option<Value>,
    allow_http_error: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            payload: None,
            allow_http_error: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Send `payload` as a JSON body.
    #[must_use]
    pub fn json(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Return non-2xx responses to the caller instead of failing.
    #[must_use]
    pub fn allow_http_error(mut self) -> Self {
        self.allow_http_error = true;
        self
    }
}
