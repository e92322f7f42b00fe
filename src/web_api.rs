use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{CONTENT_TYPE, LOCATION},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

const COMPRESSION_COUNT_HEADER: &str = "compression-count";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API key or account problem: {0}")]
    Account(String),
    #[error("client error: {0}")]
    Client(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl ApiError {
    /// Classifies a non-success response from the API.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => format!(
                "{} (HTTP {}/{})",
                parsed.message,
                status.as_u16(),
                parsed.error
            ),
            Err(_) => format!(
                "Error while parsing response (HTTP {}/ParseError)",
                status.as_u16()
            ),
        };

        match status.as_u16() {
            401 | 429 => ApiError::Account(message),
            400..=499 => ApiError::Client(message),
            500..=599 => ApiError::Server(message),
            _ => ApiError::Unexpected(message),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Connection(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    Scale,
    Fit,
    Cover,
    Thumb,
}

/// Resize request, parsed from `METHOD:WIDTH:HEIGHT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resize {
    pub method: ResizeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl FromStr for Resize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let usage = "expected METHOD:WIDTH:HEIGHT, e.g. fit:300:200";

        let parts: Vec<&str> = s.split(':').collect();
        let &[method, width, height] = parts.as_slice() else {
            return Err(usage.to_string());
        };

        let method = match method.to_ascii_lowercase().as_str() {
            "scale" => ResizeMethod::Scale,
            "fit" => ResizeMethod::Fit,
            "cover" => ResizeMethod::Cover,
            "thumb" => ResizeMethod::Thumb,
            other => {
                return Err(format!(
                    "unknown resize method '{other}', expected scale, fit, cover or thumb"
                ));
            }
        };

        let parse_dim = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map(|n| (n > 0).then_some(n))
                .map_err(|_| format!("invalid dimension '{value}', {usage}"))
        };
        let width = parse_dim(width)?;
        let height = parse_dim(height)?;

        match (method, width, height) {
            (ResizeMethod::Scale, Some(_), None) | (ResizeMethod::Scale, None, Some(_)) => {}
            (ResizeMethod::Scale, _, _) => {
                return Err(
                    "scale needs exactly one non-zero dimension, e.g. scale:300:0".to_string(),
                );
            }
            (_, Some(_), Some(_)) => {}
            _ => return Err(format!("{s}: both width and height must be greater than 0")),
        }

        Ok(Resize {
            method,
            width,
            height,
        })
    }
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method {
            ResizeMethod::Scale => "scale",
            ResizeMethod::Fit => "fit",
            ResizeMethod::Cover => "cover",
            ResizeMethod::Thumb => "thumb",
        };
        write!(
            f,
            "{method}:{}:{}",
            self.width.unwrap_or(0),
            self.height.unwrap_or(0)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Convert {
    #[serde(rename = "type")]
    pub mime: String,
}

/// Post-compression operations applied to the API's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transform {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<Convert>,
}

impl Transform {
    pub fn is_empty(&self) -> bool {
        self.resize.is_none() && self.convert.is_none()
    }
}

/// Something that turns image bytes into smaller image bytes.
pub trait RemoteCompressor {
    async fn compress(
        &mut self,
        data: Vec<u8>,
        transform: &Transform,
    ) -> Result<Vec<u8>, ApiError>;

    /// Compressions used this month, as last reported by the service.
    fn compression_count(&self) -> Option<u32>;
}

pub struct TinifyClient {
    client: Client,
    endpoint: String,
    api_key: String,
    compression_count: Option<u32>,
}

impl TinifyClient {
    pub fn new(api_key: String, endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("imgpress/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            compression_count: None,
        })
    }

    /// Checks the API key with an empty upload. The service answers a valid
    /// key with a 400 "input missing" error; any other answer is a failure.
    pub async fn validate(&mut self) -> Result<(), ApiError> {
        let request = self.client.post(format!("{}/shrink", self.endpoint));
        let response = self.execute(request).await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Ok(());
        }

        if status.is_success() {
            return Err(ApiError::Unexpected(format!(
                "empty upload was accepted (HTTP {})",
                status.as_u16()
            )));
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }

    async fn shrink(&mut self, data: Vec<u8>) -> Result<String, ApiError> {
        let request = self
            .client
            .post(format!("{}/shrink", self.endpoint))
            .body(data);
        let response = self.send(request).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::Unexpected("shrink response has no Location header".to_string())
            })
    }

    async fn output(
        &mut self,
        location: &str,
        transform: &Transform,
    ) -> Result<Vec<u8>, ApiError> {
        let request = if transform.is_empty() {
            self.client.get(location)
        } else {
            let body = serde_json::to_vec(transform)
                .map_err(|err| ApiError::Unexpected(err.to_string()))?;
            self.client
                .post(location)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
        };

        let response = self.send(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn send(&mut self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.execute(request).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }

    /// Sends with credentials and records the compression count, whatever
    /// the status.
    async fn execute(&mut self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await?;

        if let Some(count) = response
            .headers()
            .get(COMPRESSION_COUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
        {
            self.compression_count = Some(count);
        }

        Ok(response)
    }
}

impl RemoteCompressor for TinifyClient {
    async fn compress(
        &mut self,
        data: Vec<u8>,
        transform: &Transform,
    ) -> Result<Vec<u8>, ApiError> {
        let location = self.shrink(data).await?;
        log::debug!("Compressed output available at {location}");
        self.output(&location, transform).await
    }

    fn compression_count(&self) -> Option<u32> {
        self.compression_count
    }
}
