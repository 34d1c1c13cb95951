use poem::{
    Endpoint, IntoResponse, Middleware, Request, Response, Result,
    http::{HeaderName, HeaderValue},
};
use tracing::{Instrument, info_span};
use uuid::Uuid;

const MAX_LEN: usize = 100;

/// Correlation id of the current request, available to handlers as
/// `Data<&CorrelationId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_LEN)
            .map(|value| Self(value.to_string()))
            .unwrap_or_else(Self::generate)
    }
}

/// Reads or generates the correlation id, runs the request inside a span
/// carrying it and echoes it on every response.
pub struct Correlation {
    header: HeaderName,
}

impl Correlation {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl<E: Endpoint> Middleware<E> for Correlation {
    type Output = CorrelationEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        CorrelationEndpoint {
            inner: ep,
            header: self.header.clone(),
        }
    }
}

pub struct CorrelationEndpoint<E> {
    inner: E,
    header: HeaderName,
}

impl<E: Endpoint> Endpoint for CorrelationEndpoint<E> {
    type Output = Response;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        let correlation_id = CorrelationId::from_header(req.headers().get(&self.header));
        let span = info_span!(
            "http_request",
            method = %req.method(),
            path = %req.uri().path(),
            correlation_id = %correlation_id.as_str(),
        );
        req.extensions_mut().insert(correlation_id.clone());

        let mut response = match self.inner.call(req).instrument(span).await {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response(),
        };
        if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
            response.headers_mut().insert(self.header.clone(), value);
        }
        Ok(response)
    }
}
