use bytes::Bytes;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use l402_kit::challenge::PaymentChallenge;
use serde::Serialize;

/// A gate response that stops the request short of the handler: a payment
/// challenge, an authorization failure, or an internal failure.
#[derive(Debug, Clone)]
pub struct GateResponse {
    pub status: StatusCode,
    /// `WWW-Authenticate` value, set on 402 challenges.
    pub www_authenticate: Option<String>,
    pub body: GateBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GateBody {
    Challenge(PaymentChallenge),
    Error(GateError),
}

#[derive(Debug, Clone, Serialize)]
pub struct GateError {
    pub error: String,
}

impl GateResponse {
    pub fn header_value(&self) -> Option<(HeaderName, HeaderValue)> {
        let value = self.www_authenticate.as_deref()?;
        HeaderValue::from_str(value)
            .ok()
            .map(|v| (http::header::WWW_AUTHENTICATE, v))
    }
}

impl From<GateResponse> for Response<Full<Bytes>> {
    fn from(value: GateResponse) -> Self {
        let header = value.header_value();
        let body = match serde_json::to_vec(&value.body) {
            Ok(body) => body,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("failed to serialize gate response body: {err}");
                #[cfg(not(feature = "tracing"))]
                let _ = err;

                let mut response = Response::new(Full::new(Bytes::from_static(
                    b"{\"error\":\"failed to serialize gate response\"}",
                )));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return response;
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = value.status;
        response
            .headers_mut()
            .insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some((name, val)) = header {
            response.headers_mut().insert(name, val);
        }
        response
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GateResponse {
    fn into_response(self) -> axum::response::Response {
        let header = self.header_value();
        let mut response = (self.status, axum::extract::Json(self.body)).into_response();
        if let Some((name, val)) = header {
            response.headers_mut().insert(name, val);
        }
        response
    }
}
