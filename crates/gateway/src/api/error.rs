//! Maps `circle_domain::Error` onto the REST control surface's error
//! contract (§6.3, §7): "always returns a structured `{error: string}` with
//! a proper code." Grounded in the ad-hoc `(StatusCode, Json(json!({...})))`
//! pairs used throughout the teacher's handlers, folded into one `IntoResponse`
//! impl since every handler here needs the same mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use circle_domain::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownSession(_) | Error::UnknownPersona(_) => StatusCode::NOT_FOUND,
            Error::HumanProtocol(_) | Error::InvalidTransition { .. } | Error::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Llm { .. } | Error::Timeout(_) | Error::Http(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Io(_) | Error::Json(_) | Error::Yaml(_) | Error::Analysis(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
