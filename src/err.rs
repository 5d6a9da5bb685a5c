use axum::body::HttpBody;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, RequestParts};
use axum::http::{Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{async_trait, BoxError, Json};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::AuthError;
use crate::notify::NotifyError;
use crate::receipt::ReceiptError;
use crate::roster::RosterError;
use crate::store::StoreError;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

/// Answers a known path requested with the wrong method with the same
/// envelope as an unknown path.
pub async fn method_mismatch<B>(req: Request<B>, next: Next<B>) -> Response {
    let target = format!("{} {}", req.method(), req.uri());
    let response = next.run(req).await;
    if response.status() == StatusCode::METHOD_NOT_ALLOWED {
        return Error::NotFound {
            message: format!("Invalid path: {}", target),
        }
        .into_response();
    }
    response
}

/// `Json` whose rejections are reported as [`Error::InvalidPayload`].
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, B> FromRequest<B> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    B: HttpBody + Send,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req).await?;
        Ok(JsonBody(value))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a Error,
}

/// Every error a handler can answer with. The variant name is reported to the
/// client in the `error` field next to a human readable `message`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    MissingFields { message: String },
    MissingRequiredFields { message: String, fields: Vec<String> },
    InvalidPayload { message: String },
    InvalidCredentials { message: String },
    MissingToken { message: String },
    InvalidToken { message: String },
    StudentNotFound { message: String },
    ReceiptNotFound { message: String },
    NothingToExport { message: String },
    NotFound { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn internal<S: Into<String>>(kind: &'static str, msg: S) -> Error {
        Error::InternalError {
            kind,
            message: msg.into(),
        }
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Error {
        Error::InvalidPayload {
            message: msg.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::MissingFields { .. }
            | Error::MissingRequiredFields { .. }
            | Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials { .. }
            | Error::MissingToken { .. }
            | Error::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Error::StudentNotFound { .. }
            | Error::ReceiptNotFound { .. }
            | Error::NothingToExport { .. }
            | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::MissingFields { message }
            | Error::MissingRequiredFields { message, .. }
            | Error::InvalidPayload { message }
            | Error::InvalidCredentials { message }
            | Error::MissingToken { message }
            | Error::InvalidToken { message }
            | Error::StudentNotFound { message }
            | Error::ReceiptNotFound { message }
            | Error::NothingToExport { message }
            | Error::NotFound { message }
            | Error::InternalError { message, .. } => message,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::InternalError { kind, message } = &self {
            log::error!("{}: {}", kind, message);
        }
        let body = Json(Failure {
            success: false,
            error: &self,
        });
        (self.status(), body).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::internal("IOError", io.to_string())
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        log::debug!("Rejected request body: {}", rejection);
        Self::invalid(rejection.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::internal("StorageError", err.to_string())
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::MissingFields => Self::MissingFields { message },
            AuthError::InvalidCredentials => Self::InvalidCredentials { message },
            AuthError::MissingToken => Self::MissingToken { message },
            AuthError::InvalidOrExpiredToken => Self::InvalidToken { message },
            AuthError::Hashing(_) | AuthError::Signing(_) => Self::internal("AuthError", message),
        }
    }
}

impl From<RosterError> for Error {
    fn from(err: RosterError) -> Self {
        let message = err.to_string();
        match err {
            RosterError::MissingRequiredFields(fields) => {
                Self::MissingRequiredFields { message, fields }
            }
            RosterError::InvalidAmount(_) => Self::InvalidPayload { message },
            RosterError::StudentNotFound(_) => Self::StudentNotFound { message },
            RosterError::NothingToExport => Self::NothingToExport { message },
            RosterError::Store(_) => Self::internal("StorageError", message),
            RosterError::Export(_) => Self::internal("ExportError", message),
        }
    }
}

impl From<ReceiptError> for Error {
    fn from(err: ReceiptError) -> Self {
        let message = err.to_string();
        match err {
            ReceiptError::MissingFields | ReceiptError::MissingDeliveryFields => {
                Self::MissingFields { message }
            }
            ReceiptError::InvalidAmount => Self::InvalidPayload { message },
            ReceiptError::ReceiptNotFound(_) => Self::ReceiptNotFound { message },
            ReceiptError::Render(_) => Self::internal("RenderError", message),
            ReceiptError::Store(_) => Self::internal("StorageError", message),
            ReceiptError::Io(_) => Self::internal("IOError", message),
            ReceiptError::Delivery(_) => Self::internal("DeliveryError", message),
        }
    }
}

impl From<NotifyError> for Error {
    fn from(err: NotifyError) -> Self {
        Self::internal("DeliveryError", err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("Unknown", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_carries_tag_and_message() {
        let err = Error::StudentNotFound {
            message: "Student not found".to_string(),
        };
        let body = serde_json::to_value(Failure {
            success: false,
            error: &err,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": false,
                "error": "StudentNotFound",
                "message": "Student not found"
            })
        );
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn success_envelope_flattens_value() {
        #[derive(Serialize)]
        struct Count {
            count: usize,
        }
        let body = serde_json::to_value(Success::of(Count { count: 3 })).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "count": 3}));
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_eq!(
            Error::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::from(AuthError::MissingFields).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
