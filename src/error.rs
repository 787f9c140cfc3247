//! Status-bearing error conditions.
//!
//! # Responsibilities
//! - Define the conditions raised by accessors, handlers and extensions
//! - Map recognized conditions to a fixed status code
//! - Render the generic fallback for anything unrecognized
//!
//! # Design Decisions
//! - Conditions are caught once, at the dispatch boundary
//! - Status mapping for recognized conditions is not overridable
//! - Unrecognized errors go through the app error handler, else 500

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};

use crate::http::Response;

/// Boxed error type accepted from handlers and extensions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message used when an unhandled error is rendered without an app error handler.
pub const GENERIC_FAILURE: &str = "Something Went Wrong";

/// A condition raised while dispatching a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Schema validation or body parse failure.
    #[error("Bad Request")]
    BadRequest,

    /// A body or cookie read exceeded its size or time bound.
    #[error("Content Too Large")]
    ContentTooLarge,

    /// No route matched and no not-found handler is configured.
    #[error("Not Found")]
    NotFound,

    /// A condition raised deliberately with an explicit status.
    #[error("{}", exception_text(.status, .message))]
    Exception {
        status: StatusCode,
        message: Option<String>,
    },

    /// Anything not otherwise classified.
    #[error(transparent)]
    Unhandled(BoxError),
}

fn exception_text(status: &StatusCode, message: &Option<String>) -> String {
    match message {
        Some(message) => message.to_string(),
        None => status.canonical_reason().unwrap_or("Exception").to_string(),
    }
}

impl Error {
    /// Raise a recognized condition with the given status and no body.
    pub fn status(status: StatusCode) -> Self {
        Error::Exception {
            status,
            message: None,
        }
    }

    /// Raise a recognized condition whose message becomes the response body.
    pub fn exception(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Exception {
            status,
            message: Some(message.into()),
        }
    }

    /// Wrap an arbitrary error as an unhandled condition.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Error::Unhandled(err.into())
    }

    /// Status code of a recognized condition, `None` for unhandled errors.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::BadRequest => Some(StatusCode::BAD_REQUEST),
            Error::ContentTooLarge => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Error::NotFound => Some(StatusCode::NOT_FOUND),
            Error::Exception { status, .. } => Some(*status),
            Error::Unhandled(_) => None,
        }
    }

    /// Whether the status mapping of this condition is fixed.
    pub fn is_recognized(&self) -> bool {
        self.status_code().is_some()
    }

    /// Render this condition as a response.
    ///
    /// Unhandled errors render as the generic 500.
    pub fn into_response(self) -> Response {
        match self {
            Error::Exception {
                status,
                message: Some(message),
            } => text_response(status, message),
            Error::Unhandled(_) => generic_failure(),
            other => {
                let status = other
                    .status_code()
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                response
            }
        }
    }
}

/// The response emitted for unhandled conditions.
pub fn generic_failure() -> Response {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
}

fn text_response(status: StatusCode, message: String) -> Response {
    let length = HeaderValue::from(message.len());
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, length);
    response
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Unhandled(Box::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Unhandled(Box::new(err))
    }
}

impl From<axum::http::Error> for Error {
    fn from(err: axum::http::Error) -> Self {
        Error::Unhandled(Box::new(err))
    }
}

impl From<axum::http::header::InvalidHeaderValue> for Error {
    fn from(err: axum::http::header::InvalidHeaderValue) -> Self {
        Error::Unhandled(Box::new(err))
    }
}

impl From<axum::http::header::InvalidHeaderName> for Error {
    fn from(err: axum::http::header::InvalidHeaderName) -> Self {
        Error::Unhandled(Box::new(err))
    }
}

/// Failure of a memoized accessor.
///
/// Kept `Copy` so a cached failure can be replayed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    BadRequest,
    ContentTooLarge,
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::BadRequest => Error::BadRequest,
            Rejection::ContentTooLarge => Error::ContentTooLarge,
        }
    }
}
