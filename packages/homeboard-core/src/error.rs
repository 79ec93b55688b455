//! Centralized error types for the Homeboard core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::hub::HubError;
use crate::panels::feed::FeedError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for HubError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "hub_transport_error",
            Self::ConnectTimeout(_) => "hub_connect_timeout",
            Self::InvalidUrl(_) => "hub_invalid_url",
            Self::Disabled => "hub_disabled",
        }
    }
}

impl ErrorCode for FeedError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::Decode(_) => "invalid_payload",
        }
    }
}

/// Application-wide error type for the dashboard.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum HomeboardError {
    /// Hub connection or protocol failure.
    #[error("Hub error: {0}")]
    Hub(String),

    /// Upstream feed request failed.
    #[error("Feed error: {0}")]
    Feed(String),

    /// No entity with this id has been seen.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// View name is not part of the configured view set.
    #[error("Unknown view: {0}")]
    UnknownView(String),

    /// No panel with this name is registered.
    #[error("Panel not found: {0}")]
    PanelNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HomeboardError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hub(_) => "hub_error",
            Self::Feed(_) => "feed_error",
            Self::EntityNotFound(_) => "entity_not_found",
            Self::UnknownView(_) => "unknown_view",
            Self::PanelNotFound(_) => "panel_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EntityNotFound(_) | Self::PanelNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownView(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Hub(_) | Self::Feed(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type HomeboardResult<T> = Result<T, HomeboardError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for HomeboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<HubError> for HomeboardError {
    fn from(err: HubError) -> Self {
        Self::Hub(err.to_string())
    }
}

impl From<FeedError> for HomeboardError {
    fn from(err: FeedError) -> Self {
        Self::Feed(err.to_string())
    }
}
