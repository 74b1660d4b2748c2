use crate::assignment::{
    EngineError, PolicyError, PoolError, SchedulerError, StoreError, UnknownMeetingType,
};
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Worker(tokio::task::JoinError),
    Policy(PolicyError),
    Pool(PoolError),
    Engine(EngineError),
    Scheduler(SchedulerError),
    MeetingType(UnknownMeetingType),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Policy(_) | AppError::MeetingType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Pool(err) | AppError::Engine(EngineError::Pool(err)) => pool_status(err),
            AppError::Engine(EngineError::Store(err)) => store_status(err),
            AppError::Scheduler(SchedulerError::AlreadyRunning) => StatusCode::CONFLICT,
            AppError::Scheduler(SchedulerError::Pool(err))
            | AppError::Scheduler(SchedulerError::Engine(EngineError::Pool(err))) => {
                pool_status(err)
            }
            AppError::Scheduler(SchedulerError::Engine(EngineError::Store(err))) => {
                store_status(err)
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn pool_status(err: &PoolError) -> StatusCode {
    match err {
        PoolError::Store(err) => store_status(err),
        PoolError::AlreadyPooled(_)
        | PoolError::NotClaimable { .. }
        | PoolError::ClaimSuperseded(_)
        | PoolError::InvalidTransition { .. } => StatusCode::CONFLICT,
        PoolError::NotPooled(_) => StatusCode::NOT_FOUND,
        PoolError::Inconsistent(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) | StoreError::AlreadyAssigned { .. } => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "invalid configuration: {err}"),
            AppError::Telemetry(err) => write!(f, "logging setup failed: {err}"),
            AppError::Io(err) => write!(f, "i/o failure: {err}"),
            AppError::Server(err) => write!(f, "http server failed: {err}"),
            AppError::Worker(err) => write!(f, "pool worker did not finish: {err}"),
            AppError::Policy(err) => write!(f, "policy error: {err}"),
            AppError::Pool(err) => write!(f, "pool error: {err}"),
            AppError::Engine(err) => write!(f, "processing error: {err}"),
            AppError::Scheduler(err) => write!(f, "scheduler error: {err}"),
            AppError::MeetingType(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Worker(err) => Some(err),
            AppError::Policy(err) => Some(err),
            AppError::Pool(err) => Some(err),
            AppError::Engine(err) => Some(err),
            AppError::Scheduler(err) => Some(err),
            AppError::MeetingType(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Worker(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<PolicyError> for AppError {
    fn from(value: PolicyError) -> Self {
        Self::Policy(value)
    }
}

impl From<PoolError> for AppError {
    fn from(value: PoolError) -> Self {
        Self::Pool(value)
    }
}

impl From<EngineError> for AppError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<SchedulerError> for AppError {
    fn from(value: SchedulerError) -> Self {
        Self::Scheduler(value)
    }
}

impl From<UnknownMeetingType> for AppError {
    fn from(value: UnknownMeetingType) -> Self {
        Self::MeetingType(value)
    }
}
