pub mod classifier;
pub mod decode;
pub mod extractor;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod scorer;
pub mod service;


use serde::Serialize;
use thiserror::Error;

use decode::DecodeError;
use service::ServiceError;

/// Why a service-backed stage could not use the service's answer.
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Source {
    Service,
    Fallback { reason: String },
}

impl Source {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A stage result together with where it came from.
#[derive(Debug, Clone)]
pub struct Traced<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Traced<T> {
    pub fn service(value: T) -> Self {
        Self {
            value,
            source: Source::Service,
        }
    }

    pub fn fallback(value: T, failure: &StageFailure) -> Self {
        Self {
            value,
            source: Source::Fallback {
                reason: failure.to_string(),
            },
        }
    }
}
