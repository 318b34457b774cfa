//! Error types for response processing.
//!
//! - [`ValidationError`]: the assembled document lacks required metadata.
//! - [`ProcessingError`]: a stage aborted the chain.
//! - [`GatewayFailure`]: anything that ends a request, as handed to failure
//!   callbacks.

use snafu::prelude::*;

use crate::{nesting::ConstructionError, response::partial_data::ProcessorState};

/// A required field is missing or malformed in a backend document.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ValidationError {
    /// The nested response-context object is absent.
    #[snafu(display("Response is missing {key}"))]
    MissingResponseContext {
        /// Expected document key.
        key: String,
    },

    /// The response context lacks `uncoveredIntervals`.
    #[snafu(display("Response is missing \"uncoveredIntervals\" {key}"))]
    MissingUncoveredIntervals {
        /// Response-context key.
        key: String,
    },

    /// The response context lacks `uncoveredIntervalsOverflowed`.
    #[snafu(display("Response is missing \"uncoveredIntervalsOverflowed\" {key}"))]
    MissingUncoveredIntervalsOverflowed {
        /// Response-context key.
        key: String,
    },

    /// `uncoveredIntervalsOverflowed` is present but not a boolean.
    #[snafu(display("\"uncoveredIntervalsOverflowed\" in {key} is not a boolean"))]
    MalformedUncoveredIntervalsOverflowed {
        /// Response-context key.
        key: String,
    },

    /// The status-code field is absent.
    #[snafu(display("Response is missing response status code ({field})"))]
    MissingStatusCode {
        /// Expected status field.
        field: String,
    },
}

/// A processing stage aborted the chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProcessingError {
    /// The document failed validation.
    #[snafu(display("Response validation failed: {source}"))]
    Validation {
        /// Underlying validation error.
        source: ValidationError,
    },

    /// The stage already finished processing a response for this request.
    #[snafu(display("Processor already completed (state {state:?})"))]
    AlreadyCompleted {
        /// State the stage was in.
        state: ProcessorState,
    },

    /// The terminal stage already delivered an outcome to the caller.
    #[snafu(display("Response for this request was already emitted"))]
    AlreadyEmitted,
}

/// Why a request ended without a response.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayFailure {
    /// The backend response could not be assembled into a document.
    #[snafu(display("Failed to build response document: {source}"))]
    Construction {
        /// Underlying construction error.
        source: ConstructionError,
    },

    /// A processing stage rejected the document.
    #[snafu(display("Failed to process response: {source}"))]
    Processing {
        /// Underlying processing error.
        source: ProcessingError,
    },

    /// The backend answered with an HTTP error.
    #[snafu(display("Backend returned HTTP {status} {reason}: {body}"))]
    BackendHttp {
        /// HTTP status code.
        status: u16,
        /// Reason phrase.
        reason: String,
        /// Response body text.
        body: String,
    },

    /// The transport failed before a response arrived.
    #[snafu(display("Backend transport failed: {message}"))]
    Transport {
        /// Transport-provided description.
        message: String,
    },
}

impl From<ConstructionError> for GatewayFailure {
    fn from(source: ConstructionError) -> Self {
        GatewayFailure::Construction { source }
    }
}

impl From<ProcessingError> for GatewayFailure {
    fn from(source: ProcessingError) -> Self {
        GatewayFailure::Processing { source }
    }
}

impl From<ValidationError> for ProcessingError {
    fn from(source: ValidationError) -> Self {
        ProcessingError::Validation { source }
    }
}
