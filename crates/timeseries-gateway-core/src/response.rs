//! Response processing chain.
//!
//! After a backend call completes, its assembled JSON document flows through a
//! singly linked chain of [`ResponseProcessor`]s built once per request. Each
//! decorator owns the next stage and may intercept only
//! [`process_response`](ResponseProcessor::process_response); the context and
//! callback accessors are forwarded unchanged so every stage sees the terminal
//! stage's state.
//!
//! - [`PartialDataProcessor`] validates backend completeness metadata.
//! - [`ChannelResponseProcessor`] is a terminal stage handing the outcome to
//!   the waiting caller over a oneshot channel.
//!
//! The chain runs synchronously on whichever thread delivered the backend
//! response. A failure aborts only the current request.

pub mod channel;
pub mod context;
pub mod error;
pub mod partial_data;

use std::fmt;

use serde_json::Value;

use crate::datasource::BackendQuery;

pub use channel::{ChannelResponseProcessor, GatewayResponse, PipelineResult};
pub use context::{ResponseContext, UncoveredIntervals};
pub use error::{GatewayFailure, ProcessingError, ValidationError};
pub use partial_data::{PartialDataHook, PartialDataProcessor, ProcessorState, RecordUncoveredIntervals};

/// Invoked when a request fails inside the gateway or the transport.
pub type FailureCallback = Box<dyn FnOnce(GatewayFailure) + Send>;

/// Invoked when the backend answers with an HTTP error status.
pub type HttpErrorCallback = Box<dyn FnOnce(HttpErrorResponse) + Send>;

/// A non-success reply from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpErrorResponse {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response body as text.
    pub body: String,
}

/// Request-scoped values carried along for log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingContext {
    request_id: String,
    fields: Vec<(String, String)>,
}

impl LoggingContext {
    /// Context for request `request_id`.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            fields: Vec::new(),
        }
    }

    /// Attach an extra key/value pair.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// The request id.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Extra fields in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl fmt::Display for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request={}", self.request_id)?;
        for (key, value) in &self.fields {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

/// One stage of the response processing chain.
pub trait ResponseProcessor: Send {
    /// Shared per-request state, owned by the terminal stage.
    fn response_context(&self) -> &ResponseContext;

    /// Mutable access to the shared per-request state.
    fn response_context_mut(&mut self) -> &mut ResponseContext;

    /// Callback to invoke when `query` fails before producing a response.
    fn failure_callback(&self, query: &BackendQuery) -> FailureCallback;

    /// Callback to invoke when the backend rejects `query` with an HTTP error.
    fn error_callback(&self, query: &BackendQuery) -> HttpErrorCallback;

    /// Process the assembled document for `query`.
    ///
    /// An error means the request is finished: later stages were not run.
    fn process_response(
        &mut self,
        json: Value,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) -> Result<(), ProcessingError>;
}

/// Marker for stages that consume header-derived data, and therefore need a
/// document built by a header-nesting strategy.
pub trait FullResponseProcessor: ResponseProcessor {}

impl<P: ResponseProcessor + ?Sized> ResponseProcessor for Box<P> {
    fn response_context(&self) -> &ResponseContext {
        (**self).response_context()
    }

    fn response_context_mut(&mut self) -> &mut ResponseContext {
        (**self).response_context_mut()
    }

    fn failure_callback(&self, query: &BackendQuery) -> FailureCallback {
        (**self).failure_callback(query)
    }

    fn error_callback(&self, query: &BackendQuery) -> HttpErrorCallback {
        (**self).error_callback(query)
    }

    fn process_response(
        &mut self,
        json: Value,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) -> Result<(), ProcessingError> {
        (**self).process_response(json, query, metadata)
    }
}
