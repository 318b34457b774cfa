//! Per-request glue between a [`JsonBuilderStrategy`] and a processor chain.
//!
//! A pipeline is built once per request and consumed when the backend call
//! finishes: [`ResponsePipeline::complete`] for a response,
//! [`ResponsePipeline::complete_http_error`] for an HTTP error status, or
//! [`ResponsePipeline::complete_transport_failure`] when no response arrived.
//! Every failure is routed to the chain's failure callback so the caller
//! always learns the outcome exactly once.

use log::error;

use crate::{
    datasource::BackendQuery,
    nesting::{BackendResponse, JsonBuilderStrategy},
    response::{GatewayFailure, HttpErrorResponse, LoggingContext, ResponseProcessor},
};

/// A document strategy paired with the head of a processor chain.
pub struct ResponsePipeline<S, P> {
    strategy: S,
    head: P,
}

impl<S: JsonBuilderStrategy, P: ResponseProcessor> ResponsePipeline<S, P> {
    /// Pair `strategy` with the chain starting at `head`.
    pub fn new(strategy: S, head: P) -> Self {
        Self { strategy, head }
    }

    /// The first stage of the chain.
    pub fn head(&self) -> &P {
        &self.head
    }

    /// Build the document and run it through the chain.
    ///
    /// Does not invoke any callback; see [`complete`](Self::complete).
    pub fn process(
        &mut self,
        response: &BackendResponse,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) -> Result<(), GatewayFailure> {
        let document = self.strategy.build(response)?;
        self.head.process_response(document, query, metadata)?;
        Ok(())
    }

    /// Process `response`, reporting any failure through the failure callback.
    pub fn complete(
        mut self,
        response: &BackendResponse,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) {
        if let Err(failure) = self.process(response, query, metadata) {
            error!("Request failed: {failure} ({metadata})");
            (self.head.failure_callback(query))(failure);
        }
    }

    /// Report a backend HTTP error through the error callback.
    pub fn complete_http_error(self, error: HttpErrorResponse, query: &BackendQuery) {
        (self.head.error_callback(query))(error);
    }

    /// Report that the transport failed before any response arrived.
    pub fn complete_transport_failure(
        self,
        message: impl Into<String>,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) {
        let failure = GatewayFailure::Transport {
            message: message.into(),
        };
        error!("Request failed: {failure} ({metadata})");
        (self.head.failure_callback(query))(failure);
    }
}
