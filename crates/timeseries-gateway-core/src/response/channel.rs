//! Terminal stage delivering the request outcome over a oneshot channel.

use std::sync::{Arc, Mutex, PoisonError};

use log::warn;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    datasource::BackendQuery,
    response::{
        FailureCallback, HttpErrorCallback, LoggingContext, ResponseProcessor,
        context::ResponseContext,
        error::{GatewayFailure, ProcessingError},
    },
};

/// A processed document plus the context the chain accumulated for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    /// The document as it left the chain.
    pub document: Value,
    /// Request state recorded by earlier stages.
    pub context: ResponseContext,
}

/// What the waiting caller receives.
pub type PipelineResult = Result<GatewayResponse, GatewayFailure>;

type Slot = Arc<Mutex<Option<oneshot::Sender<PipelineResult>>>>;

/// Takes the sender out of `slot` and sends `outcome`.
///
/// Returns `false` if something was already delivered through the slot.
fn deliver(slot: &Slot, outcome: PipelineResult) -> bool {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    match sender {
        Some(sender) => {
            if sender.send(outcome).is_err() {
                warn!("Caller stopped waiting before the response was delivered");
            }
            true
        }
        None => false,
    }
}

/// Ends the chain by sending exactly one outcome to the caller.
///
/// Success, processing failures and backend HTTP errors all share one slot,
/// so whichever happens first wins and later attempts are refused.
#[derive(Debug)]
pub struct ChannelResponseProcessor {
    context: ResponseContext,
    slot: Slot,
}

impl ChannelResponseProcessor {
    /// Build the stage and the receiver the caller awaits.
    pub fn new() -> (Self, oneshot::Receiver<PipelineResult>) {
        let (tx, rx) = oneshot::channel();
        let processor = Self {
            context: ResponseContext::new(),
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (processor, rx)
    }

    /// True once an outcome has been sent.
    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl ResponseProcessor for ChannelResponseProcessor {
    fn response_context(&self) -> &ResponseContext {
        &self.context
    }

    fn response_context_mut(&mut self) -> &mut ResponseContext {
        &mut self.context
    }

    fn failure_callback(&self, _query: &BackendQuery) -> FailureCallback {
        let slot = Arc::clone(&self.slot);
        Box::new(move |failure| {
            if !deliver(&slot, Err(failure)) {
                warn!("Dropping failure for a request that already completed");
            }
        })
    }

    fn error_callback(&self, _query: &BackendQuery) -> HttpErrorCallback {
        let slot = Arc::clone(&self.slot);
        Box::new(move |error| {
            let failure = GatewayFailure::BackendHttp {
                status: error.status,
                reason: error.reason,
                body: error.body,
            };
            if !deliver(&slot, Err(failure)) {
                warn!("Dropping HTTP error for a request that already completed");
            }
        })
    }

    fn process_response(
        &mut self,
        json: Value,
        _query: &BackendQuery,
        metadata: &LoggingContext,
    ) -> Result<(), ProcessingError> {
        let response = GatewayResponse {
            document: json,
            context: self.context.clone(),
        };
        if deliver(&self.slot, Ok(response)) {
            Ok(())
        } else {
            warn!("Response already emitted ({metadata})");
            Err(ProcessingError::AlreadyEmitted)
        }
    }
}
