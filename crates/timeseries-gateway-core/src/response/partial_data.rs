//! Partial-data validation stage.
//!
//! The backend reports, per query, which parts of the requested range it could
//! not answer (`uncoveredIntervals`) and whether that list was truncated
//! (`uncoveredIntervalsOverflowed`). This stage insists that the report is
//! present before letting a document continue down the chain:
//!
//! 1. the nested response-context object,
//! 2. its `uncoveredIntervals` field,
//! 3. its `uncoveredIntervalsOverflowed` boolean,
//! 4. the top-level status code (any value; only an integer or numeric
//!    string equal to the success status counts as success).
//!
//! Any missing piece is logged and fails the request; the next stage never
//! runs. A valid document is forwarded unchanged, exactly once.
//!
//! What a *successful* response with uncovered intervals should mean for the
//! end user is decided by a [`PartialDataHook`], not here.

use log::{debug, error};
use serde_json::Value;
use snafu::prelude::*;

use crate::{
    config::GatewayConfig,
    datasource::BackendQuery,
    response::{
        FailureCallback, FullResponseProcessor, HttpErrorCallback, LoggingContext,
        ResponseProcessor,
        context::{ResponseContext, UncoveredIntervals},
        error::{
            AlreadyCompletedSnafu, MalformedUncoveredIntervalsOverflowedSnafu,
            MissingResponseContextSnafu, MissingStatusCodeSnafu,
            MissingUncoveredIntervalsOverflowedSnafu, MissingUncoveredIntervalsSnafu,
            ProcessingError, ValidationError,
        },
    },
};

const UNCOVERED_INTERVALS: &str = "uncoveredIntervals";
const UNCOVERED_INTERVALS_OVERFLOWED: &str = "uncoveredIntervalsOverflowed";

/// Lifecycle of one [`PartialDataProcessor`].
///
/// `Created -> Validating -> {Forwarded | Failed}`; both outcomes are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// No response seen yet.
    Created,
    /// Checking the current document.
    Validating,
    /// The document passed and was handed to the next stage.
    Forwarded,
    /// The document was rejected.
    Failed,
}

/// Policy for successful responses that still report uncovered intervals.
///
/// Called only when the status code equals the configured success status,
/// before the document is forwarded. Implementations record whatever signal
/// they derive in the [`ResponseContext`]; they cannot alter the document or
/// stop the chain.
pub trait PartialDataHook: Send {
    /// React to the completeness report of a successful response.
    fn on_success_with_uncovered(
        &self,
        uncovered: &UncoveredIntervals,
        query: &BackendQuery,
        context: &mut ResponseContext,
    );
}

/// Default hook: stores the report in the context and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordUncoveredIntervals;

impl PartialDataHook for RecordUncoveredIntervals {
    fn on_success_with_uncovered(
        &self,
        uncovered: &UncoveredIntervals,
        _query: &BackendQuery,
        context: &mut ResponseContext,
    ) {
        context.set_uncovered_intervals(uncovered.clone());
    }
}

struct ValidatedResponse {
    /// `None` when the field holds something other than an integer.
    status_code: Option<i64>,
    uncovered: UncoveredIntervals,
}

/// Validating decorator over the next stage `N`.
pub struct PartialDataProcessor<N> {
    next: N,
    context_key: String,
    status_field: String,
    success_status: u16,
    hook: Box<dyn PartialDataHook>,
    state: ProcessorState,
}

impl<N: ResponseProcessor> PartialDataProcessor<N> {
    /// Wrap `next`, reading field names from `config`.
    pub fn new(next: N, config: &GatewayConfig) -> Self {
        Self {
            next,
            context_key: config.response_context_header.clone(),
            status_field: config.status_code_field.clone(),
            success_status: config.success_status,
            hook: Box::new(RecordUncoveredIntervals),
            state: ProcessorState::Created,
        }
    }

    /// Replace the success-with-uncovered-intervals policy.
    pub fn with_hook(mut self, hook: impl PartialDataHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// The wrapped stage.
    pub fn next(&self) -> &N {
        &self.next
    }

    fn validate(&self, json: &Value) -> Result<ValidatedResponse, ValidationError> {
        let key = self.context_key.as_str();

        let context = json
            .get(key)
            .context(MissingResponseContextSnafu { key })?;

        let uncovered_intervals = context
            .get(UNCOVERED_INTERVALS)
            .context(MissingUncoveredIntervalsSnafu { key })?;

        let overflowed = context
            .get(UNCOVERED_INTERVALS_OVERFLOWED)
            .context(MissingUncoveredIntervalsOverflowedSnafu { key })?
            .as_bool()
            .context(MalformedUncoveredIntervalsOverflowedSnafu { key })?;

        let field = self.status_field.as_str();
        let status_code = json
            .get(field)
            .context(MissingStatusCodeSnafu { field })?;
        let status_code = status_as_int(status_code);

        Ok(ValidatedResponse {
            status_code,
            uncovered: UncoveredIntervals {
                uncovered_intervals: uncovered_intervals.clone(),
                uncovered_intervals_overflowed: overflowed,
            },
        })
    }
}

/// Integer value of a status field; numeric strings are accepted.
fn status_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl<N: ResponseProcessor> ResponseProcessor for PartialDataProcessor<N> {
    fn response_context(&self) -> &ResponseContext {
        self.next.response_context()
    }

    fn response_context_mut(&mut self) -> &mut ResponseContext {
        self.next.response_context_mut()
    }

    fn failure_callback(&self, query: &BackendQuery) -> FailureCallback {
        self.next.failure_callback(query)
    }

    fn error_callback(&self, query: &BackendQuery) -> HttpErrorCallback {
        self.next.error_callback(query)
    }

    fn process_response(
        &mut self,
        json: Value,
        query: &BackendQuery,
        metadata: &LoggingContext,
    ) -> Result<(), ProcessingError> {
        ensure!(
            self.state == ProcessorState::Created,
            AlreadyCompletedSnafu { state: self.state }
        );
        self.state = ProcessorState::Validating;

        let validated = match self.validate(&json) {
            Ok(validated) => validated,
            Err(err) => {
                error!("{err} ({metadata})");
                self.state = ProcessorState::Failed;
                return Err(err.into());
            }
        };

        if validated.status_code.is_none() {
            debug!(
                "Status field {} is not an integer; treating response as unsuccessful ({metadata})",
                self.status_field
            );
        }

        if validated.status_code == Some(i64::from(self.success_status)) {
            debug!(
                "Backend reported uncovered intervals (overflowed={}) for {} query ({metadata})",
                validated.uncovered.uncovered_intervals_overflowed,
                query.query_type().unwrap_or("unknown"),
            );
            self.hook.on_success_with_uncovered(
                &validated.uncovered,
                query,
                self.next.response_context_mut(),
            );
        }

        self.state = ProcessorState::Forwarded;
        self.next.process_response(json, query, metadata)
    }
}

impl<N: ResponseProcessor> FullResponseProcessor for PartialDataProcessor<N> {}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    /// Terminal stage that records every document it receives.
    #[derive(Default)]
    struct Recorder {
        context: ResponseContext,
        seen: Arc<Mutex<Vec<Value>>>,
    }

    impl ResponseProcessor for Recorder {
        fn response_context(&self) -> &ResponseContext {
            &self.context
        }

        fn response_context_mut(&mut self) -> &mut ResponseContext {
            &mut self.context
        }

        fn failure_callback(&self, _: &BackendQuery) -> FailureCallback {
            Box::new(|_| {})
        }

        fn error_callback(&self, _: &BackendQuery) -> HttpErrorCallback {
            Box::new(|_| {})
        }

        fn process_response(
            &mut self,
            json: Value,
            _: &BackendQuery,
            _: &LoggingContext,
        ) -> Result<(), ProcessingError> {
            self.seen.lock().expect("lock").push(json);
            Ok(())
        }
    }

    fn processor() -> (PartialDataProcessor<Recorder>, Arc<Mutex<Vec<Value>>>) {
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();
        (
            PartialDataProcessor::new(recorder, &GatewayConfig::default()),
            seen,
        )
    }

    fn conformant() -> Value {
        json!({
            "response": [{"timestamp": "2020-01-01T00:00:00Z", "event": {"added": 5}}],
            "X-Druid-Response-Context": {
                "uncoveredIntervals": ["2020-01-02T00:00:00Z/2020-01-03T00:00:00Z"],
                "uncoveredIntervalsOverflowed": false
            },
            "status-code": 200
        })
    }

    fn run(doc: Value) -> (Result<(), ProcessingError>, PartialDataProcessor<Recorder>, Vec<Value>) {
        let (mut p, seen) = processor();
        let result = p.process_response(doc, &BackendQuery::default(), &LoggingContext::new("t"));
        let seen = seen.lock().expect("lock").clone();
        (result, p, seen)
    }

    #[test]
    fn conformant_document_is_forwarded_once_unchanged() {
        let (result, p, seen) = run(conformant());
        assert!(result.is_ok());
        assert_eq!(seen, vec![conformant()]);
        assert_eq!(p.state(), ProcessorState::Forwarded);
    }

    #[test]
    fn success_records_report_in_shared_context() {
        let (_, p, _) = run(conformant());
        let report = p
            .response_context()
            .uncovered_intervals()
            .expect("report recorded");
        assert!(!report.uncovered_intervals_overflowed);
        assert_eq!(
            report.uncovered_intervals,
            json!(["2020-01-02T00:00:00Z/2020-01-03T00:00:00Z"])
        );
    }

    #[test]
    fn non_success_status_skips_hook_but_forwards() {
        let mut doc = conformant();
        doc["status-code"] = json!(206);
        let (result, p, seen) = run(doc.clone());

        assert!(result.is_ok());
        assert_eq!(seen, vec![doc]);
        assert!(p.response_context().uncovered_intervals().is_none());
    }

    #[test]
    fn missing_status_code_fails_without_forwarding() {
        let mut doc = conformant();
        doc.as_object_mut().expect("object").remove("status-code");
        let (result, p, seen) = run(doc);

        assert!(matches!(
            result,
            Err(ProcessingError::Validation {
                source: ValidationError::MissingStatusCode { .. }
            })
        ));
        assert!(seen.is_empty());
        assert_eq!(p.state(), ProcessorState::Failed);
    }

    #[test]
    fn missing_response_context_fails() {
        let mut doc = conformant();
        doc.as_object_mut()
            .expect("object")
            .remove("X-Druid-Response-Context");
        let (result, _, seen) = run(doc);

        assert!(matches!(
            result,
            Err(ProcessingError::Validation {
                source: ValidationError::MissingResponseContext { .. }
            })
        ));
        assert!(seen.is_empty());
    }

    #[test]
    fn missing_uncovered_fields_fail() {
        let mut doc = conformant();
        doc["X-Druid-Response-Context"]
            .as_object_mut()
            .expect("object")
            .remove("uncoveredIntervals");
        let (result, _, _) = run(doc);
        assert!(matches!(
            result,
            Err(ProcessingError::Validation {
                source: ValidationError::MissingUncoveredIntervals { .. }
            })
        ));

        let mut doc = conformant();
        doc["X-Druid-Response-Context"]
            .as_object_mut()
            .expect("object")
            .remove("uncoveredIntervalsOverflowed");
        let (result, _, _) = run(doc);
        assert!(matches!(
            result,
            Err(ProcessingError::Validation {
                source: ValidationError::MissingUncoveredIntervalsOverflowed { .. }
            })
        ));
    }

    #[test]
    fn malformed_fields_fail() {
        let mut doc = conformant();
        doc["X-Druid-Response-Context"]["uncoveredIntervalsOverflowed"] = json!("no");
        let (result, _, _) = run(doc);
        assert!(matches!(
            result,
            Err(ProcessingError::Validation {
                source: ValidationError::MalformedUncoveredIntervalsOverflowed { .. }
            })
        ));
    }

    #[test]
    fn numeric_string_status_counts_as_success() {
        let mut doc = conformant();
        doc["status-code"] = json!("200");
        let (result, p, seen) = run(doc.clone());

        assert!(result.is_ok());
        assert_eq!(seen, vec![doc]);
        assert!(p.response_context().uncovered_intervals().is_some());
    }

    #[test]
    fn non_integer_status_is_forwarded_as_unsuccessful() {
        for status in [json!("OK"), json!(200.5), json!(null), json!(true)] {
            let mut doc = conformant();
            doc["status-code"] = status;
            let (result, p, seen) = run(doc.clone());

            assert!(result.is_ok());
            assert_eq!(seen, vec![doc]);
            assert_eq!(p.state(), ProcessorState::Forwarded);
            assert!(p.response_context().uncovered_intervals().is_none());
        }
    }

    #[test]
    fn failed_instance_never_forwards_later() {
        let (mut p, seen) = processor();
        let query = BackendQuery::default();
        let log = LoggingContext::new("t");

        assert!(p.process_response(json!({}), &query, &log).is_err());
        let again = p.process_response(conformant(), &query, &log);

        assert!(matches!(
            again,
            Err(ProcessingError::AlreadyCompleted {
                state: ProcessorState::Failed
            })
        ));
        assert!(seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn custom_hook_can_flag_partial_data() {
        struct FlagPartial;

        impl PartialDataHook for FlagPartial {
            fn on_success_with_uncovered(
                &self,
                uncovered: &UncoveredIntervals,
                _: &BackendQuery,
                context: &mut ResponseContext,
            ) {
                let partial = uncovered
                    .uncovered_intervals
                    .as_array()
                    .is_some_and(|list| !list.is_empty());
                context.insert_diagnostic("partial", json!(partial));
            }
        }

        let (p, _) = processor();
        let mut p = p.with_hook(FlagPartial);
        p.process_response(conformant(), &BackendQuery::default(), &LoggingContext::new("t"))
            .expect("forwarded");

        assert_eq!(p.response_context().diagnostic("partial"), Some(&json!(true)));
    }
}
