//! Building one JSON document from a backend HTTP response.
//!
//! The backend reports completeness metadata out of band, in a response header
//! holding a JSON object. Strategies here turn the raw response into a single
//! document so downstream processors can read body and header data uniformly
//! without knowing how either was transported:
//!
//! ```json
//! {
//!   "response": <body document>,
//!   "X-Druid-Response-Context": <parsed header document>
//! }
//! ```
//!
//! Strategies compose: [`HeaderNestingStrategy`] wraps a base strategy that
//! converts the body, and [`StatusCodeStrategy`] can wrap that to record the
//! HTTP status alongside.

use std::fmt;

use bytes::Bytes;
use http::header::{HeaderName, InvalidHeaderName, ToStrError};
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::config::GatewayConfig;

/// Raw backend reply as delivered by the transport.
pub type BackendResponse = http::Response<Bytes>;

/// Key holding the body document in a nested document.
pub const RESPONSE_KEY: &str = "response";

/// Errors assembling a document from a backend response.
///
/// All variants are fatal for the request: nothing partially built is ever
/// handed to the processing chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConstructionError {
    /// The response body is not valid JSON.
    #[snafu(display("Backend response body is not valid JSON: {source}"))]
    InvalidBody {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The configured header name is not a legal HTTP header name.
    #[snafu(display("Invalid header name {header:?}: {source}"))]
    InvalidHeaderName {
        /// The rejected name.
        header: String,
        /// Underlying http error.
        source: InvalidHeaderName,
    },

    /// The expected header is absent from the response.
    #[snafu(display("Backend response is missing header {header}"))]
    MissingHeader {
        /// Header that was expected.
        header: String,
    },

    /// The header value contains bytes that are not visible ASCII.
    #[snafu(display("Header {header} is not valid text: {source}"))]
    HeaderNotText {
        /// Header that failed to decode.
        header: String,
        /// Underlying http error.
        source: ToStrError,
    },

    /// The header text is not a JSON document.
    #[snafu(display("Header {header} does not contain valid JSON: {source}"))]
    InvalidHeaderJson {
        /// Header that failed to parse.
        header: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The header would be nested under the key reserved for the body.
    #[snafu(display("Header {header:?} collides with the \"response\" document key"))]
    ReservedHeaderName {
        /// The rejected name.
        header: String,
    },

    /// A wrapping strategy needed an object from its base strategy.
    #[snafu(display("Expected a JSON object from the base strategy, found {found}"))]
    NotAnObject {
        /// Short description of what was found instead.
        found: String,
    },
}

/// Converts a backend response into a JSON document.
pub trait JsonBuilderStrategy: Send + Sync {
    /// Build the document for `response`.
    fn build(&self, response: &BackendResponse) -> Result<Value, ConstructionError>;
}

impl<F> JsonBuilderStrategy for F
where
    F: Fn(&BackendResponse) -> Result<Value, ConstructionError> + Send + Sync,
{
    fn build(&self, response: &BackendResponse) -> Result<Value, ConstructionError> {
        self(response)
    }
}

/// Parses the response body as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyJsonStrategy;

impl JsonBuilderStrategy for BodyJsonStrategy {
    fn build(&self, response: &BackendResponse) -> Result<Value, ConstructionError> {
        serde_json::from_slice(response.body()).context(InvalidBodySnafu)
    }
}

/// Nests the base document under `"response"` next to a parsed header.
#[derive(Clone)]
pub struct HeaderNestingStrategy<S> {
    base: S,
    header: HeaderName,
    key: String,
}

impl<S: JsonBuilderStrategy> HeaderNestingStrategy<S> {
    /// Nest `base`'s output next to the JSON carried in header `header`.
    ///
    /// The output key is `header` exactly as given here; header lookup itself
    /// is case-insensitive. A header named like the body key is rejected.
    pub fn new(base: S, header: &str) -> Result<Self, ConstructionError> {
        ensure!(
            !header.eq_ignore_ascii_case(RESPONSE_KEY),
            ReservedHeaderNameSnafu { header }
        );
        let name = HeaderName::from_bytes(header.as_bytes())
            .context(InvalidHeaderNameSnafu { header })?;
        Ok(Self {
            base,
            header: name,
            key: header.to_string(),
        })
    }

    /// Document key used for the parsed header.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn parse_header(&self, response: &BackendResponse) -> Result<Value, ConstructionError> {
        let raw = response
            .headers()
            .get(&self.header)
            .context(MissingHeaderSnafu { header: &self.key })?;
        let text = raw
            .to_str()
            .context(HeaderNotTextSnafu { header: &self.key })?;
        serde_json::from_str(text).context(InvalidHeaderJsonSnafu { header: &self.key })
    }
}

impl<S: JsonBuilderStrategy> JsonBuilderStrategy for HeaderNestingStrategy<S> {
    fn build(&self, response: &BackendResponse) -> Result<Value, ConstructionError> {
        let body = self.base.build(response)?;
        let header = self.parse_header(response)?;

        let mut doc = Map::new();
        doc.insert(RESPONSE_KEY.to_string(), body);
        doc.insert(self.key.clone(), header);
        Ok(Value::Object(doc))
    }
}

impl<S> fmt::Debug for HeaderNestingStrategy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderNestingStrategy")
            .field("header", &self.header)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Adds the HTTP status code to the object produced by a base strategy.
#[derive(Clone)]
pub struct StatusCodeStrategy<S> {
    base: S,
    field: String,
}

impl<S> fmt::Debug for StatusCodeStrategy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusCodeStrategy")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl<S: JsonBuilderStrategy> StatusCodeStrategy<S> {
    /// Record the status under `field` on top of `base`'s output.
    pub fn new(base: S, field: impl Into<String>) -> Self {
        Self {
            base,
            field: field.into(),
        }
    }
}

impl<S: JsonBuilderStrategy> JsonBuilderStrategy for StatusCodeStrategy<S> {
    fn build(&self, response: &BackendResponse) -> Result<Value, ConstructionError> {
        match self.base.build(response)? {
            Value::Object(mut doc) => {
                doc.insert(
                    self.field.clone(),
                    Value::from(response.status().as_u16()),
                );
                Ok(Value::Object(doc))
            }
            other => NotAnObjectSnafu {
                found: json_kind(&other),
            }
            .fail(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The full strategy for partial-data processing: body JSON, nested next to
/// the response-context header, with the status code recorded.
pub fn full_response_strategy(
    config: &GatewayConfig,
) -> Result<StatusCodeStrategy<HeaderNestingStrategy<BodyJsonStrategy>>, ConstructionError> {
    let nested = HeaderNestingStrategy::new(BodyJsonStrategy, &config.response_context_header)?;
    Ok(StatusCodeStrategy::new(nested, config.status_code_field.clone()))
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use super::*;

    fn response(body: &str, header: Option<(&str, &[u8])>) -> BackendResponse {
        let mut builder = http::Response::builder().status(StatusCode::OK);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder
            .body(Bytes::from(body.to_string()))
            .expect("valid response")
    }

    fn fixed_body(_: &BackendResponse) -> Result<Value, ConstructionError> {
        Ok(json!({"k": 1}))
    }

    #[test]
    fn nests_body_and_parsed_header() {
        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        let doc = strategy
            .build(&response("ignored", Some(("H", br#"{"x":true}"#))))
            .expect("build");

        assert_eq!(doc, json!({"response": {"k": 1}, "H": {"x": true}}));
    }

    #[test]
    fn header_lookup_is_case_insensitive_but_key_is_preserved() {
        let strategy =
            HeaderNestingStrategy::new(BodyJsonStrategy, "X-Druid-Response-Context").expect("strategy");
        let doc = strategy
            .build(&response(
                "[]",
                Some(("x-druid-response-context", br#"{"uncoveredIntervals":[]}"#)),
            ))
            .expect("build");

        assert_eq!(
            doc,
            json!({"response": [], "X-Druid-Response-Context": {"uncoveredIntervals": []}})
        );
    }

    #[test]
    fn non_json_header_fails_without_partial_document() {
        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        let err = strategy
            .build(&response("{}", Some(("H", b"not json"))))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidHeaderJson { .. }));
    }

    #[test]
    fn missing_header_fails() {
        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        let err = strategy.build(&response("{}", None)).unwrap_err();
        assert!(matches!(err, ConstructionError::MissingHeader { header } if header == "H"));
    }

    #[test]
    fn non_text_header_fails() {
        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        let err = strategy
            .build(&response("{}", Some(("H", &[0xff, 0xfe]))))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::HeaderNotText { .. }));
    }

    #[test]
    fn invalid_header_name_is_rejected_up_front() {
        let err = HeaderNestingStrategy::new(fixed_body, "bad header").unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidHeaderName { .. }));
    }

    #[test]
    fn invalid_body_fails() {
        let strategy = HeaderNestingStrategy::new(BodyJsonStrategy, "H").expect("strategy");
        let err = strategy
            .build(&response("<html>", Some(("H", b"{}"))))
            .unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidBody { .. }));
    }

    #[test]
    fn full_strategy_adds_status_code() {
        let strategy = full_response_strategy(&GatewayConfig::default()).expect("strategy");
        let doc = strategy
            .build(&response(
                r#"[{"event":1}]"#,
                Some((
                    "X-Druid-Response-Context",
                    br#"{"uncoveredIntervals":[],"uncoveredIntervalsOverflowed":false}"#,
                )),
            ))
            .expect("build");

        assert_eq!(doc["status-code"], json!(200));
        assert_eq!(doc["response"], json!([{"event": 1}]));
        assert_eq!(
            doc["X-Druid-Response-Context"]["uncoveredIntervalsOverflowed"],
            json!(false)
        );
    }

    #[test]
    fn status_code_requires_object_base() {
        let strategy = StatusCodeStrategy::new(BodyJsonStrategy, "status-code");
        let err = strategy.build(&response("[1,2]", None)).unwrap_err();
        assert!(matches!(err, ConstructionError::NotAnObject { .. }));
    }

    #[test]
    fn header_named_like_body_key_is_rejected() {
        for name in ["response", "Response", "RESPONSE"] {
            let err = HeaderNestingStrategy::new(fixed_body, name).unwrap_err();
            assert!(matches!(err, ConstructionError::ReservedHeaderName { header } if header == name));
        }
    }

    #[test]
    fn debug_output_names_header_without_base() {
        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        let text = format!("{:?}", StatusCodeStrategy::new(strategy, "status-code"));
        assert_eq!(text, r#"StatusCodeStrategy { field: "status-code", .. }"#);

        let strategy = HeaderNestingStrategy::new(fixed_body, "H").expect("strategy");
        assert!(format!("{strategy:?}").contains(r#"key: "H""#));
    }
}
