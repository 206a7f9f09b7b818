use serde::Serialize;
use serde_json::Value;

/// Machine-readable classification of a failed call.
///
/// The set is closed on purpose: backend-specific codes that don't fit are
/// mapped to [`ErrorCode::Query`] with the raw code preserved in
/// `details.backend_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    NotFound,
    Query,
    Repository,
    Create,
    Update,
    Delete,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Query => "query_error",
            ErrorCode::Repository => "repository_error",
            ErrorCode::Create => "create_error",
            ErrorCode::Update => "update_error",
            ErrorCode::Delete => "delete_error",
            ErrorCode::Unknown => "unknown_error",
        }
    }

    /// Parse a wire-level code string back into a known variant.
    pub fn from_wire(code: &str) -> Option<Self> {
        match code {
            "validation_error" => Some(ErrorCode::Validation),
            "not_found" => Some(ErrorCode::NotFound),
            "query_error" => Some(ErrorCode::Query),
            "repository_error" => Some(ErrorCode::Repository),
            "create_error" => Some(ErrorCode::Create),
            "update_error" => Some(ErrorCode::Update),
            "delete_error" => Some(ErrorCode::Delete),
            "unknown_error" => Some(ErrorCode::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical error shape every failure is normalized into.
///
/// `source` carries the original error rendered to text so the struct stays
/// cheap to clone and serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// The closed set of raw failure shapes the normalizer accepts.
///
/// Everything a backend or a lower layer can throw is converted through
/// exactly one of these variants; an already-normalized [`ErrorInfo`] passes
/// through untouched so errors are never wrapped twice.
pub enum RawError {
    /// Already normalized, passed through as-is.
    Info(ErrorInfo),
    /// A plain message with no further structure.
    Message(String),
    /// A native error value.
    Exception(Box<dyn std::error::Error + Send + Sync>),
    /// A structured backend payload, e.g. `{"error": {"message", "code"}}`.
    Payload(Value),
}

impl RawError {
    /// Wrap any native error type.
    pub fn exception(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RawError::Exception(Box::new(err))
    }
}

impl From<ErrorInfo> for RawError {
    fn from(info: ErrorInfo) -> Self {
        RawError::Info(info)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Message(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Message(message.to_string())
    }
}

impl From<Value> for RawError {
    fn from(payload: Value) -> Self {
        RawError::Payload(payload)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for RawError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        RawError::Exception(err)
    }
}

/// Collapse a raw failure shape into the canonical [`ErrorInfo`].
pub fn normalize(raw: RawError) -> ErrorInfo {
    match raw {
        RawError::Info(info) => info,
        RawError::Message(message) => ErrorInfo::new(ErrorCode::Unknown, message),
        RawError::Exception(err) => {
            ErrorInfo::new(ErrorCode::Query, err.to_string()).with_source(format!("{err:?}"))
        }
        RawError::Payload(payload) => normalize_payload(payload),
    }
}

fn normalize_payload(payload: Value) -> ErrorInfo {
    let Value::Object(obj) = &payload else {
        return ErrorInfo::new(ErrorCode::Unknown, stringify(&payload));
    };
    // Tolerate one level of `{ "error": { ... } }` nesting.
    let inner = match obj.get("error") {
        Some(Value::Object(nested)) => nested,
        _ => obj,
    };
    let Some(message) = inner.get("message").and_then(Value::as_str) else {
        return ErrorInfo::new(ErrorCode::Unknown, stringify(&payload));
    };

    let mut details = inner.get("details").cloned();
    let code = match inner.get("code").and_then(Value::as_str) {
        None => ErrorCode::Query,
        Some(raw) => ErrorCode::from_wire(raw).unwrap_or_else(|| {
            let mut map = serde_json::Map::new();
            map.insert("backend_code".to_string(), Value::String(raw.to_string()));
            if let Some(existing) = details.take() {
                map.insert("details".to_string(), existing);
            }
            details = Some(Value::Object(map));
            ErrorCode::Query
        }),
    };

    let mut info = ErrorInfo::new(code, message);
    if let Some(details) = details {
        info = info.with_details(details);
    }
    info
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "Unknown error".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Uniform result of every terminal call: either `data` or `error` is
/// populated, never both. "Success with null data" (e.g. a `maybe_single`
/// that matched nothing) is expressed as `Response<Option<T>>` holding
/// `Some(None)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(error: impl Into<RawError>) -> Self {
        Self {
            data: None,
            error: Some(normalize(error.into())),
        }
    }

    pub fn from_result(result: Result<T, ErrorInfo>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::fail(err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|err| err.message.as_str())
    }

    pub fn into_result(self) -> Result<T, ErrorInfo> {
        match (self.data, self.error) {
            (_, Some(err)) => Err(err),
            (Some(data), None) => Ok(data),
            (None, None) => Err(ErrorInfo::new(
                ErrorCode::Unknown,
                "Response carried neither data nor error",
            )),
        }
    }
}

/// Build a success response.
pub fn ok<T>(data: T) -> Response<T> {
    Response::ok(data)
}

/// Build an error response, coercing any recognized raw shape.
pub fn fail<T>(error: impl Into<RawError>) -> Response<T> {
    Response::fail(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_and_fail_are_mutually_exclusive() {
        let success: Response<i32> = ok(42);
        assert!(success.is_success());
        assert!(!success.is_error());
        assert_eq!(success.data(), Some(&42));

        let failure: Response<i32> = fail("boom");
        assert!(failure.is_error());
        assert_eq!(failure.data(), None);
        assert_eq!(failure.error_message(), Some("boom"));
    }

    #[test]
    fn string_input_becomes_unknown_error() {
        let info = normalize(RawError::from("something odd"));
        assert_eq!(info.code, ErrorCode::Unknown);
        assert_eq!(info.message, "something odd");
    }

    #[test]
    fn native_error_keeps_message_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let info = normalize(RawError::exception(io));
        assert_eq!(info.code, ErrorCode::Query);
        assert_eq!(info.message, "connection reset");
        assert!(info.source.is_some());
    }

    #[test]
    fn nested_payload_is_unwrapped() {
        let info = normalize(RawError::from(json!({
            "error": { "message": "row not found", "code": "not_found" }
        })));
        assert_eq!(info.code, ErrorCode::NotFound);
        assert_eq!(info.message, "row not found");
    }

    #[test]
    fn flat_payload_with_unknown_code_keeps_backend_code() {
        let info = normalize(RawError::from(json!({
            "message": "duplicate key",
            "code": "23505"
        })));
        assert_eq!(info.code, ErrorCode::Query);
        assert_eq!(info.message, "duplicate key");
        assert_eq!(info.details, Some(json!({ "backend_code": "23505" })));
    }

    #[test]
    fn unrecognized_payload_falls_back_to_unknown() {
        let info = normalize(RawError::from(json!([1, 2, 3])));
        assert_eq!(info.code, ErrorCode::Unknown);
        assert_eq!(info.message, "[1,2,3]");

        let info = normalize(RawError::from(json!(null)));
        assert_eq!(info.code, ErrorCode::Unknown);
        assert_eq!(info.message, "Unknown error");
    }

    #[test]
    fn already_normalized_errors_pass_through_unwrapped() {
        let original = ErrorInfo::new(ErrorCode::Validation, "bad input")
            .with_details(json!({ "name": "required" }));
        let info = normalize(RawError::from(original.clone()));
        assert_eq!(info, original);
    }

    #[test]
    fn into_result_round_trips() {
        let success: Response<&str> = ok("row");
        assert_eq!(success.into_result().ok(), Some("row"));

        let failure: Response<&str> = fail(ErrorInfo::new(ErrorCode::NotFound, "No rows found"));
        let err = failure.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
