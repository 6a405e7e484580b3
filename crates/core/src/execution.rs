//! Execution request shape and validation rules.
//!
//! Request bodies arrive loosely typed ([`RawExecutionRequest`]) so that a
//! wrong type or an unknown language is reported as a validation failure
//! listing every problem, instead of a generic deserialization rejection.

use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::language::Language;
use crate::types::DbId;

/// Largest accepted source payload, in bytes.
pub const MAX_CODE_BYTES: usize = 100_000;

/// Lower bound for a caller-supplied timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Upper bound for a caller-supplied timeout.
pub const MAX_TIMEOUT_MS: u64 = 30_000;

/// Execution request body as received over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecutionRequest {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub language: Option<Value>,
    #[serde(default)]
    pub stdin: Option<Value>,
    #[serde(default, alias = "timeoutMs")]
    pub timeout: Option<Value>,
    #[serde(default, alias = "pythonEnvironmentId")]
    pub environment_ref: Option<Value>,
}

/// A validated execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub stdin: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Only ever set for Python requests.
    pub environment_ref: Option<DbId>,
}

impl ExecutionRequest {
    /// Validate a raw body, reporting every violated rule at once.
    pub fn from_raw(raw: RawExecutionRequest) -> Result<Self, CoreError> {
        let mut problems: Vec<String> = Vec::new();

        let code = match raw.code {
            Some(Value::String(code)) if code.trim().is_empty() => {
                problems.push("Code is required".to_string());
                None
            }
            Some(Value::String(code)) if code.len() > MAX_CODE_BYTES => {
                problems.push(format!("Code must not exceed {MAX_CODE_BYTES} bytes"));
                None
            }
            Some(Value::String(code)) => Some(code),
            Some(_) => {
                problems.push("Code must be a string".to_string());
                None
            }
            None => {
                problems.push("Code is required".to_string());
                None
            }
        };

        let language = match raw.language {
            Some(Value::String(name)) if name.trim().is_empty() => {
                problems.push("Programming language is required".to_string());
                None
            }
            Some(Value::String(name)) => {
                let parsed = Language::parse(&name);
                if parsed.is_none() {
                    problems.push("Unsupported programming language".to_string());
                }
                parsed
            }
            Some(_) => {
                problems.push("Unsupported programming language".to_string());
                None
            }
            None => {
                problems.push("Programming language is required".to_string());
                None
            }
        };

        let stdin = match raw.stdin {
            None => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                problems.push("Standard input must be a string".to_string());
                None
            }
        };

        let timeout_ms = match raw.timeout {
            None => None,
            Some(value) => match parse_timeout(&value) {
                Some(ms) if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) => Some(ms),
                _ => {
                    problems.push("Timeout must be between 1-30 seconds".to_string());
                    None
                }
            },
        };

        let environment_ref = match raw.environment_ref {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => match s.trim().parse::<DbId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    problems.push("Environment ID must be a valid environment identifier".to_string());
                    None
                }
            },
            Some(Value::Number(n)) => match n.as_i64() {
                Some(id) => Some(id),
                None => {
                    problems.push("Environment ID must be a valid environment identifier".to_string());
                    None
                }
            },
            Some(_) => {
                problems.push("Environment ID must be a string".to_string());
                None
            }
        };

        if !problems.is_empty() {
            return Err(CoreError::Validation(problems.join("; ")));
        }

        // Both are guaranteed present when no problem was recorded.
        let (Some(code), Some(language)) = (code, language) else {
            return Err(CoreError::Validation("Malformed execution request".to_string()));
        };

        if environment_ref.is_some() && language != Language::Python {
            tracing::debug!(%language, "Ignoring environment reference for non-Python request");
        }

        Ok(Self {
            code,
            language,
            stdin,
            timeout_ms,
            environment_ref: environment_ref.filter(|_| language == Language::Python),
        })
    }

    /// Caller timeout if given, otherwise the language default.
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms
            .unwrap_or(self.language.profile().default_timeout_ms)
    }
}

/// Accept integers and integer strings, mirroring form-style clients.
fn parse_timeout(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn raw(value: Value) -> RawExecutionRequest {
        serde_json::from_value(value).expect("raw request")
    }

    #[test]
    fn accepts_minimal_request() {
        let req = ExecutionRequest::from_raw(raw(json!({
            "code": "print('hi')",
            "language": "python"
        })))
        .unwrap();
        assert_eq!(req.language, Language::Python);
        assert_eq!(req.timeout_ms, None);
        assert_eq!(req.effective_timeout_ms(), 5_000);
    }

    #[test]
    fn rejects_timeouts_outside_bounds() {
        for timeout in [500, 60_000] {
            let result = ExecutionRequest::from_raw(raw(json!({
                "code": "print('hi')",
                "language": "python",
                "timeout": timeout
            })));
            assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("Timeout"));
        }
    }

    #[test]
    fn accepts_boundary_timeouts_and_numeric_strings() {
        for timeout in [json!(1000), json!(30000), json!("2500")] {
            let req = ExecutionRequest::from_raw(raw(json!({
                "code": "x",
                "language": "ruby",
                "timeoutMs": timeout
            })))
            .unwrap();
            assert!(req.timeout_ms.is_some());
        }
    }

    #[test]
    fn collects_every_problem() {
        let err = ExecutionRequest::from_raw(raw(json!({
            "code": "",
            "language": "cobol",
            "stdin": 5
        })))
        .unwrap_err();
        let CoreError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("Code is required"));
        assert!(msg.contains("Unsupported programming language"));
        assert!(msg.contains("Standard input must be a string"));
    }

    #[test]
    fn rejects_oversized_code() {
        let code = "a".repeat(MAX_CODE_BYTES + 1);
        let result = ExecutionRequest::from_raw(raw(json!({
            "code": code,
            "language": "python"
        })));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn environment_ref_accepts_string_number_and_legacy_name() {
        let a = ExecutionRequest::from_raw(raw(json!({
            "code": "x", "language": "python", "environmentRef": "12"
        })))
        .unwrap();
        let b = ExecutionRequest::from_raw(raw(json!({
            "code": "x", "language": "python", "pythonEnvironmentId": 12
        })))
        .unwrap();
        assert_eq!(a.environment_ref, Some(12));
        assert_eq!(b.environment_ref, Some(12));
    }

    #[test]
    fn environment_ref_dropped_for_other_languages() {
        let req = ExecutionRequest::from_raw(raw(json!({
            "code": "puts 1", "language": "ruby", "environmentRef": "3"
        })))
        .unwrap();
        assert_eq!(req.environment_ref, None);
    }

    #[test]
    fn environment_ref_must_be_identifier() {
        let result = ExecutionRequest::from_raw(raw(json!({
            "code": "x", "language": "python", "environmentRef": ["a"]
        })));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }
}
