//! Payload types carried inside frames.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// SubscribePayload
// ============================================================================

/// Payload of a `subscribe` frame.
///
/// # Format
///
/// ```json
/// {
///   "query": "subscription { ... }",
///   "variables": { ... },
///   "operationName": "Name"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePayload {
    /// GraphQL document.
    pub query: String,

    /// Operation variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,

    /// Operation to execute when the document holds several.
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,

    /// Protocol extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl SubscribePayload {
    /// Creates a payload with only a query.
    #[inline]
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
            extensions: None,
        }
    }
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// Payload of a `next` frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecutionResult {
    /// Selected data, absent when execution failed entirely.
    #[serde(default)]
    pub data: Option<Value>,

    /// Field or request errors.
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,

    /// Server extensions.
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl ExecutionResult {
    /// Splits the result into its data, or the errors when no data came back.
    pub fn into_data(self) -> Result<Value, Vec<GraphQLError>> {
        match (self.data, self.errors) {
            (Some(data), _) if !data.is_null() => Ok(data),
            (_, Some(errors)) if !errors.is_empty() => Err(errors),
            (data, _) => Ok(data.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// GraphQLError
// ============================================================================

/// A GraphQL error as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human readable message.
    pub message: String,

    /// Document locations the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<Location>>,

    /// Response path of the failing field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Server-defined details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Creates an error with only a message.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }
}

/// Line/column position in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

// ============================================================================
// Tests
// ============================================================================
