//! Request building and response decoding.
//!
//! A [`Selection`] is what the engine subscribes with: it builds the
//! `subscribe` payload and turns the `data` of each `next` result into a
//! typed value. The engine treats both steps as opaque.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::protocol::SubscribePayload;

// ============================================================================
// Selection
// ============================================================================

/// A subscription operation: payload builder plus result decoder.
pub trait Selection: Send + 'static {
    /// Decoded value delivered for every `next` frame.
    type Output: Send + 'static;

    /// Builds the `subscribe` payload.
    ///
    /// # Errors
    ///
    /// A failure is reported to the subscriber as
    /// [`Error::EncodeSelectionFailed`](crate::Error::EncodeSelectionFailed).
    fn payload(&self) -> serde_json::Result<SubscribePayload>;

    /// Decodes the `data` member of one execution result.
    ///
    /// # Errors
    ///
    /// A failure is reported to the subscriber as
    /// [`Error::DecodeSelectionFailed`](crate::Error::DecodeSelectionFailed).
    fn decode(&self, data: Value) -> serde_json::Result<Self::Output>;
}

/// A raw payload selects untyped JSON.
impl Selection for SubscribePayload {
    type Output = Value;

    fn payload(&self) -> serde_json::Result<SubscribePayload> {
        Ok(self.clone())
    }

    fn decode(&self, data: Value) -> serde_json::Result<Value> {
        Ok(data)
    }
}

// ============================================================================
// GraphQLRequest
// ============================================================================

/// A subscription document decoded into `T`.
///
/// Variables are serialized when the subscription is actually sent, so a
/// queued subscription reports encoding failures at that point.
///
/// # Example
///
/// ```
/// use gql_transport_ws::GraphQLRequest;
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct OnMessage {
///     message: String,
/// }
///
/// let request = GraphQLRequest::<OnMessage>::new("subscription($room: ID!) { message(room: $room) }")
///     .variables(json!({ "room": "general" }))
///     .operation_name("OnMessage");
/// ```
pub struct GraphQLRequest<T, V = Value> {
    query: String,
    variables: Option<V>,
    operation_name: Option<String>,
    _output: PhantomData<fn() -> T>,
}

impl<T> GraphQLRequest<T> {
    /// Creates a request without variables.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
            _output: PhantomData,
        }
    }
}

impl<T, V> GraphQLRequest<T, V> {
    /// Sets the operation variables.
    #[must_use]
    pub fn variables<W: Serialize>(self, variables: W) -> GraphQLRequest<T, W> {
        GraphQLRequest {
            query: self.query,
            variables: Some(variables),
            operation_name: self.operation_name,
            _output: PhantomData,
        }
    }

    /// Sets the operation name.
    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Returns the GraphQL document.
    #[inline]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl<T, V: Clone> Clone for GraphQLRequest<T, V> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            variables: self.variables.clone(),
            operation_name: self.operation_name.clone(),
            _output: PhantomData,
        }
    }
}

impl<T, V> fmt::Debug for GraphQLRequest<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQLRequest")
            .field("query", &self.query)
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}

impl<T, V> Selection for GraphQLRequest<T, V>
where
    T: DeserializeOwned + Send + 'static,
    V: Serialize + Send + 'static,
{
    type Output = T;

    fn payload(&self) -> serde_json::Result<SubscribePayload> {
        let variables = self
            .variables
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        Ok(SubscribePayload {
            variables,
            operation_name: self.operation_name.clone(),
            ..SubscribePayload::new(self.query.clone())
        })
    }

    fn decode(&self, data: Value) -> serde_json::Result<T> {
        serde_json::from_value(data)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tick {
        n: u32,
    }

    #[test]
    fn test_payload_with_variables() {
        let request = GraphQLRequest::<Tick>::new("subscription($every: Int) { n }")
            .variables(json!({ "every": 5 }))
            .operation_name("Ticks");

        let payload = request.payload().unwrap();
        assert_eq!(payload.query, "subscription($every: Int) { n }");
        assert_eq!(payload.variables, Some(json!({ "every": 5 })));
        assert_eq!(payload.operation_name.as_deref(), Some("Ticks"));
    }

    #[test]
    fn test_payload_with_unserializable_variables() {
        // JSON object keys must be strings.
        let mut variables = BTreeMap::new();
        variables.insert((1, 2), "x");

        let request = GraphQLRequest::<Tick>::new("subscription { n }").variables(variables);
        assert!(request.payload().is_err());
    }

    #[test]
    fn test_decode() {
        let request = GraphQLRequest::<Tick>::new("subscription { n }");
        assert_eq!(request.decode(json!({ "n": 3 })).unwrap(), Tick { n: 3 });
        assert!(request.decode(json!({ "n": "three" })).is_err());
    }

    #[test]
    fn test_raw_payload_selection() {
        let payload = SubscribePayload::new("subscription { n }");
        assert_eq!(payload.payload().unwrap(), payload);
        assert_eq!(payload.decode(json!({ "n": 1 })).unwrap(), json!({ "n": 1 }));
    }
}
