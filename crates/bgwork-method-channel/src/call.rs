use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A method invocation travelling over a [`MethodChannel`](crate::MethodChannel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Create a call that carries no arguments
    pub fn no_arguments(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    /// Get a named argument (if arguments are an object)
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.as_object()?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_string};

    #[test]
    fn test_call_serialization() {
        let call = MethodCall::new("onResultSend", json!({"task": "sync"}));

        let json = to_string(&call).unwrap();
        let parsed: MethodCall = from_str(&json).unwrap();

        assert_eq!(parsed, call);
        assert_eq!(parsed.argument("task"), Some(&json!("sync")));
        assert_eq!(parsed.argument("missing"), None);
    }

    #[test]
    fn test_missing_arguments_default_to_null() {
        let parsed: MethodCall = from_str(r#"{"method":"backgroundChannelInitialized"}"#).unwrap();
        assert_eq!(parsed, MethodCall::no_arguments("backgroundChannelInitialized"));
        assert_eq!(parsed.argument("anything"), None);
    }
}
