//! The probing surface of a loaded module.
//!
//! [`Namespace`] is the seam between the game-logic probes and whatever hosts
//! the module. The production implementation is
//! [`SandboxNamespace`](crate::host::SandboxNamespace), which forwards every
//! request to a sandbox worker process. Values travel as JSON; objects that
//! have no JSON form come back as `{"$handle": id, "$type": name}` references
//! that later requests can target.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse classification of a top-level binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// A function, method or builtin.
    Function,
    /// A class.
    Class,
    /// A `dict` or other mapping.
    Mapping,
    /// A list, tuple or other non-text sequence.
    Sequence,
    /// An `int` or `float`.
    Number,
    /// A `str`.
    Text,
    /// A `bool`.
    Boolean,
    /// `None`.
    None,
    /// An imported module.
    Module,
    /// Anything else.
    Object,
}

/// A top-level name and the kind of value bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// The binding name.
    pub name: String,
    /// The kind of the bound value.
    pub kind: BindingKind,
}

/// Every top-level binding of a loaded module, in definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(Vec<Binding>);

impl Bindings {
    /// Wrap a list of bindings.
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self(bindings)
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.0.iter().find(|b| b.name == name)
    }

    /// The kind bound to `name`, if any.
    pub fn kind_of(&self, name: &str) -> Option<BindingKind> {
        self.get(name).map(|b| b.kind)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The first of `names` that is bound.
    pub fn first_of<'a>(&self, names: &[&'a str]) -> Option<&'a str> {
        names.iter().copied().find(|n| self.contains(n))
    }

    /// Iterate in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.0.iter()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a request operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// A top-level binding of the module.
    Global {
        /// Binding name.
        name: String,
    },
    /// An object previously returned as a handle.
    Handle {
        /// Handle id.
        handle: u64,
    },
    /// An attribute of a handle object.
    Attribute {
        /// Handle id.
        handle: u64,
        /// Attribute name.
        name: String,
    },
}

impl Target {
    /// Target a top-level binding.
    pub fn global(name: impl Into<String>) -> Self {
        Self::Global { name: name.into() }
    }

    /// Target an attribute of a handle object.
    pub fn attribute(handle: u64, name: impl Into<String>) -> Self {
        Self::Attribute {
            handle,
            name: name.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Global { name } => f.write_str(name),
            Target::Handle { handle } => write!(f, "<handle {handle}>"),
            Target::Attribute { handle, name } => write!(f, "<handle {handle}>.{name}"),
        }
    }
}

/// A value returned by the module, with its truthiness as the module sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallValue {
    /// JSON form, or a `$handle` reference.
    pub value: Value,
    /// `bool(value)` evaluated inside the module's interpreter.
    pub truthy: bool,
}

impl CallValue {
    /// The handle id, when the value is a handle reference.
    pub fn handle(&self) -> Option<u64> {
        self.value.get("$handle").and_then(Value::as_u64)
    }

    /// The type name recorded for a handle reference.
    pub fn type_name(&self) -> Option<&str> {
        self.value.get("$type").and_then(Value::as_str)
    }
}

/// Encode a 2-D grid so the worker materializes it as a numeric array
/// (numpy when available, nested lists otherwise).
pub fn array_arg(rows: Vec<Vec<i64>>) -> Value {
    serde_json::json!({ "$array": rows })
}

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    /// The arguments do not bind to the callable's signature.
    Signature,
    /// The target does not exist.
    Missing,
    /// The target exists but cannot be called.
    NotCallable,
    /// The module code raised.
    Raised,
    /// The request exceeded its deadline; the worker was killed.
    Timeout,
    /// The worker is no longer running.
    WorkerGone,
    /// The worker sent something unexpected.
    Protocol,
}

/// A failed namespace request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallError {
    /// Failure category.
    pub kind: CallErrorKind,
    /// Exception type name, for failures raised by module code.
    #[serde(default)]
    pub exc_type: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

impl CallError {
    /// Build an error of `kind` with no exception type.
    pub fn new(kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exc_type: None,
            message: message.into(),
        }
    }

    /// Whether the failure is a signature mismatch rather than a logic error.
    pub fn is_signature(&self) -> bool {
        self.kind == CallErrorKind::Signature
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exc_type {
            Some(exc) => write!(f, "{exc}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CallError {}

/// Shape of an object, as reported by `Describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Binding kind of the object.
    pub kind: BindingKind,
    /// `type(obj).__name__`.
    pub type_name: String,
    /// Public attribute names (no leading underscore).
    pub attributes: Vec<String>,
    /// Whether the object is callable.
    pub callable: bool,
}

impl ObjectInfo {
    /// Whether the object exposes `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }
}

/// The probing surface of a loaded module.
#[async_trait::async_trait]
pub trait Namespace: Send {
    /// Every top-level binding produced by loading the module.
    fn bindings(&self) -> &Bindings;

    /// Call `target` with positional `args`.
    async fn call(&mut self, target: Target, args: Vec<Value>) -> Result<CallValue, CallError>;

    /// Read `target` without calling it.
    async fn get(&mut self, target: Target) -> Result<CallValue, CallError>;

    /// Rebind a top-level name of the module.
    async fn set_global(&mut self, name: &str, value: Value) -> Result<(), CallError>;

    /// Describe the object at `target`.
    async fn describe(&mut self, target: Target) -> Result<ObjectInfo, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        Bindings::new(vec![
            Binding {
                name: "board".into(),
                kind: BindingKind::Sequence,
            },
            Binding {
                name: "check_win".into(),
                kind: BindingKind::Function,
            },
        ])
    }

    #[test]
    fn bindings_lookup() {
        let b = bindings();
        assert_eq!(b.kind_of("check_win"), Some(BindingKind::Function));
        assert!(b.contains("board"));
        assert!(!b.contains("winning_move"));
        assert_eq!(b.first_of(&["winning_move", "check_win"]), Some("check_win"));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn target_wire_format() {
        let json = serde_json::to_value(Target::attribute(3, "move")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "attribute", "handle": 3, "name": "move"})
        );
        let json = serde_json::to_value(Target::global("board")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "global", "name": "board"}));
    }

    #[test]
    fn call_value_handle() {
        let v = CallValue {
            value: serde_json::json!({"$handle": 7, "$type": "Snake"}),
            truthy: true,
        };
        assert_eq!(v.handle(), Some(7));
        assert_eq!(v.type_name(), Some("Snake"));

        let plain = CallValue {
            value: serde_json::json!(true),
            truthy: true,
        };
        assert_eq!(plain.handle(), None);
    }

    #[test]
    fn call_error_display() {
        let err = CallError {
            kind: CallErrorKind::Raised,
            exc_type: Some("IndexError".into()),
            message: "list index out of range".into(),
        };
        assert_eq!(err.to_string(), "IndexError: list index out of range");
        assert!(!err.is_signature());
    }

    #[test]
    fn call_error_wire_format() {
        let err: CallError = serde_json::from_value(serde_json::json!({
            "kind": "not_callable",
            "message": "'int' object is not callable"
        }))
        .unwrap();
        assert_eq!(err.kind, CallErrorKind::NotCallable);
        assert!(err.exc_type.is_none());
    }

    #[test]
    fn array_arg_shape() {
        let v = array_arg(vec![vec![0, 1], vec![1, 0]]);
        assert_eq!(v, serde_json::json!({"$array": [[0, 1], [1, 0]]}));
    }
}
