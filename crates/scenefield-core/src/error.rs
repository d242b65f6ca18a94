#![forbid(unsafe_code)]

//! Error types for field, route and registry operations.
//!
//! Every failure leaves the graph unchanged: a rejected route is never
//! half-connected and a rejected write never stores its value.

use std::fmt;

use crate::access::AccessType;
use crate::constraint::RouteCount;

/// Operation that was refused by an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperation {
    /// Writing a value.
    Set,
    /// Reading a value.
    Get,
    /// Using the cell as the source of a route.
    RouteFrom,
    /// Using the cell as the destination of a route.
    RouteTo,
}

impl FieldOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set value of",
            Self::Get => "get value of",
            Self::RouteFrom => "route from",
            Self::RouteTo => "route to",
        }
    }
}

/// Errors raised by field operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A routed input has a type the destination does not accept at that position.
    InvalidType {
        field: String,
        position: usize,
        expected: Vec<String>,
        actual: String,
    },
    /// The destination cannot accept another incoming route.
    InvalidRouteCount {
        field: String,
        expected: RouteCount,
        actual: usize,
    },
    /// An access rule refused the operation.
    AccessViolation {
        field: String,
        access: AccessType,
        operation: FieldOperation,
    },
    /// A container refused a node that does not satisfy its type filter.
    InvalidNodeType {
        field: String,
        expected: String,
        actual: String,
    },
    /// A textual value could not be parsed into the field's value type.
    Parse { field: String, message: String },
    /// The field does not support textual values.
    Unsupported { field: String, operation: &'static str },
    /// A route end has no live handle: it is being dropped, or was not
    /// built inside `Rc::new_cyclic`.
    FieldDropped,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidType {
                field,
                position,
                expected,
                actual,
            } => write!(
                f,
                "invalid type for route {position} into '{field}': expected {}, got {actual}",
                expected.join(" | ")
            ),
            Self::InvalidRouteCount {
                field,
                expected,
                actual,
            } => write!(
                f,
                "invalid route count for '{field}': expected {expected}, got {actual}"
            ),
            Self::AccessViolation {
                field,
                access,
                operation,
            } => write!(
                f,
                "cannot {} {access} field '{field}'",
                operation.as_str()
            ),
            Self::InvalidNodeType {
                field,
                expected,
                actual,
            } => write!(
                f,
                "invalid node type for '{field}': expected {expected}, got {actual}"
            ),
            Self::Parse { field, message } => {
                write!(f, "cannot parse value for '{field}': {message}")
            }
            Self::Unsupported { field, operation } => {
                write!(f, "'{field}' does not support {operation}")
            }
            Self::FieldDropped => write!(f, "field was dropped"),
        }
    }
}

impl std::error::Error for FieldError {}

/// Errors raised while registering or instantiating node types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A type (or alias) with this name is already registered.
    DuplicateType(String),
    /// The declared parent type has not been registered yet.
    UnknownParentType { type_name: String, parent: String },
    /// No type with this name is registered.
    UnknownType(String),
    /// The type is abstract and has no factory.
    NoFactory(String),
    /// A type declared the same field name twice.
    DuplicateField { type_name: String, field: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateType(name) => write!(f, "node type '{name}' is already registered"),
            Self::UnknownParentType { type_name, parent } => write!(
                f,
                "node type '{type_name}' names unregistered parent '{parent}'"
            ),
            Self::UnknownType(name) => write!(f, "unknown node type '{name}'"),
            Self::NoFactory(name) => write!(f, "node type '{name}' cannot be instantiated"),
            Self::DuplicateField { type_name, field } => {
                write!(f, "node type '{type_name}' declares field '{field}' twice")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors raised while loading a [`GraphConfig`](crate::config::GraphConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that is not a boolean.
    InvalidFlag { variable: String, value: String },
    /// A configuration document could not be parsed.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFlag { variable, value } => {
                write!(f, "{variable}: expected a boolean, got '{value}'")
            }
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_violation_names_operation_and_policy() {
        let err = FieldError::AccessViolation {
            field: "Box.size".into(),
            access: AccessType::OutputOnly,
            operation: FieldOperation::Set,
        };
        assert_eq!(err.to_string(), "cannot set value of outputOnly field 'Box.size'");
    }

    #[test]
    fn invalid_type_lists_alternatives() {
        let err = FieldError::InvalidType {
            field: "t".into(),
            position: 1,
            expected: vec!["SFVec2f".into(), "SFVec3f".into()],
            actual: "SFBool".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SFVec2f | SFVec3f"));
        assert!(msg.contains("got SFBool"));
    }

    #[test]
    fn registry_errors_display() {
        let err = RegistryError::UnknownParentType {
            type_name: "Box".into(),
            parent: "X3DGeometryNode".into(),
        };
        assert!(err.to_string().contains("X3DGeometryNode"));
        assert_eq!(
            RegistryError::NoFactory("X3DNode".into()).to_string(),
            "node type 'X3DNode' cannot be instantiated"
        );
    }
}
