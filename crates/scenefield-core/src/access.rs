#![forbid(unsafe_code)]

//! Access policies for fields.
//!
//! A field's [`AccessType`] decides which operations an *external* requester
//! may perform on it. The owning node and the graph's own plumbing are never
//! external, so a node can always write its outputs and read its inputs.
//!
//! | policy           | external set       | external get              | route from | route to |
//! |------------------|--------------------|---------------------------|------------|----------|
//! | `InitializeOnly` | until initialized  | yes                       | yes        | no       |
//! | `OutputOnly`     | no                 | yes                       | yes        | no       |
//! | `InputOnly`      | yes                | only with outgoing routes | no         | yes      |
//! | `InputOutput`    | yes                | yes                       | yes        | yes      |

use std::fmt;
use std::str::FromStr;

use crate::node::NodeId;

/// How a field may be accessed from outside its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessType {
    /// Settable until the owner is initialized, never a route destination.
    InitializeOnly,
    /// Written by the owner only; may be routed from.
    OutputOnly,
    /// Written from outside; may not be routed from.
    InputOnly,
    /// No restrictions.
    #[default]
    InputOutput,
}

impl AccessType {
    /// The X3D keyword for this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitializeOnly => "initializeOnly",
            Self::OutputOnly => "outputOnly",
            Self::InputOnly => "inputOnly",
            Self::InputOutput => "inputOutput",
        }
    }

    /// Whether external requesters may route out of a field with this policy.
    #[must_use]
    pub const fn allows_route_from(self) -> bool {
        !matches!(self, Self::InputOnly)
    }

    /// Whether external requesters may route into a field with this policy.
    #[must_use]
    pub const fn allows_route_to(self) -> bool {
        matches!(self, Self::InputOnly | Self::InputOutput)
    }

    /// Whether `set_<name>` resolves to this field.
    #[must_use]
    pub const fn accepts_set_prefix(self) -> bool {
        matches!(self, Self::InputOutput)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializeOnly" | "field" => Ok(Self::InitializeOnly),
            "outputOnly" | "eventOut" => Ok(Self::OutputOnly),
            "inputOnly" | "eventIn" => Ok(Self::InputOnly),
            "inputOutput" | "exposedField" => Ok(Self::InputOutput),
            other => Err(format!("unknown access type '{other}'")),
        }
    }
}

/// Who is asking for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requester {
    /// Application code outside the graph.
    External,
    /// A node; external for every field it does not own.
    Node(NodeId),
    /// The graph's own plumbing (dependent links, loaders). Never checked.
    Graph,
}
