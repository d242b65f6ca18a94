#![forbid(unsafe_code)]

//! Positional type constraints on incoming routes.
//!
//! A [`TypeConstraint`] is an ordered list of entries, one per route
//! position, optionally followed by a repeating group that matches any
//! number of further routes:
//!
//! ```text
//! [SFFloat, SFVec3f | SFVec2f, optional SFBool] then any number of [SFTime]
//! ```
//!
//! # Invariants
//!
//! 1. Optional entries only appear after every required entry.
//! 2. The universal type name [`ANY_FIELD_TYPE`] matches every field type.
//! 3. Without a repeating group the number of routes is bounded by the
//!    number of entries; with one it is unbounded.

use std::borrow::Cow;
use std::fmt;

use crate::error::FieldError;

/// Type name that matches any field.
pub const ANY_FIELD_TYPE: &str = "Field";

pub type TypeName = Cow<'static, str>;

/// One position in a [`TypeConstraint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintEntry {
    /// Exactly this type.
    Exactly(TypeName),
    /// Any one of these types.
    AnyOf(Vec<TypeName>),
    /// The inner entry, or no route at all.
    Optional(Box<ConstraintEntry>),
}

impl ConstraintEntry {
    #[must_use]
    pub fn exactly(name: impl Into<TypeName>) -> Self {
        Self::Exactly(name.into())
    }

    #[must_use]
    pub fn any_of<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TypeName>,
    {
        Self::AnyOf(names.into_iter().map(Into::into).collect())
    }

    /// Wrap an entry as optional. Already optional entries are not nested.
    #[must_use]
    pub fn optional(entry: Self) -> Self {
        match entry {
            Self::Optional(_) => entry,
            other => Self::Optional(Box::new(other)),
        }
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// Whether a field of type `actual` satisfies this entry.
    #[must_use]
    pub fn matches(&self, actual: &str) -> bool {
        let accepts = |name: &TypeName| name == ANY_FIELD_TYPE || name == actual;
        match self {
            Self::Exactly(name) => accepts(name),
            Self::AnyOf(names) => names.iter().any(accepts),
            Self::Optional(inner) => inner.matches(actual),
        }
    }

    /// The type names this entry accepts, for diagnostics.
    #[must_use]
    pub fn expected(&self) -> Vec<String> {
        match self {
            Self::Exactly(name) => vec![name.to_string()],
            Self::AnyOf(names) => names.iter().map(ToString::to_string).collect(),
            Self::Optional(inner) => inner.expected(),
        }
    }
}

impl From<&'static str> for ConstraintEntry {
    fn from(name: &'static str) -> Self {
        Self::exactly(name)
    }
}

/// Allowed number of incoming routes. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCount {
    pub min: usize,
    pub max: Option<usize>,
}

impl RouteCount {
    #[must_use]
    pub fn contains(&self, n: usize) -> bool {
        n >= self.min && self.max.is_none_or(|max| n <= max)
    }
}

impl fmt::Display for RouteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            None => write!(f, "at least {}", self.min),
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{}..={max}", self.min),
        }
    }
}

/// A constraint check failure, not yet attributed to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    InvalidType {
        position: usize,
        expected: Vec<String>,
        actual: String,
    },
    InvalidRouteCount {
        expected: RouteCount,
        actual: usize,
    },
}

impl ConstraintViolation {
    /// Attach the name of the field being checked.
    #[must_use]
    pub fn into_field_error(self, field: impl Into<String>) -> FieldError {
        let field = field.into();
        match self {
            Self::InvalidType {
                position,
                expected,
                actual,
            } => FieldError::InvalidType {
                field,
                position,
                expected,
                actual,
            },
            Self::InvalidRouteCount { expected, actual } => FieldError::InvalidRouteCount {
                field,
                expected,
                actual,
            },
        }
    }
}

/// A required entry was declared after an optional one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedConstraint {
    pub position: usize,
}

impl fmt::Display for MalformedConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "required constraint entry at position {} follows an optional one",
            self.position
        )
    }
}

impl std::error::Error for MalformedConstraint {}

/// Ordered per-position type requirements for incoming routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConstraint {
    entries: Vec<ConstraintEntry>,
    repeat: Vec<ConstraintEntry>,
}

impl Default for TypeConstraint {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl TypeConstraint {
    /// Any number of routes of any type.
    #[must_use]
    pub fn unconstrained() -> Self {
        Self::any_number_of(ANY_FIELD_TYPE)
    }

    /// No incoming routes at all.
    #[must_use]
    pub fn no_inputs() -> Self {
        Self {
            entries: Vec::new(),
            repeat: Vec::new(),
        }
    }

    /// Any number of routes of type `name`.
    #[must_use]
    pub fn any_number_of(name: impl Into<TypeName>) -> Self {
        Self {
            entries: Vec::new(),
            repeat: vec![ConstraintEntry::exactly(name)],
        }
    }

    /// Exactly these types, all required, in order.
    #[must_use]
    pub fn exactly<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TypeName>,
    {
        Self {
            entries: names.into_iter().map(ConstraintEntry::exactly).collect(),
            repeat: Vec::new(),
        }
    }

    #[must_use]
    pub fn builder() -> TypeConstraintBuilder {
        TypeConstraintBuilder::default()
    }

    /// Validate and build a constraint from positional entries.
    pub fn new(entries: Vec<ConstraintEntry>) -> Result<Self, MalformedConstraint> {
        let mut seen_optional = false;
        for (position, entry) in entries.iter().enumerate() {
            if entry.is_optional() {
                seen_optional = true;
            } else if seen_optional {
                return Err(MalformedConstraint { position });
            }
        }
        Ok(Self {
            entries,
            repeat: Vec::new(),
        })
    }

    /// Append a repeating group matched cyclically after the fixed entries.
    #[must_use]
    pub fn then_any_number<I>(mut self, group: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ConstraintEntry>,
    {
        self.repeat = group.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn entries(&self) -> &[ConstraintEntry] {
        &self.entries
    }

    #[must_use]
    pub fn repeating(&self) -> &[ConstraintEntry] {
        &self.repeat
    }

    #[must_use]
    pub fn route_count(&self) -> RouteCount {
        RouteCount {
            min: self.entries.iter().filter(|e| !e.is_optional()).count(),
            max: self.repeat.is_empty().then_some(self.entries.len()),
        }
    }

    /// The entry governing route `position`, if the position is allowed.
    #[must_use]
    pub fn entry_at(&self, position: usize) -> Option<&ConstraintEntry> {
        if let Some(entry) = self.entries.get(position) {
            return Some(entry);
        }
        if self.repeat.is_empty() {
            return None;
        }
        let offset = position - self.entries.len();
        self.repeat.get(offset % self.repeat.len())
    }

    /// Check a single route of type `actual` arriving at `position`.
    pub fn check(&self, position: usize, actual: &str) -> Result<(), ConstraintViolation> {
        match self.entry_at(position) {
            None => Err(ConstraintViolation::InvalidRouteCount {
                expected: self.route_count(),
                actual: position + 1,
            }),
            Some(entry) if !entry.matches(actual) => Err(ConstraintViolation::InvalidType {
                position,
                expected: entry.expected(),
                actual: actual.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Check that `n` incoming routes is an allowed count.
    pub fn check_count(&self, n: usize) -> Result<(), ConstraintViolation> {
        let expected = self.route_count();
        if expected.contains(n) {
            Ok(())
        } else {
            Err(ConstraintViolation::InvalidRouteCount {
                expected,
                actual: n,
            })
        }
    }

    /// Check a complete, ordered list of input types.
    pub fn check_all(&self, types: &[&str]) -> Result<(), ConstraintViolation> {
        for (position, actual) in types.iter().enumerate() {
            self.check(position, actual)?;
        }
        self.check_count(types.len())
    }
}

/// Builder for [`TypeConstraint`].
#[derive(Debug, Default)]
pub struct TypeConstraintBuilder {
    entries: Vec<ConstraintEntry>,
    repeat: Vec<ConstraintEntry>,
}

impl TypeConstraintBuilder {
    #[must_use]
    pub fn required(mut self, name: impl Into<TypeName>) -> Self {
        self.entries.push(ConstraintEntry::exactly(name));
        self
    }

    #[must_use]
    pub fn any_of<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<TypeName>,
    {
        self.entries.push(ConstraintEntry::any_of(names));
        self
    }

    #[must_use]
    pub fn optional(mut self, entry: impl Into<ConstraintEntry>) -> Self {
        self.entries.push(ConstraintEntry::optional(entry.into()));
        self
    }

    #[must_use]
    pub fn any_number(mut self, entry: impl Into<ConstraintEntry>) -> Self {
        self.repeat.push(entry.into());
        self
    }

    pub fn build(self) -> Result<TypeConstraint, MalformedConstraint> {
        Ok(TypeConstraint::new(self.entries)?.then_any_number(self.repeat))
    }
}
