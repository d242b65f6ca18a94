#![forbid(unsafe_code)]

//! Value types carried by fields, with their X3D type names and text forms.

use std::fmt;

/// A value that can live in a [`ValueField`](crate::ValueField) or
/// [`ListField`](crate::ListField).
pub trait FieldValue: Clone + PartialEq + fmt::Debug + 'static {
    /// Type name of the single-value field, e.g. `SFFloat`.
    const SF_NAME: &'static str;
    /// Type name of the list field, e.g. `MFFloat`.
    const MF_NAME: &'static str;

    fn parse(text: &str) -> Result<Self, ParseValueError>;

    fn format(&self) -> String;

    /// Parse a list. The default splits on commas and whitespace.
    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        text.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    fn format_list(values: &[Self]) -> String {
        values
            .iter()
            .map(Self::format)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A textual value that does not parse as the expected type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseValueError {
    pub expected: &'static str,
    pub input: String,
}

impl ParseValueError {
    fn new(expected: &'static str, input: &str) -> Self {
        Self {
            expected,
            input: input.to_string(),
        }
    }
}

impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, got '{}'", self.expected, self.input)
    }
}

impl std::error::Error for ParseValueError {}

fn numbers<T: std::str::FromStr>(
    text: &str,
    expected: &'static str,
) -> Result<Vec<T>, ParseValueError> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| ParseValueError::new(expected, text)))
        .collect()
}

fn exactly<const N: usize>(
    text: &str,
    expected: &'static str,
) -> Result<[f32; N], ParseValueError> {
    let parts: Vec<f32> = numbers(text, expected)?;
    parts
        .try_into()
        .map_err(|_| ParseValueError::new(expected, text))
}

fn chunked<T, const N: usize>(
    text: &str,
    expected: &'static str,
    make: impl Fn([f32; N]) -> T,
) -> Result<Vec<T>, ParseValueError> {
    let parts: Vec<f32> = numbers(text, expected)?;
    if parts.len() % N != 0 {
        return Err(ParseValueError::new(expected, text));
    }
    Ok(parts
        .chunks_exact(N)
        .map(|c| {
            let mut arr = [0.0; N];
            arr.copy_from_slice(c);
            make(arr)
        })
        .collect())
}

impl FieldValue for bool {
    const SF_NAME: &'static str = "SFBool";
    const MF_NAME: &'static str = "MFBool";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        match text.trim() {
            "TRUE" | "true" => Ok(true),
            "FALSE" | "false" => Ok(false),
            _ => Err(ParseValueError::new(Self::SF_NAME, text)),
        }
    }

    fn format(&self) -> String {
        if *self { "TRUE" } else { "FALSE" }.to_string()
    }
}

macro_rules! scalar_value {
    ($ty:ty, $sf:literal, $mf:literal) => {
        impl FieldValue for $ty {
            const SF_NAME: &'static str = $sf;
            const MF_NAME: &'static str = $mf;

            fn parse(text: &str) -> Result<Self, ParseValueError> {
                text.trim()
                    .parse()
                    .map_err(|_| ParseValueError::new(Self::SF_NAME, text))
            }

            fn format(&self) -> String {
                self.to_string()
            }
        }
    };
}

scalar_value!(i32, "SFInt32", "MFInt32");
scalar_value!(f32, "SFFloat", "MFFloat");
scalar_value!(f64, "SFDouble", "MFDouble");

impl FieldValue for String {
    const SF_NAME: &'static str = "SFString";
    const MF_NAME: &'static str = "MFString";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        let trimmed = text.trim();
        Ok(trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed)
            .to_string())
    }

    fn format(&self) -> String {
        format!("\"{self}\"")
    }

    /// Quoted strings: `"a b" "c"`. Unquoted input is a single string.
    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if !trimmed.starts_with('"') {
            return Ok(vec![trimmed.to_string()]);
        }
        let mut out = Vec::new();
        let mut rest = trimmed;
        while let Some(start) = rest.find('"') {
            let after = &rest[start + 1..];
            let end = after
                .find('"')
                .ok_or_else(|| ParseValueError::new(Self::MF_NAME, text))?;
            out.push(after[..end].to_string());
            rest = &after[end + 1..];
        }
        Ok(out)
    }
}

/// Two-component float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2f {
    pub x: f32,
    pub y: f32,
}

impl Vec2f {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl FieldValue for Vec2f {
    const SF_NAME: &'static str = "SFVec2f";
    const MF_NAME: &'static str = "MFVec2f";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        let [x, y] = exactly::<2>(text, Self::SF_NAME)?;
        Ok(Self::new(x, y))
    }

    fn format(&self) -> String {
        format!("{} {}", self.x, self.y)
    }

    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        chunked::<_, 2>(text, Self::MF_NAME, |[x, y]| Self::new(x, y))
    }
}

/// Three-component float vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3f {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl std::ops::Add for Vec3f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl FieldValue for Vec3f {
    const SF_NAME: &'static str = "SFVec3f";
    const MF_NAME: &'static str = "MFVec3f";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        let [x, y, z] = exactly::<3>(text, Self::SF_NAME)?;
        Ok(Self::new(x, y, z))
    }

    fn format(&self) -> String {
        format!("{} {} {}", self.x, self.y, self.z)
    }

    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        chunked::<_, 3>(text, Self::MF_NAME, |[x, y, z]| Self::new(x, y, z))
    }
}

/// Axis-angle rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub axis: Vec3f,
    pub angle: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            axis: Vec3f::new(0.0, 0.0, 1.0),
            angle: 0.0,
        }
    }
}

impl FieldValue for Rotation {
    const SF_NAME: &'static str = "SFRotation";
    const MF_NAME: &'static str = "MFRotation";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        let [x, y, z, angle] = exactly::<4>(text, Self::SF_NAME)?;
        Ok(Self {
            axis: Vec3f::new(x, y, z),
            angle,
        })
    }

    fn format(&self) -> String {
        format!("{} {}", self.axis.format(), self.angle)
    }

    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        chunked::<_, 4>(text, Self::MF_NAME, |[x, y, z, angle]| Self {
            axis: Vec3f::new(x, y, z),
            angle,
        })
    }
}

/// RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl FieldValue for Rgb {
    const SF_NAME: &'static str = "SFColor";
    const MF_NAME: &'static str = "MFColor";

    fn parse(text: &str) -> Result<Self, ParseValueError> {
        let [r, g, b] = exactly::<3>(text, Self::SF_NAME)?;
        Ok(Self::new(r, g, b))
    }

    fn format(&self) -> String {
        format!("{} {} {}", self.r, self.g, self.b)
    }

    fn parse_list(text: &str) -> Result<Vec<Self>, ParseValueError> {
        chunked::<_, 3>(text, Self::MF_NAME, |[r, g, b]| Self::new(r, g, b))
    }
}
