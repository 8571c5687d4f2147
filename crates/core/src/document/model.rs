//! In-memory odML document tree.
//!
//! A [`Document`] holds a forest of [`Section`]s; sections hold
//! [`Property`] entries and nested sections. Properties carry a typed value
//! list. A value list is *default* when it is empty or only contains the
//! placeholder value of its [`Dtype`]; default values may be filled in by a
//! strict merge, non-default values may not be replaced.

use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use crate::errors::DocumentError;

// ---------------------------------------------------------------------------
// Dtype
// ---------------------------------------------------------------------------

/// Value type of an odML property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dtype {
    Int,
    Float,
    Boolean,
    #[default]
    String,
    Text,
    Person,
    Url,
    Date,
    Datetime,
    Time,
    /// An n-tuple such as `3-tuple`, written as `(a;b;c)`.
    Tuple(usize),
}

impl Dtype {
    /// Parse an odML type name. Unknown names fall back to `string`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Self::Int,
            "float" | "double" => Self::Float,
            "boolean" | "bool" => Self::Boolean,
            "string" | "str" | "" => Self::String,
            "text" => Self::Text,
            "person" => Self::Person,
            "url" => Self::Url,
            "date" => Self::Date,
            "datetime" => Self::Datetime,
            "time" => Self::Time,
            other => match other.strip_suffix("-tuple").and_then(|n| n.parse().ok()) {
                Some(n) => Self::Tuple(n),
                None => {
                    debug!(dtype = other, "unknown odML dtype, treating as string");
                    Self::String
                }
            },
        }
    }

    /// Placeholder that marks a value of this type as "not filled in".
    pub fn default_placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Int => Some("-1"),
            Self::Float => Some("-1.0"),
            Self::Boolean => Some("false"),
            Self::String | Self::Text | Self::Person => Some("-"),
            Self::Url => Some("file://-"),
            Self::Date => Some("1900-11-11"),
            Self::Datetime => Some("1900-11-11 00:00:00"),
            Self::Time => Some("00:00:00"),
            Self::Tuple(_) => None,
        }
    }

    /// Whether `value` equals this type's placeholder.
    pub fn is_default_value(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Int => value.parse::<i64>().map(|v| v == -1).unwrap_or(false),
            Self::Float => value.parse::<f64>().map(|v| v == -1.0).unwrap_or(false),
            Self::Boolean => parse_bool(value) == Some(false),
            Self::Tuple(_) => false,
            _ => self.default_placeholder() == Some(value),
        }
    }

    /// Whether `value` is well-formed for this type.
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Float => value.parse::<f64>().is_ok(),
            Self::Boolean => parse_bool(value).is_some(),
            Self::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            Self::Datetime => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok(),
            Self::Time => NaiveTime::parse_from_str(value, "%H:%M:%S").is_ok(),
            Self::Tuple(n) => value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .map(|inner| inner.split(';').count() == *n)
                .unwrap_or(false),
            Self::String | Self::Text | Self::Person | Self::Url => true,
        }
    }

    /// Whether two values of this type denote the same thing.
    fn values_equal(&self, a: &str, b: &str) -> bool {
        let (a, b) = (a.trim(), b.trim());
        match self {
            Self::Int => match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(x), Ok(y)) => x == y,
                _ => a == b,
            },
            // NaN is the same measurement as NaN here.
            Self::Float => match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x == y || (x.is_nan() && y.is_nan()),
                _ => a == b,
            },
            Self::Boolean => match (parse_bool(a), parse_bool(b)) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
            _ => a == b,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::String => write!(f, "string"),
            Self::Text => write!(f, "text"),
            Self::Person => write!(f, "person"),
            Self::Url => write!(f, "url"),
            Self::Date => write!(f, "date"),
            Self::Datetime => write!(f, "datetime"),
            Self::Time => write!(f, "time"),
            Self::Tuple(n) => write!(f, "{}-tuple", n),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A named, typed value list inside a section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Property {
    pub name: String,
    pub dtype: Dtype,
    pub values: Vec<String>,
    pub unit: Option<String>,
    pub uncertainty: Option<String>,
    pub definition: Option<String>,
    pub reference: Option<String>,
    pub value_origin: Option<String>,
}

impl Property {
    /// Create a property with the given type and values and no metadata.
    pub fn new<I, S>(name: impl Into<String>, dtype: Dtype, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dtype,
            values: values.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builder-style unit setter.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// `true` when no value was set explicitly.
    pub fn is_default(&self) -> bool {
        self.values.iter().all(|v| self.dtype.is_default_value(v))
    }

    /// `true` when both properties hold the same values in the same unit.
    ///
    /// A unit missing on one side does not make the values differ.
    pub fn same_value(&self, other: &Property) -> bool {
        let units_match = match (&self.unit, &other.unit) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        units_match
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| self.dtype.values_equal(a, b))
    }

    /// Check every value against the declared type.
    pub fn validate(&self, path: &str) -> Result<(), DocumentError> {
        match self.values.iter().find(|v| !self.dtype.accepts(v)) {
            Some(bad) => Err(DocumentError::InvalidValue {
                property: path.to_string(),
                dtype: self.dtype.to_string(),
                value: bad.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// A named node of the metadata tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub name: String,
    pub section_type: Option<String>,
    pub definition: Option<String>,
    pub reference: Option<String>,
    pub properties: Vec<Property>,
    pub sections: Vec<Section>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style property append.
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Builder-style subsection append.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root of an odML metadata tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub author: Option<String>,
    pub date: Option<String>,
    pub version: Option<String>,
    pub repository: Option<String>,
    pub sections: Vec<Section>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style section append.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Look up a property by its path, e.g. `/Subject/Recording:duration`.
    pub fn property_at(&self, path: &str) -> Option<&Property> {
        let (section_path, property) = path.rsplit_once(':')?;
        let mut names = section_path.trim_start_matches('/').split('/');
        let mut section = self.section(names.next()?)?;
        for name in names {
            section = section.section(name)?;
        }
        section.property(property)
    }

    /// Every property in depth-first order together with its path.
    pub fn properties(&self) -> Vec<(String, &Property)> {
        fn walk<'a>(section: &'a Section, parent: &str, out: &mut Vec<(String, &'a Property)>) {
            let path = section_path(parent, &section.name);
            for property in &section.properties {
                out.push((property_path(&path, &property.name), property));
            }
            for child in &section.sections {
                walk(child, &path, out);
            }
        }

        let mut out = Vec::new();
        for section in &self.sections {
            walk(section, "", &mut out);
        }
        out
    }

    /// Check document-level fields, sibling name uniqueness and every
    /// property value.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if let Some(date) = &self.date {
            if !Dtype::Date.accepts(date) {
                return Err(DocumentError::InvalidValue {
                    property: "document date".into(),
                    dtype: Dtype::Date.to_string(),
                    value: date.clone(),
                });
            }
        }
        check_unique_names(&self.sections, "")?;
        for (path, property) in self.properties() {
            property.validate(&path)?;
        }
        Ok(())
    }
}

/// Paths are only unambiguous when sibling names are unique.
fn check_unique_names(sections: &[Section], parent: &str) -> Result<(), DocumentError> {
    let mut seen = HashSet::new();
    for section in sections {
        let path = section_path(parent, &section.name);
        if !seen.insert(section.name.as_str()) {
            return Err(DocumentError::DuplicateName { path });
        }

        let mut properties = HashSet::new();
        for property in &section.properties {
            if !properties.insert(property.name.as_str()) {
                return Err(DocumentError::DuplicateName {
                    path: property_path(&path, &property.name),
                });
            }
        }
        check_unique_names(&section.sections, &path)?;
    }
    Ok(())
}

/// Path of a section below `parent` (`""` for top level).
pub fn section_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name)
}

/// Path of a property inside the section at `section`.
pub fn property_path(section: &str, name: &str) -> String {
    format!("{}:{}", section, name)
}
