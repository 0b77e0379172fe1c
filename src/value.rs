//! Field values cached by standards and origins.
//!
//! A field cache entry has three states: no entry (never asked), the
//! [`FieldValue::Absent`] sentinel (asked and confirmed missing at that
//! scope), or a concrete value.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved field value.
///
/// # Examples
///
/// ```
/// use sscn::FieldValue;
///
/// let title = FieldValue::from("房屋建筑制图统一标准");
/// assert!(title.is_present());
/// assert!(!FieldValue::Absent.is_present());
/// assert_ne!(FieldValue::from(""), FieldValue::Absent);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    Status(Status),
    Bytes(Vec<u8>),
    /// Sought and confirmed not to exist. Falsy.
    Absent,
}

impl FieldValue {
    /// Returns true for every value except [`FieldValue::Absent`].
    #[must_use]
    pub const fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns true for [`FieldValue::Absent`].
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Creates a list of text values.
    #[must_use]
    pub fn text_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::Text(s.into())).collect())
    }

    /// Maps `None` to [`FieldValue::Absent`].
    #[must_use]
    pub fn from_option<T: Into<Self>>(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_status(&self) -> Option<Status> {
        match self {
            Self::Status(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the value, returning the payload bytes if any.
    #[must_use]
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => write!(f, "{v}"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Map(map) => {
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                Ok(())
            }
            Self::Status(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Absent => write!(f, "未找到"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Status> for FieldValue {
    fn from(v: Status) -> Self {
        Self::Status(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Lifecycle status of a standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// In force (现行).
    Valid,
    /// Issued, not yet in force (即将实施).
    Issued,
    /// Superseded (过时).
    Obsolete,
    /// Abolished (废止).
    Abolished,
}

impl Status {
    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Valid => "现行",
            Self::Issued => "即将实施",
            Self::Obsolete => "过时",
            Self::Abolished => "废止",
        }
    }

    /// Parses the status labels used by remote listings.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "现行" => Some(Self::Valid),
            "即将实施" => Some(Self::Issued),
            "过时" | "作废" | "已作废" | "有更新版" => Some(Self::Obsolete),
            "废止" | "已废止" => Some(Self::Abolished),
            _ => None,
        }
    }

    /// Whether a standard with this status is regarded as active.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Valid | Self::Issued)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
