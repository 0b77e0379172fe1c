//! Standard codes and their parser.
//!
//! A standard code such as `GB/T 50001-2017` breaks down as:
//!
//! ```text
//! GB/T 50001-2017
//! -- - ----- ----
//! |  |   |    |
//! |  |   |    +--- year
//! |  |   +-------- number
//! |  +------------ mandatory marker ('T' means recommended, not mandatory)
//! +--------------- prefix (category of the issuing body)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const PREFIX_PATTERN: &str = r"(?P<prefix>[A-Z]{2}[A-SU-Z]?)[-_/／\\\s]*";

const BODY_PATTERN: &str = concat!(
    r"(?P<mandatory>T?)",
    r"[-_\s]*(?P<number>[0-9]+)",
    r"(?:\.(?P<part>[0-9]))?",
    r"[-_\s]*(?P<year>[0-9]{4}|[5-9][0-9])?",
);

static PREFIXED_RE: OnceLock<Regex> = OnceLock::new();
static SEARCH_RE: OnceLock<Regex> = OnceLock::new();
static FULL_RE: OnceLock<Regex> = OnceLock::new();

#[allow(clippy::expect_used)]
fn prefixed_re() -> &'static Regex {
    PREFIXED_RE.get_or_init(|| {
        Regex::new(&format!("{PREFIX_PATTERN}{BODY_PATTERN}")).expect("standard code pattern is valid")
    })
}

#[allow(clippy::expect_used)]
fn search_re() -> &'static Regex {
    SEARCH_RE.get_or_init(|| {
        Regex::new(&format!("(?:{PREFIX_PATTERN})?{BODY_PATTERN}")).expect("standard code pattern is valid")
    })
}

#[allow(clippy::expect_used)]
fn full_re() -> &'static Regex {
    FULL_RE.get_or_init(|| {
        Regex::new(&format!("^(?:{PREFIX_PATTERN})?{BODY_PATTERN}$")).expect("standard code pattern is valid")
    })
}

/// Industry fields keyed by the first two letters of a prefix.
const INDUSTRY_FIELDS: &[(&str, &str)] = &[
    ("GB", "国家标准"),
    ("JC", "建材"),
    ("CJ", "城镇建设"),
    ("JG", "建筑工业"),
];

/// Structured, comparable code of a standard.
///
/// Codes are immutable; derived codes are built with the `with_*` methods,
/// which return a new value.
///
/// # Examples
///
/// ```
/// use sscn::StandardCode;
///
/// let code = StandardCode::parse("gb/t 50001-2017", true).unwrap();
/// assert_eq!(code.prefix(), Some("GB"));
/// assert_eq!(code.is_mandatory(), Some(false));
/// assert_eq!(code.to_string(), "GB/T 50001-2017");
/// assert!(code.is_concrete());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StandardCode {
    number: String,
    prefix: Option<String>,
    is_mandatory: Option<bool>,
    year: Option<u16>,
    part: Option<u8>,
}

impl StandardCode {
    /// Creates a code holding only a number.
    #[must_use]
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            prefix: None,
            is_mandatory: None,
            year: None,
            part: None,
        }
    }

    /// Parses `code` into a `StandardCode`.
    ///
    /// The text is trimmed and uppercased first. With `fullmatch` the whole
    /// text must be a code; otherwise the first code found anywhere is used.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedCode`] if no code is found.
    pub fn parse(code: &str, fullmatch: bool) -> Result<Self, ValidationError> {
        let normalized = code.trim().to_uppercase();
        // A prefixed code anywhere in the text beats a bare number before it.
        let caps = if fullmatch {
            full_re().captures(&normalized)
        } else {
            prefixed_re()
                .captures(&normalized)
                .or_else(|| search_re().captures(&normalized))
        }
        .ok_or_else(|| ValidationError::MalformedCode {
            code: normalized.clone(),
        })?;

        let prefix = caps
            .name("prefix")
            .map(|m| m.as_str().to_string())
            .filter(|p| !p.is_empty());
        let is_mandatory = prefix.as_ref().map(|_| {
            caps.name("mandatory")
                .map_or(true, |m| !m.as_str().contains('T'))
        });
        let number = caps
            .name("number")
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ValidationError::MalformedCode {
                code: normalized.clone(),
            })?;
        let part = caps.name("part").and_then(|m| m.as_str().parse::<u8>().ok());
        let year = caps
            .name("year")
            .and_then(|m| m.as_str().parse::<u16>().ok())
            // 95 -> 1995
            .map(|y| if y < 100 { y + 1900 } else { y });

        Ok(Self {
            number,
            prefix,
            is_mandatory,
            year,
            part,
        })
    }

    /// Iterates over every code found in `text`.
    ///
    /// Only prefixed codes are reported when there are any; bare numbers
    /// are reported otherwise.
    pub fn find_all(text: &str) -> impl Iterator<Item = Self> {
        let normalized = text.to_uppercase();
        let mut found: Vec<Self> = prefixed_re()
            .find_iter(&normalized)
            .filter_map(|m| Self::parse(m.as_str(), true).ok())
            .collect();
        if found.is_empty() {
            found = search_re()
                .find_iter(&normalized)
                .filter_map(|m| Self::parse(m.as_str(), true).ok())
                .collect();
        }
        found.into_iter()
    }

    /// The serial number, kept as text.
    #[must_use]
    pub fn number(&self) -> &str {
        &self.number
    }

    /// The category prefix, e.g. `GB` or `JGJ`.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Whether the standard is mandatory. `None` when no prefix was given.
    #[must_use]
    pub const fn is_mandatory(&self) -> Option<bool> {
        self.is_mandatory
    }

    /// Year of approval.
    #[must_use]
    pub const fn year(&self) -> Option<u16> {
        self.year
    }

    /// Part number, e.g. `1` in `GB 50001.1-2021`.
    #[must_use]
    pub const fn part(&self) -> Option<u8> {
        self.part
    }

    /// Returns a copy with the prefix replaced.
    #[must_use]
    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..self
        }
    }

    /// Returns a copy with the mandatory flag replaced.
    #[must_use]
    pub fn with_mandatory(self, is_mandatory: bool) -> Self {
        Self {
            is_mandatory: Some(is_mandatory),
            ..self
        }
    }

    /// Returns a copy with the year replaced.
    #[must_use]
    pub fn with_year(self, year: u16) -> Self {
        Self {
            year: Some(year),
            ..self
        }
    }

    /// Returns a copy with the part replaced.
    #[must_use]
    pub fn with_part(self, part: u8) -> Self {
        Self {
            part: Some(part),
            ..self
        }
    }

    /// Whether this code identifies one specific standard.
    ///
    /// Codes lacking a prefix, mandatory flag or year are search queries.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        self.prefix.is_some() && self.is_mandatory.is_some() && self.year.is_some()
    }

    /// Category of the standard, derived from its prefix.
    #[must_use]
    pub fn category(&self) -> Category {
        let Some(prefix) = self.prefix.as_deref() else {
            return Category::Unknown;
        };
        match prefix {
            "GB" => return Category::National,
            "GBJ" => return Category::NationalEngineering,
            _ => {}
        }

        let head = prefix.get(..2).unwrap_or(prefix);
        let field = INDUSTRY_FIELDS
            .iter()
            .find(|(key, _)| *key == head)
            .map_or("其他", |(_, label)| label);
        if prefix.len() == 3 {
            if !prefix.ends_with('J') {
                return Category::Unknown;
            }
            return Category::IndustryEngineering { field };
        }
        Category::Industry { field }
    }

    /// A filesystem-safe file name for a concrete code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotConcrete`] for non-concrete codes.
    pub fn file_name(&self, suffix: &str) -> Result<String, ValidationError> {
        if !self.is_concrete() {
            return Err(ValidationError::NotConcrete {
                code: self.to_string(),
            });
        }
        let name: String = self
            .to_string()
            .chars()
            .map(|c| match c {
                '/' => '-',
                '-' | ' ' => '_',
                other => other,
            })
            .collect();
        Ok(format!("{name}.{suffix}"))
    }
}

impl fmt::Display for StandardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            let marker = if self.is_mandatory == Some(false) { "/T" } else { "" };
            write!(f, "{prefix}{marker} ")?;
        }
        write!(f, "{}", self.number)?;
        if let Some(part) = self.part {
            write!(f, ".{part}")?;
        }
        if let Some(year) = self.year {
            write!(f, "-{year}")?;
        }
        Ok(())
    }
}

impl FromStr for StandardCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, false)
    }
}

/// Category of a standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// No prefix, or a prefix that fits no known scheme.
    Unknown,
    /// National standard (`GB`).
    National,
    /// National standard for engineering construction (`GBJ`).
    NationalEngineering,
    /// Industry standard of the given field.
    Industry {
        /// Industry field label.
        field: &'static str,
    },
    /// Industry standard for engineering construction of the given field.
    IndustryEngineering {
        /// Industry field label.
        field: &'static str,
    },
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "未知标准"),
            Self::National => write!(f, "国家标准"),
            Self::NationalEngineering => write!(f, "工程建设国家标准"),
            Self::Industry { field } => write!(f, "{field}领域行业标准"),
            Self::IndustryEngineering { field } => write!(f, "{field}领域工程建设行业标准"),
        }
    }
}
