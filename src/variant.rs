//! Logical build variants published by the release pipeline.
//!
//! A logical variant is the CPU/ABI identity of an installable artifact,
//! independent of its signing state. Only the five variants below are
//! recognised; any other token is rejected at parse time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The CPU/ABI identity of an artifact.
///
/// The declaration order is the canonical ordering used by artifact sets and
/// progress output.
///
/// # Examples
///
/// ```
/// use apkrelay::LogicalVariant;
///
/// let variant: LogicalVariant = "arm64-v8a".parse().expect("known token");
/// assert_eq!(variant, LogicalVariant::Arm64V8a);
/// assert_eq!(variant.file_token(), "arm64-v8a");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalVariant {
    /// 32-bit Intel.
    X86,
    /// 64-bit Intel.
    X86_64,
    /// 32-bit ARM.
    ArmeabiV7a,
    /// 64-bit ARM.
    Arm64V8a,
    /// Fat build containing every ABI.
    Universal,
}

impl LogicalVariant {
    /// Every variant, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::X86,
        Self::X86_64,
        Self::ArmeabiV7a,
        Self::Arm64V8a,
        Self::Universal,
    ];

    /// The token used for this variant inside artifact file names.
    #[must_use]
    pub const fn file_token(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::ArmeabiV7a => "armeabi-v7a",
            Self::Arm64V8a => "arm64-v8a",
            Self::Universal => "universal",
        }
    }

    /// The identifier used in configuration files and reports.
    #[must_use]
    pub const fn config_name(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::ArmeabiV7a => "armeabi_v7a",
            Self::Arm64V8a => "arm64_v8a",
            Self::Universal => "universal",
        }
    }

    /// Variants ordered so that longer file tokens are tried first.
    ///
    /// `x86_64` must win over `x86` when both could match a file stem.
    #[must_use]
    pub fn by_token_length() -> [Self; 5] {
        let mut variants = Self::ALL;
        variants.sort_by_key(|variant| std::cmp::Reverse(variant.file_token().len()));
        variants
    }
}

impl fmt::Display for LogicalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// Error returned when a string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown build variant \"{value}\"; expected one of: {expected}")]
pub struct UnknownVariant {
    /// The rejected input.
    pub value: String,
    /// Comma-separated list of accepted identifiers.
    pub expected: String,
}

impl FromStr for LogicalVariant {
    type Err = UnknownVariant;

    /// Accepts both the configuration identifier and the file token.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|variant| variant.config_name() == trimmed || variant.file_token() == trimmed)
            .ok_or_else(|| UnknownVariant {
                value: value.to_owned(),
                expected: Self::ALL
                    .iter()
                    .map(|variant| variant.config_name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
