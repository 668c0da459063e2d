//! Parsing and formatting of the size specification given with `--size`, e.g. "65", ":120", "80:", "80:120"
//!
//! Size values are decimal only. Base prefixes such as "0x" are rejected.

use pktsize_common::{PktSizeInfo, MAX_PKT_SIZE};
use thiserror::Error;

/// Option introducing a size specification
pub const SIZE_OPTION: &str = "--size";

/// Keyword used when displaying a rule
pub const PRINT_KEYWORD: &str = "size";

/// Errors of a size specification. All of them abort the construction of the rule.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizeSpecError {
    #[error("pktsize: invalid size specification `{spec}': {reason}")]
    Syntax { spec: String, reason: &'static str },

    #[error("pktsize: size value `{literal}' is larger than 65535")]
    TooLarge { literal: String },

    #[error("pktsize min. range value `{min}' greater than max. range value `{max}'")]
    RangeInverted { min: u16, max: u16 },

    #[error("size: `--size' may only be specified once")]
    AlreadySpecified,

    #[error("pktsize-parameter problem: `--size' is required, for pktsize usage type: pktsize-app --help")]
    MissingSpecification,

    #[error("pktsize: unknown option `{0}'")]
    UnknownOption(String),

    #[error("pktsize: option `--size' requires an argument")]
    MissingValue,
}

fn syntax_error(spec: &str, reason: &'static str) -> SizeSpecError {
    SizeSpecError::Syntax {
        spec: spec.to_string(),
        reason,
    }
}

/// Parses one bound of a size specification
///
/// # Arguments
/// * `literal` - the bound, e.g. "80"
/// * `spec` - the complete specification, used for error messages
fn parse_bound(literal: &str, spec: &str) -> Result<u16, SizeSpecError> {
    if literal.is_empty() {
        return Err(syntax_error(spec, "empty size value"));
    }
    if !literal.bytes().all(|b| b.is_ascii_digit()) {
        return Err(syntax_error(spec, "size values must be decimal numbers"));
    }
    // only digits left, so parsing can fail on overflow only
    literal.parse::<u16>().map_err(|_| SizeSpecError::TooLarge {
        literal: literal.to_string(),
    })
}

/// Parses a size specification into a range record
///
/// # Arguments
/// * `spec` - "N" (exactly N), ":M" (0 to M), "N:" (N to 65535) or "N:M" (N to M)
///
/// # Returns
/// The range record or an error if the specification is malformed or the range is inverted
pub fn parse(spec: &str) -> Result<PktSizeInfo, SizeSpecError> {
    let (min_size, max_size) = match spec.split_once(':') {
        None => {
            let size = parse_bound(spec, spec)?;
            (size, size)
        }
        Some((min, max)) => {
            if max.contains(':') {
                return Err(syntax_error(spec, "more than one `:'"));
            }
            let min_size = if min.is_empty() {
                0
            } else {
                parse_bound(min, spec)?
            };
            let max_size = if max.is_empty() {
                MAX_PKT_SIZE
            } else {
                parse_bound(max, spec)?
            };
            (min_size, max_size)
        }
    };
    PktSizeInfo::new(min_size, max_size).ok_or(SizeSpecError::RangeInverted {
        min: min_size,
        max: max_size,
    })
}

/// Formats a range record as size specification. An open upper bound is written as 65535.
pub fn format(info: &PktSizeInfo) -> String {
    info.to_string()
}

/// Human readable form, e.g. "size 80:120 "
pub fn print_form(info: &PktSizeInfo) -> String {
    format!("{} {} ", PRINT_KEYWORD, format(info))
}

/// Form that can be parsed again, e.g. "--size 80:120 "
pub fn save_form(info: &PktSizeInfo) -> String {
    format!("{} {} ", SIZE_OPTION, format(info))
}

/// Collects the size specification of one rule. A rule takes exactly one specification.
#[derive(Debug, Default)]
pub struct SizeSpecBuilder {
    info: Option<PktSizeInfo>,
}

impl SizeSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and stores the size specification. Fails if one was already stored.
    pub fn size(&mut self, spec: &str) -> Result<&mut Self, SizeSpecError> {
        if self.info.is_some() {
            return Err(SizeSpecError::AlreadySpecified);
        }
        self.info = Some(parse(spec)?);
        Ok(self)
    }

    /// Returns the range record, or an error if no size specification was given
    pub fn build(self) -> Result<PktSizeInfo, SizeSpecError> {
        self.info.ok_or(SizeSpecError::MissingSpecification)
    }
}

/// Parses the match options of a rule, e.g. `["--size", "80:120"]` or `["--size=65"]`
///
/// # Arguments
/// * `tokens` - option tokens of one rule
///
/// # Returns
/// The range record, or an error for unknown options, a missing or repeated `--size` or an invalid specification
pub fn parse_options<S: AsRef<str>>(tokens: &[S]) -> Result<PktSizeInfo, SizeSpecError> {
    let mut builder = SizeSpecBuilder::new();
    let mut tokens = tokens.iter().map(|token| token.as_ref());
    while let Some(token) = tokens.next() {
        if token == SIZE_OPTION {
            let value = tokens.next().ok_or(SizeSpecError::MissingValue)?;
            builder.size(value)?;
        } else if let Some(value) = token.strip_prefix("--size=") {
            builder.size(value)?;
        } else {
            return Err(SizeSpecError::UnknownOption(token.to_string()));
        }
    }
    builder.build()
}
