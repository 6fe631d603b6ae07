//! Name validation for nicknames and account names.
//!
//! The bouncer applies one conservative rule set to every name it accepts
//! from a downstream client: no whitespace anywhere, no character from the
//! disallowed punctuation set, no leading digit, and at least one character
//! after trimming.

use thiserror::Error;

/// Punctuation that may not appear anywhere in a name.
pub const DISALLOWED_NAME_CHARS: &str = ",.=!@#*%&$/\\";

/// Why a candidate name was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("names need to be at least one character long")]
    Empty,

    #[error("names cannot contain whitespace")]
    Whitespace,

    #[error("name contained a disallowed character: {0:?}")]
    DisallowedChar(char),

    #[error("the first character of a name cannot be a digit")]
    LeadingDigit,
}

/// Validate a candidate name, returning the trimmed form on success.
///
/// ```
/// use slircb_proto::clean_name;
///
/// assert_eq!(clean_name("  goodnick "), Ok("goodnick".to_string()));
/// assert!(clean_name("bad nick").is_err());
/// assert!(clean_name("9lives").is_err());
/// ```
pub fn clean_name(input: &str) -> Result<String, NameError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    for ch in name.chars() {
        if ch.is_whitespace() {
            return Err(NameError::Whitespace);
        }
        if DISALLOWED_NAME_CHARS.contains(ch) {
            return Err(NameError::DisallowedChar(ch));
        }
    }

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(NameError::LeadingDigit);
    }

    Ok(name.to_string())
}
