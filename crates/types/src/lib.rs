//! Validated text primitives shared by the ward engine and its surfaces.
//!
//! - [`NonEmptyText`]: trimmed free text that must contain at least one character (complaints,
//!   descriptions, reasons).
//! - [`Code`]: a registry key for wards, beds and room categories (`B201`, `ICU-A`, ...).

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The code exceeded [`Code::MAX_LEN`] characters
    #[error("Code exceeds {max} characters: '{code}'")]
    TooLong { code: String, max: usize },
    /// The code contained characters outside `A-Z`, `0-9`, `-` and `_`
    #[error("Code contains invalid characters (only A-Z, 0-9, '-', '_' allowed): '{0}'")]
    InvalidCharacters(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText`, trimming the input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// A registry code, normalised to uppercase.
///
/// Codes are unique keys in the bed and ward registry, so two spellings of the same code
/// (`b201`, ` B201 `) must compare equal. Construction trims, uppercases and then checks the
/// character set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code(String);

impl Code {
    pub const MAX_LEN: usize = 32;

    /// Creates a normalised code.
    ///
    /// # Errors
    ///
    /// Returns [`TextError`] if the code is empty, longer than [`Code::MAX_LEN`], or contains
    /// characters other than ASCII letters, digits, `-` and `_`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let normalised = input.as_ref().trim().to_ascii_uppercase();
        if normalised.is_empty() {
            return Err(TextError::Empty);
        }
        if normalised.len() > Self::MAX_LEN {
            return Err(TextError::TooLong {
                code: normalised,
                max: Self::MAX_LEN,
            });
        }
        let ok = normalised
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_'));
        if !ok {
            return Err(TextError::InvalidCharacters(normalised));
        }
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Code::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims() {
        let text = NonEmptyText::new("  chest pain ").unwrap();
        assert_eq!(text.as_str(), "chest pain");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TextError::Empty));
    }

    #[test]
    fn test_code_normalises_case() {
        let a = Code::new(" b201 ").unwrap();
        let b = Code::new("B201").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "B201");
    }

    #[test]
    fn test_code_rejects_bad_characters() {
        assert!(matches!(
            Code::new("B 201"),
            Err(TextError::InvalidCharacters(_))
        ));
        assert!(matches!(
            Code::new("ward/1"),
            Err(TextError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn test_code_rejects_overlong_input() {
        let long = "A".repeat(Code::MAX_LEN + 1);
        assert!(matches!(Code::new(long), Err(TextError::TooLong { .. })));
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<NonEmptyText>("\"   \"").is_err());
        let code: Code = serde_json::from_str("\"icu-a\"").unwrap();
        assert_eq!(code.as_str(), "ICU-A");
    }
}
