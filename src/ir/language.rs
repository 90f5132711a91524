//! Language codes and classification labels.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Languages with a display name and an ISO 639-3 equivalent.
///
/// Codes outside this table are still representable (a detector may report
/// any ISO 639-3 code), they just have no display name.
const KNOWN_LANGUAGES: &[(&str, &str, &str)] = &[
    ("en", "eng", "English"),
    ("fr", "fra", "French"),
    ("de", "deu", "German"),
    ("it", "ita", "Italian"),
    ("nl", "nld", "Dutch"),
    ("la", "lat", "Latin"),
    ("el", "ell", "Greek"),
    ("es", "spa", "Spanish"),
    ("pt", "por", "Portuguese"),
    ("ru", "rus", "Russian"),
    ("pl", "pol", "Polish"),
    ("sv", "swe", "Swedish"),
    ("da", "dan", "Danish"),
    ("fi", "fin", "Finnish"),
    ("tr", "tur", "Turkish"),
    ("cs", "ces", "Czech"),
    ("hu", "hun", "Hungarian"),
    ("ro", "ron", "Romanian"),
    ("uk", "ukr", "Ukrainian"),
    ("ja", "jpn", "Japanese"),
    ("zh", "cmn", "Chinese"),
    ("ko", "kor", "Korean"),
    ("ar", "ara", "Arabic"),
    ("he", "heb", "Hebrew"),
    ("hi", "hin", "Hindi"),
];

/// A lowercase ISO 639-1 (two letters) or ISO 639-3 (three letters) code.
///
/// Three-letter codes that have a two-letter equivalent in the known table
/// are folded to the two-letter form on parse, so `"fra"` and `"fr"` compare
/// equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LanguageCode(String);

/// Error returned when a string is not a plausible language code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid language code '{0}' (expected 2 or 3 ASCII letters, e.g. 'en' or 'lat')")]
pub struct LanguageCodeError(pub String);

impl LanguageCode {
    /// Parses and canonicalizes a language code.
    pub fn parse(code: &str) -> Result<Self, LanguageCodeError> {
        let trimmed = code.trim();
        let valid = (2..=3).contains(&trimmed.len())
            && trimmed.chars().all(|c| c.is_ascii_alphabetic());
        if !valid {
            return Err(LanguageCodeError(code.to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.len() == 3 {
            if let Some((iso1, _, _)) = KNOWN_LANGUAGES.iter().find(|(_, iso3, _)| *iso3 == lower)
            {
                return Ok(Self((*iso1).to_string()));
            }
        }
        Ok(Self(lower))
    }

    /// English, the default primary language.
    pub fn english() -> Self {
        Self("en".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ISO 639-3 form, used by trigram detectors and OCR language packs.
    pub fn iso639_3(&self) -> &str {
        if self.0.len() == 3 {
            return &self.0;
        }
        KNOWN_LANGUAGES
            .iter()
            .find(|(iso1, _, _)| *iso1 == self.0)
            .map(|(_, iso3, _)| *iso3)
            .unwrap_or(&self.0)
    }

    /// English display name, if the code is in the known table.
    pub fn name(&self) -> Option<&'static str> {
        KNOWN_LANGUAGES
            .iter()
            .find(|(iso1, iso3, _)| *iso1 == self.0 || *iso3 == self.0)
            .map(|(_, _, name)| *name)
    }

    /// Display name falling back to the code itself.
    pub fn display_name(&self) -> String {
        self.name()
            .map(str::to_string)
            .unwrap_or_else(|| self.0.clone())
    }

    /// All codes in the known table, in table order.
    pub fn known() -> impl Iterator<Item = LanguageCode> {
        KNOWN_LANGUAGES
            .iter()
            .map(|(iso1, _, _)| LanguageCode((*iso1).to_string()))
    }
}

impl FromStr for LanguageCode {
    type Err = LanguageCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LanguageCode({})", self.0)
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for LanguageCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LanguageCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        LanguageCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The label a classifier attaches to a token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LanguageLabel {
    Known(LanguageCode),
    /// Confidence fell below the configured minimum, or the detector could
    /// not decide at all.
    Unknown,
}

impl LanguageLabel {
    pub fn code(&self) -> Option<&LanguageCode> {
        match self {
            LanguageLabel::Known(code) => Some(code),
            LanguageLabel::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, LanguageLabel::Unknown)
    }
}

impl From<LanguageCode> for LanguageLabel {
    fn from(code: LanguageCode) -> Self {
        LanguageLabel::Known(code)
    }
}

impl fmt::Display for LanguageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageLabel::Known(code) => write!(f, "{}", code),
            LanguageLabel::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for LanguageLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LanguageLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.eq_ignore_ascii_case("unknown") {
            return Ok(LanguageLabel::Unknown);
        }
        LanguageCode::parse(&raw)
            .map(LanguageLabel::Known)
            .map_err(serde::de::Error::custom)
    }
}
