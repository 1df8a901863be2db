use std::fmt;

use serde::{Deserialize, Serialize};

use super::bitstring::{self, BitstringRequirements, BITSTRING_LEN};
use super::facet;
use super::requirements::{Language, Requirements};

/// How decode treats language codes missing from the known table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguagePolicy {
    /// Reject with [`DecodeError::UnknownLanguage`].
    #[default]
    Strict,
    /// Carry two-letter codes through as [`Language::Unknown`].
    Lenient,
}

impl LanguagePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" | "legacy" => Some(Self::Lenient),
            _ => None,
        }
    }

    pub(crate) fn resolve(self, code: &str) -> Result<Language, DecodeError> {
        if let Some(language) = Language::from_code(code) {
            return Ok(language);
        }
        let plausible = code.len() == 2 && code.bytes().all(|b| b.is_ascii_lowercase());
        match self {
            Self::Lenient if plausible => Ok(Language::Unknown(code.to_string())),
            _ => Err(DecodeError::UnknownLanguage(code.to_string())),
        }
    }
}

/// One dash-delimited segment of a facet key, in key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Language,
    PersonalInfo,
    Consents,
    ResidenceHistory,
    EmploymentHistory,
    Education,
    ProfessionalLicense,
    Signature,
}

impl Facet {
    pub const ORDER: [Facet; 8] = [
        Facet::Language,
        Facet::PersonalInfo,
        Facet::Consents,
        Facet::ResidenceHistory,
        Facet::EmploymentHistory,
        Facet::Education,
        Facet::ProfessionalLicense,
        Facet::Signature,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Facet::Language => "language",
            Facet::PersonalInfo => "personal info",
            Facet::Consents => "consents",
            Facet::ResidenceHistory => "residence history",
            Facet::EmploymentHistory => "employment history",
            Facet::Education => "education",
            Facet::ProfessionalLicense => "professional license",
            Facet::Signature => "signature",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a key failed to decode. Every variant identifies the offending part of the key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected 8 facets separated by '-', got {0}")]
    WrongArity(usize),
    #[error("unknown language code '{0}'")]
    UnknownLanguage(String),
    #[error("invalid personal info facet '{value}': {expected}")]
    BadPersonalInfo { value: String, expected: &'static str },
    #[error("invalid consents facet '{value}': {expected}")]
    BadConsents { value: String, expected: &'static str },
    #[error("invalid residence history facet '{value}': {expected}")]
    BadResidenceHistory { value: String, expected: &'static str },
    #[error("invalid employment history facet '{value}': {expected}")]
    BadEmploymentHistory { value: String, expected: &'static str },
    #[error("invalid education facet '{value}': {expected}")]
    BadEducation { value: String, expected: &'static str },
    #[error("invalid professional license facet '{value}': {expected}")]
    BadProfessionalLicense { value: String, expected: &'static str },
    #[error("invalid signature facet '{value}': {expected}")]
    BadSignature { value: String, expected: &'static str },
    #[error("bitstring key must be 2 language letters and 14 binary digits, got {0} characters")]
    BadBitstringLength(usize),
    #[error("invalid character '{found}' at position {position} of bitstring key")]
    BadBit { position: usize, found: char },
    #[error("leading bitstring flag must be 1")]
    ReservedBit,
    #[error("unknown {facet} timeline code '{code}'")]
    BadTimeline { facet: Facet, code: String },
    #[error("{facet} timeline '{code}' is set while the step is disabled")]
    OrphanTimeline { facet: Facet, code: String },
    #[error("'{0}' is neither a facet key nor a bitstring key")]
    UnrecognizedFormat(String),
}

impl DecodeError {
    /// The facet (or bitstring field) the error refers to, when there is one.
    pub fn facet(&self) -> Option<Facet> {
        match self {
            DecodeError::UnknownLanguage(_) => Some(Facet::Language),
            DecodeError::BadPersonalInfo { .. } => Some(Facet::PersonalInfo),
            DecodeError::BadConsents { .. } => Some(Facet::Consents),
            DecodeError::BadResidenceHistory { .. } => Some(Facet::ResidenceHistory),
            DecodeError::BadEmploymentHistory { .. } => Some(Facet::EmploymentHistory),
            DecodeError::BadEducation { .. } => Some(Facet::Education),
            DecodeError::BadProfessionalLicense { .. } => Some(Facet::ProfessionalLicense),
            DecodeError::BadSignature { .. } => Some(Facet::Signature),
            DecodeError::BadTimeline { facet, .. } | DecodeError::OrphanTimeline { facet, .. } => {
                Some(*facet)
            }
            DecodeError::WrongArity(_)
            | DecodeError::BadBitstringLength(_)
            | DecodeError::BadBit { .. }
            | DecodeError::ReservedBit
            | DecodeError::UnrecognizedFormat(_) => None,
        }
    }

    /// What the decoder expected in place of the offending input.
    pub fn expected(&self) -> &'static str {
        match self {
            DecodeError::WrongArity(_) => {
                "{lang}-{personalInfo}-{consents}-{residence}-{employment}-{education}-{license}-{signature}"
            }
            DecodeError::UnknownLanguage(_) => "one of en, es, fr",
            DecodeError::BadPersonalInfo { expected, .. }
            | DecodeError::BadConsents { expected, .. }
            | DecodeError::BadResidenceHistory { expected, .. }
            | DecodeError::BadEmploymentHistory { expected, .. }
            | DecodeError::BadEducation { expected, .. }
            | DecodeError::BadProfessionalLicense { expected, .. }
            | DecodeError::BadSignature { expected, .. } => *expected,
            DecodeError::BadBitstringLength(_) | DecodeError::BadBit { .. } => {
                "[a-z]{2} followed by 14 binary digits"
            }
            DecodeError::ReservedBit => "leading flag 1",
            DecodeError::BadTimeline { .. } => "one of 000, 001, 010, 011, 100",
            DecodeError::OrphanTimeline { .. } => "000 when the step is disabled",
            DecodeError::UnrecognizedFormat(_) => "a facet key or a bitstring key",
        }
    }
}

/// The two key grammars in circulation. They are never merged: a key is read as exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyGrammar {
    /// `en-EPA-DTB-R5-E3-E-P-W`
    Facet,
    /// `en10100000000000`
    Bitstring,
}

impl KeyGrammar {
    /// Identify the grammar from the key's structure alone.
    ///
    /// A `-` anywhere selects the facet grammar; two lowercase letters followed by
    /// fourteen `0`/`1` digits select the bitstring grammar. Nothing else is guessed.
    pub fn detect(key: &str) -> Option<Self> {
        if key.contains('-') {
            return Some(Self::Facet);
        }
        let bytes = key.as_bytes();
        let is_bitstring = bytes.len() == BITSTRING_LEN
            && bytes[..2].iter().all(u8::is_ascii_lowercase)
            && bytes[2..].iter().all(|b| *b == b'0' || *b == b'1');
        is_bitstring.then_some(Self::Bitstring)
    }
}

/// A decoded key tagged with the grammar it was read under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "grammar", content = "requirements", rename_all = "snake_case")]
pub enum DecodedKey {
    Facet(Requirements),
    Bitstring(BitstringRequirements),
}

impl DecodedKey {
    pub fn grammar(&self) -> KeyGrammar {
        match self {
            DecodedKey::Facet(_) => KeyGrammar::Facet,
            DecodedKey::Bitstring(_) => KeyGrammar::Bitstring,
        }
    }

    pub fn language(&self) -> &Language {
        match self {
            DecodedKey::Facet(requirements) => &requirements.language,
            DecodedKey::Bitstring(requirements) => &requirements.language,
        }
    }

    /// Re-encode under the grammar the payload belongs to.
    pub fn encode(&self) -> String {
        match self {
            DecodedKey::Facet(requirements) => facet::encode(requirements),
            DecodedKey::Bitstring(requirements) => bitstring::encode(requirements),
        }
    }
}

/// Encoder/decoder for both grammars under one language policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCodec {
    policy: LanguagePolicy,
}

impl KeyCodec {
    pub const fn new(policy: LanguagePolicy) -> Self {
        Self { policy }
    }

    pub const fn strict() -> Self {
        Self::new(LanguagePolicy::Strict)
    }

    pub const fn lenient() -> Self {
        Self::new(LanguagePolicy::Lenient)
    }

    pub fn policy(&self) -> LanguagePolicy {
        self.policy
    }

    pub fn encode(&self, requirements: &Requirements) -> String {
        facet::encode(requirements)
    }

    pub fn encode_bitstring(&self, requirements: &BitstringRequirements) -> String {
        bitstring::encode(requirements)
    }

    /// Decode a facet key.
    pub fn decode(&self, key: &str) -> Result<Requirements, DecodeError> {
        facet::decode(key.trim(), self.policy)
    }

    /// Decode under an explicitly chosen grammar.
    pub fn decode_with(&self, key: &str, grammar: KeyGrammar) -> Result<DecodedKey, DecodeError> {
        let key = key.trim();
        match grammar {
            KeyGrammar::Facet => facet::decode(key, self.policy).map(DecodedKey::Facet),
            KeyGrammar::Bitstring => {
                bitstring::decode(key, self.policy).map(DecodedKey::Bitstring)
            }
        }
    }

    /// Decode after sniffing the grammar with [`KeyGrammar::detect`].
    pub fn decode_any(&self, key: &str) -> Result<DecodedKey, DecodeError> {
        let key = key.trim();
        let grammar = KeyGrammar::detect(key)
            .ok_or_else(|| DecodeError::UnrecognizedFormat(key.to_string()))?;
        self.decode_with(key, grammar)
    }
}

/// Encode with the default codec.
pub fn encode(requirements: &Requirements) -> String {
    KeyCodec::strict().encode(requirements)
}

/// Decode a facet key with the default (strict) codec.
pub fn decode(key: &str) -> Result<Requirements, DecodeError> {
    KeyCodec::strict().decode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_grammar_by_structure() {
        assert_eq!(
            KeyGrammar::detect("en-EPA-DTB-R5-E3-E-P-W"),
            Some(KeyGrammar::Facet)
        );
        assert_eq!(
            KeyGrammar::detect("en10100000000000"),
            Some(KeyGrammar::Bitstring)
        );
        assert_eq!(KeyGrammar::detect("en1010"), None);
        assert_eq!(KeyGrammar::detect("EN10100000000000"), None);
        assert_eq!(KeyGrammar::detect("en10100000000002"), None);
    }

    #[test]
    fn decode_any_rejects_unrecognized_structure() {
        let err = KeyCodec::strict()
            .decode_any("hello")
            .expect_err("not a key");
        assert_eq!(err, DecodeError::UnrecognizedFormat("hello".to_string()));
        assert_eq!(err.facet(), None);
    }

    #[test]
    fn decode_any_tags_the_grammar() {
        let codec = KeyCodec::strict();
        let facet = codec
            .decode_any(" en-EPA-DTB-R5-E3-E-P-W ")
            .expect("facet key decodes");
        assert_eq!(facet.grammar(), KeyGrammar::Facet);

        let bits = codec.decode_any("es10100000000000").expect("bitstring decodes");
        assert_eq!(bits.grammar(), KeyGrammar::Bitstring);
        assert_eq!(bits.language(), &Language::Spanish);
    }

    #[test]
    fn explicit_grammar_is_not_second_guessed() {
        let err = KeyCodec::strict()
            .decode_with("en10100000000000", KeyGrammar::Facet)
            .expect_err("bitstring read as facets");
        assert_eq!(err, DecodeError::WrongArity(1));
    }

    #[test]
    fn language_policy_parses_aliases() {
        assert_eq!(LanguagePolicy::parse("STRICT"), Some(LanguagePolicy::Strict));
        assert_eq!(LanguagePolicy::parse("legacy"), Some(LanguagePolicy::Lenient));
        assert_eq!(LanguagePolicy::parse("loose"), None);
    }

    #[test]
    fn lenient_policy_only_accepts_plausible_codes() {
        assert_eq!(
            LanguagePolicy::Lenient.resolve("de"),
            Ok(Language::Unknown("de".to_string()))
        );
        assert_eq!(
            LanguagePolicy::Lenient.resolve("DEU"),
            Err(DecodeError::UnknownLanguage("DEU".to_string()))
        );
        assert_eq!(
            LanguagePolicy::Strict.resolve("de"),
            Err(DecodeError::UnknownLanguage("de".to_string()))
        );
    }
}
