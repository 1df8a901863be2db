//! Legacy fixed-width key: two language letters followed by fourteen flag digits.
//!
//! | offset | width | meaning                  |
//! |--------|-------|--------------------------|
//! | 0      | 1     | reserved, always `1`     |
//! | 1      | 1     | driver license consent   |
//! | 2      | 1     | drug test consent        |
//! | 3      | 1     | biometric consent        |
//! | 4      | 1     | education step           |
//! | 5      | 1     | professional license     |
//! | 6      | 1     | residence step           |
//! | 7      | 3     | residence timeline       |
//! | 10     | 1     | employment step          |
//! | 11     | 3     | employment timeline      |

use serde::{Deserialize, Serialize};

use super::codec::{DecodeError, Facet, LanguagePolicy};
use super::requirements::Language;

pub(crate) const BITSTRING_LEN: usize = 16;

/// Lookback offered by the legacy key maker for residence and employment steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeline {
    SingleEntry,
    ThreeYears,
    FiveYears,
    SevenYears,
    TenYears,
}

impl Timeline {
    pub const fn bits(self) -> &'static str {
        match self {
            Timeline::SingleEntry => "000",
            Timeline::ThreeYears => "001",
            Timeline::FiveYears => "010",
            Timeline::SevenYears => "011",
            Timeline::TenYears => "100",
        }
    }

    pub fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "000" => Some(Timeline::SingleEntry),
            "001" => Some(Timeline::ThreeYears),
            "010" => Some(Timeline::FiveYears),
            "011" => Some(Timeline::SevenYears),
            "100" => Some(Timeline::TenYears),
            _ => None,
        }
    }

    pub const fn years(self) -> u8 {
        match self {
            Timeline::SingleEntry => 0,
            Timeline::ThreeYears => 3,
            Timeline::FiveYears => 5,
            Timeline::SevenYears => 7,
            Timeline::TenYears => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitstringConsents {
    pub driver_license: bool,
    pub drug_test: bool,
    pub biometric: bool,
}

/// Payload of the bitstring grammar. Its consent set differs from the facet grammar's,
/// so the two are kept as separate types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitstringRequirements {
    pub language: Language,
    pub consents: BitstringConsents,
    pub education: bool,
    pub professional_license: bool,
    /// `None` when the residence step is disabled.
    pub residence: Option<Timeline>,
    pub employment: Option<Timeline>,
}

pub(crate) fn encode(requirements: &BitstringRequirements) -> String {
    let mut key = String::with_capacity(BITSTRING_LEN);
    key.push_str(requirements.language.code());
    key.push('1');
    for flag in [
        requirements.consents.driver_license,
        requirements.consents.drug_test,
        requirements.consents.biometric,
        requirements.education,
        requirements.professional_license,
    ] {
        key.push(bit(flag));
    }
    for step in [requirements.residence, requirements.employment] {
        key.push(bit(step.is_some()));
        key.push_str(step.map_or("000", Timeline::bits));
    }
    key
}

pub(crate) fn decode(
    key: &str,
    policy: LanguagePolicy,
) -> Result<BitstringRequirements, DecodeError> {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() != BITSTRING_LEN {
        return Err(DecodeError::BadBitstringLength(chars.len()));
    }

    let language: String = chars[..2].iter().collect();
    let language = policy.resolve(&language)?;

    let mut flags = [false; BITSTRING_LEN - 2];
    for (offset, found) in chars[2..].iter().copied().enumerate() {
        flags[offset] = match found {
            '0' => false,
            '1' => true,
            _ => {
                return Err(DecodeError::BadBit {
                    position: offset + 2,
                    found,
                })
            }
        };
    }
    if !flags[0] {
        return Err(DecodeError::ReservedBit);
    }

    let bits: String = chars[2..].iter().collect();
    Ok(BitstringRequirements {
        language,
        consents: BitstringConsents {
            driver_license: flags[1],
            drug_test: flags[2],
            biometric: flags[3],
        },
        education: flags[4],
        professional_license: flags[5],
        residence: decode_step(flags[6], &bits[7..10], Facet::ResidenceHistory)?,
        employment: decode_step(flags[10], &bits[11..14], Facet::EmploymentHistory)?,
    })
}

fn bit(flag: bool) -> char {
    if flag {
        '1'
    } else {
        '0'
    }
}

fn decode_step(enabled: bool, code: &str, facet: Facet) -> Result<Option<Timeline>, DecodeError> {
    let timeline = Timeline::from_bits(code).ok_or_else(|| DecodeError::BadTimeline {
        facet,
        code: code.to_string(),
    })?;
    match (enabled, timeline) {
        (true, timeline) => Ok(Some(timeline)),
        (false, Timeline::SingleEntry) => Ok(None),
        (false, _) => Err(DecodeError::OrphanTimeline {
            facet,
            code: code.to_string(),
        }),
    }
}
