use std::fmt;

use serde::{Deserialize, Serialize};

/// Language the collection flow is presented in.
///
/// `Unknown` only appears when a key is decoded under [`LanguagePolicy::Lenient`]; it keeps
/// the raw code so the caller can still show what was in the key.
///
/// [`LanguagePolicy::Lenient`]: super::LanguagePolicy::Lenient
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    English,
    Spanish,
    French,
    Unknown(String),
}

impl Language {
    pub const KNOWN: [Language; 3] = [Language::English, Language::Spanish, Language::French];

    /// Look up a two-letter code in the known table.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Self::English),
            "es" => Some(Self::Spanish),
            "fr" => Some(Self::French),
            _ => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::English => "en",
            Self::Spanish => "es",
            Self::French => "fr",
            Self::Unknown(code) => code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::Unknown(_) => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || value.contains('-') {
            return Err(format!("'{value}' is not a language code"));
        }
        Ok(Self::from_code(&value).unwrap_or(Self::Unknown(value)))
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.code().to_string()
    }
}

/// Personal details the individual must provide. Never empty: a selection with no
/// field set means e-mail only, both when constructed and when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PersonalInfoFields")]
pub struct PersonalInfo {
    email: bool,
    phone: bool,
    address: bool,
}

#[derive(Deserialize)]
struct PersonalInfoFields {
    #[serde(default)]
    email: bool,
    #[serde(default)]
    phone: bool,
    #[serde(default)]
    address: bool,
}

impl From<PersonalInfoFields> for PersonalInfo {
    fn from(value: PersonalInfoFields) -> Self {
        Self::new(value.email, value.phone, value.address)
    }
}

impl PersonalInfo {
    pub const EMAIL_ONLY: Self = Self {
        email: true,
        phone: false,
        address: false,
    };

    pub const ALL: Self = Self {
        email: true,
        phone: true,
        address: true,
    };

    pub const fn new(email: bool, phone: bool, address: bool) -> Self {
        if email || phone || address {
            Self {
                email,
                phone,
                address,
            }
        } else {
            Self::EMAIL_ONLY
        }
    }

    pub fn email(&self) -> bool {
        self.email
    }

    pub fn phone(&self) -> bool {
        self.phone
    }

    pub fn address(&self) -> bool {
        self.address
    }
}

impl Default for PersonalInfo {
    fn default() -> Self {
        Self::EMAIL_ONLY
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consents {
    pub drug_test: bool,
    pub tax_forms: bool,
    pub biometric: bool,
}

impl Consents {
    pub const NONE: Self = Self {
        drug_test: false,
        tax_forms: false,
        biometric: false,
    };

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

/// Lookback period offered for residence and employment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HistoryYears {
    One,
    Three,
    Five,
}

impl HistoryYears {
    pub const fn years(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Three => 3,
            Self::Five => 5,
        }
    }

    pub const fn from_years(years: u8) -> Option<Self> {
        match years {
            1 => Some(Self::One),
            3 => Some(Self::Three),
            5 => Some(Self::Five),
            _ => None,
        }
    }
}

/// Number of past employers to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EmployerCount {
    One,
    Two,
    Three,
}

impl EmployerCount {
    pub const fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    pub const fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }
}

/// Residence history requirement. Serialized as `{required, years}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResidenceHistoryRepr", into = "ResidenceHistoryRepr")]
pub enum ResidenceHistory {
    NotRequired,
    Years(HistoryYears),
}

#[derive(Serialize, Deserialize)]
struct ResidenceHistoryRepr {
    required: bool,
    #[serde(default)]
    years: u8,
}

impl TryFrom<ResidenceHistoryRepr> for ResidenceHistory {
    type Error = String;

    fn try_from(value: ResidenceHistoryRepr) -> Result<Self, Self::Error> {
        if !value.required {
            return Ok(Self::NotRequired);
        }
        HistoryYears::from_years(value.years)
            .map(Self::Years)
            .ok_or_else(|| {
                format!(
                    "residence history must cover 1, 3 or 5 years, got {}",
                    value.years
                )
            })
    }
}

impl From<ResidenceHistory> for ResidenceHistoryRepr {
    fn from(value: ResidenceHistory) -> Self {
        match value {
            ResidenceHistory::NotRequired => Self {
                required: false,
                years: 0,
            },
            ResidenceHistory::Years(years) => Self {
                required: true,
                years: years.years(),
            },
        }
    }
}

/// Employment history requirement, either by lookback years or by employer count.
/// Serialized as `{required, mode, value}` with `mode` in `years | employers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EmploymentHistoryRepr", into = "EmploymentHistoryRepr")]
pub enum EmploymentHistory {
    NotRequired,
    Years(HistoryYears),
    Employers(EmployerCount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentMode {
    Years,
    Employers,
}

#[derive(Serialize, Deserialize)]
struct EmploymentHistoryRepr {
    required: bool,
    #[serde(default = "default_employment_mode")]
    mode: EmploymentMode,
    #[serde(default)]
    value: u8,
}

fn default_employment_mode() -> EmploymentMode {
    EmploymentMode::Years
}

impl TryFrom<EmploymentHistoryRepr> for EmploymentHistory {
    type Error = String;

    fn try_from(value: EmploymentHistoryRepr) -> Result<Self, Self::Error> {
        if !value.required {
            return Ok(Self::NotRequired);
        }
        match value.mode {
            EmploymentMode::Years => HistoryYears::from_years(value.value)
                .map(Self::Years)
                .ok_or_else(|| {
                    format!("employment history must cover 1, 3 or 5 years, got {}", value.value)
                }),
            EmploymentMode::Employers => EmployerCount::from_count(value.value)
                .map(Self::Employers)
                .ok_or_else(|| {
                    format!("employment history must list 1, 2 or 3 employers, got {}", value.value)
                }),
        }
    }
}

impl From<EmploymentHistory> for EmploymentHistoryRepr {
    fn from(value: EmploymentHistory) -> Self {
        match value {
            EmploymentHistory::NotRequired => Self {
                required: false,
                mode: EmploymentMode::Years,
                value: 0,
            },
            EmploymentHistory::Years(years) => Self {
                required: true,
                mode: EmploymentMode::Years,
                value: years.years(),
            },
            EmploymentHistory::Employers(count) => Self {
                required: true,
                mode: EmploymentMode::Employers,
                value: count.count(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    Wet,
    Electronic,
}

/// Everything a facet key describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    pub language: Language,
    pub personal_info: PersonalInfo,
    pub consents: Consents,
    pub residence_history: ResidenceHistory,
    pub employment_history: EmploymentHistory,
    pub education: bool,
    pub professional_license: bool,
    pub signature: Signature,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            language: Language::English,
            personal_info: PersonalInfo::EMAIL_ONLY,
            consents: Consents::NONE,
            residence_history: ResidenceHistory::NotRequired,
            employment_history: EmploymentHistory::NotRequired,
            education: false,
            professional_license: false,
            signature: Signature::Electronic,
        }
    }
}
