//! `{lang}-{personalInfo}-{consents}-{residence}-{employment}-{education}-{license}-{signature}`

use super::codec::{DecodeError, LanguagePolicy};
use super::requirements::{
    Consents, EmployerCount, EmploymentHistory, HistoryYears, PersonalInfo, Requirements,
    ResidenceHistory, Signature,
};

const PERSONAL_INFO_EXPECTED: &str = "letters E, P, A, each at most once";
const CONSENTS_EXPECTED: &str = "N, or letters D, T, B, each at most once";
const RESIDENCE_EXPECTED: &str = "N, R1, R3 or R5";
const EMPLOYMENT_EXPECTED: &str = "N, E1, E3, E5, EN1, EN2 or EN3";

pub(crate) fn encode(requirements: &Requirements) -> String {
    let facets = [
        requirements.language.code().to_string(),
        encode_personal_info(requirements.personal_info),
        encode_consents(requirements.consents),
        encode_residence(requirements.residence_history),
        encode_employment(requirements.employment_history),
        flag(requirements.education, 'E').to_string(),
        flag(requirements.professional_license, 'P').to_string(),
        match requirements.signature {
            Signature::Wet => "W",
            Signature::Electronic => "E",
        }
        .to_string(),
    ];
    facets.join("-")
}

pub(crate) fn decode(key: &str, policy: LanguagePolicy) -> Result<Requirements, DecodeError> {
    let facets: Vec<&str> = key.split('-').collect();
    let &[language, personal_info, consents, residence, employment, education, license, signature] =
        facets.as_slice()
    else {
        return Err(DecodeError::WrongArity(facets.len()));
    };

    Ok(Requirements {
        language: policy.resolve(language)?,
        personal_info: decode_personal_info(personal_info)?,
        consents: decode_consents(consents)?,
        residence_history: decode_residence(residence)?,
        employment_history: decode_employment(employment)?,
        education: decode_flag(education, 'E').ok_or_else(|| DecodeError::BadEducation {
            value: education.to_string(),
            expected: "E or N",
        })?,
        professional_license: decode_flag(license, 'P').ok_or_else(|| {
            DecodeError::BadProfessionalLicense {
                value: license.to_string(),
                expected: "P or N",
            }
        })?,
        signature: match signature {
            "W" => Signature::Wet,
            "E" => Signature::Electronic,
            other => {
                return Err(DecodeError::BadSignature {
                    value: other.to_string(),
                    expected: "W or E",
                })
            }
        },
    })
}

fn flag(present: bool, letter: char) -> char {
    if present {
        letter
    } else {
        'N'
    }
}

fn decode_flag(facet: &str, letter: char) -> Option<bool> {
    let mut chars = facet.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c == letter => Some(true),
        (Some('N'), None) => Some(false),
        _ => None,
    }
}

fn encode_personal_info(info: PersonalInfo) -> String {
    [(info.email(), 'E'), (info.phone(), 'P'), (info.address(), 'A')]
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, letter)| *letter)
        .collect()
}

fn decode_personal_info(facet: &str) -> Result<PersonalInfo, DecodeError> {
    if facet.is_empty() {
        return Ok(PersonalInfo::EMAIL_ONLY);
    }
    let bad = || DecodeError::BadPersonalInfo {
        value: facet.to_string(),
        expected: PERSONAL_INFO_EXPECTED,
    };

    let (mut email, mut phone, mut address) = (false, false, false);
    for letter in facet.chars() {
        let slot = match letter {
            'E' => &mut email,
            'P' => &mut phone,
            'A' => &mut address,
            _ => return Err(bad()),
        };
        if std::mem::replace(slot, true) {
            return Err(bad());
        }
    }
    Ok(PersonalInfo::new(email, phone, address))
}

fn encode_consents(consents: Consents) -> String {
    if consents.is_none() {
        return "N".to_string();
    }
    [
        (consents.drug_test, 'D'),
        (consents.tax_forms, 'T'),
        (consents.biometric, 'B'),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, letter)| *letter)
    .collect()
}

fn decode_consents(facet: &str) -> Result<Consents, DecodeError> {
    if facet == "N" {
        return Ok(Consents::NONE);
    }
    let bad = || DecodeError::BadConsents {
        value: facet.to_string(),
        expected: CONSENTS_EXPECTED,
    };
    if facet.is_empty() {
        return Err(bad());
    }

    let mut consents = Consents::NONE;
    for letter in facet.chars() {
        let slot = match letter {
            'D' => &mut consents.drug_test,
            'T' => &mut consents.tax_forms,
            'B' => &mut consents.biometric,
            _ => return Err(bad()),
        };
        if std::mem::replace(slot, true) {
            return Err(bad());
        }
    }
    Ok(consents)
}

fn encode_residence(history: ResidenceHistory) -> String {
    match history {
        ResidenceHistory::NotRequired => "N".to_string(),
        ResidenceHistory::Years(years) => format!("R{}", years.years()),
    }
}

fn decode_residence(facet: &str) -> Result<ResidenceHistory, DecodeError> {
    if facet == "N" {
        return Ok(ResidenceHistory::NotRequired);
    }
    facet
        .strip_prefix('R')
        .and_then(parse_digit)
        .and_then(HistoryYears::from_years)
        .map(ResidenceHistory::Years)
        .ok_or_else(|| DecodeError::BadResidenceHistory {
            value: facet.to_string(),
            expected: RESIDENCE_EXPECTED,
        })
}

fn encode_employment(history: EmploymentHistory) -> String {
    match history {
        EmploymentHistory::NotRequired => "N".to_string(),
        EmploymentHistory::Years(years) => format!("E{}", years.years()),
        EmploymentHistory::Employers(count) => format!("EN{}", count.count()),
    }
}

fn decode_employment(facet: &str) -> Result<EmploymentHistory, DecodeError> {
    if facet == "N" {
        return Ok(EmploymentHistory::NotRequired);
    }
    let decoded = if let Some(count) = facet.strip_prefix("EN") {
        parse_digit(count)
            .and_then(EmployerCount::from_count)
            .map(EmploymentHistory::Employers)
    } else {
        facet
            .strip_prefix('E')
            .and_then(parse_digit)
            .and_then(HistoryYears::from_years)
            .map(EmploymentHistory::Years)
    };
    decoded.ok_or_else(|| DecodeError::BadEmploymentHistory {
        value: facet.to_string(),
        expected: EMPLOYMENT_EXPECTED,
    })
}

fn parse_digit(raw: &str) -> Option<u8> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10).and_then(|d| u8::try_from(d).ok()),
        _ => None,
    }
}
