//! Background-check keys: the requirements model, both key grammars, collection links
//! and the saved-key registry.

mod bitstring;
mod codec;
mod facet;
pub mod link;
mod requirements;
pub mod router;
pub mod store;

pub use bitstring::{BitstringConsents, BitstringRequirements, Timeline};
pub use codec::{
    decode, encode, DecodeError, DecodedKey, Facet, KeyCodec, KeyGrammar, LanguagePolicy,
};
pub use link::{collection_link, individual_link, with_spid, LinkAnalysis, LinkKind, LinkStyle};
pub use requirements::{
    Consents, EmployerCount, EmploymentHistory, EmploymentMode, HistoryYears, Language,
    PersonalInfo, Requirements, ResidenceHistory, Signature,
};
pub use router::key_router;
pub use store::{InMemoryKeyStore, KeyRecord, KeyRegistry, KeyStore, KeyStoreError};
