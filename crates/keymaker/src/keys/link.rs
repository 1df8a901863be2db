use serde::{Deserialize, Serialize};

/// Where the key sits in a collection link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStyle {
    /// `{base}?key={key}`
    #[default]
    Query,
    /// `{base}/collect/{key}`
    Path,
}

pub fn collection_link(endpoint_base_url: &str, key: &str, style: LinkStyle) -> String {
    let base = endpoint_base_url.trim_end_matches('/');
    match style {
        LinkStyle::Query => format!("{base}?key={key}"),
        LinkStyle::Path => format!("{base}/collect/{key}"),
    }
}

/// Attach the customer identifier used for lookups from a pasted link.
pub fn with_spid(link: &str, customer_id: &str) -> String {
    let separator = if link.contains('?') { '&' } else { '?' };
    format!("{link}{separator}spid={customer_id}")
}

/// Personalized link for one invited individual: the customer link with `&puid=` and the
/// individual id appended verbatim, whatever the link already contains.
pub fn individual_link(customer_link: &str, individual_id: &str) -> String {
    format!("{customer_link}&puid={individual_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Key,
    Url,
    Individual,
}

/// What could be recovered from a pasted key or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkAnalysis {
    pub kind: LinkKind,
    pub key: Option<String>,
    pub spid: Option<String>,
    pub puid: Option<String>,
}

impl LinkAnalysis {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let looks_like_url = input.contains("http") || input.contains("/collect/");

        if !looks_like_url {
            return Self {
                kind: LinkKind::Key,
                key: (!input.is_empty()).then(|| input.to_string()),
                spid: None,
                puid: None,
            };
        }

        let puid = query_param(input, "puid");
        let key = path_key(input).or_else(|| query_param(input, "key").map(|k| key_prefix(&k)));
        Self {
            kind: if puid.is_some() {
                LinkKind::Individual
            } else {
                LinkKind::Url
            },
            key: key.filter(|k| !k.is_empty()),
            spid: query_param(input, "spid"),
            puid,
        }
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn key_prefix(raw: &str) -> String {
    raw.chars().take_while(|c| is_key_char(*c)).collect()
}

fn path_key(input: &str) -> Option<String> {
    let (_, rest) = input.split_once("/collect/")?;
    Some(key_prefix(rest))
}

fn query_param(input: &str, name: &str) -> Option<String> {
    let (_, query) = input.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(param, _)| *param == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
