//! Field decoders that tolerate upstream type drift instead of rejecting the record.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

use crate::JobProviderRef;

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Other(IgnoredAny),
}

pub(crate) fn text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Scalar::deserialize(de)? {
        Scalar::Text(s) => Some(s),
        Scalar::Int(n) => Some(n.to_string()),
        Scalar::Float(n) => Some(n.to_string()),
        Scalar::Bool(b) => Some(b.to_string()),
        Scalar::Other(_) => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderEntry {
    Entry(JobProviderRef),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderList {
    List(Vec<ProviderEntry>),
    Other(IgnoredAny),
}

/// A list keeps its positions: an entry that is not an object becomes an empty
/// provider, so "first provider" still means the first element upstream sent.
pub(crate) fn providers<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<Option<Vec<JobProviderRef>>, D::Error> {
    Ok(match ProviderList::deserialize(de)? {
        ProviderList::List(entries) => Some(
            entries
                .into_iter()
                .map(|entry| match entry {
                    ProviderEntry::Entry(provider) => provider,
                    ProviderEntry::Other(_) => JobProviderRef::default(),
                })
                .collect(),
        ),
        ProviderList::Other(_) => None,
    })
}
