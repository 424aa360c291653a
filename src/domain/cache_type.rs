//! Cache tiers and type selections.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four independent cache tiers.
///
/// Declaration order is the dispatch order used by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Http,
    Object,
    Opcode,
    Transient,
}

impl CacheType {
    pub const ALL: [CacheType; 4] = [
        CacheType::Http,
        CacheType::Object,
        CacheType::Opcode,
        CacheType::Transient,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheType::Http => "http",
            CacheType::Object => "object",
            CacheType::Opcode => "opcode",
            CacheType::Transient => "transient",
        }
    }

    /// Only the edge tier can drop individual URLs.
    pub fn supports_purge(self) -> bool {
        matches!(self, CacheType::Http)
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown cache type `{0}`")]
pub struct UnknownCacheType(pub String);

impl FromStr for CacheType {
    type Err = UnknownCacheType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "http" => Ok(CacheType::Http),
            "object" => Ok(CacheType::Object),
            "opcode" => Ok(CacheType::Opcode),
            "transient" => Ok(CacheType::Transient),
            other => Err(UnknownCacheType(other.to_string())),
        }
    }
}

/// Parse loosely supplied type names, splitting on commas and dropping unknown entries.
///
/// Returns `None` when no names were supplied at all so callers can apply
/// their own default; `Some(empty)` means names were given but none matched.
pub fn parse_names<I, S>(names: I) -> Option<BTreeSet<CacheType>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut supplied = false;
    let mut parsed = BTreeSet::new();

    for raw in names {
        for token in raw.as_ref().split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            supplied = true;
            if let Ok(kind) = token.parse::<CacheType>() {
                parsed.insert(kind);
            }
        }
    }

    supplied.then_some(parsed)
}

/// Which tiers a flush call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSelection {
    All,
    Only(BTreeSet<CacheType>),
}

impl TypeSelection {
    pub fn only(types: impl IntoIterator<Item = CacheType>) -> Self {
        Self::Only(types.into_iter().collect())
    }

    /// Resolve against the registered tiers, keeping canonical order.
    pub fn resolve(&self, registered: impl IntoIterator<Item = CacheType>) -> BTreeSet<CacheType> {
        match self {
            TypeSelection::All => registered.into_iter().collect(),
            TypeSelection::Only(types) => registered
                .into_iter()
                .filter(|kind| types.contains(kind))
                .collect(),
        }
    }
}

impl From<BTreeSet<CacheType>> for TypeSelection {
    fn from(types: BTreeSet<CacheType>) -> Self {
        Self::Only(types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_display() {
        for kind in CacheType::ALL {
            assert_eq!(kind.to_string().parse::<CacheType>(), Ok(kind));
        }
        assert!("HTTP".parse::<CacheType>().is_err());
    }

    #[test]
    fn parse_names_splits_commas_and_drops_unknown() {
        let parsed = parse_names(["object,bogus", " transient "]).expect("names supplied");
        assert_eq!(
            parsed.into_iter().collect::<Vec<_>>(),
            vec![CacheType::Object, CacheType::Transient]
        );
    }

    #[test]
    fn parse_names_distinguishes_absent_from_invalid() {
        assert_eq!(parse_names(Vec::<String>::new()), None);
        assert_eq!(parse_names([",", ""]), None);
        assert_eq!(parse_names(["nope"]), Some(BTreeSet::new()));
    }

    #[test]
    fn selection_resolves_in_canonical_order() {
        let selection = TypeSelection::only([CacheType::Transient, CacheType::Http]);
        let resolved: Vec<_> = selection.resolve(CacheType::ALL).into_iter().collect();
        assert_eq!(resolved, vec![CacheType::Http, CacheType::Transient]);

        let registered = [CacheType::Object, CacheType::Opcode];
        assert_eq!(TypeSelection::All.resolve(registered).len(), 2);
    }

    #[test]
    fn only_http_supports_purge() {
        let purgeable: Vec<_> = CacheType::ALL
            .into_iter()
            .filter(|kind| kind.supports_purge())
            .collect();
        assert_eq!(purgeable, vec![CacheType::Http]);
    }
}
