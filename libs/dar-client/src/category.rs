//! DAR address categories and category selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address category, one DAR endpoint each.
///
/// Variants are declared in lookup priority order: current addresses first,
/// historic access addresses last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AddressCategory {
    /// `adresser`
    Address,
    /// `adgangsadresser`
    AccessAddress,
    /// `historik/adresser`
    HistoricAddress,
    /// `historik/adgangsadresser`
    HistoricAccessAddress,
}

impl AddressCategory {
    /// Every category in lookup priority order
    pub const ALL: [AddressCategory; 4] = [
        AddressCategory::Address,
        AddressCategory::AccessAddress,
        AddressCategory::HistoricAddress,
        AddressCategory::HistoricAccessAddress,
    ];

    /// Path segment under the DAR base URL
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            AddressCategory::Address => "adresser",
            AddressCategory::AccessAddress => "adgangsadresser",
            AddressCategory::HistoricAddress => "historik/adresser",
            AddressCategory::HistoricAccessAddress => "historik/adgangsadresser",
        }
    }
}

impl fmt::Display for AddressCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Error for a string that names no address category
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown address category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for AddressCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches('/');
        AddressCategory::ALL
            .into_iter()
            .find(|c| c.path_segment() == trimmed)
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

impl TryFrom<String> for AddressCategory {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressCategory> for String {
    fn from(value: AddressCategory) -> Self {
        value.path_segment().to_owned()
    }
}

/// Which categories a lookup searches, in order.
///
/// `Default` searches all four in priority order. `Only` searches exactly the
/// listed categories; an empty list searches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategorySelection {
    #[default]
    Default,
    Only(Vec<AddressCategory>),
}

impl CategorySelection {
    /// Categories to search, in order
    #[must_use]
    pub fn categories(&self) -> &[AddressCategory] {
        match self {
            CategorySelection::Default => &AddressCategory::ALL,
            CategorySelection::Only(list) => list,
        }
    }
}

impl From<Vec<AddressCategory>> for CategorySelection {
    fn from(list: Vec<AddressCategory>) -> Self {
        CategorySelection::Only(list)
    }
}

impl From<AddressCategory> for CategorySelection {
    fn from(category: AddressCategory) -> Self {
        CategorySelection::Only(vec![category])
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn path_segments_follow_priority_order() {
        let segments: Vec<_> = AddressCategory::ALL
            .iter()
            .map(|c| c.path_segment())
            .collect();
        assert_eq!(
            segments,
            vec![
                "adresser",
                "adgangsadresser",
                "historik/adresser",
                "historik/adgangsadresser"
            ]
        );
        assert!(AddressCategory::Address < AddressCategory::HistoricAccessAddress);
    }

    #[test]
    fn parses_path_segments() {
        assert_eq!(
            "historik/adresser".parse::<AddressCategory>(),
            Ok(AddressCategory::HistoricAddress)
        );
        assert_eq!(
            "/adgangsadresser/".parse::<AddressCategory>(),
            Ok(AddressCategory::AccessAddress)
        );
        assert_eq!(
            "vejnavne".parse::<AddressCategory>(),
            Err(UnknownCategory("vejnavne".to_owned()))
        );
    }

    #[test]
    fn serde_uses_path_segment() {
        let json = serde_json::to_string(&AddressCategory::HistoricAccessAddress).unwrap();
        assert_eq!(json, r#""historik/adgangsadresser""#);
        let back: AddressCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AddressCategory::HistoricAccessAddress);
    }

    #[test]
    fn default_selection_is_all_categories() {
        assert_eq!(CategorySelection::Default.categories(), &AddressCategory::ALL);
    }

    #[test]
    fn empty_selection_searches_nothing() {
        assert!(CategorySelection::Only(Vec::new()).categories().is_empty());
        assert_eq!(
            CategorySelection::from(AddressCategory::AccessAddress).categories(),
            &[AddressCategory::AccessAddress]
        );
    }
}
