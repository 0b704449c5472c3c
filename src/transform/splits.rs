//! Provinces created by administrative splits after the HDI trend series
//! ended. Each inherits the full history of the province it was carved from.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProvinceSplit {
    /// Name as it appears in the snapshot table.
    pub province: String,
    /// Province whose values are copied.
    pub parent: String,
}

// 2022 reorganisation of Papua and West Papua.
const PAPUA_SPLITS: &[(&str, &str)] = &[
    ("Southwest Papua", "West Papua"),
    ("South Papua", "Papua"),
    ("Central Papua", "Papua"),
    ("Highland Papua", "Papua"),
];

pub fn default_splits() -> Vec<ProvinceSplit> {
    PAPUA_SPLITS
        .iter()
        .map(|(province, parent)| ProvinceSplit {
            province: province.to_string(),
            parent: parent.to_string(),
        })
        .collect()
}

pub fn parent_of<'a>(splits: &'a [ProvinceSplit], province: &str) -> Option<&'a str> {
    splits
        .iter()
        .find(|s| s.province == province)
        .map(|s| s.parent.as_str())
}
