//! File names of staged artifacts inside a run directory.

use crate::dataset::Dataset;

/// Metadata key holding the HDI trend table's year range, e.g. `2010_2021`.
pub const HDI_TREND_KEY: &str = "hdi_trend";
/// Metadata key holding the reconciled table's range, set by the HDI transform.
pub const HDI_RANGE_KEY: &str = "hdi_range";

pub fn extract(dataset: Dataset, year: &str) -> String {
    format!("{}_extract_{}.htm", dataset.as_str(), year)
}

pub fn transform(dataset: Dataset, year: &str) -> String {
    format!("{}_transform_{}.csv", dataset.as_str(), year)
}

/// `first_last` range label, e.g. `2010_2023`.
pub fn year_range(first: u16, last: u16) -> String {
    format!("{}_{}", first, last)
}

pub fn hdi_extract(range: &str) -> String {
    format!("hdi_extract_{}.htm", range)
}

pub fn hdi_transform(range: &str) -> String {
    format!("hdi_transform_{}.csv", range)
}

pub fn hdi_summary(range: &str) -> String {
    format!("hdi_transform_{}_summary.csv", range)
}

pub fn hdi_transpose(range: &str) -> String {
    format!("hdi_transform_transpose_{}.csv", range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_embed_year() {
        assert_eq!(extract(Dataset::Gdp, "2022"), "gdp_extract_2022.htm");
        assert_eq!(transform(Dataset::Grp, "2022"), "grp_transform_2022.csv");
        let range = year_range(2010, 2023);
        assert_eq!(hdi_transform(&range), "hdi_transform_2010_2023.csv");
        assert_eq!(hdi_summary(&range), "hdi_transform_2010_2023_summary.csv");
        assert_eq!(hdi_extract(&year_range(2022, 2023)), "hdi_extract_2022_2023.htm");
    }
}
