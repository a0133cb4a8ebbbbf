use tracing::debug;

use crate::asset_catalog::AssetCatalog;
use crate::history_extract::ExtractedRow;
use crate::market_records::TransactionRecord;

const ROW_ID_DELIMITER: char = '_';
const ASSET_ID_SEGMENT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedleMatch {
    Contains,
    Leading,
}

#[derive(Debug, Clone, Copy)]
pub struct TagRule {
    pub needle: &'static str,
    pub matcher: NeedleMatch,
    pub tag: &'static str,
}

/// Evaluated top to bottom; the first hit wins for each description.
pub const ATTRIBUTE_TAG_RULES: &[TagRule] = &[
    TagRule {
        needle: "Killstreaker:",
        matcher: NeedleMatch::Contains,
        tag: "Kr:",
    },
    TagRule {
        needle: "Sheen:",
        matcher: NeedleMatch::Contains,
        tag: "Sn:",
    },
    TagRule {
        needle: "Unusual Effect:",
        matcher: NeedleMatch::Contains,
        tag: "Ef:",
    },
    TagRule {
        needle: "Effect:",
        matcher: NeedleMatch::Leading,
        tag: "Ef:",
    },
];

impl TagRule {
    fn matches(&self, text: &str) -> bool {
        match self.matcher {
            NeedleMatch::Contains => text.contains(self.needle),
            NeedleMatch::Leading => text.starts_with(self.needle),
        }
    }

    fn apply(&self, text: &str) -> String {
        text.replacen(self.needle, self.tag, 1)
    }
}

pub fn attribute_tag(description: &str, rules: &[TagRule]) -> Option<String> {
    rules
        .iter()
        .find(|rule| rule.matches(description))
        .map(|rule| rule.apply(description))
}

/// `history_row_<a>_<b>_...` → `<b>`; `None` when the id is too short.
pub fn asset_id_from_row_id(row_id: &str) -> Option<&str> {
    row_id
        .split(ROW_ID_DELIMITER)
        .nth(ASSET_ID_SEGMENT)
        .filter(|s| !s.is_empty())
}

/// Returns `" [tag, tag]"` for the row's asset, or an empty string.
pub fn item_suffix(row_id: &str, catalog: &AssetCatalog) -> String {
    let Some(asset_id) = asset_id_from_row_id(row_id) else {
        return String::new();
    };
    let Some(descriptor) = catalog.find_asset(asset_id).descriptor() else {
        return String::new();
    };
    let tags = descriptor
        .descriptions
        .iter()
        .filter_map(|d| attribute_tag(d, ATTRIBUTE_TAG_RULES))
        .collect::<Vec<_>>();
    if tags.is_empty() {
        return String::new();
    }
    debug!(%row_id, %asset_id, tags = tags.len(), "enriched item label");
    format!(" [{}]", tags.join(", "))
}

pub fn enrich_record(mut record: TransactionRecord, row_id: &str, catalog: &AssetCatalog) -> TransactionRecord {
    record.item.push_str(&item_suffix(row_id, catalog));
    record
}

pub fn enrich_rows(rows: Vec<ExtractedRow>, catalog: &AssetCatalog) -> Vec<TransactionRecord> {
    rows.into_iter()
        .map(|row| enrich_record(row.record, &row.row_id, catalog))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_catalog::AssetDescriptor;
    use crate::market_records::TxnAction;

    fn catalog_with(asset_id: &str, lines: &[&str]) -> AssetCatalog {
        let mut catalog = AssetCatalog::new();
        catalog.insert(
            "440",
            "2",
            asset_id,
            AssetDescriptor {
                descriptions: lines.iter().map(|s| s.to_string()).collect(),
            },
        );
        catalog
    }

    fn hat() -> TransactionRecord {
        TransactionRecord {
            date: "1 Jan".to_string(),
            action: TxnAction::Sold,
            game: "Team Fortress 2".to_string(),
            item: "Hat".to_string(),
            price: "$1".to_string(),
        }
    }

    #[test]
    fn rules_abbreviate_known_prefixes() {
        let tag = |s: &str| attribute_tag(s, ATTRIBUTE_TAG_RULES);
        assert_eq!(tag("Sheen: Team Shine").as_deref(), Some("Sn: Team Shine"));
        assert_eq!(tag("Killstreaker: Fire Horns").as_deref(), Some("Kr: Fire Horns"));
        assert_eq!(
            tag("Unusual Effect: Burning Flames").as_deref(),
            Some("Ef: Burning Flames")
        );
        assert_eq!(tag("Effect: Sunbeams").as_deref(), Some("Ef: Sunbeams"));
        assert_eq!(tag("Strange Stat: Effect: x"), None, "Effect must lead the text");
        assert_eq!(tag("Level 10 Hat"), None);
    }

    #[test]
    fn asset_id_is_fourth_row_id_segment() {
        assert_eq!(asset_id_from_row_id("history_row_4135_1001_mylisting"), Some("1001"));
        assert_eq!(asset_id_from_row_id("history_row_4135"), None);
        assert_eq!(asset_id_from_row_id("history_row_4135_"), None);
    }

    #[test]
    fn combined_tags_join_with_comma() {
        let catalog = catalog_with(
            "1001",
            &["Killstreaker: Fire Horns", "Halloween: Spooky", "Sheen: Team Shine"],
        );
        let rec = enrich_record(hat(), "history_row_4135_1001_x", &catalog);
        assert_eq!(rec.item, "Hat [Kr: Fire Horns, Sn: Team Shine]");
    }

    #[test]
    fn lookup_miss_leaves_label_unchanged() {
        let catalog = catalog_with("1001", &["Sheen: Team Shine"]);
        assert_eq!(enrich_record(hat(), "history_row_4135_2002_x", &catalog).item, "Hat");
        assert_eq!(enrich_record(hat(), "history_row", &catalog).item, "Hat");

        let plain = catalog_with("1001", &["Craftable"]);
        assert_eq!(enrich_record(hat(), "history_row_4135_1001_x", &plain).item, "Hat");
    }

    #[test]
    fn enrich_rows_keeps_order() {
        let catalog = catalog_with("7", &["Sheen: Hot Rod"]);
        let rows = vec![
            ExtractedRow {
                row_id: "history_row_1_7_a".to_string(),
                record: hat(),
            },
            ExtractedRow {
                row_id: "history_row_1_8_a".to_string(),
                record: hat(),
            },
        ];
        let out = enrich_rows(rows, &catalog);
        assert_eq!(out[0].item, "Hat [Sn: Hot Rod]");
        assert_eq!(out[1].item, "Hat");
    }
}
