use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

/// Free-text descriptions attached to one asset, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub descriptions: Vec<String>,
}

type ContextAssets = HashMap<String, AssetDescriptor>;

/// `app id → context id → asset id → descriptor`, as embedded in the market page.
///
/// Outer levels are ordered maps so scans are deterministic.
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    apps: BTreeMap<String, BTreeMap<String, ContextAssets>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetLookup<'a> {
    NotFound,
    Found {
        app_id: &'a str,
        context_id: &'a str,
        descriptor: &'a AssetDescriptor,
    },
}

impl<'a> AssetLookup<'a> {
    pub fn descriptor(self) -> Option<&'a AssetDescriptor> {
        match self {
            AssetLookup::NotFound => None,
            AssetLookup::Found { descriptor, .. } => Some(descriptor),
        }
    }
}

fn assets_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bg_rgAssets\s*=").expect("invalid g_rgAssets regex"))
}

// Steam serialises empty PHP arrays as `[]` where an object is expected.
fn keyed_entries<'v>(value: &'v Value, level: &str) -> Result<Vec<(String, &'v Value)>, String> {
    match value {
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v)).collect()),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx.to_string(), v))
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(format!(
            "asset catalog {level} level must be an object, found {}",
            json_kind(other)
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn parse_descriptor(value: &Value) -> Option<AssetDescriptor> {
    let obj = value.as_object()?;
    let mut descriptions = Vec::new();
    if let Some(raw) = obj.get("descriptions") {
        let entries = keyed_entries(raw, "descriptions").unwrap_or_default();
        for (_, entry) in entries {
            let text = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(desc) => desc.get("value").and_then(Value::as_str),
                _ => None,
            };
            if let Some(text) = text {
                descriptions.push(text.to_string());
            }
        }
    }
    Some(AssetDescriptor { descriptions })
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        app_id: impl Into<String>,
        context_id: impl Into<String>,
        asset_id: impl Into<String>,
        descriptor: AssetDescriptor,
    ) {
        self.apps
            .entry(app_id.into())
            .or_default()
            .entry(context_id.into())
            .or_default()
            .insert(asset_id.into(), descriptor);
    }

    pub fn is_empty(&self) -> bool {
        self.asset_count() == 0
    }

    pub fn asset_count(&self) -> usize {
        self.apps
            .values()
            .flat_map(|contexts| contexts.values())
            .map(HashMap::len)
            .sum()
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let mut catalog = Self::new();
        for (app_id, contexts) in keyed_entries(value, "app")? {
            for (context_id, assets) in keyed_entries(contexts, "context")? {
                for (asset_id, raw) in keyed_entries(assets, "asset")? {
                    match parse_descriptor(raw) {
                        Some(descriptor) => {
                            catalog.insert(app_id.clone(), context_id.clone(), asset_id, descriptor)
                        }
                        None => debug!(%app_id, %context_id, %asset_id, "ignoring non-object asset entry"),
                    }
                }
            }
        }
        Ok(catalog)
    }

    /// Reads the `g_rgAssets` assignment from a saved market page.
    ///
    /// A page without the variable yields an empty catalog.
    pub fn from_page_html(html: &str) -> Result<Self, String> {
        // `==` / `===` comparisons are not assignments.
        let Some(m) = assets_assignment_re()
            .find_iter(html)
            .find(|m| !html[m.end()..].starts_with('='))
        else {
            debug!("page has no g_rgAssets assignment");
            return Ok(Self::new());
        };
        let value = serde_json::Deserializer::from_str(&html[m.end()..])
            .into_iter::<Value>()
            .next()
            .ok_or_else(|| "g_rgAssets assignment has no value".to_string())?
            .map_err(|e| format!("parse g_rgAssets failed: {e}"))?;
        Self::from_json(&value)
    }

    pub fn lookup(&self, app_id: &str, context_id: &str, asset_id: &str) -> Option<&AssetDescriptor> {
        self.apps.get(app_id)?.get(context_id)?.get(asset_id)
    }

    /// First `(app, context)` pair holding `asset_id`, in key order.
    pub fn find_asset(&self, asset_id: &str) -> AssetLookup<'_> {
        let mut hits = self.apps.iter().flat_map(|(app_id, contexts)| {
            contexts.iter().filter_map(move |(context_id, assets)| {
                assets.get(asset_id).map(|descriptor| AssetLookup::Found {
                    app_id: app_id.as_str(),
                    context_id: context_id.as_str(),
                    descriptor,
                })
            })
        });
        let Some(first) = hits.next() else {
            return AssetLookup::NotFound;
        };
        let others = hits.count();
        if others > 0 {
            debug!(%asset_id, others, "asset id present under several app/context pairs; using first");
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(lines: &[&str]) -> AssetDescriptor {
        AssetDescriptor {
            descriptions: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn composite_lookup_reports_missing_levels_as_none() {
        let mut catalog = AssetCatalog::new();
        catalog.insert("440", "2", "1001", descriptor(&["Sheen: Team Shine"]));

        assert!(catalog.lookup("440", "2", "1001").is_some());
        assert!(catalog.lookup("730", "2", "1001").is_none());
        assert!(catalog.lookup("440", "6", "1001").is_none());
        assert!(catalog.lookup("440", "2", "9999").is_none());
    }

    #[test]
    fn find_asset_uses_first_pair_in_key_order() {
        let mut catalog = AssetCatalog::new();
        catalog.insert("730", "2", "77", descriptor(&["second"]));
        catalog.insert("440", "2", "77", descriptor(&["first"]));

        match catalog.find_asset("77") {
            AssetLookup::Found {
                app_id,
                context_id,
                descriptor,
            } => {
                assert_eq!(app_id, "440");
                assert_eq!(context_id, "2");
                assert_eq!(descriptor.descriptions, vec!["first".to_string()]);
            }
            AssetLookup::NotFound => panic!("asset 77 should be found"),
        }
        assert_eq!(catalog.find_asset("78"), AssetLookup::NotFound);
    }

    #[test]
    fn from_json_tolerates_php_empty_arrays() {
        let value = json!({
            "440": {
                "2": {
                    "1001": {
                        "descriptions": [
                            {"type": "html", "value": "Killstreaker: Fire Horns"},
                            {"type": "html", "value": "Sheen: Team Shine", "color": "7ea9d1"},
                            {"type": "html"}
                        ]
                    },
                    "1002": {"name": "no descriptions"}
                },
                "6": []
            },
            "753": []
        });
        let catalog = AssetCatalog::from_json(&value).expect("parse catalog");
        assert_eq!(catalog.asset_count(), 2);
        let desc = catalog.lookup("440", "2", "1001").expect("asset 1001");
        assert_eq!(
            desc.descriptions,
            vec!["Killstreaker: Fire Horns".to_string(), "Sheen: Team Shine".to_string()]
        );
        assert!(catalog
            .lookup("440", "2", "1002")
            .expect("asset 1002")
            .descriptions
            .is_empty());

        assert!(AssetCatalog::from_json(&json!([])).expect("empty array").is_empty());
        assert!(AssetCatalog::from_json(&json!("nope")).is_err());
    }

    #[test]
    fn reads_assets_from_page_script() {
        let html = r#"<script type="text/javascript">
            var g_rgAssets = {"440":{"2":{"1001":{"descriptions":[{"value":"Unusual Effect: Burning Flames"}]}}}};
            var g_rgListingInfo = [];
        </script>"#;
        let catalog = AssetCatalog::from_page_html(html).expect("page catalog");
        let found = catalog.find_asset("1001").descriptor().expect("asset in page");
        assert_eq!(found.descriptions[0], "Unusual Effect: Burning Flames");

        let missing = AssetCatalog::from_page_html("<html></html>").expect("no assets");
        assert!(missing.is_empty());

        let broken = AssetCatalog::from_page_html("var g_rgAssets = {\"440\": ;");
        assert!(broken.is_err(), "truncated JSON should be reported");
    }

    #[test]
    fn comparisons_are_not_taken_for_the_assignment() {
        let html = r#"<script>
            if (g_rgAssets == null || g_rgAssets===undefined) { g_rgAssets = {}; }
        </script><script>
            var g_rgAssets = {"440":{"2":{"1001":{"descriptions":[{"value":"Sheen: Hot Rod"}]}}}};
        </script>"#;
        let catalog = AssetCatalog::from_page_html(html).expect("comparison skipped");
        assert!(catalog.is_empty(), "first real assignment is the empty object");

        let html = r#"<script>
            if (typeof g_rgAssets == 'undefined') { return; }
            var g_rgAssets = {"440":{"2":{"1001":{"descriptions":[{"value":"Sheen: Hot Rod"}]}}}};
        </script>"#;
        let catalog = AssetCatalog::from_page_html(html).expect("comparison skipped");
        assert_eq!(catalog.asset_count(), 1);

        let only_check = AssetCatalog::from_page_html("<script>if (g_rgAssets == null) {}</script>")
            .expect("no assignment");
        assert!(only_check.is_empty());
    }
}
