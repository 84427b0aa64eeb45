//! Set and minifigure records shared by the collector and the enricher.
//!
//! `CatalogItem` mirrors one set object of the Brickset `getSets` response. Fields the
//! pipeline reads are typed and written back in normalized form: `number` as a string,
//! `numberVariant` as a non-negative integer (missing, negative or unparsable values become
//! 1), `setID` only when positive. Every other field is carried through verbatim.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

const DEFAULT_NUMBER_VARIANT: u32 = 1;
const UNKNOWN_SERIES: &str = "Unknown";
const SET_IMAGE_KEYS: [&str; 4] = ["imageURL", "imageUrl", "thumbnailURL", "thumbnailUrl"];

/// One set record from the catalog API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CatalogItem {
    #[serde(
        rename = "setID",
        default,
        deserialize_with = "deserialize_set_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub set_id: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub number: String,
    #[serde(
        rename = "numberVariant",
        default = "default_number_variant",
        deserialize_with = "deserialize_number_variant"
    )]
    pub number_variant: u32,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub theme: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub image: Value,
    #[serde(
        rename = "bricksetURL",
        default,
        deserialize_with = "deserialize_lenient_string"
    )]
    pub detail_url: String,
    /// API fields the pipeline does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    /// Returns the cache key for this set, or `None` when the set has no number.
    pub fn normalized_key(&self) -> Option<NormalizedKey> {
        NormalizedKey::new(&self.number, self.number_variant)
    }

    /// First non-empty image URL among the known `image` object keys.
    pub fn set_image(&self) -> String {
        let Some(image) = self.image.as_object() else {
            return String::new();
        };
        SET_IMAGE_KEYS
            .iter()
            .filter_map(|key| image.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|url| !url.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// `"<number>-<variant>"`, the key shared by the cache and the enriched output.
///
/// Only constructible from a non-empty set number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn new(number: &str, variant: u32) -> Option<Self> {
        let number = number.trim();
        if number.is_empty() {
            return None;
        }
        Some(Self(format!("{number}-{variant}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A minifigure found on a set's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
}

/// Final output record: one per set that had a usable number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedItem {
    pub id: NormalizedKey,
    pub series: String,
    pub name: String,
    pub image: String,
    pub minifigs: Vec<SubItem>,
}

impl EnrichedItem {
    pub fn from_catalog(
        key: NormalizedKey,
        item: &CatalogItem,
        series_renames: &BTreeMap<String, String>,
        minifigs: Vec<SubItem>,
    ) -> Self {
        Self {
            id: key,
            series: series_for_category(series_renames, &item.theme),
            name: item.name.trim().to_string(),
            image: item.set_image(),
            minifigs,
        }
    }
}

/// Maps an API theme to the app's series name. Unmapped themes pass through.
pub fn series_for_category(renames: &BTreeMap<String, String>, category: &str) -> String {
    let category = category.trim();
    if let Some(series) = renames.get(category) {
        return series.clone();
    }
    if category.is_empty() {
        UNKNOWN_SERIES.to_string()
    } else {
        category.to_string()
    }
}

fn default_number_variant() -> u32 {
    DEFAULT_NUMBER_VARIANT
}

fn deserialize_set_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_u64().filter(|id| *id > 0),
        Value::String(text) => text.trim().parse::<u64>().ok().filter(|id| *id > 0),
        _ => None,
    })
}

fn deserialize_number_variant<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && *float >= 0.0)
                .map(|float| float.trunc() as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(parsed
        .and_then(|variant| u32::try_from(variant).ok())
        .unwrap_or(DEFAULT_NUMBER_VARIANT))
}

fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::{series_for_category, CatalogItem, NormalizedKey};

    fn item_from(value: serde_json::Value) -> CatalogItem {
        serde_json::from_value(value).expect("catalog item should deserialize")
    }

    fn default_renames() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("BrickHeadz".to_string(), "BrickHeadz".to_string()),
            ("Marvel Super Heroes".to_string(), "Marvel".to_string()),
        ])
    }

    #[test]
    fn test_normalized_key_joins_number_and_variant() {
        let key = NormalizedKey::new("123", 1).expect("non-empty number should key");
        assert_eq!(key.as_str(), "123-1");
        assert_eq!(key.to_string(), "123-1");
    }

    #[test]
    fn test_normalized_key_rejects_blank_number() {
        assert_eq!(NormalizedKey::new("", 1), None);
        assert_eq!(NormalizedKey::new("   ", 3), None);
    }

    #[test]
    fn test_number_variant_is_parsed_leniently() {
        let from_string = item_from(json!({"number": "76218", "numberVariant": "2"}));
        assert_eq!(from_string.number_variant, 2);

        let from_null = item_from(json!({"number": "76218", "numberVariant": null}));
        assert_eq!(from_null.number_variant, 1);

        let from_garbage = item_from(json!({"number": "76218", "numberVariant": "x"}));
        assert_eq!(from_garbage.number_variant, 1);

        let missing = item_from(json!({"number": "76218"}));
        assert_eq!(missing.number_variant, 1);
        assert_eq!(
            missing.normalized_key().map(|key| key.to_string()),
            Some("76218-1".to_string())
        );
    }

    #[test]
    fn test_negative_number_variant_falls_back_to_default() {
        let from_string = item_from(json!({"number": "76218", "numberVariant": "-1"}));
        assert_eq!(from_string.number_variant, 1);

        let from_number = item_from(json!({"number": "76218", "numberVariant": -2}));
        assert_eq!(from_number.number_variant, 1);
    }

    #[test]
    fn test_interpreted_fields_are_written_back_normalized() {
        let item = item_from(json!({
            "setID": 29840,
            "number": 41630,
            "numberVariant": "2",
            "subtheme": 7
        }));
        let written = serde_json::to_value(&item).expect("item should serialize");
        assert_eq!(written["number"], json!("41630"));
        assert_eq!(written["numberVariant"], json!(2));
        assert_eq!(written["subtheme"], json!(7));
    }

    #[test]
    fn test_numeric_number_field_is_keyed() {
        let item = item_from(json!({"number": 41630, "numberVariant": 1}));
        assert_eq!(item.number, "41630");
        assert!(item.normalized_key().is_some());
    }

    #[test]
    fn test_set_id_accepts_numeric_strings_and_rejects_garbage() {
        assert_eq!(item_from(json!({"setID": 3345})).set_id, Some(3345));
        assert_eq!(item_from(json!({"setID": "3345"})).set_id, Some(3345));
        assert_eq!(item_from(json!({"setID": ""})).set_id, None);
        assert_eq!(item_from(json!({})).set_id, None);
    }

    #[test]
    fn test_set_image_prefers_full_image_then_thumbnail() {
        let full = item_from(json!({
            "image": {"thumbnailURL": "https://img/t.jpg", "imageURL": "https://img/full.jpg"}
        }));
        assert_eq!(full.set_image(), "https://img/full.jpg");

        let thumb_only = item_from(json!({
            "image": {"imageURL": "", "thumbnailUrl": "https://img/t.jpg"}
        }));
        assert_eq!(thumb_only.set_image(), "https://img/t.jpg");

        let no_image = item_from(json!({"image": "not-an-object"}));
        assert_eq!(no_image.set_image(), "");
    }

    #[test]
    fn test_unknown_api_fields_survive_serialization() {
        let item = item_from(json!({
            "setID": 1,
            "number": "76218",
            "year": 2022,
            "pieces": 2708
        }));
        let written = serde_json::to_value(&item).expect("item should serialize");
        assert_eq!(written["year"], json!(2022));
        assert_eq!(written["pieces"], json!(2708));
        assert_eq!(written["setID"], json!(1));
    }

    #[test]
    fn test_series_mapping_known_unknown_and_blank() {
        let renames = default_renames();
        assert_eq!(series_for_category(&renames, "Marvel Super Heroes"), "Marvel");
        assert_eq!(series_for_category(&renames, "Star Wars"), "Star Wars");
        assert_eq!(series_for_category(&renames, ""), "Unknown");
        assert_eq!(series_for_category(&renames, "   "), "Unknown");
    }
}
