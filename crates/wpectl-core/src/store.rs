use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::properties::{DEFAULT_SEPARATOR, PropertyRecord};

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_owned()
}

/// Persisted form of a property override; the owning item id and property
/// name are the map keys around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredProperty {
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_separator")]
    pub sep: String,
    #[serde(rename = "type", default)]
    pub type_hint: String,
}

impl From<&PropertyRecord> for StoredProperty {
    fn from(record: &PropertyRecord) -> Self {
        Self {
            value: record.value.clone(),
            sep: record.sep.clone(),
            type_hint: record.type_hint.clone(),
        }
    }
}

/// Collapses whitespace around every comma so list-valued properties reach
/// the engine in canonical form. Values without commas pass through.
pub fn normalize_value(value: &str) -> String {
    if !value.contains(',') {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut pending_ws = String::new();
    let mut after_comma = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !after_comma {
                pending_ws.push(ch);
            }
        } else if ch == ',' {
            pending_ws.clear();
            out.push(',');
            after_comma = true;
        } else {
            out.push_str(&pending_ws);
            pending_ws.clear();
            out.push(ch);
            after_comma = false;
        }
    }
    if !after_comma {
        out.push_str(&pending_ws);
    }
    out
}

/// Merges freshly parsed defaults with persisted overrides. An override
/// contributes only its value; separator and type hint stay with the parsed
/// default. Records with an empty name are discarded.
pub fn merge_records(
    defaults: Vec<PropertyRecord>,
    overrides: Option<&BTreeMap<String, StoredProperty>>,
) -> BTreeMap<String, PropertyRecord> {
    let mut merged = BTreeMap::new();
    for mut record in defaults {
        if record.name.is_empty() {
            continue;
        }
        if let Some(stored) = overrides.and_then(|map| map.get(&record.name)) {
            record.value = stored.value.clone();
        }
        record.value = normalize_value(&record.value);
        merged.insert(record.name.clone(), record);
    }
    merged
}

/// Last-known properties of every item configured this session, keyed by
/// item id. Iteration order within an item is the name order, which keeps
/// command synthesis deterministic.
#[derive(Debug, Default)]
pub struct PropertyStore {
    items: BTreeMap<String, BTreeMap<String, PropertyRecord>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the merge of `defaults` and `overrides` for `item_id`,
    /// replacing whatever was held before. Returns the record count.
    pub fn merge_defaults(
        &mut self,
        item_id: &str,
        defaults: Vec<PropertyRecord>,
        overrides: Option<&BTreeMap<String, StoredProperty>>,
    ) -> usize {
        let merged = merge_records(defaults, overrides);
        let count = merged.len();
        self.items.insert(item_id.to_owned(), merged);
        count
    }

    /// Restores an item's records straight from its persisted mapping, for
    /// when no fresh listing has been run yet.
    pub fn restore(&mut self, item_id: &str, persisted: &BTreeMap<String, StoredProperty>) {
        let records = persisted
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, stored)| {
                (
                    name.clone(),
                    PropertyRecord {
                        name: name.clone(),
                        value: normalize_value(&stored.value),
                        sep: stored.sep.clone(),
                        type_hint: stored.type_hint.clone(),
                    },
                )
            })
            .collect();
        self.items.insert(item_id.to_owned(), records);
    }

    /// Updates one property's value. Returns false if the property is not
    /// known for the item.
    pub fn set_value(&mut self, item_id: &str, name: &str, value: &str) -> bool {
        match self.items.get_mut(item_id).and_then(|map| map.get_mut(name)) {
            Some(record) => {
                record.value = normalize_value(value);
                true
            }
            None => false,
        }
    }

    pub fn records(&self, item_id: &str) -> Option<&BTreeMap<String, PropertyRecord>> {
        self.items.get(item_id)
    }

    /// The wholesale mapping persisted for an item on apply.
    pub fn persisted(&self, item_id: &str) -> BTreeMap<String, StoredProperty> {
        self.items
            .get(item_id)
            .map(|records| {
                records
                    .iter()
                    .map(|(name, record)| (name.clone(), StoredProperty::from(record)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(name: &str, value: &str, type_hint: &str) -> PropertyRecord {
        PropertyRecord::new(name, value).with_type(type_hint)
    }

    #[test]
    fn normalize_collapses_whitespace_around_commas() {
        assert_eq!(normalize_value("1 , 2 ,3"), "1,2,3");
        assert_eq!(normalize_value("a ,\tb"), "a,b");
    }

    #[test]
    fn normalize_leaves_comma_free_values_alone() {
        assert_eq!(normalize_value("no commas here"), "no commas here");
        assert_eq!(normalize_value(""), "");
    }

    #[test]
    fn override_value_wins_but_default_type_is_kept() {
        let overrides: BTreeMap<String, StoredProperty> = [(
            "fps".to_owned(),
            StoredProperty {
                value: "60".to_owned(),
                sep: "=".to_owned(),
                type_hint: String::new(),
            },
        )]
        .into_iter()
        .collect();

        let merged = merge_records(vec![typed("fps", "30", "number")], Some(&overrides));
        let record = merged.get("fps").expect("fps record");
        assert_eq!(record.value, "60");
        assert_eq!(record.type_hint, "number");
        assert_eq!(record.sep, "=");
    }

    #[test]
    fn defaults_pass_through_without_override() {
        let merged = merge_records(vec![typed("tint", "1,0,0", "color")], None);
        assert_eq!(merged.get("tint").expect("tint").value, "1,0,0");
    }

    #[test]
    fn merge_normalizes_list_values() {
        let merged = merge_records(vec![PropertyRecord::new("tint", "1 , 0 ,0")], None);
        assert_eq!(merged.get("tint").expect("tint").value, "1,0,0");
    }

    #[test]
    fn empty_names_are_never_stored() {
        let merged = merge_records(vec![PropertyRecord::new("", "x")], None);
        assert!(merged.is_empty());
    }

    #[test]
    fn set_value_normalizes_on_write() {
        let mut store = PropertyStore::new();
        store.merge_defaults("w1", vec![PropertyRecord::new("tint", "0,0,0")], None);

        assert!(store.set_value("w1", "tint", "1 , 2 , 3"));
        let records = store.records("w1").expect("records");
        assert_eq!(records.get("tint").expect("tint").value, "1,2,3");

        assert!(!store.set_value("w1", "unknown", "x"));
        assert!(!store.set_value("w2", "tint", "x"));
    }

    #[test]
    fn persisted_round_trips_through_restore() {
        let mut store = PropertyStore::new();
        store.merge_defaults(
            "w1",
            vec![typed("fps", "30", "number"), typed("tint", "1,0,0", "color")],
            None,
        );
        let persisted = store.persisted("w1");

        let mut fresh = PropertyStore::new();
        fresh.restore("w1", &persisted);
        assert_eq!(store.records("w1"), fresh.records("w1"));
    }

    #[test]
    fn persisted_unknown_item_is_empty() {
        let store = PropertyStore::new();
        assert!(store.persisted("nope").is_empty());
    }
}
