//! Item reference data.

use serde::{Deserialize, Serialize};

/// An in-game item. `item_id` is the internal numeric id used throughout the
/// aggregation pipeline; `ark_item_id` is the external string id exposed on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "itemId")]
    pub item_id: i32,

    #[serde(rename = "arkItemId")]
    pub ark_item_id: String,

    pub name: String,

    #[serde(rename = "sortId")]
    pub sort_id: i32,
}

impl Item {
    pub fn new(item_id: i32, ark_item_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            item_id,
            ark_item_id: ark_item_id.into(),
            name: name.into(),
            sort_id: item_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_serialization() {
        let item = Item::new(1, "30012", "Orirock Cube");
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"itemId\":1"));
        assert!(json.contains("\"arkItemId\":\"30012\""));

        let parsed: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
