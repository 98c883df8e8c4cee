//! Read inventory rows back by Zirkel key.

use super::columns::{ColumnMap, Field};
use super::store::{cell_number, cell_text, Cell};
use crate::records::InventoryItem;

/// Public URL of a key's companion image.
pub fn image_url(base_url: &str, key: &str) -> String {
    format!("{}/media/{key}.jpeg", base_url.trim_end_matches('/'))
}

/// Price of a row: the `TARIFA` column, else the first protected column.
fn price(columns: &ColumnMap, row: &[Cell]) -> Option<f64> {
    let col = columns
        .get(Field::Tarifa)
        .or_else(|| Some(columns.boundary()).filter(|&b| b < columns.width()))?;
    cell_number(row.get(col))
}

/// Items for `keys`, in the order requested. Unknown keys are skipped and
/// repeated keys are returned once.
pub fn items_by_keys(rows: &[Vec<Cell>], columns: &ColumnMap, keys: &[String], base_url: &str) -> Vec<InventoryItem> {
    let Some(key_col) = columns.get(Field::ClaveZirkel) else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    keys.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && seen.insert(k.to_string()))
        .filter_map(|key| {
            let row = rows
                .iter()
                .skip(1)
                .find(|r| cell_text(r.get(key_col)) == key)?;
            Some(InventoryItem {
                record: columns.read(row),
                tarifa: price(columns, row),
                image_url: image_url(base_url, key),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sheet() -> Vec<Vec<Cell>> {
        vec![
            vec![json!("CLAVE"), json!("CIUDAD"), json!("COORDENADAS"), json!("TARIFA")],
            vec![json!("ZMPN-1"), json!("Puebla"), json!("19.04, -98.2"), json!(12000)],
            vec![json!("ZMPN-2"), json!("León"), json!(""), json!("")],
        ]
    }

    #[test]
    fn returns_requested_order_with_price_and_url() {
        let rows = sheet();
        let map = ColumnMap::from_header(&rows[0], "TARIFA");
        let keys = vec!["ZMPN-2".to_string(), "ZMXX-9".into(), "ZMPN-1".into(), "ZMPN-2".into()];
        let items = items_by_keys(&rows, &map, &keys, "https://media.example.com/");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key(), "ZMPN-2");
        assert_eq!(items[0].tarifa, None);
        assert_eq!(items[1].tarifa, Some(12000.0));
        assert_eq!(items[1].record.latitud, Some(19.04));
        assert_eq!(items[1].image_url, "https://media.example.com/media/ZMPN-1.jpeg");
    }
}
