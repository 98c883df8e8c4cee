//! Proposal decks: inventory items laid into a copy of a slide template.
//!
//! The template has a cover slide carrying `FECHA` and a second slide laid out
//! for one site: a table of `CLAVE`, `CIUDAD`, `DIRECCIÓN`, `MEDIDA`, `TIPO`,
//! `COORDENADAS`, `IMPACTOS` and `PRECIO` markers, and a shape whose text
//! contains `Imagen` marking where the site photo goes.
//!
//! ```text
//! keys ─▶ media_by_keys ─▶ copy template ─▶ FECHA + duplicate slide 2 ─▶ re-read
//!                                                                         │
//!                      per item: markers, photo, off-screen data box ◀────┘
//! ```
//!
//! The off-screen text box (`data_<slideId>`) holds every field of the item as
//! `key: value` lines so a deck can be traced back to inventory rows.

pub mod deck;
pub mod slides;

pub use deck::{DeckStore, Presentation};
pub use slides::GoogleDeckStore;

use crate::config::DeckConfig;
use crate::error::PipelineError;
use crate::inventory::store::{cell_text, TabularStore};
use crate::inventory::Inventory;
use crate::records::InventoryItem;
use crate::retry::with_retry;
use chrono::{Datelike, Local, NaiveDate};
use deck::Slide;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Text used for any marker whose value is unknown.
pub const UNKNOWN_VALUE: &str = "Consultar";
const IMAGE_MARKER: &str = "Imagen";

const MONTHS_ES: [&str; 12] = [
    "ENERO", "FEBRERO", "MARZO", "ABRIL", "MAYO", "JUNIO", "JULIO", "AGOSTO", "SEPTIEMBRE", "OCTUBRE",
    "NOVIEMBRE", "DICIEMBRE",
];

/// A created deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalHandle {
    pub presentation_id: String,
    pub name: String,
    pub url: String,
}

/// Builds proposal decks through a [`DeckStore`].
pub struct ProposalAssembler<D: DeckStore> {
    deck: D,
    config: DeckConfig,
    date: Option<NaiveDate>,
}

impl<D: DeckStore> ProposalAssembler<D> {
    pub fn new(deck: D, config: DeckConfig) -> Self {
        Self {
            deck,
            config,
            date: None,
        }
    }

    /// Stamp decks with `date` instead of today.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn deck(&self) -> &D {
        &self.deck
    }

    /// Fetch `keys` from the inventory and build a deck from them.
    ///
    /// # Errors
    /// * [`PipelineError::ProposalFailed`] - none of the keys exist, the
    ///   template has fewer than two slides, or a deck call failed for good
    /// * errors from [`Inventory::media_by_keys`]
    pub async fn build_proposal<S: TabularStore>(
        &self,
        inventory: &Inventory<S>,
        keys: &[String],
    ) -> Result<ProposalHandle, PipelineError> {
        info!("Building proposal for {} keys", keys.len());
        let items = inventory.media_by_keys(keys).await?;
        self.build(&items).await
    }

    /// Build a deck from already fetched items, one site slide per item.
    pub async fn build(&self, items: &[InventoryItem]) -> Result<ProposalHandle, PipelineError> {
        if items.is_empty() {
            return Err(PipelineError::ProposalFailed {
                detail: "no inventory items found for the requested keys".into(),
            });
        }
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let name = deck_name(date, &random_suffix());
        let retry = &self.config.retry;

        let presentation_id = with_retry(retry, "template copy", || {
            self.deck
                .copy_template(&self.config.template_id, &name, &self.config.folder_id)
        })
        .await
        .map_err(PipelineError::from_deck)?;
        info!("Created presentation {name} ({presentation_id})");

        let presentation = self.read(&presentation_id).await?;
        let (cover, template) = match presentation.slides.as_slice() {
            [cover, template, ..] => (cover.object_id.clone(), template.object_id.clone()),
            _ => {
                return Err(PipelineError::ProposalFailed {
                    detail: "template needs a cover slide and a site slide".into(),
                })
            }
        };

        let mut requests = vec![replace_text("FECHA", &month_year_es(date), &cover)];
        requests.extend((1..items.len()).map(|_| json!({ "duplicateObject": { "objectId": template } })));
        self.update(&presentation_id, requests).await?;

        let presentation = self.read(&presentation_id).await?;
        for (i, item) in items.iter().enumerate() {
            let Some(slide) = presentation.slides.get(i + 1) else {
                warn!("No slide left for {}", item.key());
                continue;
            };
            match slide_requests(slide, item) {
                Some(requests) => self.update(&presentation_id, requests).await?,
                None => warn!(
                    "Slide {} lacks its table or '{IMAGE_MARKER}' placeholder; {} skipped",
                    slide.object_id,
                    item.key()
                ),
            }
        }

        info!("Proposal {name} ready with {} sites", items.len());
        Ok(ProposalHandle {
            url: format!("https://docs.google.com/presentation/d/{presentation_id}/edit"),
            presentation_id,
            name,
        })
    }

    async fn read(&self, id: &str) -> Result<Presentation, PipelineError> {
        with_retry(&self.config.retry, "presentation read", || self.deck.get(id))
            .await
            .map_err(PipelineError::from_deck)
    }

    async fn update(&self, id: &str, requests: Vec<Value>) -> Result<(), PipelineError> {
        with_retry(&self.config.retry, "presentation update", || {
            self.deck.batch_update(id, requests.clone())
        })
        .await
        .map_err(PipelineError::from_deck)
    }
}

// ── Request builders ─────────────────────────────────────────────────────

fn replace_text(marker: &str, value: &str, slide_id: &str) -> Value {
    json!({
        "replaceAllText": {
            "containsText": { "text": marker, "matchCase": true },
            "replaceText": value,
            "pageObjectIds": [slide_id],
        }
    })
}

/// Every request that fills one site slide, or `None` when the slide lacks
/// its table or image placeholder.
pub fn slide_requests(slide: &Slide, item: &InventoryItem) -> Option<Vec<Value>> {
    slide.table()?;
    let placeholder = slide.shape_containing(IMAGE_MARKER)?;
    let slide_id = slide.object_id.as_str();

    let mut requests: Vec<Value> = marker_values(item)
        .into_iter()
        .map(|(marker, value)| replace_text(marker, &value, slide_id))
        .collect();

    requests.push(json!({
        "createImage": {
            "url": item.image_url,
            "elementProperties": {
                "pageObjectId": slide_id,
                "size": placeholder.size,
                "transform": placeholder.transform,
            }
        }
    }));
    requests.push(json!({ "deleteObject": { "objectId": placeholder.object_id } }));

    let box_id = format!("data_{slide_id}");
    requests.push(json!({
        "createShape": {
            "objectId": box_id,
            "shapeType": "TEXT_BOX",
            "elementProperties": {
                "pageObjectId": slide_id,
                "size": {
                    "width": { "magnitude": 300, "unit": "PT" },
                    "height": { "magnitude": 500, "unit": "PT" },
                },
                "transform": { "scaleX": 1, "scaleY": 1, "translateX": 1000, "translateY": 0, "unit": "PT" },
            }
        }
    }));
    let data = data_text(item);
    if !data.is_empty() {
        requests.push(json!({ "insertText": { "objectId": box_id, "text": data } }));
    }
    Some(requests)
}

/// Marker → replacement for one item, `Consultar` where unknown.
pub fn marker_values(item: &InventoryItem) -> Vec<(&'static str, String)> {
    let r = &item.record;
    let text = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    let nonzero = |v: Option<f64>| v.filter(|n| *n != 0.0);

    let medida = match (nonzero(r.base), nonzero(r.altura)) {
        (Some(b), Some(a)) => Some(format!("{b}x{a}")),
        _ => None,
    };
    let coordenadas = match (nonzero(r.latitud), nonzero(r.longitud)) {
        (Some(lat), Some(lng)) => Some(format!("{lat}, {lng}")),
        _ => None,
    };

    [
        ("CLAVE", text(&r.clave_zirkel)),
        ("CIUDAD", text(&r.ciudad)),
        ("DIRECCIÓN", text(&r.direccion)),
        ("MEDIDA", medida),
        ("TIPO", text(&r.tipo_medio)),
        ("COORDENADAS", coordenadas),
        ("IMPACTOS", nonzero(r.impactos_mes).map(|n| n.to_string())),
        ("PRECIO", nonzero(item.tarifa).map(|p| format!("${}", format_es_mx(p)))),
    ]
    .into_iter()
    .map(|(marker, value)| (marker, value.unwrap_or_else(|| UNKNOWN_VALUE.to_string())))
    .collect()
}

/// `key: value` lines for every non-empty field of the item.
pub fn data_text(item: &InventoryItem) -> String {
    let Ok(Value::Object(fields)) = serde_json::to_value(item) else {
        return String::new();
    };
    fields
        .iter()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::Null => return None,
                Value::String(s) if s.trim().is_empty() => return None,
                other => cell_text(Some(other)),
            };
            Some(format!("{k}: {value}\n"))
        })
        .collect()
}

// ── Formatting ───────────────────────────────────────────────────────────

/// `YYYY-MM-DD_<suffix>`.
pub fn deck_name(date: NaiveDate, suffix: &str) -> String {
    format!("{}_{suffix}", date.format("%Y-%m-%d"))
}

fn random_suffix() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Spanish upper-case month and year, e.g. `MARZO DE 2025`.
pub fn month_year_es(date: NaiveDate) -> String {
    format!("{} DE {}", MONTHS_ES[date.month0() as usize], date.year())
}

/// Mexican-Spanish number formatting: comma thousands, dot decimals, at most
/// three fraction digits.
pub fn format_es_mx(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = (value.abs() * 1000.0).round() / 1000.0;
    let fixed = format!("{rounded:.3}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InventoryRecord;

    fn item() -> InventoryItem {
        InventoryItem {
            record: InventoryRecord {
                clave_zirkel: Some("ZMPN-7".into()),
                ciudad: Some("Monterrey".into()),
                base: Some(13.0),
                altura: Some(4.2),
                tipo_medio: Some("Carteleras".into()),
                latitud: Some(25.67),
                longitud: Some(-100.31),
                ..Default::default()
            },
            tarifa: Some(18500.0),
            image_url: "https://api.example.com/media/ZMPN-7.jpeg".into(),
        }
    }

    #[test]
    fn markers_fall_back_to_consultar() {
        let values = marker_values(&item());
        let get = |m: &str| values.iter().find(|(k, _)| *k == m).map(|(_, v)| v.as_str()).unwrap();
        assert_eq!(get("CLAVE"), "ZMPN-7");
        assert_eq!(get("MEDIDA"), "13x4.2");
        assert_eq!(get("COORDENADAS"), "25.67, -100.31");
        assert_eq!(get("PRECIO"), "$18,500");
        assert_eq!(get("DIRECCIÓN"), UNKNOWN_VALUE);
        assert_eq!(get("IMPACTOS"), UNKNOWN_VALUE);
        assert_eq!(values.len(), 8);
    }

    #[test]
    fn es_mx_number_format() {
        assert_eq!(format_es_mx(18500.0), "18,500");
        assert_eq!(format_es_mx(1234567.891), "1,234,567.891");
        assert_eq!(format_es_mx(999.5), "999.5");
        assert_eq!(format_es_mx(0.0), "0");
    }

    #[test]
    fn dates_and_names() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(month_year_es(date), "MARZO DE 2025");
        assert_eq!(deck_name(date, "a1b2"), "2025-03-09_a1b2");
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn data_text_lists_present_fields() {
        let text = data_text(&item());
        assert!(text.contains("claveZirkel: ZMPN-7\n"));
        assert!(text.contains("tarifa: 18500\n"));
        assert!(text.contains("altura: 4.2\n"));
        assert!(!text.contains("direccion"));
    }
}
