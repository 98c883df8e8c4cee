//! Record types flowing through extraction and reconciliation.
//!
//! * [`ExtractedMediaRecord`] - what the structurer returns for one site found
//!   in an uploaded document, plus the image picked for it.
//! * [`InventoryRecord`] - an upsert-ready row for the inventory sheet. Every
//!   field is optional: `None` means "leave the cell as it is".
//! * [`InventoryItem`] - an inventory row read back by key, with its price and
//!   public image URL.
//!
//! JSON field names follow the camelCase names the inventory front-end and
//! the extraction prompt use (`tipoMedio`, `impactosMes`, `pagina`).

use crate::inventory::keys::ZirkelKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One inventory site as structured by the model from an uploaded document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMediaRecord {
    /// The provider's own site key, when the document shows one.
    #[serde(
        rename = "clave",
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_key: Option<String>,
    /// Width in metres.
    #[serde(default, deserialize_with = "lenient::number")]
    pub base: Option<f64>,
    /// Height in metres.
    #[serde(default, deserialize_with = "lenient::number")]
    pub altura: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub ciudad: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub estado: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub tipo_medio: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub costo: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub costo_instalacion: Option<f64>,
    /// "Si", "No" or a free-form lighting description.
    #[serde(default, deserialize_with = "lenient::text")]
    pub iluminacion: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub vista: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub orientacion: String,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub caracteristica: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub impactos_mes: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub latitud: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub longitud: Option<f64>,
    /// 1-based page the site was found on. `0` when the model omitted it.
    #[serde(rename = "pagina", default, deserialize_with = "lenient::page")]
    pub page: u32,
    #[serde(default, deserialize_with = "lenient::text")]
    pub direccion: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub delegacion: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub colonia: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub codigo_postal: String,
    /// Selected thumbnail as a `data:image/jpeg;base64,` URI.
    #[serde(default, alias = "largestImage")]
    pub selected_image: Option<String>,
}

impl ExtractedMediaRecord {
    /// Check the record invariants against the source document.
    ///
    /// Returns a human-readable reason on violation.
    pub fn validate(&self, page_count: usize) -> Result<(), String> {
        if self.page == 0 || self.page as usize > page_count {
            return Err(format!(
                "page {} does not exist (document has {page_count} pages)",
                self.page
            ));
        }
        let non_negative = [
            ("costo", self.costo),
            ("costoInstalacion", self.costo_instalacion),
            ("base", self.base),
            ("altura", self.altura),
            ("impactosMes", self.impactos_mes),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(format!("{name} must be non-negative, got {v}"));
                }
            }
        }
        Ok(())
    }

    /// Turn the record into an upsert-ready inventory row for `provider`.
    ///
    /// When the document carried a site key the Zirkel key is composed from
    /// it; otherwise the key is left for the reconciler to synthesise.
    pub fn into_inventory_record(self, provider_name: &str, provider_code: &str) -> InventoryRecord {
        let zirkel_key = self
            .original_key
            .as_deref()
            .map(|k| ZirkelKey::compose(provider_code, k).into_string());
        InventoryRecord {
            proveedor: Some(provider_name.to_string()),
            clave_zirkel: zirkel_key,
            clave_original_sitio: self.original_key,
            costo: self.costo,
            costo_instalacion: self.costo_instalacion,
            tipo_medio: non_empty(self.tipo_medio),
            estado: non_empty(self.estado),
            ciudad: non_empty(self.ciudad),
            base: self.base,
            altura: self.altura,
            iluminacion: non_empty(self.iluminacion),
            vista: non_empty(self.vista),
            orientacion: non_empty(self.orientacion),
            caracteristica: self.caracteristica.and_then(non_empty),
            impactos_mes: self.impactos_mes,
            latitud: self.latitud,
            longitud: self.longitud,
            direccion: non_empty(self.direccion),
            delegacion: non_empty(self.delegacion),
            colonia: non_empty(self.colonia),
            codigo_postal: non_empty(self.codigo_postal),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// An upsert-ready inventory row. `None` fields leave existing cells untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proveedor: Option<String>,
    /// Join key; synthesised from the provider code when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clave_zirkel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clave_original_sitio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costo_instalacion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_medio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estado: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciudad: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altura: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iluminacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vista: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caracteristica: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impactos_mes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitud: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitud: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegacion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colonia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigo_postal: Option<String>,
}

/// An inventory row fetched by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    #[serde(flatten)]
    pub record: InventoryRecord,
    /// Price from the protected price column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarifa: Option<f64>,
    /// `<base>/media/<key>.jpeg`.
    pub image_url: String,
}

impl InventoryItem {
    pub fn key(&self) -> &str {
        self.record.clave_zirkel.as_deref().unwrap_or_default()
    }
}

// ── Lenient decoding ─────────────────────────────────────────────────────

static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d[\d.,]*").expect("valid regex"));

/// Parse a human-written number: `"13"`, `"4.20 MTS."`, `"$12,500"`, `"4,2"`.
///
/// A single comma followed by exactly three digits is a thousands separator;
/// any other lone comma is a decimal separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    let token = NUMBER_TOKEN.find(raw.trim())?.as_str();
    let token = token.trim_end_matches(['.', ',']);
    let normalised = if token.contains('.') {
        token.replace(',', "")
    } else {
        match token.matches(',').count() {
            0 => token.to_string(),
            1 => {
                let (_, frac) = token.split_once(',').unwrap_or((token, ""));
                if frac.len() == 3 {
                    token.replace(',', "")
                } else {
                    token.replace(',', ".")
                }
            }
            _ => token.replace(',', ""),
        }
    };
    normalised.parse().ok()
}

/// Serde helpers that accept what a language model actually emits: numbers as
/// strings, empty strings for "unknown", and the odd `null`.
pub(crate) mod lenient {
    use super::parse_number;
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(n.as_f64()),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => parse_number(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("not a number: {s:?}"))),
            other => Err(D::Error::custom(format!("expected a number, got {other}"))),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_text(d)?.unwrap_or_default())
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s.trim().to_string())),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(if b { "Si" } else { "No" }.to_string())),
            other => Err(D::Error::custom(format!("expected text, got {other}"))),
        }
    }

    pub fn page<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        match number(d)? {
            None => Ok(0),
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => Ok(n as u32),
            Some(n) => Err(D::Error::custom(format!("invalid page number {n}"))),
        }
    }
}
