//! The provider catalogue (`PROVEEDORES!A:AA`).
//!
//! Each row describes one media provider: its short code (used inside Zirkel
//! keys), names, commercial terms, an `x` per media type it sells, and
//! contact details. Column positions are fixed in this sheet.

use super::store::{cell_text, Cell};
use serde::{Deserialize, Serialize};

/// Media-type flag columns, in sheet order starting at column F.
pub const MEDIA_TYPE_COLUMNS: [&str; 18] = [
    "carteleras",
    "pantallas",
    "puentes",
    "muros",
    "sitiosTaxis",
    "vallasFijas",
    "aeropuertos",
    "vallasMoviles",
    "gimnasios",
    "suburbano",
    "metro",
    "mupisDigitales",
    "centrosComerciales",
    "totemDigital",
    "autobuses",
    "universidades",
    "otrosAlternativos",
    "impresion",
];

const FIRST_FLAG: usize = 5;
const CONTACT: usize = FIRST_FLAG + MEDIA_TYPE_COLUMNS.len();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Short code embedded in Zirkel keys.
    pub clave: String,
    pub proveedor: String,
    pub razon_social: String,
    pub negociacion: String,
    pub cobertura: String,
    /// Media types marked with an `x`, by flag name.
    pub media_types: Vec<String>,
    pub contacto: String,
    pub telefono: String,
    pub email: String,
    pub restricciones: String,
}

impl Provider {
    /// Parse one catalogue row. Rows without a code are not providers.
    pub fn from_row(row: &[Cell]) -> Option<Self> {
        let text = |i: usize| cell_text(row.get(i));
        let clave = text(0);
        if clave.is_empty() {
            return None;
        }
        let media_types = MEDIA_TYPE_COLUMNS
            .iter()
            .enumerate()
            .filter(|(i, _)| text(FIRST_FLAG + i).eq_ignore_ascii_case("x"))
            .map(|(_, name)| name.to_string())
            .collect();
        Some(Self {
            clave,
            proveedor: text(1),
            razon_social: text(2),
            negociacion: text(3),
            cobertura: text(4),
            media_types,
            contacto: text(CONTACT),
            telefono: text(CONTACT + 1),
            email: text(CONTACT + 2),
            restricciones: text(CONTACT + 3),
        })
    }

    pub fn offers(&self, media_type: &str) -> bool {
        self.media_types.iter().any(|m| m == media_type)
    }
}

/// Parse a catalogue read, skipping the header row.
pub fn parse_catalogue(rows: &[Vec<Cell>]) -> Vec<Provider> {
    rows.iter().skip(1).filter_map(|r| Provider::from_row(r)).collect()
}

/// Find a provider by code or by name (case-insensitive, trimmed).
pub fn find<'a>(providers: &'a [Provider], name_or_code: &str) -> Option<&'a Provider> {
    let needle = name_or_code.trim();
    providers
        .iter()
        .find(|p| p.clave == needle)
        .or_else(|| {
            providers
                .iter()
                .find(|p| p.proveedor.trim().eq_ignore_ascii_case(needle))
        })
}
