//! Header-driven column mapping for the inventory sheet.
//!
//! The sheet has no fixed schema: columns get inserted and reordered by hand.
//! A [`ColumnMap`] is therefore rebuilt from the header row on every call and
//! must not outlive it. It also carries the protected boundary, the first
//! column whose header contains the price marker; nothing at or after it is
//! ever written by this crate.

use super::store::{cell_number, cell_text, Cell};
use crate::records::InventoryRecord;
use serde_json::{json, Value};
use std::collections::HashMap;

/// A logical inventory field with a known header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Proveedor,
    ClaveZirkel,
    ClaveOriginal,
    Costo,
    CostoInstalacion,
    TipoMedio,
    Estado,
    Ciudad,
    Base,
    Altura,
    Iluminacion,
    Vista,
    Orientacion,
    Caracteristica,
    Coordenadas,
    Direccion,
    Delegacion,
    Colonia,
    CodigoPostal,
    Tarifa,
    ImpactosMes,
}

impl Field {
    pub const ALL: [Field; 21] = [
        Field::Proveedor,
        Field::ClaveZirkel,
        Field::ClaveOriginal,
        Field::Costo,
        Field::CostoInstalacion,
        Field::TipoMedio,
        Field::Estado,
        Field::Ciudad,
        Field::Base,
        Field::Altura,
        Field::Iluminacion,
        Field::Vista,
        Field::Orientacion,
        Field::Caracteristica,
        Field::Coordenadas,
        Field::Direccion,
        Field::Delegacion,
        Field::Colonia,
        Field::CodigoPostal,
        Field::Tarifa,
        Field::ImpactosMes,
    ];

    /// Header text, compared after trimming surrounding whitespace.
    pub fn header(self) -> &'static str {
        match self {
            Field::Proveedor => "PROVEEDOR",
            Field::ClaveZirkel => "CLAVE",
            Field::ClaveOriginal => "CLAVE ORIGINAL",
            Field::Costo => "COSTO",
            Field::CostoInstalacion => "COSTO DE INSTALACIÓN",
            Field::TipoMedio => "MEDIO",
            Field::Estado => "ESTADO",
            Field::Ciudad => "CIUDAD",
            Field::Base => "BASE",
            Field::Altura => "ALTURA",
            Field::Iluminacion => "ILUMINACIÓN",
            Field::Vista => "VISTA",
            Field::Orientacion => "ORIENTACIÓN",
            Field::Caracteristica => "CARACTERISTICAS",
            Field::Coordenadas => "COORDENADAS",
            Field::Direccion => "DIRECCIÓN",
            Field::Delegacion => "DELEGACIÓN / MUNICIPIO",
            Field::Colonia => "COLONIA",
            Field::CodigoPostal => "CÓDIGO POSTAL",
            Field::Tarifa => "TARIFA",
            Field::ImpactosMes => "IMPACTOS MES",
        }
    }
}

/// Field → column index for one header row, plus the protected boundary.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    indices: HashMap<Field, usize>,
    boundary: usize,
    width: usize,
}

impl ColumnMap {
    /// Build the map from a header row.
    ///
    /// Unknown headers are ignored; a field whose header is missing is absent
    /// and skipped on write. When a header repeats, the leftmost column wins.
    pub fn from_header(header: &[Cell], price_marker: &str) -> Self {
        let names: Vec<String> = header.iter().map(|c| cell_text(Some(c))).collect();
        let mut indices = HashMap::new();
        for field in Field::ALL {
            if let Some(i) = names.iter().position(|n| n == field.header()) {
                indices.insert(field, i);
            }
        }
        let marker = price_marker.trim().to_uppercase();
        let boundary = names
            .iter()
            .position(|n| !marker.is_empty() && n.to_uppercase().contains(&marker))
            .unwrap_or(names.len());
        Self {
            indices,
            boundary,
            width: names.len(),
        }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        self.indices.get(&field).copied()
    }

    /// First protected column. Writes stop strictly before it.
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    /// Number of header cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Writable column for `field`, if mapped and before the boundary.
    fn writable(&self, field: Field) -> Option<usize> {
        self.get(field).filter(|&i| i < self.boundary)
    }

    /// Overwrite the writable cells of `row` with the fields `record` sets.
    ///
    /// `row` is padded to the boundary. Fields left `None` keep their cell.
    pub fn apply(&self, record: &InventoryRecord, row: &mut Vec<Cell>) {
        if row.len() < self.boundary {
            row.resize(self.boundary, Value::String(String::new()));
        }
        let mut set = |field: Field, value: Option<Value>| {
            if let (Some(i), Some(v)) = (self.writable(field), value) {
                row[i] = v;
            }
        };
        let text = |s: &Option<String>| s.as_ref().map(|s| json!(s));
        let num = |n: Option<f64>| n.map(number_cell);

        set(Field::Proveedor, text(&record.proveedor));
        set(Field::ClaveZirkel, text(&record.clave_zirkel));
        set(Field::ClaveOriginal, text(&record.clave_original_sitio));
        set(Field::Costo, num(record.costo));
        set(Field::CostoInstalacion, num(record.costo_instalacion));
        set(Field::TipoMedio, text(&record.tipo_medio));
        set(Field::Estado, text(&record.estado));
        set(Field::Ciudad, text(&record.ciudad));
        set(Field::Base, num(record.base));
        set(Field::Altura, num(record.altura));
        set(Field::Iluminacion, text(&record.iluminacion));
        set(Field::Vista, text(&record.vista));
        set(Field::Orientacion, text(&record.orientacion));
        set(Field::Caracteristica, text(&record.caracteristica));
        set(
            Field::Coordenadas,
            coordinates_cell(record.latitud, record.longitud).map(Value::String),
        );
        set(Field::Direccion, text(&record.direccion));
        set(Field::Delegacion, text(&record.delegacion));
        set(Field::Colonia, text(&record.colonia));
        set(Field::CodigoPostal, text(&record.codigo_postal));
        set(Field::ImpactosMes, num(record.impactos_mes));
    }

    /// Read a data row back into a record (all mapped columns, boundary ignored).
    pub fn read(&self, row: &[Cell]) -> InventoryRecord {
        let cell = |f: Field| self.get(f).and_then(|i| row.get(i));
        let text = |f: Field| Some(cell_text(cell(f))).filter(|s| !s.is_empty());
        let num = |f: Field| cell_number(cell(f));
        let (latitud, longitud) = parse_coordinates(&cell_text(cell(Field::Coordenadas)))
            .map(|(a, b)| (Some(a), Some(b)))
            .unwrap_or((None, None));

        InventoryRecord {
            proveedor: text(Field::Proveedor),
            clave_zirkel: text(Field::ClaveZirkel),
            clave_original_sitio: text(Field::ClaveOriginal),
            costo: num(Field::Costo),
            costo_instalacion: num(Field::CostoInstalacion),
            tipo_medio: text(Field::TipoMedio),
            estado: text(Field::Estado),
            ciudad: text(Field::Ciudad),
            base: num(Field::Base),
            altura: num(Field::Altura),
            iluminacion: text(Field::Iluminacion),
            vista: text(Field::Vista),
            orientacion: text(Field::Orientacion),
            caracteristica: text(Field::Caracteristica),
            impactos_mes: num(Field::ImpactosMes),
            latitud,
            longitud,
            direccion: text(Field::Direccion),
            delegacion: text(Field::Delegacion),
            colonia: text(Field::Colonia),
            codigo_postal: text(Field::CodigoPostal),
        }
    }
}

/// Whole numbers are written as integers so re-reads compare equal.
fn number_cell(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// `"lat, lng"` when both are present and non-zero.
pub fn coordinates_cell(lat: Option<f64>, lng: Option<f64>) -> Option<String> {
    match (lat, lng) {
        (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => Some(format!("{lat}, {lng}")),
        _ => None,
    }
}

/// Inverse of [`coordinates_cell`].
pub fn parse_coordinates(cell: &str) -> Option<(f64, f64)> {
    let (lat, lng) = cell.split_once(',')?;
    Some((lat.trim().parse().ok()?, lng.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<Cell> {
        [
            "PROVEEDOR",
            "CLAVE",
            "CLAVE ORIGINAL",
            "MEDIO",
            "ESTADO ",
            "CIUDAD",
            "BASE",
            "ALTURA",
            "COORDENADAS",
            "TARIFA MENSUAL",
            "IMPACTOS MES",
            "COSTO",
        ]
        .iter()
        .map(|h| json!(h))
        .collect()
    }

    #[test]
    fn maps_trimmed_headers_and_finds_boundary() {
        let map = ColumnMap::from_header(&header(), "TARIFA");
        assert_eq!(map.get(Field::ClaveZirkel), Some(1));
        assert_eq!(map.get(Field::Estado), Some(4));
        assert_eq!(map.get(Field::Colonia), None);
        assert_eq!(map.boundary(), 9);
        assert_eq!(map.width(), 12);
    }

    #[test]
    fn missing_marker_protects_nothing() {
        let map = ColumnMap::from_header(&header()[..5], "TARIFA");
        assert_eq!(map.boundary(), 5);
    }

    #[test]
    fn apply_skips_none_and_protected_columns() {
        let map = ColumnMap::from_header(&header(), "TARIFA");
        let mut row = vec![json!("Old"), json!("ZMPN-1"), json!(""), json!("Muros")];
        let record = InventoryRecord {
            ciudad: Some("Toluca".into()),
            base: Some(12.0),
            altura: Some(3.5),
            impactos_mes: Some(5000.0),
            costo: Some(100.0),
            latitud: Some(19.28),
            longitud: Some(-99.65),
            ..Default::default()
        };
        map.apply(&record, &mut row);
        assert_eq!(row.len(), 9);
        assert_eq!(row[0], json!("Old"));
        assert_eq!(row[3], json!("Muros"));
        assert_eq!(row[5], json!("Toluca"));
        assert_eq!(row[6], json!(12));
        assert_eq!(row[7], json!(3.5));
        assert_eq!(row[8], json!("19.28, -99.65"));
    }

    #[test]
    fn coordinates_need_both_non_zero() {
        assert_eq!(coordinates_cell(Some(19.4), None), None);
        assert_eq!(coordinates_cell(Some(0.0), Some(-99.1)), None);
        assert_eq!(parse_coordinates("19.4, -99.1"), Some((19.4, -99.1)));
        assert_eq!(parse_coordinates("n/a"), None);
    }

    #[test]
    fn read_parses_coordinates_and_numbers() {
        let map = ColumnMap::from_header(&header(), "TARIFA");
        let row = vec![
            json!("Publicidad Norte"),
            json!("ZMPN-1"),
            json!(""),
            json!("Muros"),
            json!("Jalisco"),
            json!("Guadalajara"),
            json!("8"),
            json!(3),
            json!("20.67, -103.35"),
            json!(15000),
            json!(42000),
        ];
        let r = map.read(&row);
        assert_eq!(r.clave_zirkel.as_deref(), Some("ZMPN-1"));
        assert_eq!(r.clave_original_sitio, None);
        assert_eq!(r.base, Some(8.0));
        assert_eq!(r.latitud, Some(20.67));
        assert_eq!(r.impactos_mes, Some(42000.0));
        assert_eq!(r.costo, None);
    }
}
