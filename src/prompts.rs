//! Prompts for the two model calls: document structuring and image selection.
//!
//! Centralising them here keeps the wording in one place and lets unit tests
//! inspect the prompts without a live model.
//!
//! The structuring prompt is in Spanish because the listings it reads are;
//! asking in the document's language noticeably improves field naming
//! (`Ciudad de México`, `Poniente`) compared to an English instruction.

use crate::records::ExtractedMediaRecord;

/// Default structuring prompt sent with the whole document.
///
/// Used when `PipelineConfig::extraction_prompt` is `None`.
pub const EXTRACTION_PROMPT: &str = r#"Extrae la siguiente información de este documento.
Si no encuentras algún campo, usa una cadena vacía.
El documento describe un conjunto de medios publicitarios.
Si encuentras un formato como "MEDIDAS: 13.00 X 4.20 MTS.", extrae el primer número como base y el segundo como altura.
La base y altura se expresan en metros, utiliza el punto como separador decimal. Si no hay decimales, devuélvelo como entero en una cadena. Ej: "13"
Si es posible, infiere o extrae la ciudad y estado.
Utiliza texto capitalizado, primera letra en mayúscula y resto en minúscula. Ej: "Ciudad de México"
Si es posible, infiere o extrae la latitud y longitud. Utiliza el formato de punto flotante. Ej: 19.4323232
Cada página del documento viene marcada como "Página N". Indica en "pagina" el número de la página donde aparece cada medio.

type TipoMedio =
    | 'Aeropuertos' | 'Bajopuentes' | 'Bicivallas' | 'Camiones' | 'Carteleras'
    | 'Centros Comerciales' | 'Gimnasios' | 'Impresión de lonas'
    | 'Institutos Educativos' | 'Mupi Urbano' | 'Mupis Digitales' | 'Muros'
    | 'Otros Medios' | 'Pantallas Digitales' | 'Publiandantes' | 'Puente Digital'
    | 'Puentes' | 'Sitios de Taxis' | 'Stand Metro' | 'Suburbano'
    | 'Totem Digital' | 'Valla Fija' | 'Vallas Móviles';

type Vista = 'Natural' | 'Única' | 'Cruzada' | 'Lateral' | 'Frontal' | 'Central' | 'N/A' | string;

type Orientacion = 'Norte' | 'Sur' | 'Oeste' | 'Este' | 'Oriente' | 'Poniente' | string;

type Caracteristica =
    | 'Valla / Mampara' | 'Videowall' | 'Totem' | 'Unipolar' | 'Estructura'
    | 'Azotea' | 'Cartelera' | 'Varios formatos' | 'Kinder' | 'Preparatoria'
    | 'Primaria' | 'Secundaria' | 'Universidad' | 'Mupi' | 'Mupi Digital'
    | 'Muro' | 'Pantalla' | 'Puente' | 'Valla' | 'Ultra Valla' | string

La estructura de datos que devuelves debe ser una lista JSON con la siguiente estructura:
type MediaData = {
    // Clave única del medio
    clave?: string
    base: number
    altura: number
    ciudad: string
    estado: string
    tipoMedio: TipoMedio
    costo: number
    costoInstalacion?: number
    iluminacion: "Si" | "No"
    vista: Vista
    orientacion: Orientacion
    caracteristica?: Caracteristica
    // Si es posible, infiere o extrae los impactos. Si es necesario, suma los impactos en un solo número.
    impactosMes?: number
    latitud: number
    longitud: number
    pagina: number
    direccion: string
    // Si es posible, infiere o extrae la delegación/municipio de la dirección. Generalmente viene después de la colonia.
    delegacion: string
    // Si es posible, infiere o extrae la colonia de la dirección. Generalmente viene precedido como Col.
    colonia: string
    // Si es posible, infiere o extrae el código postal de la dirección. Generalmente viene precedido como CP o C.P.
    codigoPostal: string
}

Escribe el resultado en formato JSON siguiendo el esquema. Responde únicamente con la lista JSON."#;

/// Ranking instruction appended after the record JSON in the selection call.
pub const SELECTION_INSTRUCTIONS: &str = r#"Select the image that best represents this media data. Respond with the index of the best image (0-based).
If no image is suitable, respond with the best available one.
Prefer photographs of the media, if available.
If there are no photographs, the second best is the map.
Respond using this schema { "index": number }."#;

/// Label placed in front of each page's content in the structuring request.
pub fn page_label(page: u32) -> String {
    format!("Página {page}")
}

/// Build the image-selection prompt for one record.
///
/// The record's own JSON (without any image) is embedded so the model can
/// match the photo against the address, size and media type.
pub fn selection_prompt(record: &ExtractedMediaRecord, candidate_count: usize) -> String {
    let mut described = record.clone();
    described.selected_image = None;
    let json = serde_json::to_string_pretty(&described).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Given the following media data:\n{json}\n\n{candidate_count} images are attached, indexed 0 to {}.\n{SELECTION_INSTRUCTIONS}",
        candidate_count.saturating_sub(1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_carries_locale_rules() {
        assert!(EXTRACTION_PROMPT.contains("13.00 X 4.20 MTS."));
        assert!(EXTRACTION_PROMPT.contains("Ciudad de México"));
        assert!(EXTRACTION_PROMPT.contains("pagina: number"));
    }

    #[test]
    fn selection_prompt_embeds_record_and_schema() {
        let record = ExtractedMediaRecord {
            ciudad: "Monterrey".into(),
            page: 2,
            selected_image: Some("data:image/jpeg;base64,AAAA".into()),
            ..Default::default()
        };
        let prompt = selection_prompt(&record, 3);
        assert!(prompt.contains("Monterrey"));
        assert!(prompt.contains("indexed 0 to 2"));
        assert!(prompt.contains(r#"{ "index": number }"#));
        assert!(!prompt.contains("base64,AAAA"));
    }
}
