//! Document structuring: one model call for the whole document.
//!
//! The request carries the extraction prompt, then every prepared page
//! labelled `Página N` with its text layer, and the rendered page images in
//! the same order. The reply must be a JSON list of records; anything else
//! fails the whole call. There is no partial recovery: a list that only
//! half-parses is more likely to hold misattributed fields than good data.
//!
//! ## Reply cleanup
//!
//! Models asked for bare JSON still sometimes wrap it in a ```` ```json ````
//! fence or prefix a BOM. Those are stripped before parsing; nothing else is
//! rewritten.

use super::document::PreparedPage;
use super::llm::{generate, GenerativeModel, ModelRequest, RequestKind};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::prompts::{page_label, EXTRACTION_PROMPT};
use crate::records::ExtractedMediaRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```\s*$").unwrap());

/// Build the structuring request for `pages`.
pub fn structuring_request(pages: &[PreparedPage], config: &PipelineConfig) -> ModelRequest {
    let prompt = config.extraction_prompt.as_deref().unwrap_or(EXTRACTION_PROMPT);
    let mut text = String::from(prompt);

    let images: Vec<_> = pages.iter().filter_map(|p| p.image.clone()).collect();
    if !images.is_empty() {
        let order: Vec<String> = pages
            .iter()
            .filter(|p| p.image.is_some())
            .map(|p| page_label(p.number))
            .collect();
        text.push_str(&format!(
            "\n\nSe adjunta una imagen por página, en este orden: {}.",
            order.join(", ")
        ));
    }

    for page in pages {
        text.push_str(&format!("\n\n--- {} ---\n", page_label(page.number)));
        text.push_str(&page.text);
    }

    ModelRequest {
        kind: RequestKind::Structure,
        system: None,
        text,
        images,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Strip a surrounding code fence and invisible leading characters.
fn clean_reply(raw: &str) -> &str {
    let trimmed = raw.trim().trim_start_matches('\u{feff}').trim();
    match RE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Parse a structuring reply into records (images not yet selected).
///
/// Accepts a JSON list, or a single record object.
pub fn parse_records(raw: &str) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    let body = clean_reply(raw);
    let failed = |detail: String| {
        let snippet: String = body.chars().take(120).collect();
        PipelineError::ExtractionFailed {
            detail: format!("{detail}; reply starts with: {snippet:?}"),
        }
    };

    let value: Value = serde_json::from_str(body).map_err(|e| failed(format!("reply is not JSON: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => return Err(failed(format!("expected a list of records, got {}", json_kind(&other)))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<ExtractedMediaRecord>(item)
                .map_err(|e| failed(format!("record {i} does not match the schema: {e}")))
        })
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Validate every record against the document it came from.
pub fn validate_records(records: &[ExtractedMediaRecord], page_count: usize) -> Result<(), PipelineError> {
    for (index, record) in records.iter().enumerate() {
        record
            .validate(page_count)
            .map_err(|detail| PipelineError::InvalidRecord { index, detail })?;
    }
    Ok(())
}

/// Structure `pages` into validated records with one model call.
pub async fn extract_records(
    model: &dyn GenerativeModel,
    pages: &[PreparedPage],
    config: &PipelineConfig,
) -> Result<Vec<ExtractedMediaRecord>, PipelineError> {
    let request = structuring_request(pages, config);
    debug!(
        "Structuring request: {} chars, {} images",
        request.text.len(),
        request.images.len()
    );
    let reply = generate(model, &request, &config.retry)
        .await
        .map_err(PipelineError::from_model)?;
    info!(
        "Structuring used {} tokens",
        reply.prompt_tokens + reply.completion_tokens
    );

    let records = parse_records(&reply.content)?;
    validate_records(&records, pages.len())?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::ImageData;

    fn page(number: u32, text: &str, image: bool) -> PreparedPage {
        PreparedPage {
            number,
            text: text.into(),
            image: image.then(|| ImageData::new("AAAA", "image/png")),
        }
    }

    #[test]
    fn request_labels_pages_and_keeps_image_order() {
        let pages = vec![page(1, "MEDIDAS: 13.00 X 4.20 MTS.", true), page(2, "Tarifas", true)];
        let req = structuring_request(&pages, &PipelineConfig::default());
        assert_eq!(req.kind, RequestKind::Structure);
        assert_eq!(req.images.len(), 2);
        assert!(req.text.starts_with("Extrae la siguiente información"));
        assert!(req.text.contains("en este orden: Página 1, Página 2."));
        let p1 = req.text.find("--- Página 1 ---").unwrap();
        let p2 = req.text.find("--- Página 2 ---").unwrap();
        assert!(p1 < p2);
        assert!(req.text[p1..p2].contains("13.00 X 4.20"));
    }

    #[test]
    fn custom_prompt_replaces_default() {
        let config = PipelineConfig::builder().extraction_prompt("Solo JSON.").build().unwrap();
        let req = structuring_request(&[page(1, "x", false)], &config);
        assert!(req.text.starts_with("Solo JSON."));
        assert!(req.images.is_empty());
        assert!(!req.text.contains("Se adjunta"));
    }

    #[test]
    fn parses_fenced_list_with_string_numbers() {
        let reply = "```json\n[{\"base\": \"13\", \"altura\": \"4.20\", \"ciudad\": \"Ciudad de México\", \"pagina\": 1, \"costo\": \"\"}]\n```";
        let records = parse_records(reply).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base, Some(13.0));
        assert_eq!(records[0].altura, Some(4.2));
        assert_eq!(records[0].costo, None);
        assert_eq!(records[0].page, 1);
    }

    #[test]
    fn single_object_is_one_record() {
        let records = parse_records(r#"{"ciudad": "Puebla", "pagina": "2"}"#).unwrap();
        assert_eq!(records[0].page, 2);
    }

    #[test]
    fn non_json_is_extraction_failure() {
        for bad in ["Lo siento, no puedo", "42", "[{\"base\": \"trece\"}]"] {
            assert!(
                matches!(parse_records(bad), Err(PipelineError::ExtractionFailed { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn page_out_of_range_is_invalid_record() {
        let records = parse_records(r#"[{"pagina": 1}, {"pagina": 3}]"#).unwrap();
        match validate_records(&records, 2) {
            Err(PipelineError::InvalidRecord { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidRecord, got {other:?}"),
        }
        assert!(validate_records(&records[..1], 2).is_ok());
    }
}
