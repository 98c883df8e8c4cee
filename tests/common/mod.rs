//! Shared doubles for the integration tests: a scripted model, a flaky
//! spreadsheet wrapper, a recording slide deck and a synthetic PDF builder.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zirkel_inventory::inventory::store::Rows;
use zirkel_inventory::proposal::deck::{PageElement, Shape, Slide, TextContent, TextElement, TextRun};
use zirkel_inventory::{
    DeckStore, GenerativeModel, MemoryStore, ModelReply, ModelRequest, PortError, Presentation, RequestKind,
    TabularStore,
};

// ── Scripted model ───────────────────────────────────────────────────────────

/// Replies by request kind. Queued replies are used first; once a queue is
/// empty the kind's default reply is returned.
pub struct ScriptedModel {
    structure_default: String,
    select_default: String,
    structure: Mutex<VecDeque<Result<String, PortError>>>,
    select: Mutex<VecDeque<Result<String, PortError>>>,
    /// `(kind, attached image count)` per call, in call order.
    calls: Mutex<Vec<(RequestKind, usize)>>,
}

impl ScriptedModel {
    pub fn new(structure_reply: impl Into<String>) -> Self {
        Self {
            structure_default: structure_reply.into(),
            select_default: r#"{"index": 0}"#.to_string(),
            structure: Mutex::new(VecDeque::new()),
            select: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn select_default(mut self, reply: impl Into<String>) -> Self {
        self.select_default = reply.into();
        self
    }

    pub fn queue_structure(self, reply: Result<String, PortError>) -> Self {
        self.structure.lock().unwrap().push_back(reply);
        self
    }

    pub fn queue_select(self, reply: Result<String, PortError>) -> Self {
        self.select.lock().unwrap().push_back(reply);
        self
    }

    pub fn calls(&self, kind: RequestKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn images_seen(&self, kind: RequestKind) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .collect()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, PortError> {
        self.calls.lock().unwrap().push((request.kind, request.images.len()));
        let (queue, default) = match request.kind {
            RequestKind::Structure => (&self.structure, &self.structure_default),
            RequestKind::SelectImage => (&self.select, &self.select_default),
        };
        let content = queue.lock().unwrap().pop_front().unwrap_or_else(|| Ok(default.clone()))?;
        Ok(ModelReply {
            content,
            prompt_tokens: 100,
            completion_tokens: 20,
        })
    }
}

// ── Flaky spreadsheet ────────────────────────────────────────────────────────

/// Wraps a [`MemoryStore`]; each write or append first consumes one scripted
/// outcome (`Some(err)` fails the call, `None` lets it through).
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    script: Mutex<VecDeque<Option<PortError>>>,
    pub mutation_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            script: Mutex::new(VecDeque::new()),
            mutation_attempts: AtomicUsize::new(0),
        }
    }

    pub fn script(self, outcomes: Vec<Option<PortError>>) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    fn next_failure(&self) -> Option<PortError> {
        self.mutation_attempts.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().pop_front().flatten()
    }
}

#[async_trait]
impl TabularStore for FlakyStore {
    async fn read(&self, range: &str) -> Result<Rows, PortError> {
        self.inner.read(range).await
    }

    async fn write(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        match self.next_failure() {
            Some(err) => Err(err),
            None => self.inner.write(range, rows).await,
        }
    }

    async fn append(&self, range: &str, rows: Rows) -> Result<(), PortError> {
        match self.next_failure() {
            Some(err) => Err(err),
            None => self.inner.append(range, rows).await,
        }
    }
}

// ── Recording deck ───────────────────────────────────────────────────────────

#[derive(Default)]
struct DeckState {
    presentation: Presentation,
    copies: Vec<(String, String, String)>,
    batches: Vec<Vec<Value>>,
    batch_failures: VecDeque<PortError>,
    duplicates: usize,
}

/// A deck store that serves one presentation, applies `duplicateObject` the
/// way Slides does (copy inserted right after the original) and records
/// every call.
pub struct RecordingDeck {
    state: Mutex<DeckState>,
}

impl RecordingDeck {
    pub fn new(template: Vec<Slide>) -> Self {
        Self {
            state: Mutex::new(DeckState {
                presentation: Presentation {
                    presentation_id: "deck-1".into(),
                    slides: template,
                },
                ..Default::default()
            }),
        }
    }

    /// Cover slide with `FECHA` plus one site slide with a table and an
    /// `Imagen` placeholder.
    pub fn with_standard_template() -> Self {
        Self::new(vec![text_slide("cover", "cover-title", "PROPUESTA FECHA"), site_slide("site")])
    }

    pub fn fail_batches(self, errors: Vec<PortError>) -> Self {
        self.state.lock().unwrap().batch_failures.extend(errors);
        self
    }

    pub fn copies(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().copies.clone()
    }

    pub fn batches(&self) -> Vec<Vec<Value>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn slide_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .presentation
            .slides
            .iter()
            .map(|s| s.object_id.clone())
            .collect()
    }
}

#[async_trait]
impl DeckStore for RecordingDeck {
    async fn copy_template(&self, template_id: &str, name: &str, folder_id: &str) -> Result<String, PortError> {
        let mut state = self.state.lock().unwrap();
        state
            .copies
            .push((template_id.to_string(), name.to_string(), folder_id.to_string()));
        Ok(state.presentation.presentation_id.clone())
    }

    async fn batch_update(&self, _presentation_id: &str, requests: Vec<Value>) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.batch_failures.pop_front() {
            return Err(err);
        }
        for request in &requests {
            let Some(source) = request["duplicateObject"]["objectId"].as_str() else {
                continue;
            };
            let Some(pos) = state.presentation.slides.iter().position(|s| s.object_id == source) else {
                continue;
            };
            state.duplicates += 1;
            let mut copy = state.presentation.slides[pos].clone();
            let suffix = format!("_dup{}", state.duplicates);
            copy.object_id.push_str(&suffix);
            for element in &mut copy.page_elements {
                element.object_id.push_str(&suffix);
            }
            state.presentation.slides.insert(pos + 1, copy);
        }
        state.batches.push(requests);
        Ok(())
    }

    async fn get(&self, _presentation_id: &str) -> Result<Presentation, PortError> {
        Ok(self.state.lock().unwrap().presentation.clone())
    }
}

fn text_shape(object_id: &str, text: &str) -> PageElement {
    PageElement {
        object_id: object_id.into(),
        shape: Some(Shape {
            text: Some(TextContent {
                text_elements: vec![TextElement {
                    text_run: Some(TextRun { content: text.into() }),
                }],
            }),
        }),
        ..Default::default()
    }
}

pub fn text_slide(object_id: &str, shape_id: &str, text: &str) -> Slide {
    Slide {
        object_id: object_id.into(),
        page_elements: vec![text_shape(shape_id, text)],
    }
}

pub fn site_slide(object_id: &str) -> Slide {
    let mut placeholder = text_shape(&format!("{object_id}-img"), "Imagen\n");
    placeholder.size = Some(json!({
        "width": {"magnitude": 3000000, "unit": "EMU"},
        "height": {"magnitude": 2000000, "unit": "EMU"}
    }));
    placeholder.transform = Some(json!({"scaleX": 1, "scaleY": 1, "translateX": 100000, "translateY": 200000, "unit": "EMU"}));
    Slide {
        object_id: object_id.into(),
        page_elements: vec![
            text_shape(&format!("{object_id}-title"), "CLAVE"),
            PageElement {
                object_id: format!("{object_id}-table"),
                table: Some(json!({"rows": 8, "columns": 2})),
                ..Default::default()
            },
            placeholder,
        ],
    }
}

// ── Synthetic PDFs ───────────────────────────────────────────────────────────

/// One page: named image XObjects and the content stream painting them.
pub struct TestPage {
    pub images: Vec<(String, Stream)>,
    pub content: String,
}

impl TestPage {
    pub fn blank() -> Self {
        Self {
            images: Vec::new(),
            content: "BT /F1 12 Tf 72 720 Td (Sin imagen) Tj ET".into(),
        }
    }

    /// Paint every image once, each with its own `cm` placing it at `w x h` points.
    pub fn painting(images: Vec<(&str, Stream, (u32, u32))>) -> Self {
        let mut content = String::new();
        let mut named = Vec::new();
        for (name, stream, (w, h)) in images {
            content.push_str(&format!("q {w} 0 0 {h} 50 100 cm /{name} Do Q\n"));
            named.push((name.to_string(), stream));
        }
        Self { images: named, content }
    }
}

pub fn build_pdf(pages: Vec<TestPage>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for page in pages {
        let mut xobjects = Dictionary::new();
        for (name, stream) in page.images {
            let id = doc.add_object(stream);
            xobjects.set(name, id);
        }
        let content_id = doc.add_object(Stream::new(dictionary! {}, page.content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn image_dict(width: u32, height: u32, color_space: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    }
}

/// Uncompressed DeviceRGB raster filled with one colour.
pub fn rgb_image(width: u32, height: u32, rgb: [u8; 3]) -> Stream {
    let data: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    Stream::new(image_dict(width, height, "DeviceRGB"), data)
}

/// DCTDecode raster (a real JPEG) filled with one colour.
pub fn jpeg_image(width: u32, height: u32, rgb: [u8; 3]) -> Stream {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut jpeg = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();
    let mut dict = image_dict(width, height, "DeviceRGB");
    dict.set("Filter", "DCTDecode");
    Stream::new(dict, jpeg)
}

/// An image XObject without `/Width`.
pub fn image_without_width() -> Stream {
    let mut dict = image_dict(4, 4, "DeviceRGB");
    dict.remove(b"Width");
    Stream::new(dict, vec![0; 48])
}

/// An image whose sample data is shorter than its dimensions promise.
pub fn truncated_image() -> Stream {
    Stream::new(image_dict(10, 10, "DeviceRGB"), vec![0; 30])
}

/// A CMYK image declaring 2^31 x 2^31 pixels over four bytes of data.
pub fn oversized_image() -> Stream {
    let mut dict = image_dict(1, 1, "DeviceCMYK");
    dict.set("Width", 2_147_483_648_i64);
    dict.set("Height", 2_147_483_648_i64);
    Stream::new(dict, vec![0; 4])
}

// ── Inventory sheets ─────────────────────────────────────────────────────────

pub const INVENTORY: &str = "INVENTARIO";
pub const PROVIDERS: &str = "PROVEEDORES";

/// Inventory header: metadata columns, then the protected price columns,
/// then columns after the boundary that must never be written either.
pub fn inventory_header() -> Vec<Value> {
    [
        "PROVEEDOR",
        "CLAVE",
        "CLAVE ORIGINAL",
        "MEDIO",
        "ESTADO",
        "CIUDAD",
        "BASE",
        "ALTURA",
        "COORDENADAS",
        "DIRECCIÓN",
        "IMPACTOS MES",
        "TARIFA",
        "TARIFA NEGOCIADA",
        "NOTAS",
    ]
    .iter()
    .map(|h| json!(h))
    .collect()
}

/// Index of the first protected column in [`inventory_header`].
pub const BOUNDARY: usize = 11;

/// Provider catalogue with `PN` (Publicidad Norte) and `VS` (Vallas del Sur).
pub fn providers_sheet() -> Rows {
    let mut header = vec![json!("CLAVE"), json!("PROVEEDOR")];
    header.resize(27, json!(""));
    let mut pn = vec![json!("PN"), json!("Publicidad Norte"), json!("Publicidad Norte SA de CV")];
    pn.resize(5, json!(""));
    pn.push(json!("x"));
    let vs = vec![json!("VS"), json!("Vallas del Sur")];
    vec![header, pn, vs]
}

pub fn inventory_store(rows: Rows) -> MemoryStore {
    let mut sheet = vec![inventory_header()];
    sheet.extend(rows);
    MemoryStore::new()
        .with_sheet(INVENTORY, sheet)
        .with_sheet(PROVIDERS, providers_sheet())
}
