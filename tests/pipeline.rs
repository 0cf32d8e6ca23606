//! Session-level integration tests with in-process OCR and model backends.
//!
//! Everything here runs offline. The spreadsheet round-trip reads the
//! exported bytes back with calamine to check what a spreadsheet program
//! would see.

use async_trait::async_trait;
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use edgequake_menu2xlsx::{
    convert_from_bytes, export_table, parse_structured_text, BackendError, Completion,
    CompletionBackend, CompletionParams, MenuConfig, MenuError, OcrBackend, OcrOperation,
    Pipeline, PipelineProgress, PromptMessage, RawDocument, ReadResult, ReadStatus,
    SessionState, Stage, StageError, Table,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

/// OCR service that reports `running` a few times, then a fixed outcome.
struct FakeOcr {
    running_polls: u32,
    outcome: ReadStatus,
    lines: Vec<&'static str>,
    polls: AtomicU32,
}

impl FakeOcr {
    fn succeeding(lines: Vec<&'static str>) -> Self {
        Self {
            running_polls: 2,
            outcome: ReadStatus::Succeeded,
            lines,
            polls: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            running_polls: 1,
            outcome: ReadStatus::Failed,
            lines: vec![],
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl OcrBackend for FakeOcr {
    fn name(&self) -> &str {
        "fake-ocr"
    }

    async fn submit(&self, image: &[u8]) -> Result<OcrOperation, BackendError> {
        assert!(!image.is_empty());
        Ok(OcrOperation::from_location("https://ocr.test/operations/42"))
    }

    async fn poll(&self, operation: &OcrOperation) -> Result<ReadResult, BackendError> {
        assert_eq!(operation.id, "42");
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        if n < self.running_polls {
            return Ok(ReadResult {
                status: ReadStatus::Running,
                pages: vec![],
            });
        }
        Ok(ReadResult {
            status: self.outcome,
            pages: vec![self.lines.iter().map(|l| l.to_string()).collect()],
        })
    }
}

/// OCR service whose status endpoint is unreachable.
struct UnreachableOcr;

#[async_trait]
impl OcrBackend for UnreachableOcr {
    fn name(&self) -> &str {
        "unreachable-ocr"
    }

    async fn submit(&self, _image: &[u8]) -> Result<OcrOperation, BackendError> {
        Ok(OcrOperation::from_location("https://ocr.test/operations/7"))
    }

    async fn poll(&self, _operation: &OcrOperation) -> Result<ReadResult, BackendError> {
        Err(BackendError::new("HTTP 503: service unavailable"))
    }
}

/// Model that answers with a canned response and records the prompt.
struct FakeModel {
    reply: Result<&'static str, &'static str>,
    calls: AtomicUsize,
    last_user_message: Mutex<String>,
}

impl FakeModel {
    fn replying(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(String::new()),
        })
    }

    fn failing(msg: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(msg),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl CompletionBackend for FakeModel {
    fn name(&self) -> &str {
        "fake-model"
    }

    async fn complete(
        &self,
        messages: &[PromptMessage],
        params: &CompletionParams,
    ) -> Result<Completion, BackendError> {
        assert_eq!(params.max_tokens, 4096);
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = messages.last() {
            *self.last_user_message.lock().unwrap() = user.content.clone();
        }
        match self.reply {
            Ok(text) => Ok(Completion {
                content: text.to_string(),
                prompt_tokens: 900,
                completion_tokens: 40,
            }),
            Err(msg) => Err(BackendError::new(msg)),
        }
    }
}

/// Records every stage error it is told about.
#[derive(Default)]
struct ErrorLog {
    errors: Mutex<Vec<(Stage, String)>>,
    completed: Mutex<Vec<Stage>>,
}

impl PipelineProgress for ErrorLog {
    fn on_stage_complete(&self, stage: Stage, _output_len: usize) {
        self.completed.lock().unwrap().push(stage);
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.errors.lock().unwrap().push((stage, error.to_string()));
    }
}

fn config_with(model: Arc<FakeModel>, ocr: Arc<FakeOcr>) -> MenuConfig {
    MenuConfig::builder()
        .model_backend(model)
        .ocr_backend(ocr)
        .ocr_poll_interval_ms(1)
        .build()
        .unwrap()
}

fn image_upload() -> RawDocument {
    RawDocument::from_bytes("menu.png", PNG_MAGIC.to_vec(), Some("image/png")).unwrap()
}

fn sheet_rows(bytes: &[u8], sheet: &str) -> Vec<Vec<String>> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    let range = workbook.worksheet_range(sheet).unwrap();
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::String(s) => s.clone(),
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

fn s(v: &[&str]) -> Vec<String> {
    v.iter().map(|x| x.to_string()).collect()
}

// ── Full session ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_menu_to_spreadsheet() {
    let model = FakeModel::replying(
        "Category|Item|Price\nMAIN COURSE|Hot dog|$24\nDRINKS|Cola|$2",
    );
    let ocr = Arc::new(FakeOcr::succeeding(vec!["MAIN COURSE", "Hot dog $24", "DRINKS", "Cola $2"]));
    let config = config_with(Arc::clone(&model), Arc::clone(&ocr));
    let pipeline = Pipeline::new(&config).unwrap();
    let mut state = SessionState::new();

    pipeline.ingest(&mut state, &image_upload()).await;
    assert_eq!(state.extracted_text, "MAIN COURSE\nHot dog $24\nDRINKS\nCola $2");
    assert_eq!(state.stats.ocr_polls, 3);

    pipeline.generate_structure(&mut state).await;
    assert!(model
        .last_user_message
        .lock()
        .unwrap()
        .ends_with("Now, parse the following text.\n\nMAIN COURSE\nHot dog $24\nDRINKS\nCola $2"));
    assert_eq!(state.table.header(), s(&["Category", "Item", "Price"]).as_slice());
    assert_eq!(state.table.row_count(), 2);

    let sheet = pipeline.export(&mut state).unwrap();
    assert_eq!(sheet.file_name, "restaurant_menu.xlsx");
    assert_eq!(
        sheet.mime,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let rows = sheet_rows(&sheet.bytes, "Restaurant_menu");
    assert_eq!(rows[0], s(&["Category", "Item", "Price"]));
    assert_eq!(rows[2], s(&["DRINKS", "Cola", "$2"]));
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn fenced_model_output_is_unwrapped() {
    let model = FakeModel::replying("```\nItem|Price\nTea|2\n```");
    let ocr = Arc::new(FakeOcr::succeeding(vec!["Tea 2"]));
    let pipeline = Pipeline::new(&config_with(model, ocr)).unwrap();
    let mut state = SessionState::new();

    pipeline.ingest(&mut state, &image_upload()).await;
    pipeline.generate_structure(&mut state).await;
    assert_eq!(state.structured_text, "Item|Price\nTea|2");
    assert_eq!(state.table.rows(), &[s(&["Tea", "2"])]);
}

#[tokio::test]
async fn failed_ocr_keeps_previous_text_and_skips_model() {
    let model = FakeModel::replying("A|B");
    let ocr = Arc::new(FakeOcr::failing());
    let pipeline = Pipeline::new(&config_with(Arc::clone(&model), ocr)).unwrap();
    let mut state = SessionState::new();

    pipeline.ingest(&mut state, &image_upload()).await;
    assert!(state.extracted_text.is_empty());
    assert!(state.errors.is_empty());

    pipeline.generate_structure(&mut state).await;
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert!(state.table.is_empty());
    assert!(pipeline.export(&mut state).is_none());
}

#[tokio::test]
async fn ocr_transport_fault_is_reported_and_keeps_previous_text() {
    let log = Arc::new(ErrorLog::default());
    let config = MenuConfig::builder()
        .model_backend(FakeModel::replying("A|B"))
        .ocr_backend(Arc::new(UnreachableOcr))
        .ocr_poll_interval_ms(1)
        .progress(Arc::clone(&log) as Arc<dyn PipelineProgress>)
        .build()
        .unwrap();
    let pipeline = Pipeline::new(&config).unwrap();
    let mut state = SessionState::new();
    state.extracted_text = "Soup 4".to_string();

    pipeline.ingest(&mut state, &image_upload()).await;

    assert_eq!(state.extracted_text, "Soup 4");
    match state.errors.as_slice() {
        [StageError::Extraction { detail }] => assert!(detail.contains("503"), "{detail}"),
        other => panic!("unexpected errors: {other:?}"),
    }
    let reported = log.errors.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, Stage::Extract);
    assert!(log.completed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn model_fault_is_reported_and_recoverable() {
    let log = Arc::new(ErrorLog::default());
    let ocr = Arc::new(FakeOcr::succeeding(vec!["Soup 4"]));
    let config = MenuConfig::builder()
        .model_backend(FakeModel::failing("HTTP 500: upstream"))
        .ocr_backend(ocr)
        .ocr_poll_interval_ms(1)
        .progress(Arc::clone(&log) as Arc<dyn PipelineProgress>)
        .build()
        .unwrap();
    let pipeline = Pipeline::new(&config).unwrap();
    let mut state = SessionState::new();

    pipeline.ingest(&mut state, &image_upload()).await;
    pipeline.generate_structure(&mut state).await;

    assert_eq!(state.extracted_text, "Soup 4");
    assert!(state.table.is_empty());
    assert!(matches!(state.errors.as_slice(), [StageError::Model { retries: 0, .. }]));
    let reported = log.errors.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, Stage::Structure);
    assert!(reported[0].1.contains("upstream"));
    assert_eq!(*log.completed.lock().unwrap(), vec![Stage::Extract]);

    // The user can still type the table in by hand.
    pipeline.load_structured_text(&mut state, "Item|Price\nSoup|4");
    assert!(pipeline.export(&mut state).is_some());
}

#[tokio::test]
async fn user_edits_reach_the_spreadsheet() {
    let pipeline = Pipeline::offline(&MenuConfig::default()).unwrap();
    let mut state = SessionState::new();
    pipeline.load_structured_text(
        &mut state,
        "Category|Item|Description|Price\nAppetizer|Garlic Bread||6.99\nDessert|Cake",
    );

    state.table.set_cell(1, 3, "5.50").unwrap();
    state.table.insert_row(0, s(&["Soup", "Miso", "", "4.00"])).unwrap();
    state.table.remove_row(1).unwrap();
    let idx = state.table.add_row();
    state.table.set_cell(idx, 1, "Water").unwrap();

    let sheet = pipeline.export(&mut state).unwrap();
    let rows = sheet_rows(&sheet.bytes, "Restaurant_menu");
    assert_eq!(
        rows,
        vec![
            s(&["Category", "Item", "Description", "Price"]),
            s(&["Soup", "Miso", "", "4.00"]),
            s(&["Dessert", "Cake", "", "5.50"]),
            s(&["", "Water", "", ""]),
        ]
    );
}

// ── One-shot entry point ─────────────────────────────────────────────────────

#[tokio::test]
async fn convert_from_bytes_collects_everything() {
    let model = FakeModel::replying("Item|Price\nBurger|5");
    let ocr = Arc::new(FakeOcr::succeeding(vec!["Burger 5"]));
    let config = config_with(model, ocr);

    let output = convert_from_bytes(PNG_MAGIC.to_vec(), Some("image/png"), "menu.png", &config)
        .await
        .unwrap();
    assert_eq!(output.extracted_text, "Burger 5");
    assert_eq!(output.table.rows(), &[s(&["Burger", "5"])]);
    assert_eq!(output.stats.prompt_tokens, 900);
    assert!(output.is_clean());

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["table"]["header"][0], "Item");
}

#[tokio::test]
async fn image_without_ocr_is_fatal_for_one_shot() {
    let config = MenuConfig::builder()
        .model_backend(FakeModel::replying("A|B"))
        .build()
        .unwrap();
    let err = convert_from_bytes(PNG_MAGIC.to_vec(), None, "menu.png", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, MenuError::OcrNotConfigured));
}

#[tokio::test]
async fn gif_upload_is_rejected() {
    let config = MenuConfig::builder()
        .model_backend(FakeModel::replying("A|B"))
        .build()
        .unwrap();
    let err = convert_from_bytes(b"GIF89a....".to_vec(), Some("image/gif"), "menu.gif", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, MenuError::UnsupportedDocument { .. }));
}

// ── Export properties ────────────────────────────────────────────────────────

#[test]
fn exported_header_matches_parsed_header() {
    let inputs = [
        "Category|Item|Price\nMAIN|Burger|$5\nDRINKS|Cola|",
        "A|B\nX|Y|Z",
        "Only a header line",
        "Item|Price|Price\nTea|2|3",
        "Category|Item|\nMAIN|Burger|",
    ];
    for input in inputs {
        let table = parse_structured_text(input);
        let sheet = export_table(&table, "Restaurant_menu").unwrap();
        let rows = sheet_rows(&sheet.bytes, "Restaurant_menu");
        assert_eq!(rows[0], table.header().to_vec(), "input {input:?}");
        assert_eq!(rows.len(), table.row_count() + 1, "input {input:?}");
    }

    let mut table = parse_structured_text("Item|Price\nTea|2");
    table.add_row();
    let sheet = export_table(&table, "Restaurant_menu").unwrap();
    let rows = sheet_rows(&sheet.bytes, "Restaurant_menu");
    assert_eq!(rows.len(), table.row_count() + 1);
    assert_eq!(rows[2], s(&["", ""]));
}

#[test]
fn unmodified_table_exports_identically() {
    let table = parse_structured_text("Category|Item|Price\nMAIN|Burger|$5");
    let a = export_table(&table, "Restaurant_menu").unwrap();
    let b = export_table(&table.clone(), "Restaurant_menu").unwrap();
    assert_eq!(a.bytes, b.bytes);
}

#[test]
fn header_only_table_exports_one_row() {
    let mut table = Table::from_parts(s(&["Item", "Price"]), vec![s(&["Tea", "2"])]);
    table.clear_rows();
    let sheet = export_table(&table, "Menu").unwrap();
    assert_eq!(sheet_rows(&sheet.bytes, "Menu"), vec![s(&["Item", "Price"])]);
}

#[test]
fn callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ErrorLog>();
    assert_send_sync::<Pipeline>();
}
