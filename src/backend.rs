//! LSP surface. Requests are thin shims over the resolver modules; the only
//! shared state is the document store, one index snapshot behind an atomic
//! reference swap, and the single-slot completion session.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use log::debug;
use ropey::Rope;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::completion::{self, CompletionSession};
use crate::config::ServerConfig;
use crate::definition;
use crate::index::{self, CandidateIndex};
use crate::template;

pub struct Backend {
    client: Client,
    documents: DashMap<String, Document>,
    /// Replaced wholesale by each sweep; readers clone the Arc and may keep
    /// serving an older snapshot while a sweep publishes a new one.
    index: RwLock<Arc<CandidateIndex>>,
    session: Mutex<CompletionSession>,
    config: RwLock<ServerConfig>,
    workspace_root: RwLock<Option<PathBuf>>,
}

struct Document {
    text: Rope,
    language_id: String,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            documents: DashMap::new(),
            index: RwLock::new(Arc::new(CandidateIndex::default())),
            session: Mutex::new(CompletionSession::default()),
            config: RwLock::new(ServerConfig::default()),
            workspace_root: RwLock::new(None),
        }
    }

    fn snapshot(&self) -> Arc<CandidateIndex> {
        self.index
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn config_value(&self) -> ServerConfig {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn update_document(&self, uri: &Url, text: &str, language_id: Option<String>) {
        let key = uri.to_string();
        let language_id = language_id
            .or_else(|| {
                self.documents
                    .get(&key)
                    .map(|doc| doc.language_id.clone())
            })
            .unwrap_or_default();
        self.documents.insert(
            key,
            Document {
                text: Rope::from_str(text),
                language_id,
            },
        );
    }

    /// Full workspace sweep: build a brand-new index off the request path,
    /// publish it atomically, and report the counts when they moved.
    async fn rescan_workspace(&self) {
        let root = match self.workspace_root.read() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(root) = root else {
            debug!("no workspace root; skipping sweep");
            return;
        };

        let config = self.config_value();
        let globs = config.ignore_globs.clone();
        let swept = tokio::task::spawn_blocking(move || index::sweep(&root, &globs)).await;
        let Ok(new_index) = swept else {
            debug!("sweep task failed");
            return;
        };

        let new_counts = new_index.counts();
        let changed = match self.index.write() {
            Ok(mut guard) => {
                let changed = guard.counts() != new_counts;
                *guard = Arc::new(new_index);
                changed
            }
            Err(_) => return,
        };

        if changed && !config.quiet {
            let (components, pipes) = new_counts;
            self.client
                .log_message(
                    MessageType::INFO,
                    format!("indexed {components} components and {pipes} pipes"),
                )
                .await;
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Ok(mut guard) = self.workspace_root.write() {
            *guard = params.root_uri.and_then(|uri| uri.to_file_path().ok());
        }
        if let Some(config) = params
            .initialization_options
            .as_ref()
            .and_then(ServerConfig::from_settings)
        {
            if let Ok(mut guard) = self.config.write() {
                *guard = config;
            }
        }

        Ok(InitializeResult {
            server_info: None,
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(
                        ["<", "[", "(", "/", ">", "|"]
                            .iter()
                            .map(|c| c.to_string())
                            .collect(),
                    ),
                    work_done_progress_options: Default::default(),
                    all_commit_characters: None,
                    completion_item: None,
                }),
                definition_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        debug!("initialized; starting first sweep");
        self.rescan_workspace().await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.update_document(&doc.uri, &doc.text, Some(doc.language_id));
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // Full sync mode; the last change carries the whole document.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(&params.text_document.uri, &change.text, None);
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(text) = params.text {
            self.update_document(&uri, &text, None);
        }
        // Only host-language saves can change the declaration set.
        if uri.path().ends_with(".ts") {
            self.rescan_workspace().await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.remove(params.text_document.uri.as_str());
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(new_config) = ServerConfig::from_settings(&params.settings) else {
            debug!("unreadable configuration payload; keeping previous settings");
            return;
        };

        let globs_changed = match self.config.write() {
            Ok(mut guard) => {
                let changed = guard.ignore_globs != new_config.ignore_globs;
                *guard = new_config;
                changed
            }
            Err(_) => false,
        };
        if globs_changed {
            self.rescan_workspace().await;
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let items = || -> Option<Vec<CompletionItem>> {
            let doc = self.documents.get(uri.as_str())?;
            let offset = position_to_offset(position, &doc.text)?;
            let text = doc.text.to_string();
            let markup = template::is_markup_language(&doc.language_id);
            let snapshot = self.snapshot();
            let mut session = self.session.lock().ok()?;
            Some(completion::resolve(
                &text,
                offset,
                position,
                markup,
                &snapshot,
                &mut session,
            ))
        }();

        Ok(items
            .filter(|items| !items.is_empty())
            .map(CompletionResponse::Array))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        if self.config_value().disable_goto_definition {
            return Ok(None);
        }

        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let location = || -> Option<Location> {
            let doc = self.documents.get(uri.as_str())?;
            let offset = position_to_offset(position, &doc.text)?;
            let text = doc.text.to_string();
            let live = template::is_markup_language(&doc.language_id)
                || template::offset_in_template(&text, offset);
            if !live {
                return None;
            }
            definition::resolve(&text, offset, &self.snapshot())
        }();

        Ok(location.map(GotoDefinitionResponse::Scalar))
    }
}

fn position_to_offset(position: Position, rope: &Rope) -> Option<usize> {
    let line_char = rope.try_line_to_char(position.line as usize).ok()?;
    let char_idx = line_char + position.character as usize;
    if char_idx > rope.len_chars() {
        return None;
    }
    Some(rope.slice(0..char_idx).len_bytes())
}
