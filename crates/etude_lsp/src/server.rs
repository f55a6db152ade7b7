use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, DocumentHighlight, DocumentHighlightParams, DocumentLink,
    DocumentLinkOptions, DocumentLinkParams, DocumentSymbolParams, DocumentSymbolResponse,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams, HoverProviderCapability,
    InitializeParams, InitializeResult, InitializedParams, OneOf, PrepareRenameResponse,
    RenameOptions, RenameParams, SaveOptions, ServerCapabilities, TextDocumentPositionParams,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, WorkspaceEdit,
};
use tower_lsp::{LanguageServer, LspService, Server};
use tracing::{debug, info};

use crate::Backend;

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult> {
        info!("initializing etude language server");
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        will_save: None,
                        will_save_wait_until: None,
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                document_highlight_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: None,
                    work_done_progress_options: Default::default(),
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(tower_lsp::lsp_types::ServerInfo {
                name: "etude-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        self.set_ready();
        info!("etude language server initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        info!("shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        if !self.ready() {
            return;
        }
        let uri = params.text_document.uri;
        debug!(%uri, "didOpen");
        // The editor's buffer is authoritative from the first message on.
        let text = params.text_document.text;
        let diagnostics = {
            let mut state = self.state.lock().await;
            let path = state.find_or_open(&uri);
            let mut buffer_changed = false;
            if let Some(entry) = state.entry_mut(&path) {
                if entry.editor_content.content() != text {
                    entry.editor_content.set_content(text);
                    buffer_changed = true;
                }
            }
            if buffer_changed {
                state.recompile(&path);
            }
            state.entry(&path).map(|entry| entry.diagnostics()).unwrap_or_default()
        };
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        if !self.ready() {
            return;
        }
        let uri = params.text_document.uri;
        debug!(%uri, changes = params.content_changes.len(), "didChange");
        let diagnostics = {
            let mut state = self.state.lock().await;
            let path = state.find_or_open(&uri);
            if let Some(entry) = state.entry_mut(&path) {
                for change in params.content_changes {
                    match change.range {
                        Some(range) => {
                            entry.editor_content.update(range, &change.text);
                            entry.invalidate_after(range.end);
                        }
                        None => entry.editor_content.set_content(change.text),
                    }
                }
            }
            state.recompile(&path);
            state.mark_others_for_recompile(&path);
            state.entry(&path).map(|entry| entry.diagnostics()).unwrap_or_default()
        };
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        if !self.ready() {
            return;
        }
        // The in-memory buffer is already authoritative.
        debug!(uri = %params.text_document.uri, "didSave");
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if !self.ready() {
            return;
        }
        let uri = params.text_document.uri;
        debug!(%uri, "didClose");
        {
            let mut state = self.state.lock().await;
            state.remove(&uri);
        }
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        if !self.ready() {
            return Ok(None);
        }
        let uri = params.text_document.uri;
        debug!(%uri, "documentSymbol");
        let symbols = self
            .with_entry(&uri, |entry| entry.symbols.clone())
            .await
            .unwrap_or_default();
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        if !self.ready() {
            return Ok(None);
        }
        let TextDocumentPositionParams { text_document, position } =
            params.text_document_position_params;
        debug!(uri = %text_document.uri, ?position, "definition");
        let links = self
            .with_entry(&text_document.uri, |entry| Self::build_definition(entry, position))
            .await
            .unwrap_or_default();
        Ok(Some(GotoDefinitionResponse::Link(links)))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        if !self.ready() {
            return Ok(None);
        }
        let TextDocumentPositionParams { text_document, position } =
            params.text_document_position_params;
        debug!(uri = %text_document.uri, ?position, "documentHighlight");
        let highlights = self
            .with_entry(&text_document.uri, |entry| Self::build_highlights(entry, position))
            .await
            .unwrap_or_default();
        Ok(Some(highlights))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        if !self.ready() {
            return Ok(None);
        }
        let TextDocumentPositionParams { text_document, position } =
            params.text_document_position_params;
        debug!(uri = %text_document.uri, ?position, "hover");
        let hover = self
            .with_entry(&text_document.uri, |entry| Self::build_hover(entry, position))
            .await
            .flatten();
        Ok(hover)
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> Result<Option<PrepareRenameResponse>> {
        if !self.ready() {
            return Ok(None);
        }
        let TextDocumentPositionParams { text_document, position } = params;
        debug!(uri = %text_document.uri, ?position, "prepareRename");
        let range = self
            .with_entry(&text_document.uri, |entry| Self::build_prepare_rename(entry, position))
            .await
            .flatten();
        Ok(range.map(PrepareRenameResponse::Range))
    }

    async fn rename(&self, params: RenameParams) -> Result<Option<WorkspaceEdit>> {
        if !self.ready() {
            return Ok(None);
        }
        let TextDocumentPositionParams { text_document, position } =
            params.text_document_position;
        debug!(uri = %text_document.uri, ?position, new_name = %params.new_name, "rename");
        let edit = self
            .with_entry(&text_document.uri, |entry| {
                Self::build_rename(entry, position, &params.new_name)
            })
            .await
            .flatten();
        Ok(edit)
    }

    async fn document_link(&self, params: DocumentLinkParams) -> Result<Option<Vec<DocumentLink>>> {
        if !self.ready() {
            return Ok(None);
        }
        debug!(uri = %params.text_document.uri, "documentLink");
        Ok(Some(Vec::new()))
    }
}

pub async fn run() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
