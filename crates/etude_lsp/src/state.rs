use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::{Diagnostic, DocumentSymbol, Position, Url};
use tracing::debug;

use etude::driver::{CompilationDriver, DiskLoader, SourceLoader};
use etude::error::CompileError;
use etude::lexer::UnitId;

use crate::diagnostics::compile_error_to_diagnostic;
use crate::document::EditedFile;
use crate::extract::{extract, SymbolUsage};

/// Canonical form of a filesystem path: symlinks resolved where possible,
/// case folded on case-insensitive platforms so one file opened under two
/// casings lands on one cache entry.
pub(crate) fn canonical_path(path: &Path) -> PathBuf {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if cfg!(any(windows, target_os = "macos")) {
        PathBuf::from(resolved.to_string_lossy().to_lowercase())
    } else {
        resolved
    }
}

/// Everything the server keeps per open file: the live buffer, the last
/// successful compile, and the symbol/usage tables derived from it.
pub(crate) struct FileEntry {
    pub uri: Url,
    pub abs_path: PathBuf,
    pub editor_content: EditedFile,
    pub symbols: Vec<DocumentSymbol>,
    pub usages: Vec<SymbolUsage>,
    pub last_driver: Option<CompilationDriver>,
    pub diagnostic: Option<Diagnostic>,
    pub recompile_on_lookup: bool,
}

impl FileEntry {
    fn open(uri: Url, abs_path: PathBuf) -> FileEntry {
        // Seed from disk when the file exists; an untitled buffer starts
        // empty and is filled by didOpen/didChange.
        let seed = fs::read_to_string(&abs_path).unwrap_or_default();
        FileEntry {
            uri,
            abs_path,
            editor_content: EditedFile::new(seed),
            symbols: Vec::new(),
            usages: Vec::new(),
            last_driver: None,
            diagnostic: None,
            recompile_on_lookup: false,
        }
    }

    pub fn module_name(&self) -> String {
        self.abs_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.abs_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
    }

    /// Unit of this file's own module inside the retained driver.
    pub fn target_unit(&self) -> Option<UnitId> {
        self.last_driver
            .as_ref()
            .and_then(|driver| driver.target_module())
            .map(|module| module.unit)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostic.clone().into_iter().collect()
    }

    /// Drops every derived entry that may be stale after an edit at
    /// `position`: outline entries starting at or after it, and usages
    /// whose own range or whose same-file declaration target sits at or
    /// after it. Entries strictly before only point backward and keep
    /// rendering until the recompile lands.
    pub fn invalidate_after(&mut self, position: Position) {
        self.symbols.retain(|symbol| symbol.range.start < position);

        let unit = self.target_unit();
        self.usages.retain(|usage| {
            if usage.range.end >= position {
                return false;
            }
            let targets = [usage.decl_def.decl_position, usage.decl_def.def_position];
            targets.iter().all(|target| {
                Some(target.unit) != unit
                    || Position::new(target.line, target.column) < position
            })
        });
    }
}

/// The live-file index: at most one entry per canonical path.
#[derive(Default)]
pub(crate) struct BackendState {
    files: HashMap<PathBuf, FileEntry>,
}

impl BackendState {
    pub fn path_for(uri: &Url) -> PathBuf {
        let raw = uri
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(uri.path()));
        canonical_path(&raw)
    }

    pub fn entry(&self, path: &Path) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn entry_mut(&mut self, path: &Path) -> Option<&mut FileEntry> {
        self.files.get_mut(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// Ensures an entry exists for `uri` and returns its cache key. A new
    /// entry is compiled immediately; an existing one only when a
    /// recompile was left pending by an edit elsewhere.
    pub fn find_or_open(&mut self, uri: &Url) -> PathBuf {
        let path = Self::path_for(uri);
        if !self.files.contains_key(&path) {
            debug!(path = %path.display(), "opening file");
            let entry = FileEntry::open(uri.clone(), path.clone());
            self.files.insert(path.clone(), entry);
            self.recompile(&path);
        } else if self.files[&path].recompile_on_lookup {
            self.recompile(&path);
        }
        path
    }

    pub fn remove(&mut self, uri: &Url) -> Option<FileEntry> {
        let path = Self::path_for(uri);
        self.files.remove(&path)
    }

    /// Flags every entry other than `path` to recompile on its next
    /// access; an edit in one file can shift declarations the others
    /// resolved against.
    pub fn mark_others_for_recompile(&mut self, path: &Path) {
        for (other_path, entry) in self.files.iter_mut() {
            if other_path != path {
                entry.recompile_on_lookup = true;
            }
        }
    }

    /// Runs the full pipeline for one entry against the live buffers of
    /// every open file. On success the driver and both derived tables are
    /// swapped in together; on failure the previous tables stay in place
    /// and only the diagnostic changes.
    pub fn recompile(&mut self, path: &Path) {
        let overlay: HashMap<PathBuf, String> = self
            .files
            .iter()
            .map(|(entry_path, entry)| {
                (entry_path.clone(), entry.editor_content.content().to_string())
            })
            .collect();

        let Some(entry) = self.files.get_mut(path) else { return };
        let module_name = entry.module_name();
        let base_dir = entry.base_dir();
        debug!(module = %module_name, "recompiling");

        let loader = OverlayLoader { overlay: &overlay };
        let mut driver = CompilationDriver::new(module_name, base_dir);
        match driver.prepare_for_tooling(&loader) {
            Ok(()) => {
                let (symbols, usages) = extract(&driver);
                entry.symbols = symbols;
                entry.usages = usages;
                entry.last_driver = Some(driver);
                entry.diagnostic = None;
                entry.recompile_on_lookup = false;
            }
            Err(err) => {
                debug!(message = err.message(), "compile failed");
                entry.diagnostic = Some(compile_error_to_diagnostic(&err));
                entry.recompile_on_lookup = false;
            }
        }
    }
}

/// The one override the server layers onto the compiler: module sources
/// come from open editor buffers when available, from disk otherwise.
struct OverlayLoader<'a> {
    overlay: &'a HashMap<PathBuf, String>,
}

impl SourceLoader for OverlayLoader<'_> {
    fn load(&self, module_name: &str, base_dir: &Path) -> Result<(PathBuf, String), CompileError> {
        let candidate = canonical_path(&base_dir.join(format!("{module_name}.et")));
        if let Some(content) = self.overlay.get(&candidate) {
            return Ok((candidate, content.clone()));
        }
        DiskLoader.load(module_name, base_dir)
    }
}
