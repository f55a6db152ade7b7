use std::collections::HashMap;

use tower_lsp::lsp_types::{
    DocumentHighlight, Hover, HoverContents, LocationLink, MarkupContent, MarkupKind, Position,
    Range, TextEdit, Url, WorkspaceEdit,
};

use etude::resolver::SymbolKind;

use crate::extract::{location_position, SymbolUsage};
use crate::state::FileEntry;
use crate::Backend;

impl Backend {
    /// The usage under an editor position. Tokens never span lines, so
    /// only the start line is compared; the right edge is inclusive
    /// because a cursor directly after a name still refers to it. Usages
    /// never overlap, so at most one can match.
    pub(crate) fn usage_at(entry: &FileEntry, position: Position) -> Option<&SymbolUsage> {
        let mut found: Option<&SymbolUsage> = None;
        for usage in &entry.usages {
            if usage.range.start.line != position.line {
                continue;
            }
            if usage.range.start.character <= position.character
                && position.character <= usage.range.end.character
            {
                debug_assert!(found.is_none(), "usages overlap at {position:?}");
                if found.is_none() {
                    found = Some(usage);
                }
            }
        }
        found
    }

    pub(crate) fn build_definition(entry: &FileEntry, position: Position) -> Vec<LocationLink> {
        let Some(usage) = Self::usage_at(entry, position) else {
            return Vec::new();
        };
        let Some(driver) = entry.last_driver.as_ref() else {
            return Vec::new();
        };
        let decl = usage.decl_def.decl_position;
        let Ok(target_uri) = Url::from_file_path(driver.unit_path(decl.unit)) else {
            return Vec::new();
        };
        // A collapsed range at the declaration is enough for the editor
        // to land the cursor; the client widens the view itself.
        let point = location_position(decl);
        vec![LocationLink {
            origin_selection_range: Some(usage.range),
            target_uri,
            target_range: Range::new(point, point),
            target_selection_range: Range::new(point, point),
        }]
    }

    pub(crate) fn build_highlights(entry: &FileEntry, position: Position) -> Vec<DocumentHighlight> {
        let Some(target) = Self::usage_at(entry, position) else {
            return Vec::new();
        };
        entry
            .usages
            .iter()
            .filter(|usage| usage.decl_def == target.decl_def)
            .map(|usage| DocumentHighlight { range: usage.range, kind: None })
            .collect()
    }

    pub(crate) fn build_hover(entry: &FileEntry, position: Position) -> Option<Hover> {
        let usage = Self::usage_at(entry, position)?;
        let type_name = usage.type_name.clone()?;
        Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::PlainText,
                value: type_name,
            }),
            range: Some(usage.range),
        })
    }

    /// Whether a usage names an imported module; those cannot be renamed
    /// from inside a single file.
    fn names_a_module(entry: &FileEntry, usage: &SymbolUsage) -> bool {
        entry
            .last_driver
            .as_ref()
            .and_then(|driver| {
                driver.resolution().symbol_declared_at(usage.decl_def.decl_position)
            })
            .is_some_and(|record| record.kind == SymbolKind::Module)
    }

    pub(crate) fn build_prepare_rename(entry: &FileEntry, position: Position) -> Option<Range> {
        let usage = Self::usage_at(entry, position)?;
        if Self::names_a_module(entry, usage) {
            return None;
        }
        Some(usage.range)
    }

    pub(crate) fn build_rename(
        entry: &FileEntry,
        position: Position,
        new_name: &str,
    ) -> Option<WorkspaceEdit> {
        if !is_valid_identifier(new_name) {
            return None;
        }
        let target = Self::usage_at(entry, position)?;
        if Self::names_a_module(entry, target) {
            return None;
        }

        let edits: Vec<TextEdit> = entry
            .usages
            .iter()
            .filter(|usage| usage.decl_def == target.decl_def)
            .map(|usage| TextEdit { range: usage.range, new_text: new_name.to_string() })
            .collect();
        if edits.is_empty() {
            return None;
        }

        let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        changes.insert(entry.uri.clone(), edits);
        Some(WorkspaceEdit {
            changes: Some(changes),
            document_changes: None,
            change_annotations: None,
        })
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|ch| ch.is_alphanumeric() || ch == '_')
}
