use std::path::PathBuf;

use tower_lsp::lsp_types::{Position, Range, SymbolKind, TextEdit, Url};

use crate::document::EditedFile;
use crate::state::BackendState;
use crate::Backend;

fn uri_for(path: &str) -> Url {
    Url::from_file_path(path).expect("absolute test path")
}

/// Line/character of the first occurrence of `needle`.
fn position_for(text: &str, needle: &str) -> Position {
    let offset = text.find(needle).expect("needle exists");
    let mut line = 0u32;
    let mut character = 0u32;
    for (index, ch) in text.char_indices() {
        if index == offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            character = 0;
        } else {
            character += 1;
        }
    }
    Position::new(line, character)
}

/// Opens `path` in the cache with `text` as its live buffer, the way a
/// didOpen followed by a full-sync change would.
fn open_with_text(state: &mut BackendState, path: &str, text: &str) -> PathBuf {
    let key = state.find_or_open(&uri_for(path));
    state
        .entry_mut(&key)
        .expect("entry was just opened")
        .editor_content
        .set_content(text.to_string());
    state.recompile(&key);
    key
}

fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut file = EditedFile::new(text);
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    for edit in ordered {
        file.update(edit.range, &edit.new_text);
    }
    file.content().to_string()
}

#[test]
fn outline_of_a_variable_declaration() {
    let mut state = BackendState::default();
    let text = "var x = 1;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    assert!(entry.diagnostic.is_none());
    assert_eq!(entry.symbols.len(), 1);
    let symbol = &entry.symbols[0];
    assert_eq!(symbol.name, "x");
    assert_eq!(symbol.kind, SymbolKind::VARIABLE);
    let x = position_for(text, "x");
    assert_eq!(
        symbol.selection_range,
        Range::new(x, Position::new(x.line, x.character + 1))
    );
}

#[test]
fn definition_crosses_into_the_imported_module() {
    let mut state = BackendState::default();
    open_with_text(&mut state, "/test/B.et", "fun foo() {}\n");
    let text = "import B;\nvar r = foo();";
    let key = open_with_text(&mut state, "/test/A.et", text);
    let entry = state.entry(&key).expect("entry");

    assert!(entry.diagnostic.is_none());
    let cursor = position_for(text, "foo");
    let links = Backend::build_definition(entry, cursor);
    assert_eq!(links.len(), 1);
    let link = &links[0];
    assert_eq!(link.target_uri.path(), "/test/B.et");
    // Collapsed range at the declaration token of `foo` in B.
    assert_eq!(link.target_range.start, link.target_range.end);
    assert_eq!(link.target_range.start.line, 0);
    assert_eq!(link.target_range, link.target_selection_range);
}

#[test]
fn highlight_returns_the_whole_equivalence_class() {
    let mut state = BackendState::default();
    let text = "var x = 1;\nvar y = x + x;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let decl = position_for(text, "x");
    let highlights = Backend::build_highlights(entry, decl);
    assert_eq!(highlights.len(), 3);

    // The class is the same no matter which occurrence anchors it.
    for highlight in &highlights {
        let again = Backend::build_highlights(entry, highlight.range.start);
        assert_eq!(again.len(), 3);
    }
}

#[test]
fn usage_lookup_is_right_edge_inclusive() {
    let mut state = BackendState::default();
    let text = "var x = 1;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    // `x` covers characters [4, 5); the cursor may sit right after it.
    assert!(Backend::usage_at(entry, Position::new(0, 4)).is_some());
    assert!(Backend::usage_at(entry, Position::new(0, 5)).is_some());
    assert!(Backend::usage_at(entry, Position::new(0, 3)).is_none());
    assert!(Backend::usage_at(entry, Position::new(0, 6)).is_none());
    assert!(Backend::usage_at(entry, Position::new(1, 4)).is_none());
}

#[test]
fn hover_shows_the_inferred_type() {
    let mut state = BackendState::default();
    let text = "var x = 1;\nvar y = x;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let access = Position::new(1, 8);
    let hover = Backend::build_hover(entry, access).expect("hover");
    let usage = Backend::usage_at(entry, access).expect("usage");
    assert_eq!(hover.range, Some(usage.range));
    assert_eq!(usage.type_name.as_deref(), Some("Int"));
}

#[test]
fn rename_rewrites_every_in_file_usage() {
    let mut state = BackendState::default();
    let text = "var x = 1;\nvar y = x + x;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let edit = Backend::build_rename(entry, position_for(text, "x"), "total").expect("edit");
    let changes = edit.changes.expect("changes");
    assert_eq!(changes.len(), 1);
    let edits = changes.get(&entry.uri).expect("edits for the document");
    assert_eq!(edits.len(), 3);
    assert_eq!(apply_edits(text, edits), "var total = 1;\nvar y = total + total;");
}

#[test]
fn rename_to_the_same_name_is_identity() {
    let mut state = BackendState::default();
    let text = "var x = 1;\nvar y = x + x;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let edit = Backend::build_rename(entry, position_for(text, "x"), "x").expect("edit");
    let edits = edit.changes.expect("changes").remove(&entry.uri).expect("edits");
    assert_eq!(apply_edits(text, &edits), text);
}

#[test]
fn rename_refuses_module_names() {
    let mut state = BackendState::default();
    open_with_text(&mut state, "/test/B.et", "fun foo() {}\n");
    let text = "import B;\nvar r = B.foo();";
    let key = open_with_text(&mut state, "/test/A.et", text);
    let entry = state.entry(&key).expect("entry");

    let on_module = position_for(text, "B.foo");
    assert!(Backend::usage_at(entry, on_module).is_some());
    assert!(Backend::build_prepare_rename(entry, on_module).is_none());
    assert!(Backend::build_rename(entry, on_module, "C").is_none());

    // The member after the dot still renames.
    let on_member = position_for(text, "foo();");
    assert!(Backend::build_prepare_rename(entry, on_member).is_some());
}

#[test]
fn rename_rejects_invalid_identifiers() {
    let mut state = BackendState::default();
    let text = "var x = 1;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    for bad in ["", "1abc", "a.b", "a b"] {
        assert!(Backend::build_rename(entry, position_for(text, "x"), bad).is_none());
    }
}

#[test]
fn qualified_member_resolves_to_the_home_module() {
    let mut state = BackendState::default();
    open_with_text(&mut state, "/test/B.et", "fun foo() -> Int { 1 }\n");
    let text = "import B;\nvar r = B.foo();";
    let key = open_with_text(&mut state, "/test/A.et", text);
    let entry = state.entry(&key).expect("entry");

    let links = Backend::build_definition(entry, position_for(text, "foo();"));
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_uri.path(), "/test/B.et");
}

#[test]
fn syntax_error_keeps_the_previous_tables() {
    let mut state = BackendState::default();
    let key = open_with_text(&mut state, "/test/Main.et", "var x = 1;");
    assert_eq!(state.entry(&key).expect("entry").symbols.len(), 1);

    let entry = state.entry_mut(&key).expect("entry");
    entry.editor_content.set_content("var x = 1;\nfun f( {".to_string());
    state.recompile(&key);

    let entry = state.entry(&key).expect("entry");
    let diagnostic = entry.diagnostic.as_ref().expect("diagnostic");
    assert_eq!(diagnostic.range.start.line, 1);
    assert_eq!(diagnostic.range.start.character, 8);
    // Last-known-good symbols and usages still answer queries.
    assert_eq!(entry.symbols.len(), 1);
    assert!(Backend::usage_at(entry, Position::new(0, 4)).is_some());
}

#[test]
fn missing_import_surfaces_at_the_import_site() {
    let mut state = BackendState::default();
    let text = "import Nowhere;\nvar x = 1;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let diagnostic = entry.diagnostic.as_ref().expect("diagnostic");
    assert_eq!(diagnostic.range.start.line, 0);
    assert!(diagnostic.message.contains("Nowhere"));
}

#[test]
fn invalidation_drops_everything_at_or_after_the_cut() {
    let mut state = BackendState::default();
    let text = "var a = 1;\nvar b = a;\nvar c = b;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry_mut(&key).expect("entry");

    let cut = Position::new(1, 0);
    entry.invalidate_after(cut);

    for symbol in &entry.symbols {
        assert!(symbol.range.start < cut, "symbol {:?} survived", symbol.name);
    }
    let unit = entry.target_unit();
    for usage in &entry.usages {
        assert!(usage.range.end < cut);
        for target in [usage.decl_def.decl_position, usage.decl_def.def_position] {
            if Some(target.unit) == unit {
                assert!(Position::new(target.line, target.column) < cut);
            }
        }
    }
    // Line 0 declared `a` before the cut; that much survives.
    assert!(entry.symbols.iter().any(|symbol| symbol.name == "a"));
}

#[test]
fn edits_elsewhere_recompile_lazily_on_lookup() {
    let mut state = BackendState::default();
    let lib_key = open_with_text(&mut state, "/test/Lib.et", "fun old_name() {}\n");
    let main_text = "import Lib;\nvar r = old_name();";
    let main_key = open_with_text(&mut state, "/test/Main.et", main_text);
    assert!(state.entry(&main_key).expect("entry").diagnostic.is_none());

    // Rename the function inside Lib and recompile it, as didChange does.
    state
        .entry_mut(&lib_key)
        .expect("lib entry")
        .editor_content
        .set_content("fun new_name() {}\n".to_string());
    state.recompile(&lib_key);
    state.mark_others_for_recompile(&lib_key);
    assert!(state.entry(&main_key).expect("entry").recompile_on_lookup);

    // The next access recompiles Main against the edited Lib: the old
    // call no longer resolves, so its usage is gone.
    let key = state.find_or_open(&uri_for("/test/Main.et"));
    let entry = state.entry(&key).expect("entry");
    assert!(!entry.recompile_on_lookup);
    assert!(Backend::usage_at(entry, position_for(main_text, "old_name()")).is_none());
}

#[test]
fn function_outline_spans_name_through_body_start() {
    let mut state = BackendState::default();
    let text = "fun add(a: Int, b: Int) -> Int { a + b }";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let fun_symbol = entry
        .symbols
        .iter()
        .find(|symbol| symbol.name == "add")
        .expect("function symbol");
    assert_eq!(fun_symbol.kind, SymbolKind::FUNCTION);
    assert_eq!(fun_symbol.range.start, position_for(text, "add"));
    assert_eq!(fun_symbol.range.end, position_for(text, "{"));
    assert_eq!(fun_symbol.selection_range.end.character, fun_symbol.selection_range.start.character + 3);

    // Parameters appear in both tables.
    assert!(entry.symbols.iter().any(|symbol| symbol.name == "a"));
    assert!(Backend::usage_at(entry, position_for(text, "a:")).is_some());
}

#[test]
fn trait_signature_and_impl_body_share_one_entity() {
    let mut state = BackendState::default();
    let text = "type Point = struct { x: Int };\n\
                trait Show { fun show(p: Point) -> String; }\n\
                impl Show for Point { fun show(q: Point) -> String { \"p\" } }\n\
                var s = show;";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");
    assert!(entry.diagnostic.is_none());

    // The signature suppresses its own usage; the impl site emits one
    // whose declaration points back at the signature.
    let impl_line = 2;
    let impl_usage = entry
        .usages
        .iter()
        .find(|usage| usage.range.start.line == impl_line && usage.is_def)
        .expect("impl usage");
    assert!(!impl_usage.is_decl);
    assert_eq!(impl_usage.decl_def.decl_position.line, 1);
    assert_eq!(impl_usage.decl_def.def_position.line, impl_line);

    // An access elsewhere lands on the same entity.
    let access = Backend::usage_at(entry, position_for(text, "show;")).expect("access usage");
    assert_eq!(access.decl_def, impl_usage.decl_def);
}

#[test]
fn compound_initializer_fields_point_at_member_declarations() {
    let mut state = BackendState::default();
    let text = "type Point = struct { x: Int, y: Int };\n\
                var p = Point { x = 1, y = 2 };";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");

    let usage = Backend::usage_at(entry, position_for(text, "x = 1")).expect("field usage");
    assert_eq!(usage.decl_def.decl_position.line, 0);
    assert_eq!(usage.type_name.as_deref(), Some("Int"));

    // Field access resolves to the very same member site.
    let mut state = BackendState::default();
    let access_text = "type Point = struct { x: Int, y: Int };\n\
                       fun get(p: Point) -> Int { p.x }";
    let key = open_with_text(&mut state, "/test/Main.et", access_text);
    let entry = state.entry(&key).expect("entry");
    let access = Backend::usage_at(entry, position_for(access_text, "x }")).expect("access");
    assert_eq!(access.decl_def, usage.decl_def);
}

#[test]
fn variant_patterns_point_at_their_arm_declaration() {
    let mut state = BackendState::default();
    let text = "type Shape = sum { Circle: Int, Square: Int };\n\
                fun area(s: Shape) -> Int {\n\
                  match s { Circle(r) => r * r, Square(w) => w, _ => 0 }\n\
                }";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");
    assert!(entry.diagnostic.is_none());

    let circle = Backend::usage_at(entry, position_for(text, "Circle(r)")).expect("arm usage");
    assert_eq!(circle.decl_def.decl_position.line, 0);
    // The payload binding got the payload type.
    let r_binding = Backend::usage_at(entry, position_for(text, "r)")).expect("binding");
    assert_eq!(r_binding.type_name.as_deref(), Some("Int"));
    assert!(r_binding.is_decl && r_binding.is_def);
}

#[test]
fn usage_ranges_are_single_line_and_nonempty() {
    let mut state = BackendState::default();
    let text = "type Shape = sum { Circle: Int, Square: Int };\n\
                fun area(s: Shape) -> Int {\n\
                  match s { Circle(r) => r * r, _ => 0 }\n\
                }\n\
                var total = area(Shape { Circle = 3 });";
    let key = open_with_text(&mut state, "/test/Main.et", text);
    let entry = state.entry(&key).expect("entry");
    assert!(entry.diagnostic.is_none());

    assert!(!entry.usages.is_empty());
    for usage in &entry.usages {
        assert_eq!(usage.range.start.line, usage.range.end.line);
        assert!(usage.range.end.character > usage.range.start.character);
    }
}

#[test]
fn open_buffers_override_files_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("Main.et");
    std::fs::write(&path, "var old_var = 1;").expect("writes");

    let mut state = BackendState::default();
    let key = open_with_text(&mut state, path.to_str().expect("utf8 path"), "var new_var = 1;");
    let entry = state.entry(&key).expect("entry");
    assert!(entry.symbols.iter().any(|symbol| symbol.name == "new_var"));
    assert!(!entry.symbols.iter().any(|symbol| symbol.name == "old_var"));
}

#[test]
fn entries_seed_from_disk_when_present() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("Main.et");
    std::fs::write(&path, "var from_disk = 1;").expect("writes");

    // A request may arrive for a file the editor never opened; the entry
    // starts from the saved file.
    let mut state = BackendState::default();
    let uri = Url::from_file_path(&path).expect("uri");
    let key = state.find_or_open(&uri);
    let entry = state.entry(&key).expect("entry");
    assert!(entry.diagnostic.is_none());
    assert!(entry.symbols.iter().any(|symbol| symbol.name == "from_disk"));
}

#[test]
fn imports_resolve_from_disk_next_to_the_target() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("Lib.et"), "fun lib_fun() {}\n").expect("writes");
    let main_path = dir.path().join("Main.et");
    std::fs::write(&main_path, "").expect("writes");

    let mut state = BackendState::default();
    let text = "import Lib;\nvar r = lib_fun();";
    let key = open_with_text(&mut state, main_path.to_str().expect("utf8 path"), text);
    let entry = state.entry(&key).expect("entry");
    assert!(entry.diagnostic.is_none());

    let links = Backend::build_definition(entry, position_for(text, "lib_fun()"));
    assert_eq!(links.len(), 1);
    assert!(links[0].target_uri.path().ends_with("Lib.et"));
}

#[test]
fn closing_a_file_drops_its_entry() {
    let mut state = BackendState::default();
    open_with_text(&mut state, "/test/Main.et", "var x = 1;");
    assert_eq!(state.paths().count(), 1);
    state.remove(&uri_for("/test/Main.et"));
    assert_eq!(state.paths().count(), 0);
}

#[test]
fn one_entry_per_canonical_path() {
    let mut state = BackendState::default();
    open_with_text(&mut state, "/test/Main.et", "var x = 1;");
    state.find_or_open(&uri_for("/test/Main.et"));
    assert_eq!(state.paths().count(), 1);
}
