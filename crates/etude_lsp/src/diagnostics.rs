use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

use etude::error::CompileError;

/// One compile failure becomes one diagnostic: at the offending token for
/// located errors, at the top of the file otherwise.
pub(crate) fn compile_error_to_diagnostic(err: &CompileError) -> Diagnostic {
    let position = match err.location() {
        Some(location) => Position::new(location.line, location.column),
        None => Position::new(0, 0),
    };
    Diagnostic {
        range: Range::new(position, position),
        severity: Some(DiagnosticSeverity::ERROR),
        code: None,
        code_description: None,
        source: Some("etude".to_string()),
        message: err.message().to_string(),
        related_information: None,
        tags: None,
        data: None,
    }
}
