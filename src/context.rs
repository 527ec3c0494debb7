//! Explicit analysis context threaded through every operation

use crate::ast::{Ast, ScopeId};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::options::AnalysisOptions;

/// Read access to the syntax tree, the diagnostic sink and the options
pub struct AnalysisContext<'a> {
    /// Syntax tree being analysed
    pub ast: &'a Ast,
    /// Diagnostic receiver
    pub diagnostics: &'a mut dyn DiagnosticSink,
    /// Configuration
    pub options: &'a AnalysisOptions,
    /// Innermost lexical scope of the construct being analysed
    pub current_scope: ScopeId,
}

impl<'a> AnalysisContext<'a> {
    /// Creates a context positioned at the translation-unit scope.
    pub fn new(
        ast: &'a Ast,
        diagnostics: &'a mut dyn DiagnosticSink,
        options: &'a AnalysisOptions,
    ) -> Self {
        AnalysisContext {
            ast,
            diagnostics,
            options,
            current_scope: ast.tu_scope(),
        }
    }

    /// Forwards a diagnostic to the sink.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }
}
