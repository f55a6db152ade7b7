use tower_lsp::lsp_types::{DocumentSymbol, Position, Range, SymbolKind};

use etude::ast::{Expr, ExprKind, FieldInit, FunDecl, ImplDecl, TraitDecl, TypeDecl, VarDecl};
use etude::driver::CompilationDriver;
use etude::lexer::{LexLocation, Token};
use etude::resolver::SymbolKind as EtudeSymbolKind;
use etude::types::TypeShape;
use etude::visitor::Visitor;

/// Declaration and definition sites of the entity a usage names. The two
/// differ only when a signature (say, a trait method) lives apart from
/// the body implementing it. Two usages refer to the same entity exactly
/// when these compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolDeclDefInfo {
    pub decl_position: LexLocation,
    pub def_position: LexLocation,
}

/// An on-screen name range bound to the entity it refers to.
#[derive(Debug, Clone)]
pub struct SymbolUsage {
    pub range: Range,
    pub decl_def: SymbolDeclDefInfo,
    pub type_name: Option<String>,
    pub is_decl: bool,
    pub is_def: bool,
}

/// On-screen range of a token. The token's location points one past its
/// last character, so the start is recovered by subtracting the length;
/// tokens never span lines.
pub fn token_range(token: &Token) -> Range {
    debug_assert!(token.location.column as usize >= token.len());
    let line = token.location.line;
    let end = Position::new(line, token.location.column);
    let start = Position::new(line, token.location.column - token.len() as u32);
    Range::new(start, end)
}

/// Collapsed editor position of a compiler location.
pub fn location_position(location: LexLocation) -> Position {
    Position::new(location.line, location.column)
}

/// Runs the extraction visitor over the driver's target module and
/// returns the outline and usage tables.
pub fn extract(driver: &CompilationDriver) -> (Vec<DocumentSymbol>, Vec<SymbolUsage>) {
    let mut visitor = ExtractVisitor {
        driver,
        symbols: Vec::new(),
        usages: Vec::new(),
    };
    driver.run_visitor(&mut visitor);
    (visitor.symbols, visitor.usages)
}

struct ExtractVisitor<'a> {
    driver: &'a CompilationDriver,
    symbols: Vec<DocumentSymbol>,
    usages: Vec<SymbolUsage>,
}

impl ExtractVisitor<'_> {
    fn push_symbol(&mut self, name: &Token, kind: SymbolKind, range: Range) {
        self.symbols.push(DocumentSymbol {
            name: name.text.clone(),
            detail: None,
            kind,
            tags: None,
            deprecated: None,
            range,
            selection_range: token_range(name),
            children: None,
        });
    }

    /// Usage whose declaration and definition both sit at the site itself.
    fn push_self_usage(&mut self, name: &Token, type_name: Option<String>) {
        self.usages.push(SymbolUsage {
            range: token_range(name),
            decl_def: SymbolDeclDefInfo {
                decl_position: name.location,
                def_position: name.location,
            },
            type_name,
            is_decl: true,
            is_def: true,
        });
    }

    /// Usage of a resolved symbol at `site`.
    fn push_symbol_usage(&mut self, site: &Token, record: &etude::SymbolRecord) {
        self.usages.push(SymbolUsage {
            range: token_range(site),
            decl_def: SymbolDeclDefInfo {
                decl_position: record.decl,
                def_position: record.def,
            },
            type_name: record.type_repr.clone(),
            is_decl: site.location == record.decl,
            is_def: site.location == record.def,
        });
    }

    /// Usage pointing at a type member declared at `decl`.
    fn push_member_usage(&mut self, site: &Token, decl: LexLocation, type_name: Option<String>) {
        self.usages.push(SymbolUsage {
            range: token_range(site),
            decl_def: SymbolDeclDefInfo { decl_position: decl, def_position: decl },
            type_name,
            is_decl: site.location == decl,
            is_def: site.location == decl,
        });
    }

    fn decl_record(&self, node: etude::NodeId) -> Option<&etude::SymbolRecord> {
        let resolution = self.driver.resolution();
        resolution.decl_symbol(node).map(|id| resolution.symbol(id))
    }

    /// Shared handling for function declarations; trait method signatures
    /// get their outline entry but no name usage.
    fn handle_fun(&mut self, decl: &FunDecl, suppress_name_usage: bool) {
        let name_range = token_range(&decl.name);
        let range = match &decl.body {
            // The outline spans the name through the body's opening brace,
            // staying stable while the body is edited.
            Some(Expr { kind: ExprKind::Block { open, .. }, .. }) => {
                Range::new(name_range.start, token_range(open).start)
            }
            _ => name_range,
        };
        self.push_symbol(&decl.name, SymbolKind::FUNCTION, range);
        if !suppress_name_usage {
            if let Some(record) = self.decl_record(decl.id).cloned() {
                self.push_symbol_usage(&decl.name, &record);
            }
        }

        for param in &decl.params {
            self.push_symbol(&param.name, SymbolKind::VARIABLE, token_range(&param.name));
            let type_name =
                self.decl_record(param.id).and_then(|record| record.type_repr.clone());
            self.push_self_usage(&param.name, type_name);
        }

        if let Some(body) = &decl.body {
            self.visit_expr(body);
        }
    }
}

impl Visitor for ExtractVisitor<'_> {
    fn visit_type_decl(&mut self, decl: &TypeDecl) {
        let kind = match &decl.body {
            etude::TypeBody::Struct(_) => SymbolKind::STRUCT,
            etude::TypeBody::Sum(_) => SymbolKind::ENUM,
            etude::TypeBody::Alias(_) => SymbolKind::TYPE_PARAMETER,
        };
        self.push_symbol(&decl.name, kind, token_range(&decl.name));
        self.push_self_usage(&decl.name, None);
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        self.push_symbol(&decl.name, SymbolKind::VARIABLE, token_range(&decl.name));
        let type_name = self.decl_record(decl.id).and_then(|record| record.type_repr.clone());
        self.push_self_usage(&decl.name, type_name);
        self.visit_expr(&decl.init);
    }

    fn visit_fun_decl(&mut self, decl: &FunDecl) {
        self.handle_fun(decl, false);
    }

    fn visit_trait_decl(&mut self, decl: &TraitDecl) {
        for method in &decl.methods {
            self.handle_fun(method, true);
        }
    }

    fn visit_impl_decl(&mut self, decl: &ImplDecl) {
        for method in &decl.methods {
            self.handle_fun(method, false);
        }
    }

    fn visit_var_access(&mut self, expr: &Expr, name: &Token) {
        let record = self
            .driver
            .resolution()
            .find_decl_for_usage(expr.id, &name.text)
            .map(|id| self.driver.resolution().symbol(id).clone());
        if let Some(record) = record {
            self.push_symbol_usage(name, &record);
        }
        // The outline entry survives even when resolution failed, so
        // editors keep a usable view under errors further up the file.
        self.push_symbol(name, SymbolKind::VARIABLE, token_range(name));
    }

    fn visit_field_access(&mut self, _expr: &Expr, base: &Expr, field: &Token) {
        self.visit_expr(base);

        let resolution = self.driver.resolution();
        let types = self.driver.types();

        // Qualified access through an imported module resolves the member
        // in that module's scope rather than a struct member table.
        if let ExprKind::Var(base_name) = &base.kind {
            let module = resolution
                .find_decl_for_usage(base.id, &base_name.text)
                .map(|id| resolution.symbol(id))
                .filter(|record| record.kind == EtudeSymbolKind::Module)
                .and_then(|record| record.module_name.clone());
            if let Some(module) = module {
                let member = resolution
                    .module_scope(&module)
                    .and_then(|scope| resolution.lookup(scope, &field.text))
                    .map(|id| resolution.symbol(id).clone());
                if let Some(member) = member {
                    self.push_symbol_usage(field, &member);
                }
                return;
            }
        }

        let Some(base_ty) = types.type_of(base.id) else { return };
        let Some(def) = types.shape_of(base_ty) else { return };
        if let TypeShape::Struct(members) = &def.shape {
            if let Some(member) = members.iter().find(|member| member.name == field.text) {
                let type_name = types.render(&member.ty);
                self.push_member_usage(field, member.decl, type_name);
            }
        }
    }

    fn visit_compound_init(&mut self, expr: &Expr, type_name: &Token, fields: &[FieldInit]) {
        let resolution = self.driver.resolution();
        let types = self.driver.types();
        let shape = resolution
            .find_decl_for_usage(expr.id, &type_name.text)
            .map(|id| resolution.symbol(id))
            .filter(|record| record.kind == EtudeSymbolKind::Type)
            .and_then(|record| record.type_def)
            .map(|def| &types.def(def).shape);

        for field in fields {
            match shape {
                Some(TypeShape::Struct(members)) => {
                    if let Some(member) =
                        members.iter().find(|member| member.name == field.name.text)
                    {
                        let type_name = types.render(&member.ty);
                        self.push_member_usage(&field.name, member.decl, type_name);
                    }
                }
                Some(TypeShape::Sum(variants)) => {
                    if let Some(variant) =
                        variants.iter().find(|variant| variant.name == field.name.text)
                    {
                        let type_name =
                            variant.payload.as_ref().and_then(|payload| types.render(payload));
                        self.push_member_usage(&field.name, variant.decl, type_name);
                    }
                }
                _ => {}
            }
        }

        for field in fields {
            if let Some(value) = &field.value {
                self.visit_expr(value);
            }
        }
    }

    fn visit_variant_pat(
        &mut self,
        pattern: &etude::Pattern,
        name: &Token,
        inner: Option<&etude::Pattern>,
    ) {
        if let Some(inner) = inner {
            self.visit_pattern(inner);
        }

        let types = self.driver.types();
        let variant = types
            .type_of(pattern.id)
            .and_then(|scrutinee| types.shape_of(scrutinee))
            .and_then(|def| match &def.shape {
                TypeShape::Sum(variants) => {
                    variants.iter().find(|variant| variant.name == name.text)
                }
                _ => None,
            });
        if let Some(variant) = variant {
            let type_name = variant.payload.as_ref().and_then(|payload| types.render(payload));
            self.push_member_usage(name, variant.decl, type_name);
        }
    }

    fn visit_binding_pat(&mut self, pattern: &etude::Pattern, name: &Token) {
        self.push_symbol(name, SymbolKind::VARIABLE, token_range(name));
        let type_name = self.decl_record(pattern.id).and_then(|record| record.type_repr.clone());
        self.push_self_usage(name, type_name);
    }
}
