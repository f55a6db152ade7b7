use std::collections::HashMap;

use crate::ast::{
    Decl, Expr, ExprKind, FunDecl, Module, NodeId, Pattern, PatternKind, Stmt, TypeDecl,
};
use crate::lexer::{LexLocation, Token};
use crate::types::TypeDefId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
    Type,
    Method,
    Module,
}

/// One named entity. `decl` and `def` coincide except for trait methods,
/// where the signature is the declaration and the impl body the definition.
#[derive(Debug, Clone)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
    pub decl: LexLocation,
    pub def: LexLocation,
    pub type_repr: Option<String>,
    pub type_def: Option<TypeDefId>,
    /// For `SymbolKind::Module`: the module this symbol names.
    pub module_name: Option<String>,
}

#[derive(Debug, Default)]
struct ScopeLayer {
    bindings: HashMap<String, SymbolId>,
    parent: Option<ScopeId>,
}

/// Name-resolution output for a whole compilation: the symbol table, the
/// scope layers, and the side tables attaching a scope to every node that
/// needs one. Built before any visitor runs; nodes are never mutated.
#[derive(Debug, Default)]
pub struct Resolution {
    symbols: Vec<SymbolRecord>,
    scopes: Vec<ScopeLayer>,
    scope_of: HashMap<NodeId, ScopeId>,
    decl_symbols: HashMap<NodeId, SymbolId>,
    module_scopes: HashMap<String, ScopeId>,
    module_exports: HashMap<String, Vec<(String, SymbolId)>>,
}

impl Resolution {
    pub fn symbol(&self, id: SymbolId) -> &SymbolRecord {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut SymbolRecord {
        &mut self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> &[SymbolRecord] {
        &self.symbols
    }

    /// Scope attached to a usage node by the resolver, if any.
    pub fn scope_at(&self, node: NodeId) -> Option<ScopeId> {
        self.scope_of.get(&node).copied()
    }

    /// Symbol introduced by a declaration or binding-pattern node.
    pub fn decl_symbol(&self, node: NodeId) -> Option<SymbolId> {
        self.decl_symbols.get(&node).copied()
    }

    /// Resolves a name usage through the scope layer attached to its node.
    pub fn find_decl_for_usage(&self, node: NodeId, name: &str) -> Option<SymbolId> {
        let scope = self.scope_at(node)?;
        self.lookup(scope, name)
    }

    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(scope_id) = current {
            let layer = &self.scopes[scope_id.0 as usize];
            if let Some(symbol) = layer.bindings.get(name) {
                return Some(*symbol);
            }
            current = layer.parent;
        }
        None
    }

    pub fn module_scope(&self, module: &str) -> Option<ScopeId> {
        self.module_scopes.get(module).copied()
    }

    /// Symbol whose declaration site is exactly `location`. Used by the
    /// server to recover the symbol behind a usage's declaration pointer.
    pub fn symbol_declared_at(&self, location: LexLocation) -> Option<&SymbolRecord> {
        self.symbols.iter().find(|record| record.decl == location)
    }

    fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeLayer { bindings: HashMap::new(), parent });
        id
    }

    fn new_symbol(&mut self, record: SymbolRecord) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(record);
        id
    }

    fn bind(&mut self, scope: ScopeId, name: &str, symbol: SymbolId) {
        self.scopes[scope.0 as usize].bindings.insert(name.to_string(), symbol);
    }
}

fn site_symbol(name: &Token, kind: SymbolKind) -> SymbolRecord {
    SymbolRecord {
        name: name.text.clone(),
        kind,
        decl: name.location,
        def: name.location,
        type_repr: None,
        type_def: None,
        module_name: None,
    }
}

/// Resolves `modules`, which must arrive in dependency order (imports
/// before importers); the driver's topological sort guarantees that.
pub fn resolve(modules: &[Module]) -> Resolution {
    let mut resolution = Resolution::default();
    for module in modules {
        resolve_module(&mut resolution, module);
    }
    resolution
}

fn resolve_module(resolution: &mut Resolution, module: &Module) {
    let scope = resolution.new_scope(None);
    resolution.module_scopes.insert(module.name.clone(), scope);

    // Imported modules were resolved earlier; splice their own top-level
    // symbols (not what they themselves imported) into this scope, and
    // bind the module name itself so qualified access and the rename
    // module check can see it.
    for import in &module.imports {
        let module_symbol = resolution.new_symbol(SymbolRecord {
            name: import.name.text.clone(),
            kind: SymbolKind::Module,
            decl: import.name.location,
            def: import.name.location,
            type_repr: None,
            type_def: None,
            module_name: Some(import.name.text.clone()),
        });
        resolution.bind(scope, &import.name.text, module_symbol);

        if let Some(exports) = resolution.module_exports.get(&import.name.text) {
            for (name, symbol) in exports.clone() {
                resolution.bind(scope, &name, symbol);
            }
        }
    }

    // Register every top-level declaration before resolving any body, so
    // order within a module never matters.
    let mut exports: Vec<(String, SymbolId)> = Vec::new();
    for decl in &module.decls {
        register_decl(resolution, scope, decl, &mut exports);
    }
    resolution.module_exports.insert(module.name.clone(), exports);

    for decl in &module.decls {
        resolve_decl_body(resolution, scope, decl);
    }
}

fn register_decl(
    resolution: &mut Resolution,
    scope: ScopeId,
    decl: &Decl,
    exports: &mut Vec<(String, SymbolId)>,
) {
    match decl {
        Decl::Var(var) => {
            let symbol = resolution.new_symbol(site_symbol(&var.name, SymbolKind::Variable));
            resolution.bind(scope, &var.name.text, symbol);
            resolution.decl_symbols.insert(var.id, symbol);
            exports.push((var.name.text.clone(), symbol));
        }
        Decl::Fun(fun) => {
            let symbol = resolution.new_symbol(site_symbol(&fun.name, SymbolKind::Function));
            resolution.bind(scope, &fun.name.text, symbol);
            resolution.decl_symbols.insert(fun.id, symbol);
            exports.push((fun.name.text.clone(), symbol));
        }
        Decl::Type(ty) => {
            let symbol = resolution.new_symbol(site_symbol(&ty.name, SymbolKind::Type));
            resolution.bind(scope, &ty.name.text, symbol);
            resolution.decl_symbols.insert(ty.id, symbol);
            exports.push((ty.name.text.clone(), symbol));
        }
        Decl::Trait(tr) => {
            let symbol = resolution.new_symbol(site_symbol(&tr.name, SymbolKind::Type));
            resolution.bind(scope, &tr.name.text, symbol);
            resolution.decl_symbols.insert(tr.id, symbol);
            exports.push((tr.name.text.clone(), symbol));
            for method in &tr.methods {
                let method_symbol =
                    resolution.new_symbol(site_symbol(&method.name, SymbolKind::Method));
                resolution.bind(scope, &method.name.text, method_symbol);
                resolution.decl_symbols.insert(method.id, method_symbol);
                exports.push((method.name.text.clone(), method_symbol));
            }
        }
        Decl::Impl(im) => {
            for method in &im.methods {
                // A method implementing a trait signature keeps the
                // signature as its declaration site and gains the impl as
                // its definition site.
                let existing = resolution
                    .lookup(scope, &method.name.text)
                    .filter(|id| resolution.symbol(*id).kind == SymbolKind::Method);
                let symbol = match existing {
                    Some(id) => {
                        resolution.symbol_mut(id).def = method.name.location;
                        id
                    }
                    None => {
                        let id =
                            resolution.new_symbol(site_symbol(&method.name, SymbolKind::Method));
                        resolution.bind(scope, &method.name.text, id);
                        exports.push((method.name.text.clone(), id));
                        id
                    }
                };
                resolution.decl_symbols.insert(method.id, symbol);
            }
        }
    }
}

fn resolve_decl_body(resolution: &mut Resolution, scope: ScopeId, decl: &Decl) {
    match decl {
        Decl::Var(var) => resolve_expr(resolution, scope, &var.init),
        Decl::Fun(fun) => resolve_fun_body(resolution, scope, fun),
        Decl::Type(TypeDecl { .. }) => {}
        Decl::Trait(tr) => {
            for method in &tr.methods {
                resolve_fun_body(resolution, scope, method);
            }
        }
        Decl::Impl(im) => {
            for method in &im.methods {
                resolve_fun_body(resolution, scope, method);
            }
        }
    }
}

fn resolve_fun_body(resolution: &mut Resolution, scope: ScopeId, fun: &FunDecl) {
    let Some(body) = &fun.body else {
        return;
    };
    let fun_scope = resolution.new_scope(Some(scope));
    for param in &fun.params {
        let symbol = resolution.new_symbol(site_symbol(&param.name, SymbolKind::Parameter));
        resolution.bind(fun_scope, &param.name.text, symbol);
        resolution.decl_symbols.insert(param.id, symbol);
    }
    resolve_expr(resolution, fun_scope, body);
}

fn resolve_stmt(resolution: &mut Resolution, scope: ScopeId, stmt: &Stmt) {
    match stmt {
        Stmt::Decl(Decl::Var(var)) => {
            // The initializer resolves against the outer binding, if any.
            resolve_expr(resolution, scope, &var.init);
            let symbol = resolution.new_symbol(site_symbol(&var.name, SymbolKind::Variable));
            resolution.bind(scope, &var.name.text, symbol);
            resolution.decl_symbols.insert(var.id, symbol);
        }
        Stmt::Decl(Decl::Fun(fun)) => {
            let symbol = resolution.new_symbol(site_symbol(&fun.name, SymbolKind::Function));
            resolution.bind(scope, &fun.name.text, symbol);
            resolution.decl_symbols.insert(fun.id, symbol);
            resolve_fun_body(resolution, scope, fun);
        }
        Stmt::Decl(_) => {}
        Stmt::Expr(expr) => resolve_expr(resolution, scope, expr),
        Stmt::Assign { target, value } => {
            resolve_expr(resolution, scope, target);
            resolve_expr(resolution, scope, value);
        }
        Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
            if let Some(value) = value {
                resolve_expr(resolution, scope, value);
            }
        }
    }
}

fn resolve_expr(resolution: &mut Resolution, scope: ScopeId, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Var(_) => {
            resolution.scope_of.insert(expr.id, scope);
        }
        ExprKind::Field { base, .. } => resolve_expr(resolution, scope, base),
        ExprKind::Call { callee, args } => {
            resolve_expr(resolution, scope, callee);
            for arg in args {
                resolve_expr(resolution, scope, arg);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            resolve_expr(resolution, scope, lhs);
            resolve_expr(resolution, scope, rhs);
        }
        ExprKind::Unary { operand, .. }
        | ExprKind::Deref { operand, .. }
        | ExprKind::AddressOf { operand, .. } => resolve_expr(resolution, scope, operand),
        ExprKind::If { cond, then_branch, else_branch } => {
            resolve_expr(resolution, scope, cond);
            resolve_expr(resolution, scope, then_branch);
            if let Some(else_branch) = else_branch {
                resolve_expr(resolution, scope, else_branch);
            }
        }
        ExprKind::Match { scrutinee, arms } => {
            resolve_expr(resolution, scope, scrutinee);
            for arm in arms {
                // Every arm is its own lexical scope.
                let arm_scope = resolution.new_scope(Some(scope));
                resolve_pattern(resolution, arm_scope, &arm.pattern);
                resolve_expr(resolution, arm_scope, &arm.body);
            }
        }
        ExprKind::Block { stmts, tail, .. } => {
            let block_scope = resolution.new_scope(Some(scope));
            for stmt in stmts {
                resolve_stmt(resolution, block_scope, stmt);
            }
            if let Some(tail) = tail {
                resolve_expr(resolution, block_scope, tail);
            }
        }
        ExprKind::CompoundInit { fields, .. } => {
            resolution.scope_of.insert(expr.id, scope);
            for field in fields {
                if let Some(value) = &field.value {
                    resolve_expr(resolution, scope, value);
                }
            }
        }
        ExprKind::Cast { operand, .. } => resolve_expr(resolution, scope, operand),
    }
}

fn resolve_pattern(resolution: &mut Resolution, scope: ScopeId, pattern: &Pattern) {
    match &pattern.kind {
        PatternKind::Binding(name) => {
            let symbol = resolution.new_symbol(site_symbol(name, SymbolKind::Variable));
            resolution.bind(scope, &name.text, symbol);
            resolution.decl_symbols.insert(pattern.id, symbol);
        }
        PatternKind::Discard(_) | PatternKind::Literal(_) => {}
        PatternKind::Variant { inner, .. } => {
            if let Some(inner) = inner {
                resolve_pattern(resolution, scope, inner);
            }
        }
        PatternKind::Struct { fields, .. } => {
            resolution.scope_of.insert(pattern.id, scope);
            for (_, field_pattern) in fields {
                resolve_pattern(resolution, scope, field_pattern);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{lex, UnitId};
    use crate::parser::parse_module;

    fn resolve_source(sources: &[(&str, &str)]) -> (Vec<Module>, Resolution) {
        let mut modules = Vec::new();
        let mut next_id = 0;
        for (index, (name, source)) in sources.iter().enumerate() {
            let unit = UnitId(index as u32);
            let tokens = lex(unit, source).expect("lexes");
            let (module, next) = parse_module(*name, unit, &tokens, next_id).expect("parses");
            next_id = next;
            modules.push(module);
        }
        let resolution = resolve(&modules);
        (modules, resolution)
    }

    fn var_access_ids(module: &Module) -> Vec<(NodeId, String)> {
        fn walk_expr(expr: &Expr, out: &mut Vec<(NodeId, String)>) {
            match &expr.kind {
                ExprKind::Var(token) => out.push((expr.id, token.text.clone())),
                ExprKind::Field { base, .. } => walk_expr(base, out),
                ExprKind::Call { callee, args } => {
                    walk_expr(callee, out);
                    args.iter().for_each(|a| walk_expr(a, out));
                }
                ExprKind::Binary { lhs, rhs, .. } => {
                    walk_expr(lhs, out);
                    walk_expr(rhs, out);
                }
                ExprKind::Unary { operand, .. }
                | ExprKind::Deref { operand, .. }
                | ExprKind::AddressOf { operand, .. } => walk_expr(operand, out),
                ExprKind::If { cond, then_branch, else_branch } => {
                    walk_expr(cond, out);
                    walk_expr(then_branch, out);
                    if let Some(e) = else_branch {
                        walk_expr(e, out);
                    }
                }
                ExprKind::Match { scrutinee, arms } => {
                    walk_expr(scrutinee, out);
                    arms.iter().for_each(|arm| walk_expr(&arm.body, out));
                }
                ExprKind::Block { stmts, tail, .. } => {
                    for stmt in stmts {
                        match stmt {
                            Stmt::Decl(Decl::Var(var)) => walk_expr(&var.init, out),
                            Stmt::Decl(Decl::Fun(fun)) => {
                                if let Some(body) = &fun.body {
                                    walk_expr(body, out);
                                }
                            }
                            Stmt::Decl(_) => {}
                            Stmt::Expr(e) => walk_expr(e, out),
                            Stmt::Assign { target, value } => {
                                walk_expr(target, out);
                                walk_expr(value, out);
                            }
                            Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
                                if let Some(v) = value {
                                    walk_expr(v, out);
                                }
                            }
                        }
                    }
                    if let Some(tail) = tail {
                        walk_expr(tail, out);
                    }
                }
                ExprKind::CompoundInit { fields, .. } => {
                    for field in fields {
                        if let Some(value) = &field.value {
                            walk_expr(value, out);
                        }
                    }
                }
                ExprKind::Cast { operand, .. } => walk_expr(operand, out),
                ExprKind::Literal(_) => {}
            }
        }

        let mut out = Vec::new();
        for decl in &module.decls {
            match decl {
                Decl::Var(var) => walk_expr(&var.init, &mut out),
                Decl::Fun(fun) => {
                    if let Some(body) = &fun.body {
                        walk_expr(body, &mut out);
                    }
                }
                Decl::Impl(im) => {
                    for method in &im.methods {
                        if let Some(body) = &method.body {
                            walk_expr(body, &mut out);
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }

    #[test]
    fn parameters_resolve_inside_function_bodies() {
        let (modules, resolution) =
            resolve_source(&[("Main", "fun twice(x: Int) -> Int { x + x }")]);
        let accesses = var_access_ids(&modules[0]);
        assert_eq!(accesses.len(), 2);
        for (node, name) in accesses {
            let symbol = resolution.find_decl_for_usage(node, &name).expect("resolves");
            assert_eq!(resolution.symbol(symbol).kind, SymbolKind::Parameter);
        }
    }

    #[test]
    fn module_locals_shadow_imports() {
        let (modules, resolution) = resolve_source(&[
            ("Lib", "var shared = 1;"),
            ("Main", "import Lib;\nvar shared = 2;\nvar use_it = shared;"),
        ]);
        let accesses = var_access_ids(&modules[1]);
        let (node, name) = accesses.first().expect("one access");
        let symbol = resolution.find_decl_for_usage(*node, name).expect("resolves");
        // The local declaration on line 1 wins over the imported one.
        assert_eq!(resolution.symbol(symbol).decl.line, 1);
    }

    #[test]
    fn imported_functions_resolve_to_their_home_unit() {
        let (modules, resolution) = resolve_source(&[
            ("Lib", "fun helper() -> Int { 1 }"),
            ("Main", "import Lib;\nvar x = helper();"),
        ]);
        let accesses = var_access_ids(&modules[1]);
        let (node, name) = accesses.first().expect("one access");
        let symbol = resolution.find_decl_for_usage(*node, name).expect("resolves");
        assert_eq!(resolution.symbol(symbol).decl.unit, UnitId(0));
        assert_eq!(resolution.symbol(symbol).kind, SymbolKind::Function);
    }

    #[test]
    fn import_does_not_leak_transitively() {
        let (modules, resolution) = resolve_source(&[
            ("Base", "fun deep() -> Int { 0 }"),
            ("Mid", "import Base;\nfun shallow() -> Int { deep() }"),
            ("Main", "import Mid;\nvar x = deep();"),
        ]);
        let accesses = var_access_ids(&modules[2]);
        let (node, name) = accesses.first().expect("one access");
        assert!(resolution.find_decl_for_usage(*node, name).is_none());
    }

    #[test]
    fn match_arms_get_their_own_scope() {
        let (modules, resolution) = resolve_source(&[(
            "Main",
            "type Shape = sum { Circle: Int, Square: Int };\n\
             fun pick(s: Shape) -> Int {\n\
               match s { Circle(r) => r, Square(w) => w }\n\
             }",
        )]);
        let accesses = var_access_ids(&modules[0]);
        // `s`, `r`, `w`: every one resolves, and `r`/`w` to distinct symbols.
        let resolved: Vec<SymbolId> = accesses
            .iter()
            .map(|(node, name)| resolution.find_decl_for_usage(*node, name).expect("resolves"))
            .collect();
        assert_eq!(resolved.len(), 3);
        assert_ne!(resolved[1], resolved[2]);
    }

    #[test]
    fn impl_method_links_declaration_to_trait_signature() {
        let (_, resolution) = resolve_source(&[(
            "Main",
            "type Point = struct { x: Int };\n\
             trait Show { fun show(p: Point) -> String; }\n\
             impl Show for Point { fun show(p: Point) -> String { \"p\" } }",
        )]);
        let method = resolution
            .symbols()
            .iter()
            .find(|s| s.name == "show" && s.kind == SymbolKind::Method)
            .expect("method symbol");
        assert_eq!(method.decl.line, 1);
        assert_eq!(method.def.line, 2);
        assert_ne!(method.decl, method.def);
    }

    #[test]
    fn module_name_binds_as_module_symbol() {
        let (_, resolution) = resolve_source(&[
            ("Lib", "var v = 1;"),
            ("Main", "import Lib;\nvar x = 2;"),
        ]);
        let module_symbol = resolution
            .symbols()
            .iter()
            .find(|s| s.kind == SymbolKind::Module)
            .expect("module symbol");
        assert_eq!(module_symbol.name, "Lib");
        assert_eq!(module_symbol.module_name.as_deref(), Some("Lib"));
    }
}
