use crate::ast::{
    Decl, Expr, ExprKind, FieldInit, FunDecl, ImplDecl, MatchArm, Module, Pattern, PatternKind,
    Stmt, TraitDecl, TypeDecl, VarDecl,
};
use crate::lexer::Token;

/// Traversal over a compiled module, one hook per node variant. Every hook
/// defaults to walking the node's children in lexical order, so an
/// implementation only overrides the variants it cares about.
pub trait Visitor {
    fn visit_module(&mut self, module: &Module) {
        walk_module(self, module);
    }

    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        walk_var_decl(self, decl);
    }

    fn visit_fun_decl(&mut self, decl: &FunDecl) {
        walk_fun_decl(self, decl);
    }

    fn visit_type_decl(&mut self, _decl: &TypeDecl) {}

    fn visit_trait_decl(&mut self, decl: &TraitDecl) {
        walk_trait_decl(self, decl);
    }

    fn visit_impl_decl(&mut self, decl: &ImplDecl) {
        walk_impl_decl(self, decl);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_literal(&mut self, _expr: &Expr, _token: &Token) {}

    fn visit_var_access(&mut self, _expr: &Expr, _name: &Token) {}

    fn visit_field_access(&mut self, _expr: &Expr, base: &Expr, _field: &Token) {
        self.visit_expr(base);
    }

    fn visit_call(&mut self, _expr: &Expr, callee: &Expr, args: &[Expr]) {
        self.visit_expr(callee);
        for arg in args {
            self.visit_expr(arg);
        }
    }

    fn visit_binary(&mut self, _expr: &Expr, lhs: &Expr, rhs: &Expr) {
        self.visit_expr(lhs);
        self.visit_expr(rhs);
    }

    fn visit_unary(&mut self, _expr: &Expr, operand: &Expr) {
        self.visit_expr(operand);
    }

    fn visit_deref(&mut self, _expr: &Expr, operand: &Expr) {
        self.visit_expr(operand);
    }

    fn visit_addressof(&mut self, _expr: &Expr, operand: &Expr) {
        self.visit_expr(operand);
    }

    fn visit_if(&mut self, _expr: &Expr, cond: &Expr, then_branch: &Expr, else_branch: Option<&Expr>) {
        self.visit_expr(cond);
        self.visit_expr(then_branch);
        if let Some(else_branch) = else_branch {
            self.visit_expr(else_branch);
        }
    }

    fn visit_match(&mut self, _expr: &Expr, scrutinee: &Expr, arms: &[MatchArm]) {
        self.visit_expr(scrutinee);
        for arm in arms {
            self.visit_pattern(&arm.pattern);
            self.visit_expr(&arm.body);
        }
    }

    fn visit_block(&mut self, _expr: &Expr, stmts: &[Stmt], tail: Option<&Expr>) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
        if let Some(tail) = tail {
            self.visit_expr(tail);
        }
    }

    fn visit_compound_init(&mut self, _expr: &Expr, _type_name: &Token, fields: &[FieldInit]) {
        for field in fields {
            if let Some(value) = &field.value {
                self.visit_expr(value);
            }
        }
    }

    fn visit_cast(&mut self, _expr: &Expr, operand: &Expr) {
        self.visit_expr(operand);
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        walk_pattern(self, pattern);
    }

    fn visit_binding_pat(&mut self, _pattern: &Pattern, _name: &Token) {}

    fn visit_discard_pat(&mut self, _pattern: &Pattern) {}

    fn visit_literal_pat(&mut self, _pattern: &Pattern) {}

    fn visit_variant_pat(&mut self, _pattern: &Pattern, _name: &Token, inner: Option<&Pattern>) {
        if let Some(inner) = inner {
            self.visit_pattern(inner);
        }
    }

    fn visit_struct_pat(&mut self, _pattern: &Pattern, fields: &[(Token, Pattern)]) {
        for (_, field_pattern) in fields {
            self.visit_pattern(field_pattern);
        }
    }
}

pub fn walk_module<V: Visitor + ?Sized>(v: &mut V, module: &Module) {
    for decl in &module.decls {
        v.visit_decl(decl);
    }
}

pub fn walk_decl<V: Visitor + ?Sized>(v: &mut V, decl: &Decl) {
    match decl {
        Decl::Var(var) => v.visit_var_decl(var),
        Decl::Fun(fun) => v.visit_fun_decl(fun),
        Decl::Type(ty) => v.visit_type_decl(ty),
        Decl::Trait(tr) => v.visit_trait_decl(tr),
        Decl::Impl(im) => v.visit_impl_decl(im),
    }
}

pub fn walk_var_decl<V: Visitor + ?Sized>(v: &mut V, decl: &VarDecl) {
    v.visit_expr(&decl.init);
}

pub fn walk_fun_decl<V: Visitor + ?Sized>(v: &mut V, decl: &FunDecl) {
    if let Some(body) = &decl.body {
        v.visit_expr(body);
    }
}

pub fn walk_trait_decl<V: Visitor + ?Sized>(v: &mut V, decl: &TraitDecl) {
    for method in &decl.methods {
        v.visit_fun_decl(method);
    }
}

pub fn walk_impl_decl<V: Visitor + ?Sized>(v: &mut V, decl: &ImplDecl) {
    for method in &decl.methods {
        v.visit_fun_decl(method);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Decl(decl) => v.visit_decl(decl),
        Stmt::Expr(expr) => v.visit_expr(expr),
        Stmt::Assign { target, value } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(token) => v.visit_literal(expr, token),
        ExprKind::Var(name) => v.visit_var_access(expr, name),
        ExprKind::Field { base, field } => v.visit_field_access(expr, base, field),
        ExprKind::Call { callee, args } => v.visit_call(expr, callee, args),
        ExprKind::Binary { lhs, rhs, .. } => v.visit_binary(expr, lhs, rhs),
        ExprKind::Unary { operand, .. } => v.visit_unary(expr, operand),
        ExprKind::Deref { operand, .. } => v.visit_deref(expr, operand),
        ExprKind::AddressOf { operand, .. } => v.visit_addressof(expr, operand),
        ExprKind::If { cond, then_branch, else_branch } => {
            v.visit_if(expr, cond, then_branch, else_branch.as_deref())
        }
        ExprKind::Match { scrutinee, arms } => v.visit_match(expr, scrutinee, arms),
        ExprKind::Block { stmts, tail, .. } => v.visit_block(expr, stmts, tail.as_deref()),
        ExprKind::CompoundInit { type_name, fields } => {
            v.visit_compound_init(expr, type_name, fields)
        }
        ExprKind::Cast { operand, .. } => v.visit_cast(expr, operand),
    }
}

pub fn walk_pattern<V: Visitor + ?Sized>(v: &mut V, pattern: &Pattern) {
    match &pattern.kind {
        PatternKind::Binding(name) => v.visit_binding_pat(pattern, name),
        PatternKind::Discard(_) => v.visit_discard_pat(pattern),
        PatternKind::Literal(_) => v.visit_literal_pat(pattern),
        PatternKind::Variant { name, inner } => {
            v.visit_variant_pat(pattern, name, inner.as_deref())
        }
        PatternKind::Struct { fields, .. } => v.visit_struct_pat(pattern, fields),
    }
}
