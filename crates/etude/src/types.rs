use std::collections::HashMap;

use crate::ast::{
    Decl, Expr, ExprKind, FunDecl, Module, NodeId, Pattern, PatternKind, Stmt, TypeBody, TypeExpr,
    VarDecl,
};
use crate::error::CompileError;
use crate::lexer::LexLocation;
use crate::resolver::{Resolution, ScopeId, SymbolId, SymbolKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeDefId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Bool,
    Str,
    Unit,
    Ptr(Box<Type>),
    Named(TypeDefId),
    Fun { params: Vec<Type>, ret: Box<Type> },
    Unknown,
}

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub name: String,
    pub ty: Type,
    pub decl: LexLocation,
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: String,
    pub payload: Option<Type>,
    pub decl: LexLocation,
}

#[derive(Debug, Clone)]
pub enum TypeShape {
    Struct(Vec<MemberInfo>),
    Sum(Vec<VariantInfo>),
    Alias(Type),
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,
    pub decl: LexLocation,
    pub shape: TypeShape,
}

/// Type storage for a whole compilation: named definitions plus the side
/// table mapping expression and pattern nodes to their inferred types.
#[derive(Debug, Default)]
pub struct TypeTable {
    defs: Vec<TypeDef>,
    node_types: HashMap<NodeId, Type>,
    symbol_types: HashMap<SymbolId, Type>,
}

impl TypeTable {
    pub fn def(&self, id: TypeDefId) -> &TypeDef {
        &self.defs[id.0 as usize]
    }

    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.node_types.get(&node)
    }

    pub fn type_of_symbol(&self, symbol: SymbolId) -> Option<&Type> {
        self.symbol_types.get(&symbol)
    }

    /// Follows alias chains down to a structural type.
    pub fn unalias<'t>(&'t self, ty: &'t Type) -> &'t Type {
        let mut current = ty;
        for _ in 0..32 {
            let Type::Named(id) = current else { return current };
            match &self.def(*id).shape {
                TypeShape::Alias(aliased) => current = aliased,
                _ => return current,
            }
        }
        current
    }

    /// Structural definition behind a type, unaliased.
    pub fn shape_of<'t>(&'t self, ty: &'t Type) -> Option<&'t TypeDef> {
        match self.unalias(ty) {
            Type::Named(id) => Some(self.def(*id)),
            _ => None,
        }
    }

    pub fn render(&self, ty: &Type) -> Option<String> {
        match ty {
            Type::Int => Some("Int".to_string()),
            Type::Bool => Some("Bool".to_string()),
            Type::Str => Some("String".to_string()),
            Type::Unit => Some("Unit".to_string()),
            Type::Ptr(inner) => Some(format!("*{}", self.render(inner)?)),
            Type::Named(id) => Some(self.def(*id).name.clone()),
            Type::Fun { params, ret } => {
                let params: Option<Vec<String>> = params.iter().map(|p| self.render(p)).collect();
                Some(format!("({}) -> {}", params?.join(", "), self.render(ret)?))
            }
            Type::Unknown => None,
        }
    }
}

/// Runs the type passes over `modules` (dependency order, target last):
/// collect named definitions, type declaration signatures, then infer
/// bodies. Unknown names in type positions abort with a located error;
/// unresolved value names stay `Unknown` so tooling keeps working on
/// partially broken code.
pub fn infer(modules: &[Module], resolution: &mut Resolution) -> Result<TypeTable, CompileError> {
    let mut table = TypeTable::default();

    // Create every definition first so members may reference types
    // declared later or in another module.
    let mut def_ids: HashMap<NodeId, TypeDefId> = HashMap::new();
    for module in modules {
        for decl in &module.decls {
            if let Decl::Type(ty) = decl {
                let id = TypeDefId(table.defs.len() as u32);
                table.defs.push(TypeDef {
                    name: ty.name.text.clone(),
                    decl: ty.name.location,
                    shape: TypeShape::Alias(Type::Unknown),
                });
                def_ids.insert(ty.id, id);
                if let Some(symbol) = resolution.decl_symbol(ty.id) {
                    resolution.symbol_mut(symbol).type_def = Some(id);
                }
            }
        }
    }

    for module in modules {
        let scope = resolution
            .module_scope(&module.name)
            .expect("module was resolved before type inference");
        for decl in &module.decls {
            if let Decl::Type(ty) = decl {
                let id = def_ids[&ty.id];
                let shape = match &ty.body {
                    TypeBody::Struct(members) => {
                        let mut infos = Vec::new();
                        for member in members {
                            infos.push(MemberInfo {
                                name: member.name.text.clone(),
                                ty: resolve_type_expr(&member.ty, scope, resolution)?,
                                decl: member.name.location,
                            });
                        }
                        TypeShape::Struct(infos)
                    }
                    TypeBody::Sum(variants) => {
                        let mut infos = Vec::new();
                        for variant in variants {
                            let payload = match &variant.payload {
                                Some(ty) => {
                                    Some(resolve_type_expr(ty, scope, resolution)?)
                                }
                                None => None,
                            };
                            infos.push(VariantInfo {
                                name: variant.name.text.clone(),
                                payload,
                                decl: variant.name.location,
                            });
                        }
                        TypeShape::Sum(infos)
                    }
                    TypeBody::Alias(aliased) => {
                        TypeShape::Alias(resolve_type_expr(aliased, scope, resolution)?)
                    }
                };
                table.defs[id.0 as usize].shape = shape;
            }
        }
    }

    for module in modules {
        let scope = resolution.module_scope(&module.name).expect("module was resolved");
        let mut checker =
            Checker { resolution: &mut *resolution, table: &mut table, module_scope: scope };
        checker.module(module)?;
    }

    Ok(table)
}

fn resolve_type_expr(
    te: &TypeExpr,
    scope: ScopeId,
    resolution: &Resolution,
) -> Result<Type, CompileError> {
    match te {
        TypeExpr::Name(token) => match token.text.as_str() {
            "Int" => Ok(Type::Int),
            "Bool" => Ok(Type::Bool),
            "String" => Ok(Type::Str),
            "Unit" => Ok(Type::Unit),
            name => {
                let symbol = resolution
                    .lookup(scope, name)
                    .filter(|id| resolution.symbol(*id).kind == SymbolKind::Type);
                let def = symbol.and_then(|id| resolution.symbol(id).type_def);
                match def {
                    Some(id) => Ok(Type::Named(id)),
                    None => Err(CompileError::located(
                        format!("unknown type name '{name}'"),
                        token.location,
                    )),
                }
            }
        },
        TypeExpr::Ptr(inner) => {
            Ok(Type::Ptr(Box::new(resolve_type_expr(inner, scope, resolution)?)))
        }
        TypeExpr::Fun { params, ret } => {
            let params = params
                .iter()
                .map(|p| resolve_type_expr(p, scope, resolution))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = Box::new(resolve_type_expr(ret, scope, resolution)?);
            Ok(Type::Fun { params, ret })
        }
    }
}

struct Checker<'a> {
    resolution: &'a mut Resolution,
    table: &'a mut TypeTable,
    module_scope: ScopeId,
}

impl Checker<'_> {
    fn module(&mut self, module: &Module) -> Result<(), CompileError> {
        // Signatures first so call sites can see them regardless of order.
        for decl in &module.decls {
            match decl {
                Decl::Fun(fun) => self.fun_signature(fun)?,
                Decl::Trait(tr) => {
                    for method in &tr.methods {
                        self.fun_signature(method)?;
                    }
                }
                Decl::Impl(im) => {
                    for method in &im.methods {
                        self.fun_signature(method)?;
                    }
                }
                Decl::Var(var) => {
                    if let Some(annotation) = &var.ty {
                        let ty = self.resolve(annotation)?;
                        self.assign_symbol(var.id, ty);
                    }
                }
                Decl::Type(_) => {}
            }
        }

        for decl in &module.decls {
            match decl {
                Decl::Var(var) => self.var_decl(var)?,
                Decl::Fun(fun) => self.fun_body(fun)?,
                Decl::Trait(tr) => {
                    for method in &tr.methods {
                        self.fun_body(method)?;
                    }
                }
                Decl::Impl(im) => {
                    for method in &im.methods {
                        self.fun_body(method)?;
                    }
                }
                Decl::Type(_) => {}
            }
        }
        Ok(())
    }

    fn resolve(&self, te: &TypeExpr) -> Result<Type, CompileError> {
        resolve_type_expr(te, self.module_scope, self.resolution)
    }

    fn assign_symbol(&mut self, decl_node: NodeId, ty: Type) {
        let Some(symbol) = self.resolution.decl_symbol(decl_node) else {
            return;
        };
        if let Some(repr) = self.table.render(&ty) {
            self.resolution.symbol_mut(symbol).type_repr = Some(repr);
        }
        self.table.symbol_types.insert(symbol, ty);
    }

    fn fun_signature(&mut self, fun: &FunDecl) -> Result<(), CompileError> {
        let mut params = Vec::new();
        for param in &fun.params {
            let ty = match &param.ty {
                Some(annotation) => self.resolve(annotation)?,
                None => Type::Unknown,
            };
            self.assign_symbol(param.id, ty.clone());
            params.push(ty);
        }
        let ret = match &fun.ret {
            Some(annotation) => self.resolve(annotation)?,
            None => Type::Unit,
        };
        self.assign_symbol(fun.id, Type::Fun { params, ret: Box::new(ret) });
        Ok(())
    }

    fn var_decl(&mut self, var: &VarDecl) -> Result<(), CompileError> {
        let init_ty = self.expr(&var.init)?;
        let ty = match &var.ty {
            Some(annotation) => self.resolve(annotation)?,
            None => init_ty,
        };
        self.assign_symbol(var.id, ty);
        Ok(())
    }

    fn fun_body(&mut self, fun: &FunDecl) -> Result<(), CompileError> {
        if let Some(body) = &fun.body {
            self.expr(body)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Decl(Decl::Var(var)) => self.var_decl(var)?,
            Stmt::Decl(Decl::Fun(fun)) => {
                self.fun_signature(fun)?;
                self.fun_body(fun)?;
            }
            Stmt::Decl(_) => {}
            Stmt::Expr(expr) => {
                self.expr(expr)?;
            }
            Stmt::Assign { target, value } => {
                self.expr(target)?;
                self.expr(value)?;
            }
            Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        let ty = match &expr.kind {
            ExprKind::Literal(token) => match token.text.as_str() {
                "true" | "false" => Type::Bool,
                _ if token.text.starts_with('"') => Type::Str,
                _ => Type::Int,
            },
            ExprKind::Var(token) => self
                .resolution
                .find_decl_for_usage(expr.id, &token.text)
                .and_then(|symbol| self.table.type_of_symbol(symbol).cloned())
                .unwrap_or(Type::Unknown),
            ExprKind::Field { base, field } => {
                let base_ty = self.expr(base)?;
                self.field_type(base, &base_ty, &field.text)
            }
            ExprKind::Call { callee, args } => {
                let callee_ty = self.expr(callee)?;
                for arg in args {
                    self.expr(arg)?;
                }
                match self.table.unalias(&callee_ty) {
                    Type::Fun { ret, .. } => (**ret).clone(),
                    _ => Type::Unknown,
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                if ["==", "!=", "<", ">", "<=", ">="].iter().any(|cmp| op.is(cmp)) {
                    Type::Bool
                } else {
                    Type::Int
                }
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                if op.is("!") {
                    Type::Bool
                } else {
                    Type::Int
                }
            }
            ExprKind::Deref { operand, .. } => {
                let operand_ty = self.expr(operand)?;
                match self.table.unalias(&operand_ty) {
                    Type::Ptr(inner) => (**inner).clone(),
                    _ => Type::Unknown,
                }
            }
            ExprKind::AddressOf { operand, .. } => {
                let operand_ty = self.expr(operand)?;
                Type::Ptr(Box::new(operand_ty))
            }
            ExprKind::If { cond, then_branch, else_branch } => {
                self.expr(cond)?;
                let then_ty = self.expr(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.expr(else_branch)?;
                    then_ty
                } else {
                    Type::Unit
                }
            }
            ExprKind::Match { scrutinee, arms } => {
                let scrutinee_ty = self.expr(scrutinee)?;
                let mut result = Type::Unknown;
                for arm in arms {
                    self.pattern(&arm.pattern, &scrutinee_ty);
                    let body_ty = self.expr(&arm.body)?;
                    if result == Type::Unknown {
                        result = body_ty;
                    }
                }
                result
            }
            ExprKind::Block { stmts, tail, .. } => {
                for stmt in stmts {
                    self.stmt(stmt)?;
                }
                match tail {
                    Some(tail) => self.expr(tail)?,
                    None => Type::Unit,
                }
            }
            ExprKind::CompoundInit { type_name, fields } => {
                for field in fields {
                    if let Some(value) = &field.value {
                        self.expr(value)?;
                    }
                }
                self.resolution
                    .find_decl_for_usage(expr.id, &type_name.text)
                    .filter(|id| self.resolution.symbol(*id).kind == SymbolKind::Type)
                    .and_then(|id| self.resolution.symbol(id).type_def)
                    .map(Type::Named)
                    .unwrap_or(Type::Unknown)
            }
            ExprKind::Cast { operand, ty } => {
                self.expr(operand)?;
                self.resolve(ty)?
            }
        };
        self.table.node_types.insert(expr.id, ty.clone());
        Ok(ty)
    }

    /// Member type of `base.field`. Qualified module access resolves the
    /// member through the imported module's scope instead of a struct
    /// member table.
    fn field_type(&self, base: &Expr, base_ty: &Type, field: &str) -> Type {
        if let ExprKind::Var(token) = &base.kind {
            let module = self
                .resolution
                .find_decl_for_usage(base.id, &token.text)
                .map(|id| self.resolution.symbol(id))
                .filter(|record| record.kind == SymbolKind::Module)
                .and_then(|record| record.module_name.clone());
            if let Some(module) = module {
                return self
                    .resolution
                    .module_scope(&module)
                    .and_then(|scope| self.resolution.lookup(scope, field))
                    .and_then(|symbol| self.table.type_of_symbol(symbol).cloned())
                    .unwrap_or(Type::Unknown);
            }
        }
        match self.table.shape_of(base_ty).map(|def| &def.shape) {
            Some(TypeShape::Struct(members)) => members
                .iter()
                .find(|member| member.name == field)
                .map(|member| member.ty.clone())
                .unwrap_or(Type::Unknown),
            _ => Type::Unknown,
        }
    }

    fn pattern(&mut self, pattern: &Pattern, expected: &Type) {
        self.table.node_types.insert(pattern.id, expected.clone());
        match &pattern.kind {
            PatternKind::Binding(_) => {
                if let Some(symbol) = self.resolution.decl_symbol(pattern.id) {
                    if let Some(repr) = self.table.render(expected) {
                        self.resolution.symbol_mut(symbol).type_repr = Some(repr);
                    }
                    self.table.symbol_types.insert(symbol, expected.clone());
                }
            }
            PatternKind::Discard(_) | PatternKind::Literal(_) => {}
            PatternKind::Variant { name, inner } => {
                if let Some(inner) = inner {
                    let payload = match self.table.shape_of(expected).map(|def| &def.shape) {
                        Some(TypeShape::Sum(variants)) => variants
                            .iter()
                            .find(|variant| variant.name == name.text)
                            .and_then(|variant| variant.payload.clone())
                            .unwrap_or(Type::Unknown),
                        _ => Type::Unknown,
                    };
                    self.pattern(inner, &payload);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (field_name, field_pattern) in fields {
                    let member_ty = match self.table.shape_of(expected).map(|def| &def.shape) {
                        Some(TypeShape::Struct(members)) => members
                            .iter()
                            .find(|member| member.name == field_name.text)
                            .map(|member| member.ty.clone())
                            .unwrap_or(Type::Unknown),
                        _ => Type::Unknown,
                    };
                    self.pattern(field_pattern, &member_ty);
                }
            }
        }
    }
}
