use crate::lexer::{Token, UnitId};

/// Identity of an AST node within one compilation. Side tables produced by
/// the resolver and the type checker are keyed by it, so nodes themselves
/// stay immutable after parsing.
pub type NodeId = u32;

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub unit: UnitId,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub name: Token,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Var(VarDecl),
    Fun(FunDecl),
    Type(TypeDecl),
    Trait(TraitDecl),
    Impl(ImplDecl),
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: NodeId,
    pub name: Token,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub id: NodeId,
    pub name: Token,
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone)]
pub struct FunDecl {
    pub id: NodeId,
    pub name: Token,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    /// Always a block when present; trait method signatures have none.
    pub body: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub id: NodeId,
    pub name: Token,
    pub body: TypeBody,
}

#[derive(Debug, Clone)]
pub enum TypeBody {
    Struct(Vec<MemberDecl>),
    Sum(Vec<VariantDecl>),
    Alias(TypeExpr),
}

#[derive(Debug, Clone)]
pub struct MemberDecl {
    pub name: Token,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct VariantDecl {
    pub name: Token,
    pub payload: Option<TypeExpr>,
}

#[derive(Debug, Clone)]
pub struct TraitDecl {
    pub id: NodeId,
    pub name: Token,
    pub methods: Vec<FunDecl>,
}

#[derive(Debug, Clone)]
pub struct ImplDecl {
    pub id: NodeId,
    pub trait_name: Token,
    pub target: TypeExpr,
    pub methods: Vec<FunDecl>,
}

#[derive(Debug, Clone)]
pub enum TypeExpr {
    Name(Token),
    Ptr(Box<TypeExpr>),
    Fun { params: Vec<TypeExpr>, ret: Box<TypeExpr> },
}

impl TypeExpr {
    /// Token naming the head of the type, used for error locations.
    pub fn head(&self) -> &Token {
        match self {
            TypeExpr::Name(token) => token,
            TypeExpr::Ptr(inner) => inner.head(),
            TypeExpr::Fun { ret, .. } => ret.head(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Decl(Decl),
    Expr(Expr),
    Assign { target: Expr, value: Expr },
    Return { kw: Token, value: Option<Expr> },
    Yield { kw: Token, value: Option<Expr> },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Token),
    Var(Token),
    Field { base: Box<Expr>, field: Token },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Binary { op: Token, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: Token, operand: Box<Expr> },
    Deref { star: Token, operand: Box<Expr> },
    AddressOf { amp: Token, operand: Box<Expr> },
    If { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Option<Box<Expr>> },
    Match { scrutinee: Box<Expr>, arms: Vec<MatchArm> },
    Block { open: Token, stmts: Vec<Stmt>, tail: Option<Box<Expr>> },
    CompoundInit { type_name: Token, fields: Vec<FieldInit> },
    Cast { operand: Box<Expr>, ty: TypeExpr },
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: Token,
    /// `Point { x }` is shorthand for `x = x`; the value is absent then.
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: NodeId,
    pub kind: PatternKind,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    Binding(Token),
    Discard(Token),
    Literal(Token),
    Variant { name: Token, inner: Option<Box<Pattern>> },
    Struct { type_name: Token, fields: Vec<(Token, Pattern)> },
}

impl Expr {
    /// Token at the start of the expression, used for error locations and
    /// for the outline range of function bodies.
    pub fn first_token(&self) -> &Token {
        match &self.kind {
            ExprKind::Literal(token) | ExprKind::Var(token) => token,
            ExprKind::Field { base, .. } => base.first_token(),
            ExprKind::Call { callee, .. } => callee.first_token(),
            ExprKind::Binary { lhs, .. } => lhs.first_token(),
            ExprKind::Unary { op, .. } => op,
            ExprKind::Deref { star, .. } => star,
            ExprKind::AddressOf { amp, .. } => amp,
            ExprKind::If { cond, .. } => cond.first_token(),
            ExprKind::Match { scrutinee, .. } => scrutinee.first_token(),
            ExprKind::Block { open, .. } => open,
            ExprKind::CompoundInit { type_name, .. } => type_name,
            ExprKind::Cast { operand, .. } => operand.first_token(),
        }
    }
}
