//! Front end of the Etude compiler, sized for tooling: lexing, parsing,
//! name resolution, and type inference over a module graph, plus the
//! compilation driver and AST visitor the language server is built on.
//! There is no code generation here.

pub mod ast;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod types;
pub mod visitor;

pub use ast::{
    Decl, Expr, ExprKind, FieldInit, FunDecl, Import, ImplDecl, MatchArm, MemberDecl, Module,
    NodeId, Param, Pattern, PatternKind, Stmt, TraitDecl, TypeBody, TypeDecl, TypeExpr, VarDecl,
    VariantDecl,
};
pub use driver::{CompilationDriver, DiskLoader, SourceLoader, SourceUnit, STDLIB_ENV};
pub use error::CompileError;
pub use lexer::{lex, LexLocation, Token, TokenKind, UnitId};
pub use parser::parse_module;
pub use resolver::{Resolution, ScopeId, SymbolId, SymbolKind, SymbolRecord};
pub use types::{Type, TypeDef, TypeDefId, TypeShape, TypeTable};
pub use visitor::Visitor;
