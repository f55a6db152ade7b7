use crate::ast::{
    Decl, Expr, ExprKind, FieldInit, FunDecl, Import, MatchArm, MemberDecl, Module, NodeId, Param,
    Pattern, PatternKind, Stmt, TraitDecl, TypeBody, TypeDecl, TypeExpr, VarDecl, VariantDecl,
    ImplDecl,
};
use crate::error::CompileError;
use crate::lexer::{Token, TokenKind, UnitId};

/// Parses one module. `first_id` seeds the node-id counter so ids stay
/// unique across every module of a compilation; the next free id is
/// returned alongside the module. The first syntax error aborts the parse.
pub fn parse_module(
    name: impl Into<String>,
    unit: UnitId,
    tokens: &[Token],
    first_id: NodeId,
) -> Result<(Module, NodeId), CompileError> {
    let mut parser = Parser { tokens, pos: 0, next_id: first_id };

    let mut imports = Vec::new();
    while parser.at("import") {
        parser.advance();
        let name = parser.expect_ident()?;
        parser.expect(";")?;
        imports.push(Import { name });
    }

    let mut decls = Vec::new();
    while parser.peek().kind != TokenKind::Eof {
        decls.push(parser.decl()?);
    }

    let module = Module { name: name.into(), unit, imports, decls };
    Ok((module, parser.next_id))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    next_id: NodeId,
}

impl<'a> Parser<'a> {
    fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    fn eat(&mut self, text: &str) -> Option<Token> {
        if self.at(text) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, text: &str) -> Result<Token, CompileError> {
        if self.at(text) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected '{}', found '{}'", text, self.describe_peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<Token, CompileError> {
        let token = self.peek();
        if token.kind == TokenKind::Ident && !crate::lexer::is_keyword(&token.text) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected a name, found '{}'", self.describe_peek())))
        }
    }

    fn describe_peek(&self) -> String {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            "end of file".to_string()
        } else {
            token.text.clone()
        }
    }

    fn error_here(&self, message: String) -> CompileError {
        CompileError::located(message, self.peek().location)
    }

    // Declarations

    fn decl(&mut self) -> Result<Decl, CompileError> {
        if self.at("var") {
            return Ok(Decl::Var(self.var_decl()?));
        }
        if self.at("fun") {
            return Ok(Decl::Fun(self.fun_decl()?));
        }
        if self.at("type") {
            return Ok(Decl::Type(self.type_decl()?));
        }
        if self.at("trait") {
            return Ok(Decl::Trait(self.trait_decl()?));
        }
        if self.at("impl") {
            return Ok(Decl::Impl(self.impl_decl()?));
        }
        Err(self.error_here(format!("expected a declaration, found '{}'", self.describe_peek())))
    }

    fn var_decl(&mut self) -> Result<VarDecl, CompileError> {
        self.expect("var")?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        let ty = if self.eat(":").is_some() { Some(self.type_expr()?) } else { None };
        self.expect("=")?;
        let init = self.expr()?;
        self.expect(";")?;
        Ok(VarDecl { id, name, ty, init })
    }

    fn fun_decl(&mut self) -> Result<FunDecl, CompileError> {
        self.expect("fun")?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        self.expect("(")?;
        let mut params = Vec::new();
        while !self.at(")") {
            let param_id = self.fresh_id();
            let param_name = self.expect_ident()?;
            let param_ty = if self.eat(":").is_some() { Some(self.type_expr()?) } else { None };
            params.push(Param { id: param_id, name: param_name, ty: param_ty });
            if self.eat(",").is_none() {
                break;
            }
        }
        self.expect(")")?;
        let ret = if self.eat("->").is_some() { Some(self.type_expr()?) } else { None };
        let body = if self.at("{") {
            Some(self.block()?)
        } else {
            self.expect(";")?;
            None
        };
        Ok(FunDecl { id, name, params, ret, body })
    }

    fn type_decl(&mut self) -> Result<TypeDecl, CompileError> {
        self.expect("type")?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        self.expect("=")?;
        let body = if self.at("struct") {
            self.advance();
            self.expect("{")?;
            let mut members = Vec::new();
            while !self.at("}") {
                let member_name = self.expect_ident()?;
                self.expect(":")?;
                let member_ty = self.type_expr()?;
                members.push(MemberDecl { name: member_name, ty: member_ty });
                if self.eat(",").is_none() {
                    break;
                }
            }
            self.expect("}")?;
            TypeBody::Struct(members)
        } else if self.at("sum") {
            self.advance();
            self.expect("{")?;
            let mut variants = Vec::new();
            while !self.at("}") {
                let variant_name = self.expect_ident()?;
                let payload = if self.eat(":").is_some() { Some(self.type_expr()?) } else { None };
                variants.push(VariantDecl { name: variant_name, payload });
                if self.eat(",").is_none() {
                    break;
                }
            }
            self.expect("}")?;
            TypeBody::Sum(variants)
        } else {
            TypeBody::Alias(self.type_expr()?)
        };
        self.expect(";")?;
        Ok(TypeDecl { id, name, body })
    }

    fn trait_decl(&mut self) -> Result<TraitDecl, CompileError> {
        self.expect("trait")?;
        let id = self.fresh_id();
        let name = self.expect_ident()?;
        self.expect("{")?;
        let mut methods = Vec::new();
        while !self.at("}") {
            methods.push(self.fun_decl()?);
        }
        self.expect("}")?;
        Ok(TraitDecl { id, name, methods })
    }

    fn impl_decl(&mut self) -> Result<ImplDecl, CompileError> {
        self.expect("impl")?;
        let id = self.fresh_id();
        let trait_name = self.expect_ident()?;
        self.expect("for")?;
        let target = self.type_expr()?;
        self.expect("{")?;
        let mut methods = Vec::new();
        while !self.at("}") {
            methods.push(self.fun_decl()?);
        }
        self.expect("}")?;
        Ok(ImplDecl { id, trait_name, target, methods })
    }

    fn type_expr(&mut self) -> Result<TypeExpr, CompileError> {
        if self.eat("*").is_some() {
            return Ok(TypeExpr::Ptr(Box::new(self.type_expr()?)));
        }
        if self.eat("(").is_some() {
            let mut params = Vec::new();
            while !self.at(")") {
                params.push(self.type_expr()?);
                if self.eat(",").is_none() {
                    break;
                }
            }
            self.expect(")")?;
            self.expect("->")?;
            let ret = Box::new(self.type_expr()?);
            return Ok(TypeExpr::Fun { params, ret });
        }
        let name = self.expect_ident()?;
        Ok(TypeExpr::Name(name))
    }

    // Statements and blocks

    fn block(&mut self) -> Result<Expr, CompileError> {
        let id = self.fresh_id();
        let open = self.expect("{")?;
        let mut stmts = Vec::new();
        let mut tail = None;
        while !self.at("}") {
            if self.at("var") || self.at("fun") {
                stmts.push(Stmt::Decl(self.decl()?));
                continue;
            }
            if self.at("return") || self.at("yield") {
                let kw = self.advance();
                let value = if self.at(";") { None } else { Some(self.expr()?) };
                self.expect(";")?;
                if kw.is("return") {
                    stmts.push(Stmt::Return { kw, value });
                } else {
                    stmts.push(Stmt::Yield { kw, value });
                }
                continue;
            }
            let expr = self.expr()?;
            if self.eat("=").is_some() {
                let value = self.expr()?;
                self.expect(";")?;
                stmts.push(Stmt::Assign { target: expr, value });
                continue;
            }
            if self.eat(";").is_some() {
                stmts.push(Stmt::Expr(expr));
                continue;
            }
            if self.at("}") {
                tail = Some(Box::new(expr));
                break;
            }
            return Err(self.error_here(format!(
                "expected ';' or '}}', found '{}'",
                self.describe_peek()
            )));
        }
        self.expect("}")?;
        Ok(Expr { id, kind: ExprKind::Block { open, stmts, tail } })
    }

    // Expressions, loosest binding first.

    fn expr(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.comparison()?;
        while self.at("as") {
            self.advance();
            let ty = self.type_expr()?;
            let id = self.fresh_id();
            expr = Expr { id, kind: ExprKind::Cast { operand: Box::new(expr), ty } };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.additive()?;
        while ["==", "!=", "<", ">", "<=", ">="].iter().any(|op| self.at(op)) {
            let op = self.advance();
            let rhs = self.additive()?;
            let id = self.fresh_id();
            lhs = Expr {
                id,
                kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.multiplicative()?;
        while self.at("+") || self.at("-") {
            let op = self.advance();
            let rhs = self.multiplicative()?;
            let id = self.fresh_id();
            lhs = Expr {
                id,
                kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        while self.at("*") || self.at("/") {
            let op = self.advance();
            let rhs = self.unary()?;
            let id = self.fresh_id();
            lhs = Expr {
                id,
                kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.at("-") || self.at("!") {
            let op = self.advance();
            let operand = self.unary()?;
            let id = self.fresh_id();
            return Ok(Expr { id, kind: ExprKind::Unary { op, operand: Box::new(operand) } });
        }
        if self.at("*") {
            let star = self.advance();
            let operand = self.unary()?;
            let id = self.fresh_id();
            return Ok(Expr { id, kind: ExprKind::Deref { star, operand: Box::new(operand) } });
        }
        if self.at("&") {
            let amp = self.advance();
            let operand = self.unary()?;
            let id = self.fresh_id();
            return Ok(Expr { id, kind: ExprKind::AddressOf { amp, operand: Box::new(operand) } });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            if self.at("(") {
                self.advance();
                let mut args = Vec::new();
                while !self.at(")") {
                    args.push(self.expr()?);
                    if self.eat(",").is_none() {
                        break;
                    }
                }
                self.expect(")")?;
                let id = self.fresh_id();
                expr = Expr { id, kind: ExprKind::Call { callee: Box::new(expr), args } };
                continue;
            }
            if self.at(".") {
                self.advance();
                let field = self.expect_ident()?;
                let id = self.fresh_id();
                expr = Expr { id, kind: ExprKind::Field { base: Box::new(expr), field } };
                continue;
            }
            return Ok(expr);
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.peek().clone();

        if token.kind == TokenKind::Number
            || token.kind == TokenKind::Str
            || token.is("true")
            || token.is("false")
        {
            self.advance();
            let id = self.fresh_id();
            return Ok(Expr { id, kind: ExprKind::Literal(token) });
        }

        if self.at("(") {
            self.advance();
            let expr = self.expr()?;
            self.expect(")")?;
            return Ok(expr);
        }

        if self.at("if") {
            return self.if_expr();
        }

        if self.at("match") {
            return self.match_expr();
        }

        if self.at("{") {
            return self.block();
        }

        if token.kind == TokenKind::Ident && !crate::lexer::is_keyword(&token.text) {
            // Type names are capitalized, so `Point { .. }` is a compound
            // initializer while `p { .. }` never parses as one (which keeps
            // `if x { .. }` unambiguous).
            if starts_uppercase(&token.text) && self.peek_ahead(1).is("{") {
                return self.compound_init();
            }
            self.advance();
            let id = self.fresh_id();
            return Ok(Expr { id, kind: ExprKind::Var(token) });
        }

        Err(self.error_here(format!("expected an expression, found '{}'", self.describe_peek())))
    }

    fn if_expr(&mut self) -> Result<Expr, CompileError> {
        self.expect("if")?;
        let id = self.fresh_id();
        let cond = self.expr()?;
        let then_branch = self.block()?;
        let else_branch = if self.eat("else").is_some() {
            if self.at("if") {
                Some(Box::new(self.if_expr()?))
            } else {
                Some(Box::new(self.block()?))
            }
        } else {
            None
        };
        Ok(Expr {
            id,
            kind: ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
        })
    }

    fn match_expr(&mut self) -> Result<Expr, CompileError> {
        self.expect("match")?;
        let id = self.fresh_id();
        let scrutinee = self.expr()?;
        self.expect("{")?;
        let mut arms = Vec::new();
        while !self.at("}") {
            let pattern = self.pattern()?;
            self.expect("=>")?;
            let body = self.expr()?;
            arms.push(MatchArm { pattern, body });
            if self.eat(",").is_none() {
                break;
            }
        }
        self.expect("}")?;
        Ok(Expr { id, kind: ExprKind::Match { scrutinee: Box::new(scrutinee), arms } })
    }

    fn compound_init(&mut self) -> Result<Expr, CompileError> {
        let id = self.fresh_id();
        let type_name = self.expect_ident()?;
        self.expect("{")?;
        let mut fields = Vec::new();
        while !self.at("}") {
            let field_name = self.expect_ident()?;
            let value = if self.eat("=").is_some() { Some(self.expr()?) } else { None };
            fields.push(FieldInit { name: field_name, value });
            if self.eat(",").is_none() {
                break;
            }
        }
        self.expect("}")?;
        Ok(Expr { id, kind: ExprKind::CompoundInit { type_name, fields } })
    }

    fn pattern(&mut self) -> Result<Pattern, CompileError> {
        let token = self.peek().clone();

        if token.is("_") {
            self.advance();
            let id = self.fresh_id();
            return Ok(Pattern { id, kind: PatternKind::Discard(token) });
        }

        if token.kind == TokenKind::Number
            || token.kind == TokenKind::Str
            || token.is("true")
            || token.is("false")
        {
            self.advance();
            let id = self.fresh_id();
            return Ok(Pattern { id, kind: PatternKind::Literal(token) });
        }

        if token.kind == TokenKind::Ident && !crate::lexer::is_keyword(&token.text) {
            if starts_uppercase(&token.text) && self.peek_ahead(1).is("{") {
                let id = self.fresh_id();
                let type_name = self.advance();
                self.expect("{")?;
                let mut fields = Vec::new();
                while !self.at("}") {
                    let field_name = self.expect_ident()?;
                    self.expect(":")?;
                    let field_pat = self.pattern()?;
                    fields.push((field_name, field_pat));
                    if self.eat(",").is_none() {
                        break;
                    }
                }
                self.expect("}")?;
                return Ok(Pattern { id, kind: PatternKind::Struct { type_name, fields } });
            }
            if starts_uppercase(&token.text) {
                let id = self.fresh_id();
                let name = self.advance();
                let inner = if self.eat("(").is_some() {
                    let inner = self.pattern()?;
                    self.expect(")")?;
                    Some(Box::new(inner))
                } else {
                    None
                };
                return Ok(Pattern { id, kind: PatternKind::Variant { name, inner } });
            }
            self.advance();
            let id = self.fresh_id();
            return Ok(Pattern { id, kind: PatternKind::Binding(token) });
        }

        Err(self.error_here(format!("expected a pattern, found '{}'", self.describe_peek())))
    }
}

fn starts_uppercase(text: &str) -> bool {
    text.chars().next().is_some_and(|ch| ch.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_ok(source: &str) -> Module {
        let tokens = lex(UnitId(0), source).expect("lexes");
        let (module, _) = parse_module("Test", UnitId(0), &tokens, 0).expect("parses");
        module
    }

    fn parse_err(source: &str) -> CompileError {
        let tokens = lex(UnitId(0), source).expect("lexes");
        parse_module("Test", UnitId(0), &tokens, 0).unwrap_err()
    }

    #[test]
    fn parses_var_declaration() {
        let module = parse_ok("var x = 1;");
        assert_eq!(module.decls.len(), 1);
        let Decl::Var(var) = &module.decls[0] else { panic!("expected var") };
        assert_eq!(var.name.text, "x");
        assert!(matches!(var.init.kind, ExprKind::Literal(_)));
    }

    #[test]
    fn parses_function_with_params_and_body() {
        let module = parse_ok("fun add(a: Int, b: Int) -> Int { a + b }");
        let Decl::Fun(fun) = &module.decls[0] else { panic!("expected fun") };
        assert_eq!(fun.name.text, "add");
        assert_eq!(fun.params.len(), 2);
        assert!(fun.ret.is_some());
        let Some(Expr { kind: ExprKind::Block { tail, .. }, .. }) = &fun.body else {
            panic!("expected block body")
        };
        assert!(tail.is_some());
    }

    #[test]
    fn parses_struct_and_sum_types() {
        let module = parse_ok(
            "type Point = struct { x: Int, y: Int };\n\
             type Shape = sum { Circle: Int, Square };",
        );
        let Decl::Type(point) = &module.decls[0] else { panic!() };
        let TypeBody::Struct(members) = &point.body else { panic!("expected struct") };
        assert_eq!(members.len(), 2);
        let Decl::Type(shape) = &module.decls[1] else { panic!() };
        let TypeBody::Sum(variants) = &shape.body else { panic!("expected sum") };
        assert_eq!(variants.len(), 2);
        assert!(variants[0].payload.is_some());
        assert!(variants[1].payload.is_none());
    }

    #[test]
    fn parses_trait_and_impl() {
        let module = parse_ok(
            "type Point = struct { x: Int };\n\
             trait Show { fun show(p: Point) -> String; }\n\
             impl Show for Point { fun show(p: Point) -> String { \"point\" } }",
        );
        let Decl::Trait(tr) = &module.decls[1] else { panic!("expected trait") };
        assert!(tr.methods[0].body.is_none());
        let Decl::Impl(im) = &module.decls[2] else { panic!("expected impl") };
        assert!(im.methods[0].body.is_some());
    }

    #[test]
    fn compound_initializer_needs_a_capitalized_head() {
        let module = parse_ok(
            "type Point = struct { x: Int };\n\
             fun origin() -> Point { Point { x = 0 } }\n\
             fun pick(p: Point) -> Int { if p.x > 0 { 1 } else { 0 } }",
        );
        assert_eq!(module.decls.len(), 3);
    }

    #[test]
    fn parses_match_with_variant_and_discard_arms() {
        let module = parse_ok(
            "type Shape = sum { Circle: Int, Square: Int };\n\
             fun area(s: Shape) -> Int {\n\
               match s { Circle(r) => r * r, Square(w) => w, _ => 0 }\n\
             }",
        );
        let Decl::Fun(fun) = &module.decls[1] else { panic!() };
        let Some(Expr { kind: ExprKind::Block { tail: Some(tail), .. }, .. }) = &fun.body else {
            panic!()
        };
        let ExprKind::Match { arms, .. } = &tail.kind else { panic!("expected match") };
        assert_eq!(arms.len(), 3);
        assert!(matches!(arms[0].pattern.kind, PatternKind::Variant { .. }));
        assert!(matches!(arms[2].pattern.kind, PatternKind::Discard(_)));
    }

    #[test]
    fn parses_pointer_operations_and_casts() {
        let module = parse_ok(
            "fun peek(p: *Int) -> Int { *p }\n\
             fun cell(x: Int) -> *Int { &x }\n\
             fun widen(x: Int) -> Int { x as Int }",
        );
        assert_eq!(module.decls.len(), 3);
    }

    #[test]
    fn parses_statements_in_blocks() {
        let module = parse_ok(
            "fun main() {\n\
               var x = 1;\n\
               x = x + 1;\n\
               yield x;\n\
               return x;\n\
             }",
        );
        let Decl::Fun(fun) = &module.decls[0] else { panic!() };
        let Some(Expr { kind: ExprKind::Block { stmts, .. }, .. }) = &fun.body else { panic!() };
        assert_eq!(stmts.len(), 4);
        assert!(matches!(stmts[1], Stmt::Assign { .. }));
        assert!(matches!(stmts[2], Stmt::Yield { .. }));
        assert!(matches!(stmts[3], Stmt::Return { .. }));
    }

    #[test]
    fn syntax_error_reports_offending_token() {
        let err = parse_err("fun f( {");
        let location = err.location().expect("located error");
        assert_eq!(location.line, 0);
        // The brace sits at column 7; locations point one past the token.
        assert_eq!(location.column, 8);
    }

    #[test]
    fn imports_precede_declarations() {
        let module = parse_ok("import Geometry;\nimport Io;\nvar x = 1;");
        assert_eq!(module.imports.len(), 2);
        assert_eq!(module.imports[0].name.text, "Geometry");
    }

    #[test]
    fn node_ids_are_unique() {
        let module = parse_ok("fun add(a: Int, b: Int) -> Int { a + b }");
        let mut seen = std::collections::HashSet::new();
        let Decl::Fun(fun) = &module.decls[0] else { panic!() };
        assert!(seen.insert(fun.id));
        for param in &fun.params {
            assert!(seen.insert(param.id));
        }
    }
}
