pub mod ast;
pub mod expr;
pub mod stmt;
pub mod types;

use crate::errors::{CompileError, ParseError, ParseErrorKind};
use crate::lexer::token::{Keyword, Token};
use crate::lexer::tokenize;
use crate::semantic::ids::NodeId;
use crate::span::{FileId, Span, Spanned};
use ast::*;

/// Recursive descent parser for vs source code.
pub struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    next_node: u32,
    /// Struct literals are not allowed in `if`/`while`/`for` headers, where
    /// `{` opens the body.
    no_struct_lit: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Token>>) -> Self {
        let mut tokens = tokens;
        if !matches!(tokens.last().map(|t| &t.node), Some(Token::Eof)) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Spanned::new(Token::Eof, Span::new(end.file, end.end, end.end)));
        }
        Self {
            tokens,
            pos: 0,
            next_node: 0,
            no_struct_lit: false,
        }
    }

    /// Node ids continue from `base`, so ids stay unique across the files
    /// of one compilation.
    pub fn with_node_base(mut self, base: u32) -> Self {
        self.next_node = base;
        self
    }

    pub fn next_node_base(&self) -> u32 {
        self.next_node
    }

    pub fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    // ── Tokens ────────────────────────────────────────────────

    /// `new` guarantees a trailing `Eof`, which every read past the end
    /// lands on.
    fn current(&self) -> &Spanned<Token> {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    pub fn peek(&self) -> &Token {
        &self.current().node
    }

    pub fn peek_span(&self) -> Span {
        self.current().span
    }

    /// `n` tokens past the current one.
    pub fn peek_ahead(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].node
    }

    pub fn advance(&mut self) -> Spanned<Token> {
        let tok = self.current().clone();
        self.pos = (self.pos + 1).min(self.tokens.len());
        tok
    }

    pub fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    pub fn check_keyword(&self, kw: Keyword) -> bool {
        *self.peek() == Token::Keyword(kw)
    }

    pub fn match_token(&mut self, token: &Token) -> bool {
        let hit = self.check(token);
        if hit {
            self.pos += 1;
        }
        hit
    }

    pub fn match_keyword(&mut self, kw: Keyword) -> bool {
        self.match_token(&Token::Keyword(kw))
    }

    pub fn expect(&mut self, token: &Token) -> Result<Spanned<Token>, ParseError> {
        if !self.check(token) {
            return Err(self.error_unexpected(&format!("'{token}'")));
        }
        Ok(self.advance())
    }

    pub fn expect_keyword(&mut self, kw: Keyword) -> Result<Spanned<Token>, ParseError> {
        if !self.check_keyword(kw) {
            return Err(self.error_unexpected(&format!("'{kw}'")));
        }
        Ok(self.advance())
    }

    fn take_name(&mut self, keywords: bool) -> Result<Spanned<String>, ParseError> {
        let name = match self.peek() {
            Token::Ident(name) => name.clone(),
            Token::Keyword(kw) if keywords => kw.as_str().to_string(),
            _ => return Err(self.error_unexpected("identifier")),
        };
        let span = self.advance().span;
        Ok(Spanned::new(name, span))
    }

    pub fn expect_identifier(&mut self) -> Result<Spanned<String>, ParseError> {
        self.take_name(false)
    }

    /// Member names may be keywords, as in `any.type`.
    pub fn expect_name(&mut self) -> Result<Spanned<String>, ParseError> {
        self.take_name(true)
    }

    pub fn at_end(&self) -> bool {
        *self.peek() == Token::Eof
    }

    pub fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1) {
            Some(i) => self.tokens[i].span,
            None => self.peek_span(),
        }
    }

    /// Statement terminator: a `;`, or nothing before a closing `}`.
    pub fn expect_terminator(&mut self) -> Result<(), ParseError> {
        if self.match_token(&Token::Semi) || self.check(&Token::RBrace) {
            Ok(())
        } else {
            Err(self.error_unexpected("';'"))
        }
    }

    // ── Errors ────────────────────────────────────────────────

    pub fn error_unexpected(&self, expected: &str) -> ParseError {
        ParseError {
            kind: ParseErrorKind::UnexpectedToken {
                expected: expected.to_string(),
                got: format!("{}", self.peek()),
            },
            span: self.peek_span(),
        }
    }

    pub fn error_at(&self, span: Span, kind: ParseErrorKind) -> ParseError {
        ParseError { kind, span }
    }

    // ── Module Parsing ────────────────────────────────────────

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let start = self.peek_span();
        let mut items = Vec::new();
        while !self.at_end() {
            if self.match_token(&Token::Semi) {
                continue;
            }
            items.push(self.parse_item()?);
        }
        Ok(Module {
            items,
            span: start.merge(self.peek_span()),
        })
    }

    fn parse_item(&mut self) -> Result<Item, ParseError> {
        match self.peek() {
            Token::Keyword(Keyword::Fn) if matches!(self.peek_ahead(1), Token::Ident(_)) => {
                Ok(Item::Function(self.parse_function()?))
            }
            Token::Keyword(Keyword::Extern) => Ok(Item::Extern(self.parse_extern()?)),
            Token::Keyword(Keyword::Type) => {
                let decl = self.parse_type_decl()?;
                self.match_token(&Token::Semi);
                Ok(Item::TypeDecl(decl))
            }
            Token::Keyword(Keyword::Impl) => Ok(Item::Impl(self.parse_impl()?)),
            Token::Keyword(Keyword::Use) => {
                let start = self.advance().span;
                let package = self.expect_identifier()?;
                self.expect(&Token::Semi)?;
                Ok(Item::Use(UseDecl {
                    package,
                    span: start.merge(self.previous_span()),
                }))
            }
            Token::Ident(_) if self.at_declaration() => Ok(Item::Global(self.parse_declaration()?)),
            _ => Err(self.error_unexpected("top-level declaration")),
        }
    }

    // ── Functions ─────────────────────────────────────────────

    /// `fn name<$T>(params) Ret { body }`
    pub fn parse_function(&mut self) -> Result<FunctionDef, ParseError> {
        let start = self.expect_keyword(Keyword::Fn)?.span;
        let name = self.expect_identifier()?;
        let mut poly_params = Vec::new();
        if self.match_token(&Token::Lt) {
            loop {
                match self.peek().clone() {
                    Token::Poly(p) => {
                        let span = self.advance().span;
                        poly_params.push(Spanned::new(p, span));
                    }
                    _ => return Err(self.error_unexpected("polymorphic type name")),
                }
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Gt)?;
        }
        let params = self.parse_params()?;
        let ret = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            poly_params,
            params,
            ret,
            span: start.merge(body.span),
            body,
        })
    }

    /// `fn(params) Ret { body }` in expression position.
    pub fn parse_function_literal(&mut self) -> Result<FunctionDef, ParseError> {
        let start = self.expect_keyword(Keyword::Fn)?.span;
        let params = self.parse_params()?;
        let ret = self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name: Spanned::new(String::new(), start),
            poly_params: Vec::new(),
            params,
            ret,
            span: start.merge(body.span),
            body,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut params: Vec<Param> = Vec::new();
        while !self.check(&Token::RParen) {
            if let Some(last) = params.last() {
                if last.variadic {
                    return Err(self.error_at(last.span, ParseErrorKind::VariadicNotLast));
                }
            }
            let name = self.expect_identifier()?;
            let variadic = self.match_token(&Token::Ellipsis);
            let ty = self.parse_type()?;
            params.push(Param {
                span: name.span.merge(ty.span),
                name,
                ty,
                variadic,
            });
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    fn parse_return_type(&mut self) -> Result<Option<TypeExpr>, ParseError> {
        if self.check(&Token::LBrace) || self.check(&Token::Semi) {
            return Ok(None);
        }
        self.match_token(&Token::Arrow);
        Ok(Some(self.parse_type()?))
    }

    /// `extern fn name(params) Ret;`
    fn parse_extern(&mut self) -> Result<ExternFn, ParseError> {
        let start = self.expect_keyword(Keyword::Extern)?.span;
        self.expect_keyword(Keyword::Fn)?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        let ret = self.parse_return_type()?;
        self.expect(&Token::Semi)?;
        Ok(ExternFn {
            name,
            params,
            ret,
            span: start.merge(self.previous_span()),
        })
    }

    /// `impl T { fn m(..) { } ... }`
    fn parse_impl(&mut self) -> Result<ImplBlock, ParseError> {
        let start = self.expect_keyword(Keyword::Impl)?.span;
        let target = self.parse_type()?;
        self.expect(&Token::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.match_token(&Token::Semi) {
                continue;
            }
            methods.push(self.parse_function()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(ImplBlock {
            target,
            methods,
            span: start.merge(self.previous_span()),
        })
    }

    /// `type Name <type>`
    pub fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let start = self.expect_keyword(Keyword::Type)?.span;
        let name = self.expect_identifier()?;
        let value = self.parse_type()?;
        Ok(TypeDecl {
            name,
            span: start.merge(value.span),
            value,
        })
    }

    // ── Block Parsing ─────────────────────────────────────────

    pub fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(&Token::LBrace)?.span;
        let saved = self.no_struct_lit;
        self.no_struct_lit = false;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error_unexpected("'}'"));
            }
            if self.match_token(&Token::Semi) {
                continue;
            }
            stmts.push(self.parse_statement()?);
        }
        let end = self.expect(&Token::RBrace)?.span;
        self.no_struct_lit = saved;
        Ok(Block::new(stmts, start.merge(end)))
    }
}

/// Lex and parse one file. Node ids start at `node_base`; the returned
/// counter is the next free id.
pub fn parse_source(
    source: &str,
    file: FileId,
    node_base: u32,
) -> Result<(Module, u32), CompileError> {
    let tokens = tokenize(source, file)?;
    let mut parser = Parser::new(tokens).with_node_base(node_base);
    let module = parser.parse_module()?;
    Ok((module, parser.next_node_base()))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn parse(source: &str) -> Module {
        parse_source(source, FileId(0), 0).expect("parses").0
    }

    pub(crate) fn parse_err(source: &str) -> ParseErrorKind {
        match parse_source(source, FileId(0), 0) {
            Err(CompileError::Parse(e)) => e.kind,
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn function_with_polymorphic_params() {
        let m = parse("fn identity<$T>(x $T) $T { return x }");
        let Item::Function(f) = &m.items[0] else {
            panic!("expected function");
        };
        assert_eq!(f.name.node, "identity");
        assert_eq!(f.poly_params.len(), 1);
        assert!(matches!(f.params[0].ty.kind, TypeExprKind::Poly(ref n) if n == "T"));
        assert!(matches!(
            f.ret.as_ref().map(|t| &t.kind),
            Some(TypeExprKind::Poly(_))
        ));
    }

    #[test]
    fn extern_and_use() {
        let m = parse("use util; extern fn puts(s ptr) int;");
        assert!(matches!(&m.items[0], Item::Use(u) if u.package.node == "util"));
        assert!(matches!(&m.items[1], Item::Extern(e) if e.name.node == "puts"));
    }

    #[test]
    fn impl_block() {
        let m = parse("impl Point { fn norm() int { return self.x } }");
        let Item::Impl(block) = &m.items[0] else {
            panic!("expected impl");
        };
        assert_eq!(block.methods.len(), 1);
        assert!(matches!(block.target.kind, TypeExprKind::Named(ref n) if n == "Point"));
    }

    #[test]
    fn variadic_must_be_last() {
        assert_eq!(
            parse_err("fn f(xs ...int, y int) {}"),
            ParseErrorKind::VariadicNotLast
        );
    }

    #[test]
    fn globals_at_top_level() {
        let m = parse("count := 0; name string;");
        assert_eq!(m.items.len(), 2);
        assert!(m.items.iter().all(|i| matches!(i, Item::Global(_))));
    }

    #[test]
    fn node_ids_continue_from_base() {
        let (_, next) = parse_source("x := 1 + 2;", FileId(0), 10).expect("parses");
        assert_eq!(next, 13);
    }
}
