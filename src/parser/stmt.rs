use super::ast::*;
use super::Parser;
use crate::errors::{ParseError, ParseErrorKind};
use crate::lexer::token::{Keyword, Token};

impl Parser {
    /// Whether the tokens at the cursor start a variable declaration
    /// (`x T ...` or `x := ...`) rather than an expression.
    pub fn at_declaration(&self) -> bool {
        if !matches!(self.peek(), Token::Ident(_)) {
            return false;
        }
        match self.peek_ahead(1) {
            Token::ColonEq => true,
            Token::Ident(_) | Token::Poly(_) | Token::Quote | Token::Amp | Token::AndAnd => true,
            Token::Keyword(Keyword::Fn) => true,
            Token::LBracket => match self.peek_ahead(2) {
                Token::RBracket => true,
                Token::Int(_) => {
                    matches!(self.peek_ahead(3), Token::RBracket)
                        && self.starts_type(self.peek_ahead(4))
                }
                _ => false,
            },
            _ => false,
        }
    }

    pub fn parse_declaration(&mut self) -> Result<Stmt, ParseError> {
        let name = self.expect_identifier()?;
        let start = name.span;
        let (ty, init) = if self.match_token(&Token::ColonEq) {
            (None, Some(self.parse_expression()?))
        } else {
            let ty = self.parse_type()?;
            let init = if self.match_token(&Token::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            (Some(ty), init)
        };
        let span = start.merge(self.previous_span());
        self.expect_terminator()?;
        Ok(Stmt {
            kind: StmtKind::Decl {
                name,
                ty,
                init,
                var: None,
            },
            span,
        })
    }

    pub fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek_span();
        match self.peek() {
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.check(&Token::Semi) || self.check(&Token::RBrace) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                let span = start.merge(self.previous_span());
                self.expect_terminator()?;
                Ok(Stmt {
                    kind: StmtKind::Return(value),
                    span,
                })
            }
            Token::Keyword(Keyword::Break) => {
                self.advance();
                self.expect_terminator()?;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span: start,
                })
            }
            Token::Keyword(Keyword::Continue) => {
                self.advance();
                self.expect_terminator()?;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span: start,
                })
            }
            Token::Keyword(Keyword::If) => self.parse_if(),
            Token::Keyword(Keyword::While) => {
                self.advance();
                let cond = self.parse_header_expression()?;
                let body = self.parse_block()?;
                Ok(Stmt {
                    span: start.merge(body.span),
                    kind: StmtKind::While { cond, body },
                })
            }
            Token::Keyword(Keyword::For) => self.parse_for(),
            Token::LBrace => {
                let block = self.parse_block()?;
                Ok(Stmt {
                    span: block.span,
                    kind: StmtKind::Block(block),
                })
            }
            Token::Keyword(Keyword::Fn) if matches!(self.peek_ahead(1), Token::Ident(_)) => {
                let def = self.parse_function()?;
                Ok(Stmt {
                    span: def.span,
                    kind: StmtKind::Fn {
                        def: Box::new(def),
                        func: None,
                    },
                })
            }
            Token::Keyword(Keyword::Type) => {
                let decl = self.parse_type_decl()?;
                self.expect_terminator()?;
                Ok(Stmt {
                    span: decl.span,
                    kind: StmtKind::TypeDecl(decl),
                })
            }
            Token::Ident(_) if self.at_declaration() => self.parse_declaration(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.parse_expression()?;
        let start = expr.span;
        if let Token::OpAssign(_) = self.peek() {
            return Err(self.error_at(self.peek_span(), ParseErrorKind::CompoundAssignment));
        }
        if self.match_token(&Token::Eq) {
            if !is_assignable(&expr) {
                return Err(self.error_at(expr.span, ParseErrorKind::InvalidAssignmentTarget));
            }
            let value = self.parse_expression()?;
            let span = start.merge(value.span);
            self.expect_terminator()?;
            return Ok(Stmt {
                kind: StmtKind::Assign {
                    target: expr,
                    value,
                },
                span,
            });
        }
        self.expect_terminator()?;
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect_keyword(Keyword::If)?.span;
        let cond = self.parse_header_expression()?;
        let then_block = self.parse_block()?;
        let else_branch = if self.match_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                let block = self.parse_block()?;
                Some(Box::new(Stmt {
                    span: block.span,
                    kind: StmtKind::Block(block),
                }))
            }
        } else {
            None
        };
        let end = else_branch
            .as_ref()
            .map(|s| s.span)
            .unwrap_or(then_block.span);
        Ok(Stmt {
            kind: StmtKind::If {
                cond,
                then_block,
                else_branch,
            },
            span: start.merge(end),
        })
    }

    /// `for v in xs { }` or `for i, v in xs { }`
    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let start = self.expect_keyword(Keyword::For)?.span;
        let first = self.expect_identifier()?;
        let (index, item) = if self.match_token(&Token::Comma) {
            (Some(first), self.expect_identifier()?)
        } else {
            (None, first)
        };
        self.expect_keyword(Keyword::In)?;
        let iter = self.parse_header_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            span: start.merge(body.span),
            kind: StmtKind::For {
                index,
                item,
                iter,
                body,
                index_var: None,
                item_var: None,
            },
        })
    }

    /// Expression before a `{` body, where struct literals are disabled.
    fn parse_header_expression(&mut self) -> Result<Expr, ParseError> {
        let saved = self.no_struct_lit;
        self.no_struct_lit = true;
        let result = self.parse_expression();
        self.no_struct_lit = saved;
        result
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident { .. } | ExprKind::Dot { .. } | ExprKind::Index { .. } => true,
        ExprKind::Unary { op, .. } => *op == UnaryOp::Deref,
        _ => false,
    }
}
