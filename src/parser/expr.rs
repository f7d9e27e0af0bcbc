use super::ast::*;
use super::Parser;
use crate::errors::{ParseError, ParseErrorKind};
use crate::lexer::token::{Keyword, Token};
use crate::span::Span;

/// Binary operator and its binding power; higher binds tighter.
fn binary_op(tok: &Token) -> Option<(BinOp, u8)> {
    Some(match tok {
        Token::OrOr => (BinOp::Or, 1),
        Token::AndAnd => (BinOp::And, 2),
        Token::Pipe => (BinOp::BitOr, 3),
        Token::Caret => (BinOp::BitXor, 4),
        Token::Amp => (BinOp::BitAnd, 5),
        Token::EqEq => (BinOp::Eq, 6),
        Token::BangEq => (BinOp::Ne, 6),
        Token::Lt => (BinOp::Lt, 7),
        Token::LtEq => (BinOp::Le, 7),
        Token::Gt => (BinOp::Gt, 7),
        Token::GtEq => (BinOp::Ge, 7),
        Token::Shl => (BinOp::Shl, 8),
        Token::Shr => (BinOp::Shr, 8),
        Token::Plus => (BinOp::Add, 9),
        Token::Minus => (BinOp::Sub, 9),
        Token::Star => (BinOp::Mul, 10),
        Token::Slash => (BinOp::Div, 10),
        Token::Percent => (BinOp::Mod, 10),
        _ => return None,
    })
}

impl Parser {
    fn make_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = self.node_id();
        Expr::new(id, kind, span)
    }

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.merge(rhs.span);
            lhs = self.make_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek_span();
        let op = match self.peek() {
            Token::Bang => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Neg),
            Token::Plus => Some(UnaryOp::Plus),
            Token::Amp => Some(UnaryOp::Ref),
            Token::Star => Some(UnaryOp::Deref),
            Token::AndAnd => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span);
                let inner = self.make_expr(
                    ExprKind::Unary {
                        op: UnaryOp::Ref,
                        operand: Box::new(operand),
                    },
                    span,
                );
                return Ok(self.make_expr(
                    ExprKind::Unary {
                        op: UnaryOp::Ref,
                        operand: Box::new(inner),
                    },
                    span,
                ));
            }
            _ => None,
        };
        let mut expr = match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span);
                self.make_expr(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            None => self.parse_postfix()?,
        };
        while self.match_keyword(Keyword::As) {
            let to = self.parse_type()?;
            let span = expr.span.merge(to.span);
            expr = self.make_expr(
                ExprKind::Cast {
                    expr: Box::new(expr),
                    to,
                },
                span,
            );
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    let mut spread = false;
                    while !self.check(&Token::RParen) {
                        args.push(self.parse_expression()?);
                        if self.match_token(&Token::Ellipsis) {
                            spread = true;
                            break;
                        }
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                    let end = self.expect(&Token::RParen)?.span;
                    let span = expr.span.merge(end);
                    expr = self.make_expr(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            spread,
                            target: CallTarget::Unresolved,
                        },
                        span,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    let start = if self.check(&Token::Colon) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    if self.match_token(&Token::Colon) {
                        let end = if self.check(&Token::RBracket) {
                            None
                        } else {
                            Some(Box::new(self.parse_expression()?))
                        };
                        let close = self.expect(&Token::RBracket)?.span;
                        let span = expr.span.merge(close);
                        expr = self.make_expr(
                            ExprKind::Slice {
                                object: Box::new(expr),
                                start,
                                end,
                            },
                            span,
                        );
                    } else {
                        let close = self.expect(&Token::RBracket)?.span;
                        let span = expr.span.merge(close);
                        let index = match start {
                            Some(index) => index,
                            None => return Err(self.error_unexpected("index expression")),
                        };
                        expr = self.make_expr(
                            ExprKind::Index {
                                object: Box::new(expr),
                                index,
                            },
                            span,
                        );
                    }
                }
                Token::Dot => {
                    self.advance();
                    let field = self.expect_name()?;
                    let span = expr.span.merge(field.span);
                    expr = self.make_expr(
                        ExprKind::Dot {
                            object: Box::new(expr),
                            field,
                            access: Access::Unresolved,
                        },
                        span,
                    );
                }
                Token::LBrace if self.at_struct_literal(&expr) => {
                    expr = self.parse_struct_literal(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `Name{` followed by `}` or `field:` starts a struct literal.
    fn at_struct_literal(&self, expr: &Expr) -> bool {
        if self.no_struct_lit || !matches!(expr.kind, ExprKind::Ident { .. }) {
            return false;
        }
        match self.peek_ahead(1) {
            Token::RBrace => true,
            Token::Ident(_) | Token::Keyword(_) => matches!(self.peek_ahead(2), Token::Colon),
            _ => false,
        }
    }

    fn parse_struct_literal(&mut self, name: Expr) -> Result<Expr, ParseError> {
        let ExprKind::Ident { name: type_name, .. } = &name.kind else {
            return Err(self.error_unexpected("type name"));
        };
        let ty = TypeExpr::named(type_name, name.span);
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            let field = self.expect_name()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expression()?;
            fields.push((field, value));
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        let end = self.expect(&Token::RBrace)?.span;
        Ok(self.make_expr(ExprKind::StructLit { ty, fields }, name.span.merge(end)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.peek_span();
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Int(n), span))
            }
            Token::Float(x) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Float(x), span))
            }
            Token::Str(s) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Str(s), span))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Bool(true), span))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Bool(false), span))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Ident { name, var: None }, span))
            }
            Token::LParen => {
                self.advance();
                let saved = self.no_struct_lit;
                self.no_struct_lit = false;
                let mut inner = self.parse_expression()?;
                self.no_struct_lit = saved;
                let end = self.expect(&Token::RParen)?.span;
                inner.span = span.merge(end);
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                while !self.check(&Token::RBracket) {
                    elems.push(self.parse_expression()?);
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                }
                let end = self.expect(&Token::RBracket)?.span;
                Ok(self.make_expr(ExprKind::ArrayLit { elems }, span.merge(end)))
            }
            Token::Keyword(Keyword::New) => {
                self.advance();
                let ty = self.parse_type()?;
                let full = span.merge(ty.span);
                Ok(self.make_expr(ExprKind::New { ty, target: None }, full))
            }
            Token::Directive(name) => {
                if name != "type" {
                    return Err(self.error_at(span, ParseErrorKind::UnknownDirective(name)));
                }
                self.advance();
                self.expect(&Token::LParen)?;
                let ty = self.parse_type()?;
                let end = self.expect(&Token::RParen)?.span;
                Ok(self.make_expr(ExprKind::TypeInfo { ty, target: None }, span.merge(end)))
            }
            Token::Keyword(Keyword::Fn) => {
                let def = self.parse_function_literal()?;
                let full = def.span;
                Ok(self.make_expr(
                    ExprKind::FnLit {
                        def: Box::new(def),
                        func: None,
                    },
                    full,
                ))
            }
            other => Err(self.error_at(span, ParseErrorKind::ExpectedExpression(other.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::span::{FileId, Spanned};

    fn field_names(fields: &[(Spanned<String>, Expr)]) -> Vec<&str> {
        fields.iter().map(|(n, _)| n.node.as_str()).collect()
    }

    fn expr(src: &str) -> Expr {
        let tokens = tokenize(src, FileId(0)).expect("lexes");
        Parser::new(tokens).parse_expression().expect("parses")
    }

    #[test]
    fn precedence() {
        let e = expr("1 + 2 * 3 == 7 && ok");
        let ExprKind::Binary { op: BinOp::And, lhs, .. } = e.kind else {
            panic!("expected &&");
        };
        let ExprKind::Binary { op: BinOp::Eq, lhs, .. } = lhs.kind else {
            panic!("expected ==");
        };
        let ExprKind::Binary { op: BinOp::Add, rhs, .. } = lhs.kind else {
            panic!("expected +");
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn calls_with_spread() {
        let e = expr("f(a, xs...)");
        assert!(matches!(e.kind, ExprKind::Call { ref args, spread: true, .. } if args.len() == 2));
    }

    #[test]
    fn method_call_is_call_on_dot() {
        let e = expr("v.push(1)");
        let ExprKind::Call { callee, .. } = e.kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Dot { ref field, .. } if field.node == "push"));
    }

    #[test]
    fn slices_and_indexes() {
        assert!(matches!(expr("s[1:3]").kind, ExprKind::Slice { start: Some(_), end: Some(_), .. }));
        assert!(matches!(expr("s[:3]").kind, ExprKind::Slice { start: None, .. }));
        assert!(matches!(expr("s[2:]").kind, ExprKind::Slice { end: None, .. }));
        assert!(matches!(expr("s[2]").kind, ExprKind::Index { .. }));
    }

    #[test]
    fn casts_bind_after_unary_operand() {
        let e = expr("-x as float");
        assert!(matches!(e.kind, ExprKind::Unary { op: UnaryOp::Neg, ref operand } if matches!(operand.kind, ExprKind::Cast { .. })));
    }

    #[test]
    fn struct_literal() {
        let e = expr("Point{x: 1, y: 2}");
        let ExprKind::StructLit { fields, .. } = &e.kind else {
            panic!("expected struct literal");
        };
        assert_eq!(field_names(fields), vec!["x", "y"]);
    }

    #[test]
    fn new_typeinfo_and_fn_literal() {
        assert!(matches!(expr("new Node").kind, ExprKind::New { .. }));
        assert!(matches!(expr("#type(int)").kind, ExprKind::TypeInfo { .. }));
        assert!(matches!(expr("fn(a int) int { return a }").kind, ExprKind::FnLit { .. }));
    }

    #[test]
    fn array_literal() {
        assert!(matches!(expr("[1, 2, 3]").kind, ExprKind::ArrayLit { ref elems } if elems.len() == 3));
    }
}
