use super::ast::*;
use super::Parser;
use crate::errors::{ParseError, ParseErrorKind};
use crate::lexer::token::{Keyword, Token};
use crate::span::Spanned;

impl Parser {
    /// Tokens that can begin a type expression.
    pub fn starts_type(&self, tok: &Token) -> bool {
        matches!(
            tok,
            Token::Ident(_)
                | Token::Poly(_)
                | Token::Amp
                | Token::AndAnd
                | Token::Quote
                | Token::LBracket
                | Token::Keyword(Keyword::Fn | Keyword::Struct | Keyword::Enum)
        )
    }

    pub fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.peek_span();
        let kind = match self.peek().clone() {
            Token::Amp => {
                self.advance();
                let inner = self.parse_type()?;
                TypeExprKind::Ref {
                    inner: Box::new(inner),
                    owned: false,
                }
            }
            Token::AndAnd => {
                // `&&T` arrives as one token.
                self.advance();
                let inner = self.parse_type()?;
                let inner_span = inner.span;
                TypeExprKind::Ref {
                    inner: Box::new(TypeExpr {
                        kind: TypeExprKind::Ref {
                            inner: Box::new(inner),
                            owned: false,
                        },
                        span: inner_span,
                    }),
                    owned: false,
                }
            }
            Token::Quote => {
                self.advance();
                if self.check(&Token::LBracket) && matches!(self.peek_ahead(1), Token::RBracket) {
                    self.advance();
                    self.advance();
                    let inner = self.parse_type()?;
                    TypeExprKind::Array {
                        inner: Box::new(inner),
                        owned: true,
                    }
                } else {
                    let inner = self.parse_type()?;
                    TypeExprKind::Ref {
                        inner: Box::new(inner),
                        owned: true,
                    }
                }
            }
            Token::LBracket => {
                self.advance();
                match self.peek().clone() {
                    Token::RBracket => {
                        self.advance();
                        let inner = self.parse_type()?;
                        TypeExprKind::Array {
                            inner: Box::new(inner),
                            owned: false,
                        }
                    }
                    Token::Int(n) if n > 0 => {
                        self.advance();
                        self.expect(&Token::RBracket)?;
                        let inner = self.parse_type()?;
                        TypeExprKind::StaticArray {
                            inner: Box::new(inner),
                            length: n as u64,
                        }
                    }
                    _ => return Err(self.error_at(self.peek_span(), ParseErrorKind::BadArrayLength)),
                }
            }
            Token::Poly(name) => {
                self.advance();
                TypeExprKind::Poly(name)
            }
            Token::Keyword(Keyword::Fn) => self.parse_fn_type()?,
            Token::Keyword(Keyword::Struct) => self.parse_struct_type()?,
            Token::Keyword(Keyword::Enum) => self.parse_enum_type()?,
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::Dot) && matches!(self.peek_ahead(1), Token::Ident(_)) {
                    self.advance();
                    let member = self.expect_identifier()?;
                    TypeExprKind::External {
                        package: name,
                        name: member.node,
                    }
                } else {
                    TypeExprKind::Named(name)
                }
            }
            other => {
                return Err(self.error_at(start, ParseErrorKind::ExpectedType(other.to_string())))
            }
        };
        let base = TypeExpr {
            kind,
            span: start.merge(self.previous_span()),
        };
        if matches!(
            base.kind,
            TypeExprKind::Named(_) | TypeExprKind::External { .. }
        ) && self.check(&Token::LParen)
        {
            return self.parse_type_params(base);
        }
        Ok(base)
    }

    /// `Name(T, U)`
    fn parse_type_params(&mut self, base: TypeExpr) -> Result<TypeExpr, ParseError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.parse_type()?);
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(TypeExpr {
            span: base.span.merge(self.previous_span()),
            kind: TypeExprKind::Params {
                base: Box::new(base),
                args,
            },
        })
    }

    /// `fn(A, ...B) -> R`; the arrow is optional.
    fn parse_fn_type(&mut self) -> Result<TypeExprKind, ParseError> {
        self.expect_keyword(Keyword::Fn)?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        let mut variadic = false;
        while !self.check(&Token::RParen) {
            if variadic {
                return Err(self.error_at(self.peek_span(), ParseErrorKind::VariadicNotLast));
            }
            variadic = self.match_token(&Token::Ellipsis);
            args.push(self.parse_type()?);
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        let ret = if self.match_token(&Token::Arrow) || self.starts_type(self.peek()) {
            Some(Box::new(self.parse_type()?))
        } else {
            None
        };
        Ok(TypeExprKind::Func {
            args,
            ret,
            variadic,
        })
    }

    /// `struct { a T; b U }` or `struct($T) { value T }`
    fn parse_struct_type(&mut self) -> Result<TypeExprKind, ParseError> {
        self.expect_keyword(Keyword::Struct)?;
        let mut params = Vec::new();
        if self.match_token(&Token::LParen) {
            while !self.check(&Token::RParen) {
                match self.peek().clone() {
                    Token::Poly(name) => {
                        let span = self.advance().span;
                        params.push(Spanned::new(name, span));
                    }
                    _ => return Err(self.error_unexpected("polymorphic type name")),
                }
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.match_token(&Token::Semi) || self.match_token(&Token::Comma) {
                continue;
            }
            let name = self.expect_name()?;
            let ty = self.parse_type()?;
            fields.push((name, ty));
        }
        self.expect(&Token::RBrace)?;
        Ok(TypeExprKind::Struct { params, fields })
    }

    /// `enum { A, B = 5 }` or `enum u8 { .. }`
    fn parse_enum_type(&mut self) -> Result<TypeExprKind, ParseError> {
        self.expect_keyword(Keyword::Enum)?;
        let inner = if self.check(&Token::LBrace) {
            None
        } else {
            Some(Box::new(self.parse_type()?))
        };
        self.expect(&Token::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.match_token(&Token::Semi) || self.match_token(&Token::Comma) {
                continue;
            }
            let name = self.expect_identifier()?;
            let value = if self.match_token(&Token::Eq) {
                let negative = self.match_token(&Token::Minus);
                match self.peek().clone() {
                    Token::Int(n) => {
                        self.advance();
                        Some(if negative { -n } else { n })
                    }
                    _ => return Err(self.error_unexpected("integer")),
                }
            } else {
                None
            };
            members.push((name, value));
        }
        self.expect(&Token::RBrace)?;
        Ok(TypeExprKind::Enum { inner, members })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::span::FileId;

    fn ty(src: &str) -> TypeExprKind {
        let tokens = tokenize(src, FileId(0)).expect("lexes");
        Parser::new(tokens).parse_type().expect("parses").kind
    }

    #[test]
    fn references_and_arrays() {
        assert!(matches!(ty("&int"), TypeExprKind::Ref { owned: false, .. }));
        assert!(matches!(ty("'Node"), TypeExprKind::Ref { owned: true, .. }));
        assert!(matches!(ty("[]string"), TypeExprKind::Array { owned: false, .. }));
        assert!(matches!(ty("'[]u8"), TypeExprKind::Array { owned: true, .. }));
        assert!(matches!(
            ty("[4]int"),
            TypeExprKind::StaticArray { length: 4, .. }
        ));
    }

    #[test]
    fn double_ampersand_is_ref_to_ref() {
        let TypeExprKind::Ref { inner, .. } = ty("&&int") else {
            panic!("expected ref");
        };
        assert!(matches!(inner.kind, TypeExprKind::Ref { .. }));
    }

    #[test]
    fn function_type() {
        let TypeExprKind::Func {
            args,
            ret,
            variadic,
        } = ty("fn(int, ...string) -> bool")
        else {
            panic!("expected fn type");
        };
        assert_eq!(args.len(), 2);
        assert!(variadic);
        assert!(ret.is_some());
    }

    #[test]
    fn generic_struct_and_params() {
        let TypeExprKind::Struct { params, fields } = ty("struct($T) { value $T; next &Box($T) }")
        else {
            panic!("expected struct");
        };
        assert_eq!(params.len(), 1);
        assert_eq!(fields.len(), 2);
        let TypeExprKind::Ref { inner, .. } = &fields[1].1.kind else {
            panic!("expected ref");
        };
        assert!(matches!(inner.kind, TypeExprKind::Params { ref args, .. } if args.len() == 1));
    }

    #[test]
    fn enum_with_values() {
        let TypeExprKind::Enum { inner, members } = ty("enum u8 { A, B = 5, C = -1 }") else {
            panic!("expected enum");
        };
        assert!(inner.is_some());
        let values: Vec<_> = members.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![None, Some(5), Some(-1)]);
    }

    #[test]
    fn external_type() {
        assert!(matches!(
            ty("util.Pair"),
            TypeExprKind::External { ref package, ref name } if package == "util" && name == "Pair"
        ));
    }
}
