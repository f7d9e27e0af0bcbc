pub mod token;

use crate::errors::{LexError, LexErrorKind};
use crate::span::{FileId, Span, Spanned};
use logos::Logos;
use token::{closing_quote, Keyword, RawToken, Token};

/// Tokenizer for vs source text.
///
/// Wraps the logos-generated raw scanner, decodes literal payloads, skips
/// block comments and stops at the first error. The last token produced is
/// always `Token::Eof`.
pub struct Lexer<'src> {
    source: &'src str,
    file: FileId,
    inner: logos::Lexer<'src, RawToken>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file: FileId) -> Self {
        Self {
            source,
            file,
            inner: RawToken::lexer(source),
            finished: false,
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.file, start, end)
    }

    fn error(&mut self, kind: LexErrorKind, start: usize, end: usize) -> LexError {
        self.finished = true;
        LexError {
            kind,
            span: self.span(start, end),
        }
    }

    /// Skips past the closing `*/` of a block comment whose opener was just
    /// consumed. Block comments do not nest.
    fn skip_block_comment(&mut self, start: usize) -> Result<(), LexError> {
        match self.inner.remainder().find("*/") {
            Some(offset) => {
                self.inner.bump(offset + 2);
                Ok(())
            }
            None => Err(self.error(
                LexErrorKind::UnterminatedBlockComment,
                start,
                self.source.len(),
            )),
        }
    }

    fn next_token(&mut self) -> Option<Result<Spanned<Token>, LexError>> {
        if self.finished {
            return None;
        }
        loop {
            let raw = match self.inner.next() {
                None => {
                    self.finished = true;
                    let end = self.source.len();
                    return Some(Ok(Spanned::new(Token::Eof, self.span(end, end))));
                }
                Some(raw) => raw,
            };
            let range = self.inner.span();
            let slice = self.inner.slice();
            let raw = match raw {
                Ok(raw) => raw,
                Err(()) => {
                    let c = slice.chars().next().unwrap_or('\0');
                    return Some(Err(self.error(
                        LexErrorKind::UnexpectedCharacter(c),
                        range.start,
                        range.end,
                    )));
                }
            };
            if raw == RawToken::BlockCommentStart {
                if let Err(e) = self.skip_block_comment(range.start) {
                    return Some(Err(e));
                }
                continue;
            }
            let span = self.span(range.start, range.end);
            return Some(self.convert_raw_token(raw, slice, span).map(|tok| Spanned::new(tok, span)));
        }
    }

    /// Convert a raw token + its slice into a final Token.
    fn convert_raw_token(
        &mut self,
        raw: RawToken,
        slice: &str,
        span: Span,
    ) -> Result<Token, LexError> {
        Ok(match raw {
            RawToken::IntLiteral => match slice.parse::<i64>() {
                Ok(n) => Token::Int(n),
                Err(_) => {
                    return Err(self.error(
                        LexErrorKind::InvalidNumber(slice.to_string()),
                        span.start,
                        span.end,
                    ))
                }
            },
            RawToken::HexLiteral => match u64::from_str_radix(&slice[2..], 16) {
                Ok(n) => Token::Int(n as i64),
                Err(_) => {
                    return Err(self.error(
                        LexErrorKind::InvalidNumber(slice.to_string()),
                        span.start,
                        span.end,
                    ))
                }
            },
            RawToken::FloatLiteral => match slice.parse::<f64>() {
                Ok(x) => Token::Float(x),
                Err(_) => {
                    return Err(self.error(
                        LexErrorKind::InvalidNumber(slice.to_string()),
                        span.start,
                        span.end,
                    ))
                }
            },
            RawToken::StringLiteral => {
                if closing_quote(&slice[1..]).is_none() {
                    return Err(self.error(
                        LexErrorKind::UnterminatedString,
                        span.start,
                        self.source.len(),
                    ));
                }
                Token::Str(self.unescape(slice, span)?)
            }
            RawToken::Identifier => match Keyword::from_str(slice) {
                Some(kw) => Token::Keyword(kw),
                None => Token::Ident(slice.to_string()),
            },
            RawToken::PolyName => Token::Poly(slice[1..].to_string()),
            RawToken::Dollar => {
                let kind = match self.inner.remainder().chars().next() {
                    Some(c) => LexErrorKind::UnexpectedAfterDollar(c),
                    None => LexErrorKind::UnexpectedCharacter('$'),
                };
                return Err(self.error(kind, span.start, span.end));
            }
            RawToken::Directive => Token::Directive(slice[1..].to_string()),
            RawToken::OpAssign => Token::OpAssign(slice[..slice.len() - 1].to_string()),
            RawToken::Ellipsis => Token::Ellipsis,
            RawToken::Arrow => Token::Arrow,
            RawToken::ColonEq => Token::ColonEq,
            RawToken::AndAnd => Token::AndAnd,
            RawToken::OrOr => Token::OrOr,
            RawToken::EqEq => Token::EqEq,
            RawToken::BangEq => Token::BangEq,
            RawToken::LtEq => Token::LtEq,
            RawToken::GtEq => Token::GtEq,
            RawToken::Shl => Token::Shl,
            RawToken::Shr => Token::Shr,
            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Caret => Token::Caret,
            RawToken::Amp => Token::Amp,
            RawToken::Pipe => Token::Pipe,
            RawToken::Bang => Token::Bang,
            RawToken::Eq => Token::Eq,
            RawToken::Lt => Token::Lt,
            RawToken::Gt => Token::Gt,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::LBrace => Token::LBrace,
            RawToken::RBrace => Token::RBrace,
            RawToken::Comma => Token::Comma,
            RawToken::Semi => Token::Semi,
            RawToken::Colon => Token::Colon,
            RawToken::Dot => Token::Dot,
            RawToken::Quote => Token::Quote,
            RawToken::BlockCommentStart => {
                return Err(self.error(
                    LexErrorKind::UnterminatedBlockComment,
                    span.start,
                    span.end,
                ))
            }
        })
    }

    /// Decode the body of a quoted string literal (quotes included in `slice`).
    fn unescape(&mut self, slice: &str, span: Span) -> Result<String, LexError> {
        let body = &slice[1..slice.len() - 1];
        let mut out = String::with_capacity(body.len());
        let mut chars = body.char_indices();
        while let Some((i, c)) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some((_, esc)) = chars.next() else {
                return Err(self.error(LexErrorKind::UnterminatedString, span.start, span.end));
            };
            out.push(match esc {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                other => {
                    let at = span.start + 1 + i;
                    return Err(self.error(LexErrorKind::InvalidEscape(other), at, at + 2));
                }
            });
        }
        Ok(out)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Spanned<Token>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

/// Tokenize a whole file, stopping at the first error.
pub fn tokenize(source: &str, file: FileId) -> Result<Vec<Spanned<Token>>, LexError> {
    Lexer::new(source, file).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source, FileId(0))
            .expect("lexes")
            .into_iter()
            .map(|s| s.node)
            .collect()
    }

    fn lex_err(source: &str) -> LexErrorKind {
        tokenize(source, FileId(0)).expect_err("should fail").kind
    }

    #[test]
    fn declaration() {
        assert_eq!(
            lex("x int = 1 + 2;"),
            vec![
                Token::Ident("x".into()),
                Token::Ident("int".into()),
                Token::Eq,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_poly_names() {
        assert_eq!(
            lex("fn id<$T>(x $T) $T"),
            vec![
                Token::Keyword(Keyword::Fn),
                Token::Ident("id".into()),
                Token::Lt,
                Token::Poly("T".into()),
                Token::Gt,
                Token::LParen,
                Token::Ident("x".into()),
                Token::Poly("T".into()),
                Token::RParen,
                Token::Poly("T".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("a // line\n/* block\n * more */ b"),
            vec![Token::Ident("a".into()), Token::Ident("b".into()), Token::Eof]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            lex(r#""a\tb\n\"c\"""#),
            vec![Token::Str("a\tb\n\"c\"".into()), Token::Eof]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            lex("42 0xff 1.5 2.0e3"),
            vec![
                Token::Int(42),
                Token::Int(255),
                Token::Float(1.5),
                Token::Float(2000.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            lex("a := b... && c != d -> e"),
            vec![
                Token::Ident("a".into()),
                Token::ColonEq,
                Token::Ident("b".into()),
                Token::Ellipsis,
                Token::AndAnd,
                Token::Ident("c".into()),
                Token::BangEq,
                Token::Ident("d".into()),
                Token::Arrow,
                Token::Ident("e".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn compound_assignment_is_lexed() {
        assert_eq!(
            lex("x += 1"),
            vec![
                Token::Ident("x".into()),
                Token::OpAssign("+".into()),
                Token::Int(1),
                Token::Eof
            ]
        );
    }

    #[test]
    fn directive() {
        assert_eq!(
            lex("#type(int)"),
            vec![
                Token::Directive("type".into()),
                Token::LParen,
                Token::Ident("int".into()),
                Token::RParen,
                Token::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(lex_err("x := \"abc"), LexErrorKind::UnterminatedString);
        assert_eq!(lex_err("println(\"hi);"), LexErrorKind::UnterminatedString);
        assert_eq!(lex_err("\"a b"), LexErrorKind::UnterminatedString);
        assert_eq!(lex_err("s := \"ends in \\\""), LexErrorKind::UnterminatedString);
    }

    #[test]
    fn escaped_quotes_stay_inside_the_literal() {
        assert_eq!(
            lex("\"a\\\"b\" x"),
            vec![Token::Str("a\"b".into()), Token::Ident("x".into()), Token::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment() {
        assert_eq!(lex_err("a /* never closed"), LexErrorKind::UnterminatedBlockComment);
    }

    #[test]
    fn bad_character() {
        assert_eq!(lex_err("a @ b"), LexErrorKind::UnexpectedCharacter('@'));
    }

    #[test]
    fn dollar_needs_a_name() {
        assert_eq!(lex_err("$1"), LexErrorKind::UnexpectedAfterDollar('1'));
    }

    #[test]
    fn spans_carry_file_id() {
        let toks = tokenize("  foo", FileId(3)).expect("lexes");
        assert_eq!(toks[0].span, Span::new(FileId(3), 2, 5));
    }
}
