//! Tokenizer for the ASCII PSF grammar.
//!
//! The lexer is restartable: [`Lexer::byte_offset`] and [`Lexer::seek`] let the fast
//! value scanner jump the cursor past a `VALUE ... END` window it has already consumed
//! by raw text scanning, without the lexer ever tokenizing that window itself.

use std::path::PathBuf;

use nom::character::complete::{char as nom_char, digit0, digit1, one_of};
use nom::combinator::{opt, recognize};
use nom::sequence::{pair, tuple};
use nom::IResult;

use crate::error::{Error, LocatedMessage, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Array,
    Byte,
    Complex,
    Double,
    End,
    Float,
    Group,
    Header,
    Int,
    Long,
    Prop,
    Single,
    String,
    Struct,
    Sweep,
    Trace,
    Type,
    Value,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "ARRAY" => Keyword::Array,
            "BYTE" => Keyword::Byte,
            "COMPLEX" => Keyword::Complex,
            "DOUBLE" => Keyword::Double,
            "END" => Keyword::End,
            "FLOAT" => Keyword::Float,
            "GROUP" => Keyword::Group,
            "HEADER" => Keyword::Header,
            "INT" => Keyword::Int,
            "LONG" => Keyword::Long,
            "NAN" => return None, // handled by the real-literal path, never reached here in practice
            "PROP" => Keyword::Prop,
            "SINGLE" => Keyword::Single,
            "STRING" => Keyword::String,
            "STRUCT" => Keyword::Struct,
            "SWEEP" => Keyword::Sweep,
            "TRACE" => Keyword::Trace,
            "TYPE" => Keyword::Type,
            "VALUE" => Keyword::Value,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Integer(i64),
    Real(f64),
    QuotedString(String),
    LParen,
    RParen,
    Star,
    Keyword(Keyword),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpannedToken {
    pub token: Token,
    pub byte_offset: usize,
}

pub(crate) struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    filename: Option<PathBuf>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str, filename: Option<PathBuf>) -> Self {
        Self { src, pos: 0, filename }
    }

    /// Current byte offset into the source; stable across calls, usable with [`seek`].
    pub(crate) fn byte_offset(&self) -> usize {
        self.pos
    }

    /// Jump the cursor to an arbitrary byte offset, as the fast scanner does after it
    /// has consumed a `VALUE ... END` window by raw text search.
    pub(crate) fn seek(&mut self, byte_offset: usize) {
        self.pos = byte_offset;
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn locate(&self, byte_offset: usize) -> Location {
        let before = &self.src[..byte_offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = self.src[byte_offset..]
            .find('\n')
            .map(|i| byte_offset + i)
            .unwrap_or(self.src.len());
        let col = self.src[line_start..byte_offset].chars().count();
        Location::new(line, col, &self.src[line_start..line_end])
    }

    fn lex_error(&self, byte_offset: usize, message: impl Into<String>) -> Error {
        Error::Lex(LocatedMessage::new(
            self.filename.clone(),
            message,
            Some(self.locate(byte_offset)),
        ))
    }

    /// Builds a located `Error::Parse` at `byte_offset`, for use by the parser which
    /// shares this lexer's position bookkeeping.
    pub(crate) fn parse_error(&self, byte_offset: usize, message: impl Into<String>) -> Error {
        Error::Parse(LocatedMessage::new(
            self.filename.clone(),
            message,
            Some(self.locate(byte_offset.min(self.src.len()))),
        ))
    }

    /// Returns the next token, or `Ok(None)` at end of input.
    pub(crate) fn next_token(&mut self) -> Result<Option<SpannedToken>, Error> {
        self.skip_whitespace();
        if self.pos >= self.src.len() {
            return Ok(None);
        }
        let start = self.pos;
        let rest = &self.src[start..];
        let mut chars = rest.chars();
        let c = chars.next().expect("checked non-empty above");

        let token = match c {
            '"' => Token::QuotedString(self.scan_quoted_string()?),
            '(' => {
                self.pos += 1;
                Token::LParen
            }
            ')' => {
                self.pos += 1;
                Token::RParen
            }
            '*' => {
                self.pos += 1;
                Token::Star
            }
            _ if rest.starts_with("nan") => {
                self.pos += 3;
                Token::Real(f64::NAN)
            }
            _ if rest.starts_with("NaN") => {
                self.pos += 3;
                Token::Real(f64::NAN)
            }
            _ if rest.starts_with("inf") => {
                self.pos += 3;
                Token::Real(f64::INFINITY)
            }
            _ if c.is_ascii_digit() || c == '+' || c == '-' => self.scan_number(rest)?,
            _ if c.is_ascii_uppercase() => self.scan_identifier(rest)?,
            other => {
                self.pos += other.len_utf8();
                return Err(self.lex_error(start, format!("illegal character '{other}'.")));
            }
        };

        Ok(Some(SpannedToken { token, byte_offset: start }))
    }

    fn scan_number(&mut self, rest: &str) -> Result<Token, Error> {
        if let Ok((tail, value)) = real_literal(rest) {
            self.pos += rest.len() - tail.len();
            return Ok(Token::Real(value));
        }
        if let Ok((tail, value)) = integer_literal(rest) {
            self.pos += rest.len() - tail.len();
            return Ok(Token::Integer(value));
        }
        let start = self.pos;
        let bad = rest.chars().next().expect("non-empty");
        self.pos += bad.len_utf8();
        Err(self.lex_error(start, format!("illegal character '{bad}'.")))
    }

    fn scan_identifier(&mut self, rest: &str) -> Result<Token, Error> {
        let start = self.pos;
        let word_len = rest.bytes().take_while(|b| b.is_ascii_uppercase()).count();
        let word = &rest[..word_len];
        self.pos += word_len;
        match Keyword::from_word(word) {
            Some(kw) => Ok(Token::Keyword(kw)),
            None => Err(self.lex_error(start, format!("unknown keyword '{word}'."))),
        }
    }

    fn scan_quoted_string(&mut self) -> Result<String, Error> {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut i = start + 1; // skip opening quote
        loop {
            if i >= bytes.len() {
                return Err(self.lex_error(start, "unterminated string literal.".to_string()));
            }
            match bytes[i] {
                b'\n' => {
                    return Err(self.lex_error(start, "newline in string literal.".to_string()))
                }
                b'\\' => {
                    i += 1;
                    if i >= bytes.len() {
                        return Err(
                            self.lex_error(start, "unterminated string literal.".to_string())
                        );
                    }
                    let escaped_len =
                        self.src[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                    i += escaped_len;
                }
                b'"' => {
                    let raw = &self.src[start + 1..i];
                    self.pos = i + 1;
                    return Ok(raw.replace('\\', ""));
                }
                _ => {
                    let ch_len = self.src[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                    i += ch_len;
                }
            }
        }
    }
}

/// Recognizes `[+-]?[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?`, requiring either the
/// fractional part or the exponent to be present (otherwise it's an [`integer_literal`]).
fn real_literal(input: &str) -> IResult<&str, f64> {
    let (rest, matched) = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(nom_char('.'), digit0)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    if !matched.contains('.') && !matched.contains('e') && !matched.contains('E') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        )));
    }
    let value: f64 = matched
        .parse()
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float)))?;
    Ok((rest, value))
}

/// Recognizes `-?[0-9]+` (no leading `+`, matching the grammar's `INTEGER` token).
fn integer_literal(input: &str) -> IResult<&str, i64> {
    let (rest, matched) = recognize(pair(opt(nom_char('-')), digit1))(input)?;
    let value: i64 = matched
        .parse()
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)))?;
    Ok((rest, value))
}
