//! Recursive-descent reducer over the token stream, producing the five parsed
//! sections (header, types, sweeps, traces+groups, values) that [`crate::reader`]
//! assembles into a [`crate::types::PsfDataset`].
//!
//! The `VALUE` section is special: once the `VALUE` keyword is consumed, the parser
//! hands the raw remaining text to [`crate::fast_scan`] before falling back to the
//! token-based grammar below. The lexer's restartability is what makes that splice
//! possible — on success the lexer is seeked past the fast-scanned window as if it had
//! been tokenized all along.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::Error;
use crate::fast_scan;
use crate::lexer::{Keyword, Lexer, SpannedToken, Token};
use crate::types::{GroupDef, NamedValues, PropValue, PsfType, StructType, Sweep, Trace, TraceShape};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Int(i64),
    Real(f64),
}

/// One sample's value as the grammar produced it, before the reader folds complex
/// pairs and unwraps struct/group tuples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawSample {
    Number(Number),
    Str(String),
    Tuple(Vec<RawSample>),
}

/// A `VALUE` section entry: an optional explicit type-name (present for DC entries,
/// absent when the name already has a declared trace) and its samples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawValues {
    pub type_name: Option<String>,
    pub samples: Vec<RawSample>,
}

#[derive(Debug)]
pub(crate) struct ParsedSections {
    pub header: NamedValues,
    pub types: HashMap<String, PsfType>,
    pub sweeps: Vec<Sweep>,
    pub traces: Vec<Trace>,
    pub groups: HashMap<String, GroupDef>,
    pub values: Vec<(String, RawValues)>,
}

pub(crate) fn parse(src: &str, filename: Option<PathBuf>) -> Result<ParsedSections, Error> {
    let mut p = Parser::new(src, filename);

    p.expect_keyword(Keyword::Header)?;
    let header = p.parse_named_values()?;

    if matches!(p.peek()?, Some(Token::Keyword(Keyword::End))) {
        p.bump()?;
        return Ok(ParsedSections {
            header,
            types: HashMap::new(),
            sweeps: vec![],
            traces: vec![],
            groups: HashMap::new(),
            values: vec![],
        });
    }

    p.expect_keyword(Keyword::Type)?;
    let types = p.parse_types()?;

    let mut sweeps = vec![];
    let mut traces = vec![];
    let mut groups = HashMap::new();
    let mut saw_group = false;

    if matches!(p.peek()?, Some(Token::Keyword(Keyword::Sweep))) {
        p.bump()?;
        sweeps = p.parse_sweeps(&types)?;
        p.expect_keyword(Keyword::Trace)?;
        let (t, g, sg) = p.parse_traces(&types)?;
        traces = t;
        groups = g;
        saw_group = sg;
    }

    p.expect_keyword(Keyword::Value)?;
    let value_start = p.lexer.byte_offset();

    let values = if !saw_group {
        match fast_scan::find_value_section_end(src, value_start)
            .and_then(|end| fast_scan::try_fast_scan(&src[value_start..end]).map(|r| (end, r)))
        {
            Some((end, fast)) => {
                log::debug!("fast value scan succeeded for {} signal(s)", fast.names.len());
                p.lexer.seek(end);
                p.peeked = None;
                fast.names
                    .into_iter()
                    .zip(fast.columns)
                    .map(|(name, column)| {
                        let samples =
                            column.into_iter().map(|v| RawSample::Number(Number::Real(v))).collect();
                        (name, RawValues { type_name: None, samples })
                    })
                    .collect()
            }
            None => {
                log::debug!("fast value scan not applicable, falling back to grammar parse");
                p.parse_values()?
            }
        }
    } else {
        p.parse_values()?
    };

    p.expect_keyword(Keyword::End)?;

    Ok(ParsedSections { header, types, sweeps, traces, groups, values })
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<SpannedToken>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, filename: Option<PathBuf>) -> Self {
        Self { lexer: Lexer::new(src, filename), peeked: None }
    }

    fn peek(&mut self) -> Result<Option<&Token>, Error> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref().map(|s| &s.token))
    }

    fn bump(&mut self) -> Result<Option<SpannedToken>, Error> {
        match self.peeked.take() {
            Some(t) => Ok(Some(t)),
            None => self.lexer.next_token(),
        }
    }

    fn current_offset(&self) -> usize {
        self.peeked.as_ref().map(|s| s.byte_offset).unwrap_or_else(|| self.lexer.byte_offset())
    }

    fn unexpected(&self, found: Option<SpannedToken>, expected: &str) -> Error {
        match found {
            Some(st) => self.lexer.parse_error(st.byte_offset, format!("expected {expected}, found {:?}", st.token)),
            None => self.lexer.parse_error(self.lexer.byte_offset(), format!("expected {expected}, found end of input")),
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::Keyword(k), .. }) if k == kw => Ok(()),
            other => Err(self.unexpected(other, &format!("{kw:?}"))),
        }
    }

    fn expect_string(&mut self) -> Result<String, Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::QuotedString(s), .. }) => Ok(s),
            other => Err(self.unexpected(other, "a quoted string")),
        }
    }

    fn expect_integer(&mut self) -> Result<i64, Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::Integer(n), .. }) => Ok(n),
            other => Err(self.unexpected(other, "an integer")),
        }
    }

    fn expect_lparen(&mut self) -> Result<(), Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::LParen, .. }) => Ok(()),
            other => Err(self.unexpected(other, "'('")),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::RParen, .. }) => Ok(()),
            other => Err(self.unexpected(other, "')'")),
        }
    }

    fn expect_star(&mut self) -> Result<(), Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::Star, .. }) => Ok(()),
            other => Err(self.unexpected(other, "'*'")),
        }
    }

    fn parse_named_values(&mut self) -> Result<NamedValues, Error> {
        let mut out = vec![];
        while matches!(self.peek()?, Some(Token::QuotedString(_))) {
            let key = self.expect_string()?;
            let value = self.parse_prop_value()?;
            out.push((key, value));
        }
        Ok(out)
    }

    fn parse_prop_value(&mut self) -> Result<PropValue, Error> {
        match self.bump()? {
            Some(SpannedToken { token: Token::QuotedString(s), .. }) => Ok(PropValue::Str(s)),
            Some(SpannedToken { token: Token::Integer(n), .. }) => Ok(PropValue::Int(n)),
            Some(SpannedToken { token: Token::Real(r), .. }) => Ok(PropValue::Real(r)),
            other => Err(self.unexpected(other, "a header/prop value")),
        }
    }

    fn parse_type_entries(&mut self) -> Result<Vec<(String, PsfType)>, Error> {
        let mut out = vec![];
        while matches!(self.peek()?, Some(Token::QuotedString(_))) {
            let name = self.expect_string()?;
            let (kind, struct_def, properties) = self.parse_kinds()?;
            out.push((name.clone(), PsfType::new(name, kind, struct_def, properties)));
        }
        Ok(out)
    }

    fn parse_types(&mut self) -> Result<HashMap<String, PsfType>, Error> {
        Ok(self.parse_type_entries()?.into_iter().collect())
    }

    fn parse_kinds(&mut self) -> Result<(String, Option<StructType>, NamedValues), Error> {
        let mut kind_words = vec![];
        let mut struct_def = None;
        let mut properties = vec![];
        loop {
            match self.peek()? {
                Some(Token::Keyword(Keyword::Float)) => {
                    kind_words.push("float");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Double)) => {
                    kind_words.push("double");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Complex)) => {
                    kind_words.push("complex");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Int)) => {
                    kind_words.push("int");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Byte)) => {
                    kind_words.push("byte");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Long)) => {
                    kind_words.push("long");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Single)) => {
                    kind_words.push("single");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::String)) => {
                    kind_words.push("string");
                    self.bump()?;
                }
                Some(Token::Star) => {
                    kind_words.push("*");
                    self.bump()?;
                }
                Some(Token::Keyword(Keyword::Array)) => {
                    self.bump()?;
                    self.expect_lparen()?;
                    self.expect_star()?;
                    self.expect_rparen()?;
                }
                Some(Token::Keyword(Keyword::Struct)) => {
                    self.bump()?;
                    self.expect_lparen()?;
                    let members = self.parse_type_entries()?;
                    self.expect_rparen()?;
                    struct_def = Some(StructType::new(members));
                }
                Some(Token::Keyword(Keyword::Prop)) => {
                    self.bump()?;
                    self.expect_lparen()?;
                    properties.extend(self.parse_named_values()?);
                    self.expect_rparen()?;
                }
                _ => break,
            }
        }
        Ok((kind_words.join(" "), struct_def, properties))
    }

    /// `units` comes from the referenced type's own `PROP` block, not the sweep
    /// header's — a `SWEEP` entry's inline `PROP(...)` carries per-sweep metadata
    /// like `grid`, while the declared type is the source of truth for units.
    fn parse_sweeps(&mut self, types: &HashMap<String, PsfType>) -> Result<Vec<Sweep>, Error> {
        let mut sweeps = vec![];
        while matches!(self.peek()?, Some(Token::QuotedString(_))) {
            let name = self.expect_string()?;
            let type_name = self.expect_string()?;
            let (_kind, _struct_def, properties) = self.parse_kinds()?;
            let units = types.get(&type_name).map(|t| t.units().to_string()).unwrap_or_default();
            let grid = properties.iter().find(|(k, _)| k == "grid").and_then(|(_, v)| match v {
                PropValue::Int(n) => Some(*n),
                _ => None,
            });
            sweeps.push(Sweep { name, type_name, grid, units, abscissa: vec![] });
        }
        Ok(sweeps)
    }

    fn parse_traces(
        &mut self,
        types: &HashMap<String, PsfType>,
    ) -> Result<(Vec<Trace>, HashMap<String, GroupDef>, bool), Error> {
        let mut traces = vec![];
        let mut groups = HashMap::new();
        let mut saw_group = false;
        let mut pending_group: Option<(String, i64)> = None;
        let mut current_members: Vec<(String, String)> = vec![];

        while matches!(self.peek()?, Some(Token::QuotedString(_))) {
            let name = self.expect_string()?;

            if matches!(self.peek()?, Some(Token::Keyword(Keyword::Group))) {
                self.bump()?;
                let count = self.expect_integer()?;
                saw_group = true;
                if let Some((open_name, remaining)) = pending_group.take() {
                    return Err(Error::Integrity(format!(
                        "group '{open_name}' declared more members than the trace list provided ({remaining} missing)"
                    )));
                }
                traces.push(Trace { name: name.clone(), shape: TraceShape::Group { group_name: name.clone() } });
                pending_group = Some((name, count));
                current_members = vec![];
                continue;
            }

            let type_name = self.expect_string()?;
            while matches!(self.peek()?, Some(Token::Keyword(Keyword::Prop))) {
                self.bump()?;
                self.expect_lparen()?;
                self.parse_named_values()?;
                self.expect_rparen()?;
            }

            if let Some((group_name, remaining)) = pending_group.as_mut() {
                current_members.push((name, type_name));
                *remaining -= 1;
                if *remaining <= 0 {
                    groups.insert(group_name.clone(), GroupDef { members: std::mem::take(&mut current_members) });
                    pending_group = None;
                }
            } else {
                let is_struct = types.get(&type_name).map(|t| t.is_struct()).unwrap_or(false);
                let shape =
                    if is_struct { TraceShape::Struct { type_name } } else { TraceShape::Scalar { type_name } };
                traces.push(Trace { name, shape });
            }
        }

        if let Some((group_name, remaining)) = pending_group {
            return Err(Error::Integrity(format!(
                "group '{group_name}' declared {remaining} more member(s) than the trace list provided"
            )));
        }

        Ok((traces, groups, saw_group))
    }

    /// A `VALUE` section is record-oriented: every sweep point repeats each signal's
    /// name once. The first occurrence of a name opens its entry; every later
    /// occurrence appends to it, mirroring `p_values`/`p_values_last`'s
    /// create-then-append accumulation instead of overwriting or duplicating entries.
    fn parse_values(&mut self) -> Result<Vec<(String, RawValues)>, Error> {
        let mut out: Vec<(String, RawValues)> = vec![];
        let mut index: HashMap<String, usize> = HashMap::new();
        while matches!(self.peek()?, Some(Token::QuotedString(_))) {
            let name = self.expect_string()?;
            let type_name =
                if matches!(self.peek()?, Some(Token::QuotedString(_))) { Some(self.expect_string()?) } else { None };

            let mut samples = if type_name.is_some() && matches!(self.peek()?, Some(Token::QuotedString(_))) {
                let s = self.expect_string()?;
                vec![RawSample::Str(s)]
            } else {
                self.parse_numbers()?
            };

            match index.get(&name) {
                Some(&i) => {
                    if type_name.is_some() {
                        out[i].1.type_name = type_name;
                    }
                    out[i].1.samples.append(&mut samples);
                }
                None => {
                    index.insert(name.clone(), out.len());
                    out.push((name, RawValues { type_name, samples }));
                }
            }
        }
        Ok(out)
    }

    fn parse_numbers(&mut self) -> Result<Vec<RawSample>, Error> {
        let mut out = vec![];
        loop {
            match self.peek()? {
                Some(Token::Integer(_)) | Some(Token::Real(_)) => out.push(self.parse_simple_number()?),
                Some(Token::LParen) => out.push(self.parse_composite_number()?),
                _ => break,
            }
        }
        if out.is_empty() {
            let offset = self.current_offset();
            return Err(self.lexer.parse_error(offset, "expected at least one number".to_string()));
        }
        Ok(out)
    }

    fn parse_simple_number(&mut self) -> Result<RawSample, Error> {
        let token = self.bump()?.expect("caller already peeked Integer or Real").token;
        let sample = match token {
            Token::Integer(n) => RawSample::Number(Number::Int(n)),
            Token::Real(r) => RawSample::Number(Number::Real(r)),
            other => unreachable!("caller already peeked a number token, got {other:?}"),
        };
        self.skip_optional_prop()?;
        Ok(sample)
    }

    fn parse_composite_number(&mut self) -> Result<RawSample, Error> {
        self.expect_lparen()?;
        let inner = self.parse_numbers()?;
        self.expect_rparen()?;
        self.skip_optional_prop()?;
        Ok(RawSample::Tuple(inner))
    }

    fn skip_optional_prop(&mut self) -> Result<(), Error> {
        if matches!(self.peek()?, Some(Token::Keyword(Keyword::Prop))) {
            self.bump()?;
            self.expect_lparen()?;
            self.parse_named_values()?;
            self.expect_rparen()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_only_dataset() {
        let src = r#"HEADER "PSFversion" "1.00" END"#;
        let sections = parse(src, None).unwrap();
        assert_eq!(sections.header, vec![("PSFversion".to_string(), PropValue::Str("1.00".to_string()))]);
        assert!(sections.types.is_empty());
    }

    #[test]
    fn parses_dc_operating_point_with_struct_member() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE PROP("units" "V")
            VALUE
            "out" "float_double" 3.3
            END
        "#;
        let sections = parse(src, None).unwrap();
        assert_eq!(sections.values.len(), 1);
        assert_eq!(sections.values[0].0, "out");
        assert_eq!(sections.values[0].1.type_name.as_deref(), Some("float_double"));
    }

    #[test]
    fn parses_swept_trace_section_with_group() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            SWEEP
            "freq" "float_double" PROP("grid" 1)
            TRACE
            "biasgroup" GROUP 2
            "ib" "float_double"
            "vb" "float_double"
            VALUE
            "freq" 1.0 2.0
            "biasgroup" (1.0 2.0) (3.0 4.0)
            END
        "#;
        let sections = parse(src, None).unwrap();
        assert_eq!(sections.traces.len(), 1);
        assert!(matches!(sections.traces[0].shape, TraceShape::Group { .. }));
        let group = sections.groups.get("biasgroup").unwrap();
        assert_eq!(group.members, vec![("ib".to_string(), "float_double".to_string()), ("vb".to_string(), "float_double".to_string())]);
    }

    #[test]
    fn parse_values_accumulates_repeated_names_row_major() {
        // A complex trace disables the fast path (it contains `(`), so this exercises
        // parse_values directly: each sweep point repeats both names once per row.
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            "complex_double" COMPLEX DOUBLE
            SWEEP
            "freq" "float_double"
            TRACE
            "out" "complex_double"
            VALUE
            "freq" 10.0 "out" (1.0 0.0)
            "freq" 100.0 "out" (2.0 1.0)
            "freq" 1000.0 "out" (3.0 2.0)
            END
        "#;
        let sections = parse(src, None).unwrap();
        assert_eq!(sections.values.len(), 2);

        let freq = &sections.values.iter().find(|(n, _)| n == "freq").unwrap().1;
        assert_eq!(
            freq.samples,
            vec![
                RawSample::Number(Number::Real(10.0)),
                RawSample::Number(Number::Real(100.0)),
                RawSample::Number(Number::Real(1000.0)),
            ]
        );

        let out = &sections.values.iter().find(|(n, _)| n == "out").unwrap().1;
        assert_eq!(out.samples.len(), 3);
    }

    #[test]
    fn fast_path_and_grammar_path_agree_on_flat_values() {
        let header = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "float_double" FLOAT DOUBLE
            SWEEP
            "freq" "float_double"
            TRACE
            "gain" "float_double"
        "#;
        let fast_src = format!(r#"{header} VALUE "freq" 1.0 "gain" 2.0 "freq" 3.0 "gain" 4.0 END"#);
        let slow_src = format!(r#"{header} VALUE "freq" 1.0 3.0 "gain" 2.0 4.0 END"#);

        let fast = parse(&fast_src, None).unwrap();
        let slow = parse(&slow_src, None).unwrap();

        let fast_gain: Vec<f64> = fast
            .values
            .iter()
            .find(|(n, _)| n == "gain")
            .unwrap()
            .1
            .samples
            .iter()
            .map(|s| match s {
                RawSample::Number(Number::Real(v)) => *v,
                _ => panic!("expected real sample"),
            })
            .collect();
        let slow_gain: Vec<f64> = slow
            .values
            .iter()
            .find(|(n, _)| n == "gain")
            .unwrap()
            .1
            .samples
            .iter()
            .map(|s| match s {
                RawSample::Number(Number::Real(v)) => *v,
                _ => panic!("expected real sample"),
            })
            .collect();
        assert_eq!(fast_gain, slow_gain);
    }

    #[test]
    fn unknown_keyword_in_type_section_errors() {
        let src = r#"
            HEADER "PSFversion" "1.00"
            TYPE
            "broken" FROBNICATE
        "#;
        let err = parse(src, None).unwrap_err();
        assert!(matches!(err, Error::Lex(_)));
    }
}
