//! USDA (ASCII) text parser.
//!
//! The text is tokenized first and then parsed recursively into prim specs.
//! Only the subset of the format needed for import is understood.
//!
//! # Supported Syntax
//!
//! - Layer header: `defaultPrim`, `timeCodesPerSecond`, `framesPerSecond`,
//!   `startTimeCode`, `endTimeCode`, `metersPerUnit`, `upAxis`, `doc`
//! - `def`, `over` and `class` prims with an optional type name
//! - Prim metadata: `active`, `instanceable`, `kind`, `references`,
//!   `variants`, `variantSets`, `apiSchemas` (list ops are accepted)
//! - `variantSet "name" = { "variant" { ... } }`
//! - Attributes with `uniform`/`custom`, scalar and array values, and
//!   `.timeSamples = { time: value, ... }`
//! - `rel` declarations, `.connect` values and dictionaries are skipped

use ferry_math::{DMat4, DVec2, DVec3, DVec4};
use thiserror::Error;

use super::types::*;
use super::ScenePath;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format at line {line}: {text}")]
    InvalidNumber { line: usize, text: String },

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Asset(String),
    Path(String),
    Number(String),
    Punct(char),
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

/// An untyped value as written in the file.
#[derive(Clone, Debug, PartialEq)]
enum Raw {
    Number(String),
    Str(String),
    Ident(String),
    Asset(String, Option<String>),
    Path(String),
    Tuple(Vec<Raw>),
    List(Vec<Raw>),
    Dict(Vec<(String, Raw)>),
}

/// Element type of an attribute, derived from its declared type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Double,
    Vec2,
    Vec3,
    Vec4,
    Matrix,
    String,
    Token,
    Asset,
}

fn classify(type_name: &str) -> Option<Kind> {
    let kind = match type_name {
        "bool" => Kind::Bool,
        "int" | "int64" | "uint" | "uint64" | "uchar" => Kind::Int,
        "float" | "double" | "half" | "timecode" => Kind::Double,
        "string" => Kind::String,
        "token" => Kind::Token,
        "asset" => Kind::Asset,
        "matrix4d" => Kind::Matrix,
        "quatf" | "quatd" | "quath" => Kind::Vec4,
        t if t.starts_with("matrix") => return None,
        t => match t.chars().find(|c| c.is_ascii_digit()) {
            Some('2') => Kind::Vec2,
            Some('3') => Kind::Vec3,
            Some('4') => Kind::Vec4,
            _ => return None,
        },
    };
    Some(kind)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.'
}

fn tokenize(content: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '"' | '\'' => {
                let start_line = line;
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                let mut text = String::new();
                if triple {
                    i += 3;
                    loop {
                        if i >= chars.len() {
                            return Err(ParseError::Parse {
                                line: start_line,
                                message: "unterminated string".to_string(),
                            });
                        }
                        if chars[i] == c && chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                            i += 3;
                            break;
                        }
                        if chars[i] == '\n' {
                            line += 1;
                        }
                        text.push(chars[i]);
                        i += 1;
                    }
                } else {
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None | Some('\n') => {
                                return Err(ParseError::Parse {
                                    line: start_line,
                                    message: "unterminated string".to_string(),
                                })
                            }
                            Some('\\') => {
                                match chars.get(i + 1) {
                                    Some('n') => text.push('\n'),
                                    Some('t') => text.push('\t'),
                                    Some(&other) => text.push(other),
                                    None => {}
                                }
                                i += 2;
                            }
                            Some(&ch) if ch == c => {
                                i += 1;
                                break;
                            }
                            Some(&ch) => {
                                text.push(ch);
                                i += 1;
                            }
                        }
                    }
                }
                tokens.push(Token { tok: Tok::Str(text), line: start_line });
            }
            '@' | '<' => {
                let close = if c == '@' { '@' } else { '>' };
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != close {
                    if chars[end] == '\n' {
                        return Err(ParseError::Parse {
                            line,
                            message: format!("unterminated '{c}'"),
                        });
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ParseError::UnexpectedEof);
                }
                let text: String = chars[start..end].iter().collect();
                let tok = if c == '@' { Tok::Asset(text) } else { Tok::Path(text) };
                tokens.push(Token { tok, line });
                i = end + 1;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+' || c == '.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    let exponent_sign = (ch == '-' || ch == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token { tok: Tok::Number(text), line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token { tok: Tok::Ident(text), line });
            }
            '(' | ')' | '{' | '}' | '[' | ']' | '=' | ',' | ':' | ';' => {
                tokens.push(Token { tok: Tok::Punct(c), line });
                i += 1;
            }
            other => {
                return Err(ParseError::Parse {
                    line,
                    message: format!("unexpected character '{other}'"),
                })
            }
        }
    }

    Ok(tokens)
}

/// Result of parsing one layer file.
#[derive(Clone, Debug, Default)]
pub struct ParsedLayer {
    pub metadata: LayerMetadata,
    pub root_prims: Vec<PrimSpec>,
}

/// USDA text parser.
pub struct UsdaParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(content)?,
            pos: 0,
        })
    }

    /// Parse the header and every root prim.
    pub fn parse(&mut self) -> ParseResult<ParsedLayer> {
        let mut layer = ParsedLayer::default();

        if self.peek_punct('(') {
            self.parse_layer_metadata(&mut layer.metadata)?;
        }

        while self.peek().is_some() {
            layer.root_prims.push(self.parse_prim()?);
        }

        log::debug!("Parsed {} root prims", layer.root_prims.len());
        Ok(layer)
    }

    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_punct(&self, c: char) -> bool {
        self.peek() == Some(&Tok::Punct(c))
    }

    fn peek_ident(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(w)) if w == word)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.line)
    }

    fn next(&mut self) -> ParseResult<Tok> {
        let token = self.tokens.get(self.pos).ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(token.tok.clone())
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::Parse {
            line: self.line(),
            message: message.into(),
        })
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        match self.next()? {
            Tok::Punct(p) if p == c => Ok(()),
            other => {
                self.pos -= 1;
                self.error(format!("expected '{c}', found {other:?}"))
            }
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.next()? {
            Tok::Ident(word) => Ok(word),
            other => {
                self.pos -= 1;
                self.error(format!("expected identifier, found {other:?}"))
            }
        }
    }

    fn expect_string(&mut self) -> ParseResult<String> {
        match self.next()? {
            Tok::Str(s) => Ok(s),
            other => {
                self.pos -= 1;
                self.error(format!("expected string, found {other:?}"))
            }
        }
    }

    /// Consumes `}` or fails with the line the block was opened on.
    fn close_block(&mut self, opened_at: usize) -> ParseResult<bool> {
        match self.peek() {
            None => Err(ParseError::UnclosedBlock(opened_at)),
            Some(Tok::Punct('}')) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    // ---- raw values ----------------------------------------------------

    fn parse_raw(&mut self) -> ParseResult<Raw> {
        match self.next()? {
            Tok::Number(n) => Ok(Raw::Number(n)),
            Tok::Str(s) => Ok(Raw::Str(s)),
            Tok::Ident(i) => Ok(Raw::Ident(i)),
            Tok::Path(p) => Ok(Raw::Path(p)),
            Tok::Asset(a) => {
                let target = match self.peek() {
                    Some(Tok::Path(p)) => Some(p.clone()),
                    _ => None,
                };
                if target.is_some() {
                    self.pos += 1;
                }
                Ok(Raw::Asset(a, target))
            }
            Tok::Punct('(') => Ok(Raw::Tuple(self.parse_sequence(')')?)),
            Tok::Punct('[') => Ok(Raw::List(self.parse_sequence(']')?)),
            Tok::Punct('{') => self.parse_dict(),
            other => {
                self.pos -= 1;
                self.error(format!("expected value, found {other:?}"))
            }
        }
    }

    fn parse_sequence(&mut self, close: char) -> ParseResult<Vec<Raw>> {
        let opened_at = self.line();
        let mut items = Vec::new();
        loop {
            match self.peek().cloned() {
                None => return Err(ParseError::UnclosedBlock(opened_at)),
                Some(Tok::Punct(c)) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Tok::Punct(',')) => self.pos += 1,
                Some(_) => items.push(self.parse_raw()?),
            }
        }
    }

    /// `{ type name = value ... }`
    fn parse_dict(&mut self) -> ParseResult<Raw> {
        let opened_at = self.line();
        let mut entries = Vec::new();
        while !self.close_block(opened_at)? {
            if self.peek_punct(',') || self.peek_punct(';') {
                self.pos += 1;
                continue;
            }
            self.expect_ident()?;
            if self.peek_punct('[') {
                self.expect_punct('[')?;
                self.expect_punct(']')?;
            }
            let key = match self.next()? {
                Tok::Ident(k) | Tok::Str(k) => k,
                other => return self.error(format!("expected dictionary key, found {other:?}")),
            };
            self.expect_punct('=')?;
            entries.push((key, self.parse_raw()?));
        }
        Ok(Raw::Dict(entries))
    }

    // ---- typed values --------------------------------------------------

    fn number(&self, raw: &Raw) -> ParseResult<f64> {
        let text = match raw {
            Raw::Number(n) => n.as_str(),
            Raw::Ident(i) if i == "inf" || i == "nan" => i.as_str(),
            other => return self.error(format!("expected number, found {other:?}")),
        };
        text.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
            line: self.line(),
            text: text.to_string(),
        })
    }

    fn tuple(&self, raw: &Raw, arity: usize) -> ParseResult<Vec<f64>> {
        match raw {
            Raw::Tuple(items) if items.len() == arity => items.iter().map(|r| self.number(r)).collect(),
            other => self.error(format!("expected {arity}-tuple, found {other:?}")),
        }
    }

    fn scalar(&self, kind: Kind, raw: &Raw) -> ParseResult<Value> {
        let value = match kind {
            Kind::Bool => match raw {
                Raw::Ident(b) if b == "true" => Value::Bool(true),
                Raw::Ident(b) if b == "false" => Value::Bool(false),
                Raw::Number(n) => Value::Bool(n != "0"),
                other => return self.error(format!("expected bool, found {other:?}")),
            },
            Kind::Int => {
                let n = self.number(raw)?;
                if n.fract() != 0.0 {
                    return self.error(format!("expected integer, found {n}"));
                }
                Value::Int(n as i64)
            }
            Kind::Double => Value::Double(self.number(raw)?),
            Kind::Vec2 => {
                let t = self.tuple(raw, 2)?;
                Value::Vec2(DVec2::new(t[0], t[1]))
            }
            Kind::Vec3 => {
                let t = self.tuple(raw, 3)?;
                Value::Vec3(DVec3::new(t[0], t[1], t[2]))
            }
            Kind::Vec4 => {
                let t = self.tuple(raw, 4)?;
                Value::Vec4(DVec4::new(t[0], t[1], t[2], t[3]))
            }
            Kind::Matrix => {
                let Raw::Tuple(rows) = raw else {
                    return self.error("expected matrix rows");
                };
                if rows.len() != 4 {
                    return self.error("matrix4d needs four rows");
                }
                let mut cols = [[0.0; 4]; 4];
                for (i, row) in rows.iter().enumerate() {
                    let r = self.tuple(row, 4)?;
                    cols[i] = [r[0], r[1], r[2], r[3]];
                }
                // USD rows are row vectors, which are glam columns
                Value::Matrix(DMat4::from_cols_array_2d(&cols))
            }
            Kind::String | Kind::Token => match raw {
                Raw::Str(s) => {
                    if kind == Kind::String {
                        Value::String(s.clone())
                    } else {
                        Value::Token(s.clone())
                    }
                }
                other => return self.error(format!("expected string, found {other:?}")),
            },
            Kind::Asset => match raw {
                Raw::Asset(a, _) => Value::Asset(a.clone()),
                Raw::Str(s) => Value::Asset(s.clone()),
                other => return self.error(format!("expected asset path, found {other:?}")),
            },
        };
        Ok(value)
    }

    fn typed(&self, kind: Kind, is_array: bool, raw: &Raw) -> ParseResult<Value> {
        if !is_array {
            return self.scalar(kind, raw);
        }
        let Raw::List(items) = raw else {
            return self.error(format!("expected array, found {raw:?}"));
        };
        let values = items
            .iter()
            .map(|item| self.scalar(kind, item))
            .collect::<ParseResult<Vec<_>>>()?;

        macro_rules! collect {
            ($variant:ident, $array:ident) => {
                Value::$array(
                    values
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::$variant(x) => Some(x),
                            _ => None,
                        })
                        .collect(),
                )
            };
        }

        Ok(match kind {
            Kind::Bool => collect!(Bool, BoolArray),
            Kind::Int => collect!(Int, IntArray),
            Kind::Double => collect!(Double, DoubleArray),
            Kind::Vec2 => collect!(Vec2, Vec2Array),
            Kind::Vec3 => collect!(Vec3, Vec3Array),
            Kind::Vec4 => collect!(Vec4, Vec4Array),
            Kind::Matrix => collect!(Matrix, MatrixArray),
            Kind::String => collect!(String, StringArray),
            Kind::Token => collect!(Token, TokenArray),
            Kind::Asset => Value::StringArray(
                values
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Asset(a) => Some(a),
                        _ => None,
                    })
                    .collect(),
            ),
        })
    }

    fn strings(&self, raw: &Raw) -> ParseResult<Vec<String>> {
        match raw {
            Raw::Str(s) => Ok(vec![s.clone()]),
            Raw::List(items) => items
                .iter()
                .map(|item| match item {
                    Raw::Str(s) => Ok(s.clone()),
                    other => self.error(format!("expected string, found {other:?}")),
                })
                .collect(),
            Raw::Ident(n) if n == "None" => Ok(Vec::new()),
            other => self.error(format!("expected string list, found {other:?}")),
        }
    }

    fn path(&self, text: &str) -> ParseResult<ScenePath> {
        ScenePath::parse(text).map_err(|e| ParseError::Parse {
            line: self.line(),
            message: e.to_string(),
        })
    }

    fn references(&self, raw: &Raw) -> ParseResult<Vec<Reference>> {
        match raw {
            Raw::Path(p) => Ok(vec![Reference {
                asset: None,
                prim_path: Some(self.path(p)?),
            }]),
            Raw::Asset(asset, target) => Ok(vec![Reference {
                asset: (!asset.is_empty()).then(|| asset.clone()),
                prim_path: target.as_deref().map(|p| self.path(p)).transpose()?,
            }]),
            Raw::List(items) => {
                let mut refs = Vec::new();
                for item in items {
                    refs.extend(self.references(item)?);
                }
                Ok(refs)
            }
            Raw::Ident(n) if n == "None" => Ok(Vec::new()),
            other => self.error(format!("expected reference, found {other:?}")),
        }
    }

    // ---- metadata ------------------------------------------------------

    fn parse_layer_metadata(&mut self, metadata: &mut LayerMetadata) -> ParseResult<()> {
        let opened_at = self.line();
        self.expect_punct('(')?;
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(opened_at)),
                Some(Tok::Punct(')')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Tok::Str(_)) => {
                    metadata.doc = Some(self.expect_string()?);
                }
                Some(_) => {
                    let mut key = self.expect_ident()?;
                    if matches!(key.as_str(), "prepend" | "append" | "add" | "delete" | "reorder") {
                        key = self.expect_ident()?;
                    }
                    self.expect_punct('=')?;
                    let raw = self.parse_raw()?;
                    match key.as_str() {
                        "defaultPrim" => metadata.default_prim = self.strings(&raw)?.into_iter().next(),
                        "timeCodesPerSecond" => metadata.time_codes_per_second = Some(self.number(&raw)?),
                        "framesPerSecond" => metadata.frames_per_second = Some(self.number(&raw)?),
                        "startTimeCode" => metadata.start_time_code = Some(self.number(&raw)?),
                        "endTimeCode" => metadata.end_time_code = Some(self.number(&raw)?),
                        "metersPerUnit" => metadata.meters_per_unit = Some(self.number(&raw)?),
                        "upAxis" => metadata.up_axis = self.strings(&raw)?.into_iter().next(),
                        "doc" => metadata.doc = self.strings(&raw)?.into_iter().next(),
                        other => log::debug!("Skipping layer metadata '{other}'"),
                    }
                }
            }
        }
    }

    fn parse_prim_metadata(&mut self, spec: &mut PrimSpec) -> ParseResult<()> {
        let opened_at = self.line();
        self.expect_punct('(')?;
        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(opened_at)),
                Some(Tok::Punct(')')) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(Tok::Str(_)) | Some(Tok::Punct(',')) | Some(Tok::Punct(';')) => {
                    self.pos += 1;
                }
                Some(_) => {
                    let mut key = self.expect_ident()?;
                    let mut list_op = None;
                    if matches!(key.as_str(), "prepend" | "append" | "add" | "delete" | "reorder") {
                        list_op = Some(key);
                        key = self.expect_ident()?;
                    }
                    self.expect_punct('=')?;
                    let raw = self.parse_raw()?;
                    if matches!(list_op.as_deref(), Some("delete") | Some("reorder")) {
                        continue;
                    }
                    match key.as_str() {
                        "active" => spec.active = self.scalar(Kind::Bool, &raw)?.as_bool(),
                        "instanceable" => spec.instanceable = self.scalar(Kind::Bool, &raw)?.as_bool(),
                        "kind" => spec.kind = self.strings(&raw)?.into_iter().next(),
                        "references" => spec.references.extend(self.references(&raw)?),
                        "apiSchemas" => spec.api_schemas.extend(self.strings(&raw)?),
                        "variantSets" => {
                            for name in self.strings(&raw)? {
                                if !spec.variant_set_names.contains(&name) {
                                    spec.variant_set_names.push(name);
                                }
                            }
                        }
                        "variants" => {
                            let Raw::Dict(entries) = raw else {
                                return self.error("expected variant selection dictionary");
                            };
                            for (set, selection) in entries {
                                if let Some(sel) = self.strings(&selection)?.into_iter().next() {
                                    spec.variant_selections.insert(set, sel);
                                }
                            }
                        }
                        other => log::debug!("Skipping prim metadata '{other}' on '{}'", spec.name),
                    }
                }
            }
        }
    }

    /// Skips a `( ... )` metadata block on attributes and relationships.
    fn skip_metadata(&mut self) -> ParseResult<()> {
        if !self.peek_punct('(') {
            return Ok(());
        }
        let opened_at = self.line();
        let mut depth = 0usize;
        loop {
            match self.next() {
                Ok(Tok::Punct('(')) => depth += 1,
                Ok(Tok::Punct(')')) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(_) => return Err(ParseError::UnclosedBlock(opened_at)),
            }
        }
    }

    // ---- prims ---------------------------------------------------------

    fn parse_prim(&mut self) -> ParseResult<PrimSpec> {
        let specifier = match self.expect_ident()?.as_str() {
            "def" => Specifier::Def,
            "over" => Specifier::Over,
            "class" => Specifier::Class,
            other => return self.error(format!("expected prim specifier, found '{other}'")),
        };
        let type_name = match self.peek() {
            Some(Tok::Ident(_)) => Some(self.expect_ident()?),
            _ => None,
        };
        let name = self.expect_string()?;
        let mut spec = PrimSpec {
            specifier,
            type_name,
            name,
            ..Default::default()
        };

        if self.peek_punct('(') {
            self.parse_prim_metadata(&mut spec)?;
        }
        self.parse_prim_body(&mut spec)?;
        Ok(spec)
    }

    fn parse_prim_body(&mut self, spec: &mut PrimSpec) -> ParseResult<()> {
        let opened_at = self.line();
        self.expect_punct('{')?;
        while !self.close_block(opened_at)? {
            match self.peek().cloned() {
                Some(Tok::Punct(';')) => self.pos += 1,
                Some(Tok::Ident(word)) => match word.as_str() {
                    "def" | "over" | "class" => {
                        let child = self.parse_prim()?;
                        spec.children.push(child);
                    }
                    "variantSet" => self.parse_variant_set(spec)?,
                    "rel" => self.skip_relationship()?,
                    _ => self.parse_attribute(spec)?,
                },
                Some(other) => {
                    return self.error(format!("unexpected {other:?} in prim '{}'", spec.name));
                }
                None => return Err(ParseError::UnclosedBlock(opened_at)),
            }
        }
        Ok(())
    }

    fn parse_variant_set(&mut self, spec: &mut PrimSpec) -> ParseResult<()> {
        self.expect_ident()?;
        let name = self.expect_string()?;
        self.expect_punct('=')?;
        let opened_at = self.line();
        self.expect_punct('{')?;

        let mut set = VariantSetSpec {
            name: name.clone(),
            variants: Vec::new(),
        };
        while !self.close_block(opened_at)? {
            let variant_name = self.expect_string()?;
            let mut body = PrimSpec::new(Specifier::Over, None, variant_name);
            if self.peek_punct('(') {
                self.parse_prim_metadata(&mut body)?;
            }
            self.parse_prim_body(&mut body)?;
            set.variants.push(body);
        }

        if !spec.variant_set_names.contains(&name) {
            spec.variant_set_names.push(name);
        }
        spec.variant_sets.push(set);
        Ok(())
    }

    fn skip_relationship(&mut self) -> ParseResult<()> {
        self.expect_ident()?;
        if self.peek_ident("custom") || self.peek_ident("uniform") || self.peek_ident("varying") {
            self.pos += 1;
        }
        self.expect_ident()?;
        if self.peek_punct('=') {
            self.pos += 1;
            self.parse_raw()?;
        }
        self.skip_metadata()
    }

    fn parse_attribute(&mut self, spec: &mut PrimSpec) -> ParseResult<()> {
        let mut uniform = false;
        while self.peek_ident("custom") || self.peek_ident("uniform") || self.peek_ident("varying") || self.peek_ident("config") {
            if self.expect_ident()? == "uniform" {
                uniform = true;
            }
        }

        let type_name = self.expect_ident()?;
        let is_array = self.peek_punct('[');
        if is_array {
            self.expect_punct('[')?;
            self.expect_punct(']')?;
        }
        let full_name = self.expect_ident()?;

        if full_name.ends_with(".connect") {
            self.expect_punct('=')?;
            self.parse_raw()?;
            return self.skip_metadata();
        }

        let kind = classify(&type_name);
        let declared = if is_array { format!("{type_name}[]") } else { type_name.clone() };

        if let Some(name) = full_name.strip_suffix(".timeSamples") {
            self.expect_punct('=')?;
            let samples = self.parse_time_samples(kind, is_array)?;
            if let Some(attr) = Self::attribute_entry(spec, name, &declared, uniform, kind.is_some()) {
                for (time, value) in samples {
                    attr.set_sample(time, value);
                }
            }
            return self.skip_metadata();
        }

        let default = if self.peek_punct('=') {
            self.pos += 1;
            let raw = self.parse_raw()?;
            match (kind, &raw) {
                (_, Raw::Ident(none)) if none == "None" => None,
                (Some(kind), raw) => Some(self.typed(kind, is_array, raw)?),
                (None, _) => None,
            }
        } else {
            None
        };
        self.skip_metadata()?;

        if let Some(attr) = Self::attribute_entry(spec, &full_name, &declared, uniform, kind.is_some()) {
            if default.is_some() {
                attr.default = default;
            }
        }
        Ok(())
    }

    fn attribute_entry<'s>(
        spec: &'s mut PrimSpec,
        name: &str,
        type_name: &str,
        uniform: bool,
        supported: bool,
    ) -> Option<&'s mut Attribute> {
        if !supported {
            log::debug!("Skipping attribute '{name}' of unsupported type '{type_name}'");
            return None;
        }
        let idx = match spec.attributes.iter().position(|a| a.name == name) {
            Some(idx) => idx,
            None => {
                let mut attr = Attribute::new(name, type_name);
                attr.uniform = uniform;
                spec.attributes.push(attr);
                spec.attributes.len() - 1
            }
        };
        spec.attributes.get_mut(idx)
    }

    /// `{ time: value, ... }`
    fn parse_time_samples(&mut self, kind: Option<Kind>, is_array: bool) -> ParseResult<Vec<(f64, Value)>> {
        let opened_at = self.line();
        self.expect_punct('{')?;
        let mut samples = Vec::new();
        while !self.close_block(opened_at)? {
            if self.peek_punct(',') {
                self.pos += 1;
                continue;
            }
            let time_raw = self.parse_raw()?;
            let time = self.number(&time_raw)?;
            self.expect_punct(':')?;
            let raw = self.parse_raw()?;
            if let Some(kind) = kind {
                if !matches!(&raw, Raw::Ident(n) if n == "None") {
                    samples.push((time, self.typed(kind, is_array, &raw)?));
                }
            }
        }
        Ok(samples)
    }
}

/// Parse a whole USDA document.
pub fn parse_usda(content: &str) -> ParseResult<ParsedLayer> {
    UsdaParser::new(content)?.parse()
}
