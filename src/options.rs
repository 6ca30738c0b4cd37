//! Options-string parsing for Flex plugin calls.
//!
//! Test scripts hand every Flex action a loosely structured options string.
//! Authors either write an object literal (`{chain: "id:panel", text: 'hi'}`)
//! or the shorthand pair form (`chain=id:panel, text=hi`). [`parse_options`]
//! accepts both and never fails: malformed input degrades to an empty
//! [`OptionsMap`], which callers treat as "no options".
//!
//! The literal form is parsed with a strict data grammar. Nothing in the input
//! is ever evaluated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use thiserror::Error;

pub type JsonObject = JsonMap<String, JsonValue>;

/// Parsed option names mapped to their values.
///
/// Values coming from the pair form are always strings; values coming from the
/// literal form keep their literal type (numbers, booleans, nested objects).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsMap(JsonObject);

impl OptionsMap {
    pub fn new() -> Self {
        Self(JsonObject::new())
    }

    /// Parse a raw options string. Equivalent to [`parse_options`].
    pub fn parse(input: &str) -> Self {
        parse_options(input)
    }

    /// Parse an optional options string; a missing string yields an empty map.
    pub fn from_raw(input: Option<&str>) -> Self {
        input.map(parse_options).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Convenience accessor for string-valued options.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    pub fn into_inner(self) -> JsonObject {
        self.0
    }

    pub fn to_value(&self) -> JsonValue {
        JsonValue::Object(self.0.clone())
    }

    /// Compact JSON encoding handed to plugin methods.
    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }
}

impl From<JsonObject> for OptionsMap {
    fn from(value: JsonObject) -> Self {
        Self(value)
    }
}

impl fmt::Display for OptionsMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

/// Parse an options string, trying the object-literal form first and the
/// `key=value` pair form second.
pub fn parse_options(input: &str) -> OptionsMap {
    match parse_object_literal(input) {
        Ok(map) => OptionsMap(map),
        Err(err) => {
            log::debug!("options are not an object literal ({err}); using key=value pairs");
            parse_pairs(input)
        }
    }
}

/// Parse the shorthand `a=1, b=2` form.
///
/// Each comma-separated segment is trimmed and split on its first `=`. Keys and
/// values are kept verbatim. Segments without `=` name an option with no value,
/// which is not stored.
pub fn parse_pairs(input: &str) -> OptionsMap {
    let mut map = OptionsMap::new();
    for segment in input.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) => map.insert(key, JsonValue::String(value.to_string())),
            None => log::debug!("option '{segment}' has no value; ignoring"),
        }
    }
    map
}

/// Errors raised by the object-literal grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("top-level literal must be an object")]
    NotAnObject,
    #[error("literal nests deeper than {} levels", MAX_NESTING)]
    TooDeep,
}

/// Deepest object/array nesting the literal grammar accepts.
pub const MAX_NESTING: usize = 128;

/// Parse a complete object literal.
///
/// Accepts JSON plus the relaxed forms test authors write by hand: bare
/// identifier keys, single-quoted strings and trailing commas.
pub fn parse_object_literal(input: &str) -> Result<JsonObject, LiteralError> {
    let mut parser = LiteralParser::new(input);
    parser.skip_whitespace();
    if parser.peek() != Some('{') {
        return match parser.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some(_) => Err(LiteralError::NotAnObject),
        };
    }
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if let Some((offset, found)) = parser.peek_indexed() {
        return Err(LiteralError::UnexpectedChar { found, offset });
    }
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(LiteralError::NotAnObject),
    }
}

struct LiteralParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), LiteralError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(LiteralError::TooDeep);
        }
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_indexed(&self) -> Option<(usize, char)> {
        self.peek().map(|ch| (self.pos, ch))
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        match self.peek_indexed() {
            Some((_, ch)) if ch == expected => {
                self.bump();
                Ok(())
            }
            Some((offset, found)) => Err(LiteralError::UnexpectedChar { found, offset }),
            None => Err(LiteralError::UnexpectedEnd),
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek_indexed() {
            Some((offset, found)) => LiteralError::UnexpectedChar { found, offset },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue, LiteralError> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => {
                self.descend()?;
                let object = self.parse_object().map(JsonValue::Object);
                self.depth -= 1;
                object
            }
            Some('[') => {
                self.descend()?;
                let array = self.parse_array();
                self.depth -= 1;
                array
            }
            Some(quote @ ('"' | '\'')) => self.parse_string(quote).map(JsonValue::String),
            Some(ch) if ch == '-' || ch == '+' || ch == '.' || ch.is_ascii_digit() => {
                self.parse_number().map(JsonValue::Number)
            }
            Some(ch) if is_identifier_start(ch) => {
                let start = self.pos;
                let word = self.parse_identifier();
                match word {
                    "true" => Ok(JsonValue::Bool(true)),
                    "false" => Ok(JsonValue::Bool(false)),
                    "null" => Ok(JsonValue::Null),
                    _ => Err(LiteralError::UnexpectedChar {
                        found: ch,
                        offset: start,
                    }),
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_object(&mut self) -> Result<JsonObject, LiteralError> {
        self.expect('{')?;
        let mut map = JsonObject::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(map);
            }
            let key = self.parse_key()?;
            self.skip_whitespace();
            self.expect(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return Ok(map);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_array(&mut self) -> Result<JsonValue, LiteralError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(JsonValue::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    return Ok(JsonValue::Array(items));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => self.parse_string(quote),
            Some(ch) if is_identifier_start(ch) => Ok(self.parse_identifier().to_string()),
            Some(ch) if ch.is_ascii_digit() => {
                let number = self.parse_number()?;
                Ok(number.to_string())
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_identifier_part(ch) {
                self.bump();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn parse_number(&mut self) -> Result<Number, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E') {
                self.bump();
            } else {
                break;
            }
        }
        let raw = &self.input[start..self.pos];
        let digits = raw.strip_prefix('+').unwrap_or(raw);
        if let Ok(int) = digits.parse::<i64>() {
            return Ok(Number::from(int));
        }
        if let Ok(uint) = digits.parse::<u64>() {
            return Ok(Number::from(uint));
        }
        digits
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .ok_or_else(|| LiteralError::InvalidNumber(raw.to_string()))
    }

    fn parse_string(&mut self, quote: char) -> Result<String, LiteralError> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            let offset = self.pos;
            match self.bump() {
                None => return Err(LiteralError::UnexpectedEnd),
                Some(ch) if ch == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or(LiteralError::UnexpectedEnd)?;
                    match escaped {
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{0008}'),
                        'f' => out.push('\u{000C}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => out.push(self.parse_unicode_escape(offset)?),
                        _ => return Err(LiteralError::InvalidEscape(offset)),
                    }
                }
                Some(ch) => out.push(ch),
            }
        }
    }

    fn parse_hex4(&mut self, offset: usize) -> Result<u32, LiteralError> {
        let end = self.pos + 4;
        let hex = self
            .input
            .get(self.pos..end)
            .ok_or(LiteralError::InvalidEscape(offset))?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| LiteralError::InvalidEscape(offset))?;
        self.pos = end;
        Ok(code)
    }

    fn parse_unicode_escape(&mut self, offset: usize) -> Result<char, LiteralError> {
        let high = self.parse_hex4(offset)?;
        if (0xD800..0xDC00).contains(&high) {
            if self.input[self.pos..].starts_with("\\u") {
                self.pos += 2;
                let low = self.parse_hex4(offset)?;
                if (0xDC00..0xE000).contains(&low) {
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(combined).ok_or(LiteralError::InvalidEscape(offset));
                }
            }
            return Err(LiteralError::InvalidEscape(offset));
        }
        char::from_u32(high).ok_or(LiteralError::InvalidEscape(offset))
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}
