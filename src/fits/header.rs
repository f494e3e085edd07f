//! FITS header cards: parsing, typed lookup, and transfer to and from the
//! current HDU of an open `fitsio` file.

use std::fmt;

use anyhow::{anyhow, Result};
use fitsio::hdu::FitsHdu;
use fitsio::FitsFile;

use super::raw;

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Str(s) => s.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            HeaderValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String form with surrounding blanks removed. Numbers render as written.
    pub fn as_string(&self) -> String {
        match self {
            HeaderValue::Str(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => write!(f, "{}", s),
            HeaderValue::Int(v) => write!(f, "{}", v),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::Bool(v) => write!(f, "{}", if *v { "T" } else { "F" }),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(s: &str) -> Self {
        HeaderValue::Str(s.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(s: String) -> Self {
        HeaderValue::Str(s)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Bool(v)
    }
}

/// One keyword record.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub key: String,
    pub value: HeaderValue,
    pub comment: Option<String>,
}

/// An ordered list of keyword records. Keys are stored upper-case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a card, or replace the value and comment of an existing key.
    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>, comment: Option<&str>) {
        let key = key.trim().to_ascii_uppercase();
        let value = value.into();
        let comment = comment.map(str::to_string);
        match self.cards.iter_mut().find(|c| c.key == key) {
            Some(card) => {
                card.value = value;
                card.comment = comment;
            }
            None => self.cards.push(Card {
                key,
                value,
                comment,
            }),
        }
    }

    pub fn remove(&mut self, key: &str) {
        let key = key.to_ascii_uppercase();
        self.cards.retain(|c| c.key != key);
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|c| c.key == key).map(|c| &c.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn comment(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_uppercase();
        self.cards
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.comment.as_deref())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(HeaderValue::as_string)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(HeaderValue::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(HeaderValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .ok_or_else(|| anyhow!("missing required header card {}", key))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.get_f64(key)
            .ok_or_else(|| anyhow!("missing or non-numeric header card {}", key))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)
            .ok_or_else(|| anyhow!("missing or non-integer header card {}", key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Append every card of `other`, replacing keys already present.
    pub fn extend(&mut self, other: &Header) {
        for card in other.iter() {
            self.set(&card.key, card.value.clone(), card.comment.as_deref());
        }
    }
}

// ── Card parsing ───────────────────────────────────────────────────────────

/// Parse one 80-character card. Returns `None` for commentary, blank or END cards.
pub fn parse_card(card: &str) -> Option<Card> {
    if card.len() < 10 || &card[8..10] != "= " {
        return None;
    }
    let key = card[..8].trim().to_string();
    if key.is_empty() {
        return None;
    }
    let rest = &card[10..];
    let trimmed = rest.trim_start();

    if let Some(body) = trimmed.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut value = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = body.len();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                    continue;
                }
                end = i + 1;
                break;
            }
            value.push(c);
        }
        let comment = body[end..]
            .split_once('/')
            .map(|(_, c)| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return Some(Card {
            key,
            value: HeaderValue::Str(value.trim_end().to_string()),
            comment,
        });
    }

    let (token, comment) = match trimmed.split_once('/') {
        Some((t, c)) => (t.trim(), Some(c.trim().to_string()).filter(|c| !c.is_empty())),
        None => (trimmed.trim(), None),
    };
    let value = parse_token(token)?;
    Some(Card {
        key,
        value,
        comment,
    })
}

fn parse_token(token: &str) -> Option<HeaderValue> {
    match token {
        "" => None,
        "T" => Some(HeaderValue::Bool(true)),
        "F" => Some(HeaderValue::Bool(false)),
        _ => {
            if let Ok(v) = token.parse::<i64>() {
                return Some(HeaderValue::Int(v));
            }
            token
                .replace(['D', 'd'], "E")
                .parse::<f64>()
                .ok()
                .map(HeaderValue::Float)
        }
    }
}

// ── HDU transfer ───────────────────────────────────────────────────────────

/// Keys cfitsio owns; never copied from a `Header` onto an HDU.
const STRUCTURAL: &[&str] = &[
    "SIMPLE", "BITPIX", "EXTEND", "XTENSION", "PCOUNT", "GCOUNT", "TFIELDS", "EXTNAME", "END",
];

pub(crate) fn is_structural(key: &str) -> bool {
    STRUCTURAL.contains(&key)
        || key.starts_with("NAXIS")
        || key.starts_with("ZNAXIS")
        || ["TTYPE", "TFORM", "TUNIT", "TDIM"]
            .iter()
            .any(|p| key.strip_prefix(p).is_some_and(|n| n.chars().all(|c| c.is_ascii_digit())))
}

/// Header of the current HDU of `fptr`.
pub fn read_header(fptr: &mut FitsFile) -> Result<Header> {
    let mut header = Header::new();
    for record in raw::header_records(fptr)? {
        if let Some(card) = parse_card(&record) {
            header.cards.push(card);
        }
    }
    Ok(header)
}

/// Write every non-structural card of `header` onto `hdu`, which must be the
/// current HDU (as it is right after `FitsFile::hdu`, `create_image` or
/// `create_table`).
pub fn write_header(fptr: &mut FitsFile, hdu: &FitsHdu, header: &Header) -> Result<()> {
    for card in header.iter().filter(|c| !is_structural(&c.key)) {
        let key = card.key.as_str();
        match &card.value {
            HeaderValue::Bool(b) => {
                raw::write_logical_key(fptr, key, *b, card.comment.as_deref().unwrap_or(""))?
            }
            HeaderValue::Int(v) => hdu.write_key(fptr, key, *v)?,
            // Non-finite values have no FITS representation.
            HeaderValue::Float(v) => {
                hdu.write_key(fptr, key, if v.is_finite() { *v } else { 0.0 })?
            }
            HeaderValue::Str(s) => hdu.write_key(fptr, key, s.clone())?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_card() {
        let card = parse_card("FILTER  = 'g DECam SDSS c0001 4720.0 1520.0' / Unique filter identifier").unwrap();
        assert_eq!(card.key, "FILTER");
        assert_eq!(card.value, HeaderValue::Str("g DECam SDSS c0001 4720.0 1520.0".into()));
        assert_eq!(card.comment.as_deref(), Some("Unique filter identifier"));
    }

    #[test]
    fn test_parse_numeric_cards() {
        let c = parse_card("EXPTIME =                 90.0 / [s] Exposure duration").unwrap();
        assert_eq!(c.value, HeaderValue::Float(90.0));
        let c = parse_card("EXPNUM  =               563212 / DECam exposure number").unwrap();
        assert_eq!(c.value, HeaderValue::Int(563212));
        let c = parse_card("SIMPLE  =                    T").unwrap();
        assert_eq!(c.value, HeaderValue::Bool(true));
        let c = parse_card("CD1_1   =       -7.2844D-05").unwrap();
        assert!((c.value.as_f64().unwrap() + 7.2844e-5).abs() < 1e-15);
    }

    #[test]
    fn test_escaped_quote() {
        let c = parse_card("OBJECT  = 'O''Brien field'").unwrap();
        assert_eq!(c.value.as_string(), "O'Brien field");
    }
}
