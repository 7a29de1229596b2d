//! Schema-aware row codec.
//!
//! This module is the bridge between typed SQL literals (as the
//! out-of-scope tokenizer/parser would hand them in) and the two byte
//! formats the storage engine actually persists: **primary-key bytes**
//! and **row bytes**. It also decodes row bytes back into JSON for
//! query responses.
//!
//! `ColumnType` is a closed sum type — every function here matches on it
//! exhaustively, so adding a column type is a compile error until every
//! site is updated, by design (see the crate-level design notes on
//! polymorphic table values).


use crate::codec;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Column types
// ------------------------------------------------------------------------------------------------

/// The closed set of column types a table schema may declare.
///
/// Discriminant values match the `type_id` byte persisted in
/// `metadata.bin`; they are part of the on-disk contract and must not be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Char = 1,
    Text = 2,
    Blob = 3,
    Int32 = 4,
    Int64 = 5,
    Boolean = 6,
    Float32 = 7,
    Date = 8,
    Timestamp = 9,
}

impl ColumnType {
    /// Recovers a `ColumnType` from its on-disk `type_id` byte.
    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Char),
            2 => Some(Self::Text),
            3 => Some(Self::Blob),
            4 => Some(Self::Int32),
            5 => Some(Self::Int64),
            6 => Some(Self::Boolean),
            7 => Some(Self::Float32),
            8 => Some(Self::Date),
            9 => Some(Self::Timestamp),
            _ => None,
        }
    }

    /// Returns the on-disk `type_id` byte for this type.
    pub fn type_id(self) -> u8 {
        self as u8
    }
}

/// Maps a schema-declaration type name (as it would appear in a `CREATE
/// TABLE` statement) to a [`ColumnType`], case-insensitively. Several
/// spellings are accepted for the same type (`int`/`int32`,
/// `binary`/`blob`, `varchar`/`string`/`text`) to match common SQL
/// dialects.
pub fn column_type_from_name(name: &str) -> Option<ColumnType> {
    match name.to_ascii_lowercase().as_str() {
        "char" => Some(ColumnType::Char),
        "varchar" | "string" | "text" => Some(ColumnType::Text),
        "binary" | "blob" => Some(ColumnType::Blob),
        "int" | "int32" => Some(ColumnType::Int32),
        "int64" | "bigint" => Some(ColumnType::Int64),
        "boolean" | "bool" => Some(ColumnType::Boolean),
        "float" => Some(ColumnType::Float32),
        "date" => Some(ColumnType::Date),
        "timestamp" => Some(ColumnType::Timestamp),
        _ => None,
    }
}

/// Returns the canonical schema-declaration name for a [`ColumnType`].
/// This is the inverse of [`column_type_from_name`]'s primary spelling,
/// not a round trip of every accepted alias.
pub fn column_type_name(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Char => "char",
        ColumnType::Text => "varchar",
        ColumnType::Blob => "binary",
        ColumnType::Int32 => "int32",
        ColumnType::Int64 => "int64",
        ColumnType::Boolean => "boolean",
        ColumnType::Float32 => "float",
        ColumnType::Date => "date",
        ColumnType::Timestamp => "timestamp",
    }
}

// ------------------------------------------------------------------------------------------------
// Schema
// ------------------------------------------------------------------------------------------------

/// A single column declaration: name plus type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
        }
    }
}

/// An ordered column list plus the index of the primary-key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
    pub primary_key_index: usize,
}

impl TableSchema {
    /// Builds a schema, validating that column names are unique and the
    /// primary-key index is in range. Returns `bad_metadata` on
    /// violation — this is the same failure mode as a schema loaded from
    /// a corrupted `metadata.bin`.
    pub fn new(columns: Vec<ColumnDef>, primary_key_index: usize) -> Result<Self, RowCodecError> {
        if columns.is_empty() {
            return Err(RowCodecError::BadMetadata("schema has no columns".into()));
        }
        if primary_key_index >= columns.len() {
            return Err(RowCodecError::BadMetadata(
                "primary key index out of range".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(RowCodecError::BadMetadata(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }
        Ok(Self {
            columns,
            primary_key_index,
        })
    }

    pub fn primary_key_column(&self) -> &ColumnDef {
        &self.columns[self.primary_key_index]
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

// ------------------------------------------------------------------------------------------------
// SQL literals
// ------------------------------------------------------------------------------------------------

/// The syntactic kind of a literal as it arrived from the (out-of-scope)
/// SQL tokenizer, before any type checking against a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlLiteralKind {
    Null,
    Number,
    Bool,
    Quoted,
    Hex,
    Base64,
}

/// A tagged literal value: the raw source text plus the syntactic kind
/// that determined how it was lexed. `Null` literals carry no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlLiteral {
    pub kind: SqlLiteralKind,
    pub text: String,
}

impl SqlLiteral {
    pub fn null() -> Self {
        Self {
            kind: SqlLiteralKind::Null,
            text: String::new(),
        }
    }

    pub fn number(text: impl Into<String>) -> Self {
        Self {
            kind: SqlLiteralKind::Number,
            text: text.into(),
        }
    }

    pub fn bool_lit(text: impl Into<String>) -> Self {
        Self {
            kind: SqlLiteralKind::Bool,
            text: text.into(),
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            kind: SqlLiteralKind::Quoted,
            text: text.into(),
        }
    }

    pub fn hex(text: impl Into<String>) -> Self {
        Self {
            kind: SqlLiteralKind::Hex,
            text: text.into(),
        }
    }

    pub fn base64(text: impl Into<String>) -> Self {
        Self {
            kind: SqlLiteralKind::Base64,
            text: text.into(),
        }
    }
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SqlLiteralKind::Null => write!(f, "null"),
            _ => write!(f, "{}", self.text),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Errors
// ------------------------------------------------------------------------------------------------

/// Errors raised by the row codec, named by the wire error kind the
/// out-of-scope server collaborator would report ([`Self::kind`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RowCodecError {
    #[error("invalid primary key literal for column type")]
    InvalidPk,

    #[error("row has unexpected version")]
    BadRowVersion,

    #[error("malformed row bytes")]
    BadRow,

    #[error("malformed hex literal")]
    BadHex,

    #[error("malformed base64 literal")]
    BadBase64,

    #[error("malformed integer literal")]
    BadInt,

    #[error("malformed float literal")]
    BadFloat,

    #[error("malformed date literal")]
    BadDate,

    #[error("malformed timestamp literal")]
    BadTimestamp,

    #[error("primary key column cannot be updated")]
    CannotUpdatePk,

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate column in assignment list: {0}")]
    DuplicateColumn(String),

    #[error("row/column count mismatch")]
    ColumnCountMismatch,

    #[error("primary key column missing from column list")]
    MissingPk,

    #[error("bad schema metadata: {0}")]
    BadMetadata(String),
}

impl RowCodecError {
    /// The wire error kind the server collaborator surfaces for this
    /// failure (see the external-interfaces error taxonomy).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPk => "invalid_pk",
            Self::BadRowVersion => "bad_row_version",
            Self::BadRow => "bad_row",
            Self::BadHex => "bad_hex",
            Self::BadBase64 => "bad_base64",
            Self::BadInt => "bad_int",
            Self::BadFloat => "bad_float",
            Self::BadDate => "bad_date",
            Self::BadTimestamp => "bad_timestamp",
            Self::CannotUpdatePk => "cannot_update_pk",
            Self::UnknownColumn(_) => "unknown_column",
            Self::DuplicateColumn(_) => "duplicate_column",
            Self::ColumnCountMismatch => "bad_row",
            Self::MissingPk => "missing_pk",
            Self::BadMetadata(_) => "bad_metadata",
        }
    }
}

const ROW_VERSION: u32 = 1;

// ------------------------------------------------------------------------------------------------
// hex / base64 helpers
// ------------------------------------------------------------------------------------------------

fn hex_to_bytes(s: &str) -> Result<Vec<u8>, RowCodecError> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(RowCodecError::BadHex);
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16).ok_or(RowCodecError::BadHex)?;
        let lo = (chunk[1] as char).to_digit(16).ok_or(RowCodecError::BadHex)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

fn base64_to_bytes(s: &str) -> Result<Vec<u8>, RowCodecError> {
    BASE64.decode(s.as_bytes()).map_err(|_| RowCodecError::BadBase64)
}

fn bytes_to_base64(b: &[u8]) -> String {
    BASE64.encode(b)
}

// ------------------------------------------------------------------------------------------------
// Literal parsing
// ------------------------------------------------------------------------------------------------

fn parse_i32(s: &str) -> Result<i32, RowCodecError> {
    s.parse::<i32>().map_err(|_| RowCodecError::BadInt)
}

fn parse_i64(s: &str) -> Result<i64, RowCodecError> {
    s.parse::<i64>().map_err(|_| RowCodecError::BadInt)
}

fn parse_f32(s: &str) -> Result<f32, RowCodecError> {
    s.parse::<f32>().map_err(|_| RowCodecError::BadFloat)
}

/// Parses `YYYY-MM-DD` (exactly 10 characters) into days since the Unix
/// epoch (1970-01-01), signed.
pub fn parse_date_days(s: &str) -> Result<i32, RowCodecError> {
    if s.len() != 10 || s.as_bytes()[4] != b'-' || s.as_bytes()[7] != b'-' {
        return Err(RowCodecError::BadDate);
    }
    let y: i32 = s[0..4].parse().map_err(|_| RowCodecError::BadDate)?;
    let m: u32 = s[5..7].parse().map_err(|_| RowCodecError::BadDate)?;
    let d: u32 = s[8..10].parse().map_err(|_| RowCodecError::BadDate)?;
    days_from_civil(y, m, d).ok_or(RowCodecError::BadDate)
}

/// Parses `YYYY-MM-DDThh:mm:ss[.fff]Z` into milliseconds since the Unix
/// epoch, signed. Fractional seconds beyond 3 digits are discarded; `Z`
/// (or `z`) is required.
pub fn parse_timestamp_ms(s: &str) -> Result<i64, RowCodecError> {
    if s.len() < 20 {
        return Err(RowCodecError::BadTimestamp);
    }
    let b = s.as_bytes();
    if b[4] != b'-' || b[7] != b'-' || (b[10] != b'T' && b[10] != b't') {
        return Err(RowCodecError::BadTimestamp);
    }
    let y: i32 = s[0..4].parse().map_err(|_| RowCodecError::BadTimestamp)?;
    let mo: u32 = s[5..7].parse().map_err(|_| RowCodecError::BadTimestamp)?;
    let da: u32 = s[8..10].parse().map_err(|_| RowCodecError::BadTimestamp)?;
    let hh: i64 = s[11..13].parse().map_err(|_| RowCodecError::BadTimestamp)?;
    let mm: i64 = s[14..16].parse().map_err(|_| RowCodecError::BadTimestamp)?;
    let ss: i64 = s[17..19].parse().map_err(|_| RowCodecError::BadTimestamp)?;

    let mut pos = 19usize;
    let mut ms: i64 = 0;
    if pos < s.len() && b[pos] == b'.' {
        pos += 1;
        let mut mult = 100i64;
        let mut count = 0;
        while pos < s.len() && b[pos].is_ascii_digit() && count < 3 {
            ms += (b[pos] - b'0') as i64 * mult;
            mult /= 10;
            pos += 1;
            count += 1;
        }
        while pos < s.len() && b[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos >= s.len() || (b[pos] != b'Z' && b[pos] != b'z') {
        return Err(RowCodecError::BadTimestamp);
    }

    let days = days_from_civil(y, mo, da).ok_or(RowCodecError::BadTimestamp)?;
    let total_ms = (days as i64) * 86_400_000 + hh * 3_600_000 + mm * 60_000 + ss * 1_000 + ms;
    Ok(total_ms)
}

/// Formats a day count since the Unix epoch as `YYYY-MM-DD`.
pub fn date_from_days(days: i32) -> String {
    let (y, m, d) = civil_from_days(days);
    format!("{y:04}-{m:02}-{d:02}")
}

/// Formats milliseconds since the Unix epoch as
/// `YYYY-MM-DDThh:mm:ss.fffZ`.
pub fn timestamp_from_ms(ms: i64) -> String {
    let days = ms.div_euclid(86_400_000);
    let mut rem = ms.rem_euclid(86_400_000);
    let hh = rem / 3_600_000;
    rem %= 3_600_000;
    let mm = rem / 60_000;
    rem %= 60_000;
    let ss = rem / 1_000;
    let millis = rem % 1_000;
    let (y, mo, da) = civil_from_days(days as i32);
    format!("{y:04}-{mo:02}-{da:02}T{hh:02}:{mm:02}:{ss:02}.{millis:03}Z")
}

/// Days since 1970-01-01 for a proleptic Gregorian `(y, m, d)`, using
/// Howard Hinnant's `days_from_civil` algorithm. Returns `None` if the
/// date is not a valid calendar date.
fn days_from_civil(y: i32, m: u32, d: u32) -> Option<i32> {
    if !(1..=12).contains(&m) || d < 1 {
        return None;
    }
    let days_in_month = match m {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(y) {
                29
            } else {
                28
            }
        }
        _ => unreachable!(),
    };
    if d > days_in_month {
        return None;
    }
    let y2 = if m <= 2 { y as i64 - 1 } else { y as i64 };
    let era = if y2 >= 0 { y2 } else { y2 - 399 } / 400;
    let yoe = (y2 - era * 400) as i64;
    let mp = ((m as i64 + 9) % 12) as i64;
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    Some((era * 146_097 + doe - 719_468) as i32)
}

fn is_leap_year(y: i32) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Inverse of [`days_from_civil`]: converts a day count since the Unix
/// epoch back into a proleptic Gregorian `(year, month, day)`.
fn civil_from_days(z: i32) -> (i32, u32, u32) {
    let z = z as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

// ------------------------------------------------------------------------------------------------
// Primary-key bytes
// ------------------------------------------------------------------------------------------------

/// Returns the canonical, big-endian primary-key bytes for `literal`
/// under `col_type`. See the module docs for the per-type encoding.
pub fn partition_key_bytes(col_type: ColumnType, lit: &SqlLiteral) -> Result<Vec<u8>, RowCodecError> {
    if lit.kind == SqlLiteralKind::Null {
        return Err(RowCodecError::InvalidPk);
    }
    match col_type {
        ColumnType::Char => {
            if lit.kind != SqlLiteralKind::Quoted || lit.text.chars().count() != 1 {
                return Err(RowCodecError::InvalidPk);
            }
            Ok(lit.text.as_bytes().to_vec())
        }
        ColumnType::Text => {
            if lit.kind != SqlLiteralKind::Quoted {
                return Err(RowCodecError::InvalidPk);
            }
            Ok(lit.text.as_bytes().to_vec())
        }
        ColumnType::Blob => match lit.kind {
            SqlLiteralKind::Hex => hex_to_bytes(&lit.text).map_err(|_| RowCodecError::InvalidPk),
            SqlLiteralKind::Base64 => base64_to_bytes(&lit.text).map_err(|_| RowCodecError::InvalidPk),
            _ => Err(RowCodecError::InvalidPk),
        },
        ColumnType::Int32 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::InvalidPk);
            }
            let v = parse_i32(&lit.text).map_err(|_| RowCodecError::InvalidPk)?;
            let mut out = Vec::new();
            codec::put_i32_be(&mut out, v);
            Ok(out)
        }
        ColumnType::Int64 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::InvalidPk);
            }
            let v = parse_i64(&lit.text).map_err(|_| RowCodecError::InvalidPk)?;
            let mut out = Vec::new();
            codec::put_i64_be(&mut out, v);
            Ok(out)
        }
        ColumnType::Boolean => {
            if lit.kind != SqlLiteralKind::Bool {
                return Err(RowCodecError::InvalidPk);
            }
            Ok(vec![u8::from(lit.text.eq_ignore_ascii_case("true"))])
        }
        ColumnType::Float32 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::InvalidPk);
            }
            let f = parse_f32(&lit.text).map_err(|_| RowCodecError::InvalidPk)?;
            Ok(f.to_be_bytes().to_vec())
        }
        ColumnType::Date => {
            if lit.kind != SqlLiteralKind::Quoted {
                return Err(RowCodecError::InvalidPk);
            }
            let days = parse_date_days(&lit.text).map_err(|_| RowCodecError::InvalidPk)?;
            let mut out = Vec::new();
            codec::put_i32_be(&mut out, days);
            Ok(out)
        }
        ColumnType::Timestamp => {
            let ms = match lit.kind {
                SqlLiteralKind::Number => parse_i64(&lit.text).map_err(|_| RowCodecError::InvalidPk)?,
                SqlLiteralKind::Quoted => parse_timestamp_ms(&lit.text).map_err(|_| RowCodecError::InvalidPk)?,
                _ => return Err(RowCodecError::InvalidPk),
            };
            let mut out = Vec::new();
            codec::put_i64_be(&mut out, ms);
            Ok(out)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Row bytes
// ------------------------------------------------------------------------------------------------

fn append_value_bytes(out: &mut Vec<u8>, col_type: ColumnType, lit: &SqlLiteral) -> Result<(), RowCodecError> {
    match col_type {
        ColumnType::Char => {
            if lit.kind != SqlLiteralKind::Quoted || lit.text.chars().count() != 1 {
                return Err(RowCodecError::BadRow);
            }
            codec::put_bytes_be(out, lit.text.as_bytes());
        }
        ColumnType::Text => {
            if lit.kind != SqlLiteralKind::Quoted {
                return Err(RowCodecError::BadRow);
            }
            codec::put_bytes_be(out, lit.text.as_bytes());
        }
        ColumnType::Blob => {
            let b = match lit.kind {
                SqlLiteralKind::Hex => hex_to_bytes(&lit.text)?,
                SqlLiteralKind::Base64 => base64_to_bytes(&lit.text)?,
                _ => return Err(RowCodecError::BadRow),
            };
            codec::put_bytes_be(out, &b);
        }
        ColumnType::Int32 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::BadRow);
            }
            codec::put_i32_be(out, parse_i32(&lit.text)?);
        }
        ColumnType::Int64 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::BadRow);
            }
            codec::put_i64_be(out, parse_i64(&lit.text)?);
        }
        ColumnType::Boolean => {
            if lit.kind != SqlLiteralKind::Bool {
                return Err(RowCodecError::BadRow);
            }
            out.push(u8::from(lit.text.eq_ignore_ascii_case("true")));
        }
        ColumnType::Float32 => {
            if lit.kind != SqlLiteralKind::Number {
                return Err(RowCodecError::BadRow);
            }
            out.extend_from_slice(&parse_f32(&lit.text)?.to_be_bytes());
        }
        ColumnType::Date => {
            if lit.kind != SqlLiteralKind::Quoted {
                return Err(RowCodecError::BadRow);
            }
            codec::put_i32_be(out, parse_date_days(&lit.text)?);
        }
        ColumnType::Timestamp => {
            let ms = match lit.kind {
                SqlLiteralKind::Number => parse_i64(&lit.text)?,
                SqlLiteralKind::Quoted => parse_timestamp_ms(&lit.text)?,
                _ => return Err(RowCodecError::BadRow),
            };
            codec::put_i64_be(out, ms);
        }
    }
    Ok(())
}

fn skip_value_bytes(col_type: ColumnType, buf: &[u8], offset: &mut usize) -> Result<(), RowCodecError> {
    let len = match col_type {
        ColumnType::Text | ColumnType::Char | ColumnType::Blob => {
            let l = codec::get_u32_be(buf, offset).map_err(|_| RowCodecError::BadRow)? as usize;
            codec::skip(buf, offset, l).map_err(|_| RowCodecError::BadRow)?;
            return Ok(());
        }
        ColumnType::Int32 | ColumnType::Float32 | ColumnType::Date => 4,
        ColumnType::Int64 | ColumnType::Timestamp => 8,
        ColumnType::Boolean => 1,
    };
    codec::skip(buf, offset, len).map_err(|_| RowCodecError::BadRow)
}

/// Encodes a full row: `u32 version` followed by, for every non-pk
/// column in schema order, a null marker and the optional value bytes.
///
/// `col_names`/`values` need not follow schema order or include every
/// column; omitted columns become null. The primary-key column must be
/// present in `col_names` (its value is not re-encoded into the row — it
/// lives in `pk_bytes`/the decorated key — but its presence is required
/// so a row is never silently created without a key).
pub fn row_bytes(
    schema: &TableSchema,
    col_names: &[String],
    values: &[SqlLiteral],
) -> Result<Vec<u8>, RowCodecError> {
    if col_names.len() != values.len() {
        return Err(RowCodecError::ColumnCountMismatch);
    }
    let pk_name = &schema.primary_key_column().name;
    if !col_names.iter().any(|c| c == pk_name) {
        return Err(RowCodecError::MissingPk);
    }

    let mut by_index: Vec<Option<&SqlLiteral>> = vec![None; schema.columns.len()];
    for (name, value) in col_names.iter().zip(values.iter()) {
        let idx = schema
            .find_column_index(name)
            .ok_or_else(|| RowCodecError::UnknownColumn(name.clone()))?;
        by_index[idx] = Some(value);
    }

    let mut out = Vec::new();
    codec::put_u32_be(&mut out, ROW_VERSION);
    for (i, col) in schema.columns.iter().enumerate() {
        if i == schema.primary_key_index {
            continue;
        }
        match by_index[i] {
            None => out.push(1),
            Some(lit) if lit.kind == SqlLiteralKind::Null => out.push(1),
            Some(lit) => {
                out.push(0);
                append_value_bytes(&mut out, col.col_type, lit)?;
            }
        }
    }
    Ok(out)
}

/// Re-emits a full row after applying `set_cols`/`set_vals` on top of
/// `existing` (if any). Unset columns retain their existing bytes, or
/// become null if there is no existing row.
pub fn merge_row_bytes_for_update(
    schema: &TableSchema,
    existing: Option<&[u8]>,
    set_cols: &[String],
    set_vals: &[SqlLiteral],
) -> Result<Vec<u8>, RowCodecError> {
    if set_cols.len() != set_vals.len() {
        return Err(RowCodecError::ColumnCountMismatch);
    }

    let mut by_index: Vec<Option<&SqlLiteral>> = vec![None; schema.columns.len()];
    for (name, value) in set_cols.iter().zip(set_vals.iter()) {
        let idx = schema
            .find_column_index(name)
            .ok_or_else(|| RowCodecError::UnknownColumn(name.clone()))?;
        if idx == schema.primary_key_index {
            return Err(RowCodecError::CannotUpdatePk);
        }
        if by_index[idx].is_some() {
            return Err(RowCodecError::DuplicateColumn(name.clone()));
        }
        by_index[idx] = Some(value);
    }

    let mut existing_is_null = vec![true; schema.columns.len()];
    let mut existing_spans = vec![(0usize, 0usize); schema.columns.len()];

    if let Some(row) = existing {
        let mut offset = 0usize;
        let version = codec::get_u32_be(row, &mut offset).map_err(|_| RowCodecError::BadRow)?;
        if version != ROW_VERSION {
            return Err(RowCodecError::BadRowVersion);
        }
        for (i, col) in schema.columns.iter().enumerate() {
            if i == schema.primary_key_index {
                continue;
            }
            if offset >= row.len() {
                return Err(RowCodecError::BadRow);
            }
            let null_marker = row[offset];
            offset += 1;
            if null_marker != 0 {
                existing_is_null[i] = true;
                continue;
            }
            existing_is_null[i] = false;
            let before = offset;
            skip_value_bytes(col.col_type, row, &mut offset)?;
            existing_spans[i] = (before, offset);
        }
    }

    let mut out = Vec::new();
    codec::put_u32_be(&mut out, ROW_VERSION);
    for (i, col) in schema.columns.iter().enumerate() {
        if i == schema.primary_key_index {
            continue;
        }
        match by_index[i] {
            Some(lit) if lit.kind == SqlLiteralKind::Null => out.push(1),
            Some(lit) => {
                out.push(0);
                append_value_bytes(&mut out, col.col_type, lit)?;
            }
            None => {
                if let Some(row) = existing {
                    if !existing_is_null[i] {
                        out.push(0);
                        let (start, end) = existing_spans[i];
                        out.extend_from_slice(&row[start..end]);
                        continue;
                    }
                }
                out.push(1);
            }
        }
    }
    Ok(out)
}

// ------------------------------------------------------------------------------------------------
// Row → JSON
// ------------------------------------------------------------------------------------------------

fn json_value_from_bytes(col_type: ColumnType, buf: &[u8], offset: &mut usize) -> Result<serde_json::Value, RowCodecError> {
    match col_type {
        ColumnType::Text | ColumnType::Char => {
            let raw = codec::get_bytes_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            let s = String::from_utf8(raw).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::String(s))
        }
        ColumnType::Blob => {
            let raw = codec::get_bytes_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::String(bytes_to_base64(&raw)))
        }
        ColumnType::Int32 => {
            let v = codec::get_i32_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::from(v))
        }
        ColumnType::Int64 => {
            let v = codec::get_i64_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::from(v))
        }
        ColumnType::Boolean => {
            if *offset >= buf.len() {
                return Err(RowCodecError::BadRow);
            }
            let v = buf[*offset] != 0;
            *offset += 1;
            Ok(serde_json::Value::Bool(v))
        }
        ColumnType::Float32 => {
            let bits = codec::get_u32_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            let f = f32::from_bits(bits);
            if !f.is_finite() {
                Ok(serde_json::Value::Null)
            } else {
                Ok(serde_json::Number::from_f64(f as f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null))
            }
        }
        ColumnType::Date => {
            let days = codec::get_i32_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::String(date_from_days(days)))
        }
        ColumnType::Timestamp => {
            let ms = codec::get_i64_be(buf, offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::String(timestamp_from_ms(ms)))
        }
    }
}

fn json_pk_value(col_type: ColumnType, pk_bytes: &[u8]) -> Result<serde_json::Value, RowCodecError> {
    match col_type {
        ColumnType::Text | ColumnType::Char => {
            let s = String::from_utf8(pk_bytes.to_vec()).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::String(s))
        }
        ColumnType::Blob => Ok(serde_json::Value::String(bytes_to_base64(pk_bytes))),
        ColumnType::Int32 => {
            if pk_bytes.len() != 4 {
                return Err(RowCodecError::BadRow);
            }
            let mut offset = 0;
            let v = codec::get_i32_be(pk_bytes, &mut offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::from(v))
        }
        ColumnType::Int64 => {
            if pk_bytes.len() != 8 {
                return Err(RowCodecError::BadRow);
            }
            let mut offset = 0;
            let v = codec::get_i64_be(pk_bytes, &mut offset).map_err(|_| RowCodecError::BadRow)?;
            Ok(serde_json::Value::from(v))
        }
        ColumnType::Boolean => {
            if pk_bytes.len() != 1 {
                return Err(RowCodecError::BadRow);
            }
            Ok(serde_json::Value::Bool(pk_bytes[0] != 0))
        }
        ColumnType::Float32 => {
            if pk_bytes.len() != 4 {
                return Err(RowCodecError::BadRow);
            }
            let bits = u32::from_be_bytes(pk_bytes.try_into().expect("checked len"));
            let f = f32::from_bits(bits);
            if !f.is_finite() {
                Ok(serde_json::Value::Null)
            } else {
                Ok(serde_json::Number::from_f64(f as f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null))
            }
        }
        ColumnType::Date => {
            if pk_bytes.len() != 4 {
                return Err(RowCodecError::BadRow);
            }
            let days = i32::from_be_bytes(pk_bytes.try_into().expect("checked len"));
            Ok(serde_json::Value::String(date_from_days(days)))
        }
        ColumnType::Timestamp => {
            if pk_bytes.len() != 8 {
                return Err(RowCodecError::BadRow);
            }
            let ms = i64::from_be_bytes(pk_bytes.try_into().expect("checked len"));
            Ok(serde_json::Value::String(timestamp_from_ms(ms)))
        }
    }
}

/// Decodes `row_bytes` into a JSON object, projecting and renaming
/// columns per `select_pairs` (`(output_name, source_column)`); an empty
/// `select_pairs` selects every column under its own name (`SELECT *`).
pub fn row_to_json_mapped(
    schema: &TableSchema,
    pk_bytes: &[u8],
    row: &[u8],
    select_pairs: &[(String, String)],
) -> Result<serde_json::Value, RowCodecError> {
    let mapped: Vec<(String, String)> = if select_pairs.is_empty() {
        schema.columns.iter().map(|c| (c.name.clone(), c.name.clone())).collect()
    } else {
        select_pairs.to_vec()
    };

    let mut offset = 0usize;
    let version = codec::get_u32_be(row, &mut offset).map_err(|_| RowCodecError::BadRow)?;
    if version != ROW_VERSION {
        return Err(RowCodecError::BadRowVersion);
    }

    let mut is_null = vec![true; schema.columns.len()];
    let mut spans = vec![(0usize, 0usize); schema.columns.len()];
    for (i, col) in schema.columns.iter().enumerate() {
        if i == schema.primary_key_index {
            continue;
        }
        if offset >= row.len() {
            return Err(RowCodecError::BadRow);
        }
        let marker = row[offset];
        offset += 1;
        if marker != 0 {
            is_null[i] = true;
            continue;
        }
        is_null[i] = false;
        let before = offset;
        // consume via the JSON decoder itself so span bounds are exact
        json_value_from_bytes(col.col_type, row, &mut offset)?;
        spans[i] = (before, offset);
    }

    let mut out = serde_json::Map::new();
    for (out_name, source_name) in &mapped {
        let idx = schema
            .find_column_index(source_name)
            .ok_or_else(|| RowCodecError::UnknownColumn(source_name.clone()))?;
        let value = if idx == schema.primary_key_index {
            json_pk_value(schema.columns[idx].col_type, pk_bytes)?
        } else if is_null[idx] {
            serde_json::Value::Null
        } else {
            let (start, _end) = spans[idx];
            let mut o = start;
            json_value_from_bytes(schema.columns[idx].col_type, row, &mut o)?
        };
        out.insert(out_name.clone(), value);
    }
    Ok(serde_json::Value::Object(out))
}
