//! MySQL row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::{Buf, Bytes};
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};

use crate::{
    common::unit_error,
    ext::{BytesExt, FmtExt},
    mysql::{MySqlType, ProtocolError, backend::ColumnDefinition},
};

/// Wire format rows were produced in.
///
/// Text protocol sends every value as a string, the binary protocol of
/// prepared statements sends fixed width and length prefixed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    Text,
    Binary,
}

/// MySQL row.
pub struct Row {
    columns: Arc<[ColumnDefinition]>,
    values: Vec<Option<Bytes>>,
    format: RowFormat,
}

impl Row {
    pub(crate) fn parse(
        payload: Bytes,
        columns: &Arc<[ColumnDefinition]>,
        format: RowFormat,
    ) -> Result<Row, ProtocolError> {
        let values = match format {
            RowFormat::Text => parse_text(payload, columns.len())?,
            RowFormat::Binary => parse_binary(payload, columns)?,
        };
        Ok(Row { columns: Arc::clone(columns), values, format })
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column definitions.
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Try get and decode column.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        let nth = idx.position(&self.columns)?;
        R::decode(Column {
            def: self.columns[nth].clone(),
            value: self.values[nth].clone(),
            format: self.format,
        })
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

/// Text rows prefix NULL with the `0xfb` sentinel, everything else is a
/// length encoded string.
fn parse_text(mut payload: Bytes, len: usize) -> Result<Vec<Option<Bytes>>, ProtocolError> {
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        match payload.first() {
            Some(0xfb) => {
                payload.advance(1);
                values.push(None);
            },
            Some(_) => values.push(Some(payload.get_lenenc_bytes()?)),
            None => return Err(ProtocolError::truncated("text row")),
        }
    }
    Ok(values)
}

/// Binary rows carry a null bitmap with a two bit offset after the `0x00`
/// header, then fixed width or length prefixed values per column type.
fn parse_binary(
    mut payload: Bytes,
    columns: &[ColumnDefinition],
) -> Result<Vec<Option<Bytes>>, ProtocolError> {
    match payload.first() {
        Some(0x00) => payload.advance(1),
        Some(&found) => return Err(ProtocolError::unexpected_byte(found, "binary row")),
        None => return Err(ProtocolError::truncated("binary row")),
    }

    let bitmap_len = (columns.len() + 9) / 8;
    if payload.remaining() < bitmap_len {
        return Err(ProtocolError::truncated("binary row"));
    }
    let bitmap = payload.split_to(bitmap_len);

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(None);
            continue;
        }
        let value = match column.ty.binary_len() {
            Some(len) => {
                if payload.remaining() < len {
                    return Err(ProtocolError::truncated("binary row"));
                }
                payload.split_to(len)
            },
            None => payload.get_lenenc_bytes()?,
        };
        values.push(Some(value));
    }
    Ok(values)
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (column, value) in self.columns.iter().zip(&self.values) {
            dbg.key(&column.name.as_str());
            match value {
                None => dbg.value(&format_args!("NULL")),
                Some(value) => dbg.value(&value.lossy()),
            };
        }
        dbg.finish()
    }
}

/// MySQL column.
#[derive(Debug, Clone)]
pub struct Column {
    def: ColumnDefinition,
    value: Option<Bytes>,
    format: RowFormat,
}

impl Column {
    /// Returns the declared column type.
    pub const fn mysql_type(&self) -> MySqlType {
        self.def.ty
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Extract the inner bytes as slice.
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Clone the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn value(&self) -> Option<Bytes> {
        self.value.as_ref().cloned()
    }

    /// Consume self into the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn into_value(self) -> Option<Bytes> {
        self.value
    }

    /// Try consume self into the inner [`Bytes`].
    ///
    /// Return [`DecodeError::Null`] if value is `NULL`.
    pub fn try_into_value(self) -> Result<Bytes, DecodeError> {
        self.value.ok_or(DecodeError::Null)
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }
}

/// Statement result with its rows affected.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowResult {
    pub rows_affected: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);

/// A type that can be constructed from [`Column`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

enum IntValue {
    Signed(i64),
    Unsigned(u64),
}

fn int_value(col: &Column) -> Result<IntValue, DecodeError> {
    let ty = col.mysql_type();
    let value = col.as_slice().ok_or(DecodeError::Null)?;

    if col.format == RowFormat::Text {
        let text = std::str::from_utf8(value)?;
        return match text.starts_with('-') {
            true => text.parse().map(IntValue::Signed).map_err(|_| DecodeError::TypeMismatch(ty)),
            false => text.parse().map(IntValue::Unsigned).map_err(|_| DecodeError::TypeMismatch(ty)),
        };
    }

    let mut le = [0u8; 8];
    let width = match ty {
        MySqlType::Tiny => 1,
        MySqlType::Short | MySqlType::Year => 2,
        MySqlType::Long | MySqlType::Int24 => 4,
        MySqlType::LongLong => 8,
        other => return Err(DecodeError::TypeMismatch(other)),
    };
    if value.len() < width {
        return Err(DecodeError::TypeMismatch(ty));
    }
    le[..width].copy_from_slice(&value[..width]);

    match col.def.is_unsigned() {
        true => Ok(IntValue::Unsigned(u64::from_le_bytes(le))),
        false => {
            // sign extend from the value's actual width
            let unsigned = u64::from_le_bytes(le);
            let shift = 64 - width * 8;
            Ok(IntValue::Signed((unsigned << shift) as i64 >> shift))
        },
    }
}

macro_rules! decode_int {
    ($ty:ty) => {
        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                match int_value(&col)? {
                    IntValue::Signed(v) => <$ty>::try_from(v).map_err(|_| DecodeError::OutOfRange),
                    IntValue::Unsigned(v) => <$ty>::try_from(v).map_err(|_| DecodeError::OutOfRange),
                }
            }
        }
    };
}

decode_int!(i8);
decode_int!(i16);
decode_int!(i32);
decode_int!(i64);
decode_int!(u8);
decode_int!(u16);
decode_int!(u32);
decode_int!(u64);

impl Decode for bool {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        match int_value(&col)? {
            IntValue::Signed(v) => Ok(v != 0),
            IntValue::Unsigned(v) => Ok(v != 0),
        }
    }
}

impl Decode for f64 {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        let ty = col.mysql_type();
        let value = col.as_slice().ok_or(DecodeError::Null)?;
        if col.format == RowFormat::Text {
            let text = std::str::from_utf8(value)?;
            return text.parse().map_err(|_| DecodeError::TypeMismatch(ty));
        }
        match ty {
            MySqlType::Float if value.len() >= 4 => {
                Ok(f32::from_le_bytes([value[0], value[1], value[2], value[3]]) as f64)
            },
            MySqlType::Double if value.len() >= 8 => {
                let mut le = [0u8; 8];
                le.copy_from_slice(&value[..8]);
                Ok(f64::from_le_bytes(le))
            },
            other => Err(DecodeError::TypeMismatch(other)),
        }
    }
}

impl Decode for f32 {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        let ty = col.mysql_type();
        let value = col.as_slice().ok_or(DecodeError::Null)?;
        if col.format == RowFormat::Text {
            let text = std::str::from_utf8(value)?;
            return text.parse().map_err(|_| DecodeError::TypeMismatch(ty));
        }
        match ty {
            MySqlType::Float if value.len() >= 4 => {
                Ok(f32::from_le_bytes([value[0], value[1], value[2], value[3]]))
            },
            other => Err(DecodeError::TypeMismatch(other)),
        }
    }
}

impl Decode for String {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        let ty = col.mysql_type();
        if col.format == RowFormat::Binary && ty.is_temporal() {
            let value = col.as_slice().ok_or(DecodeError::Null)?;
            return match ty {
                MySqlType::Time => format_binary_time(value).ok_or(DecodeError::TypeMismatch(ty)),
                _ => format_binary_datetime(value, ty).ok_or(DecodeError::TypeMismatch(ty)),
            };
        }
        Ok(String::from_utf8(col.try_into_value().map(Into::into)?)?)
    }
}

impl Decode for Vec<u8> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        Ok(col.try_into_value()?.into())
    }
}

impl Decode for Bytes {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        col.try_into_value()
    }
}

/// Binary DATE/DATETIME/TIMESTAMP to its text protocol representation.
///
/// Lengths are 0 (all zero), 4 (date), 7 (seconds) or 11 (microseconds).
fn format_binary_datetime(value: &[u8], ty: MySqlType) -> Option<String> {
    use std::fmt::Write;

    let (mut year, mut month, mut day) = (0u16, 0u8, 0u8);
    let (mut hour, mut minute, mut second) = (0u8, 0u8, 0u8);
    let mut micros = 0u32;

    match value.len() {
        0 => { },
        4 | 7 | 11 => {
            year = u16::from_le_bytes([value[0], value[1]]);
            month = value[2];
            day = value[3];
            if value.len() >= 7 {
                hour = value[4];
                minute = value[5];
                second = value[6];
            }
            if value.len() == 11 {
                micros = u32::from_le_bytes([value[7], value[8], value[9], value[10]]);
            }
        },
        _ => return None,
    }

    let mut out = String::with_capacity(26);
    write!(out, "{year:04}-{month:02}-{day:02}").ok()?;
    if ty != MySqlType::Date {
        write!(out, " {hour:02}:{minute:02}:{second:02}").ok()?;
        if micros > 0 {
            write!(out, ".{micros:06}").ok()?;
        }
    }
    Some(out)
}

/// Binary TIME to its text protocol representation.
///
/// Lengths are 0 (zero duration), 8 (seconds) or 12 (microseconds).
fn format_binary_time(value: &[u8]) -> Option<String> {
    use std::fmt::Write;

    let (mut negative, mut hours, mut minute, mut second) = (false, 0u64, 0u8, 0u8);
    let mut micros = 0u32;

    match value.len() {
        0 => { },
        8 | 12 => {
            negative = value[0] != 0;
            let days = u32::from_le_bytes([value[1], value[2], value[3], value[4]]);
            hours = u64::from(days) * 24 + u64::from(value[5]);
            minute = value[6];
            second = value[7];
            if value.len() == 12 {
                micros = u32::from_le_bytes([value[8], value[9], value[10], value[11]]);
            }
        },
        _ => return None,
    }

    let mut out = String::with_capacity(17);
    if negative {
        out.push('-');
    }
    write!(out, "{hours:02}:{minute:02}:{second:02}").ok()?;
    if micros > 0 {
        write!(out, ".{micros:06}").ok()?;
    }
    Some(out)
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the nth column the index refers to.
    fn position(self, columns: &[ColumnDefinition]) -> Result<usize, DecodeError>;
}

impl Index for usize {
    fn position(self, columns: &[ColumnDefinition]) -> Result<usize, DecodeError> {
        match self < columns.len() {
            true => Ok(self),
            false => Err(DecodeError::IndexOutOfBounds(self)),
        }
    }
}

impl Index for &str {
    fn position(self, columns: &[ColumnDefinition]) -> Result<usize, DecodeError> {
        columns
            .iter()
            .position(|col| &*col.name == self)
            .ok_or_else(|| DecodeError::ColumnNotFound(String::from(self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when try to [`fetch_one`][crate::query::Query::fetch_one] and not returns any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Server returned a non utf8 string.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Column type cannot decode into the requested type.
    TypeMismatch(MySqlType),
    /// Value does not fit the requested integer width.
    OutOfRange,
    /// Row is null.
    Null,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::TypeMismatch(ty) => write!(f, "column type {ty:?} missmatch"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::Null => write!(f, "unexpected NULL value"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
