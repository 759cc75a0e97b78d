//! Binary protocol parameter encoding.
use bytes::BufMut;

use crate::{
    ext::{BufMutExt, lenenc_int_len},
    mysql::MySqlType,
    value::ValueRef,
};

/// Value that can be encoded to be bound to sql parameter.
pub trait Encode<'q> {
    fn encode(self) -> Encoded<'q>;
}

/// An encoded binary protocol parameter.
///
/// Fixed width types carry their little-endian bytes, everything else is
/// written with a length-encoded prefix.
#[derive(Debug)]
pub struct Encoded<'q> {
    value: ValueRef<'q>,
    ty: MySqlType,
    unsigned: bool,
    is_null: bool,
    lenenc: bool,
}

impl<'q> Encoded<'q> {
    pub(crate) fn null() -> Encoded<'static> {
        Encoded {
            value: ValueRef::Slice(&[]),
            ty: MySqlType::Null,
            unsigned: false,
            is_null: true,
            lenenc: false,
        }
    }

    pub(crate) const fn mysql_type(&self) -> MySqlType {
        self.ty
    }

    pub(crate) const fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    pub(crate) const fn is_null(&self) -> bool {
        self.is_null
    }

    /// Encoded size in the value section of a statement execution.
    pub(crate) fn value_len(&self) -> usize {
        if self.is_null {
            return 0;
        }
        let len = self.value.len();
        match self.lenenc {
            true => lenenc_int_len(len as u64) + len,
            false => len,
        }
    }

    pub(crate) fn encode_value(&self, mut buf: impl BufMut) {
        if self.is_null {
            return;
        }
        match self.lenenc {
            true => buf.put_lenenc_bytes(self.value.as_slice()),
            false => buf.put(self.value.as_slice()),
        }
    }
}

macro_rules! encode_int {
    ($ty:ty, $mysql:ident, $unsigned:expr) => {
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                Encoded {
                    value: ValueRef::inline(&self.to_le_bytes()),
                    ty: MySqlType::$mysql,
                    unsigned: $unsigned,
                    is_null: false,
                    lenenc: false,
                }
            }
        }
    };
}

encode_int!(i8, Tiny, false);
encode_int!(i16, Short, false);
encode_int!(i32, Long, false);
encode_int!(i64, LongLong, false);
encode_int!(u8, Tiny, true);
encode_int!(u16, Short, true);
encode_int!(u32, Long, true);
encode_int!(u64, LongLong, true);
encode_int!(f32, Float, false);
encode_int!(f64, Double, false);

impl Encode<'static> for bool {
    fn encode(self) -> Encoded<'static> {
        (self as i8).encode()
    }
}

macro_rules! encode_lenenc {
    (<$lf:tt> $ty:ty, $mysql:ident) => {
        impl<$lf> Encode<$lf> for &$lf $ty {
            fn encode(self) -> Encoded<$lf> {
                Encoded {
                    value: self.into(),
                    ty: MySqlType::$mysql,
                    unsigned: false,
                    is_null: false,
                    lenenc: true,
                }
            }
        }
    };
    ($ty:ty, $mysql:ident) => {
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                Encoded {
                    value: self.into(),
                    ty: MySqlType::$mysql,
                    unsigned: false,
                    is_null: false,
                    lenenc: true,
                }
            }
        }
    };
}

encode_lenenc!(<'a> str, VarString);
encode_lenenc!(<'a> [u8], Blob);
encode_lenenc!(String, VarString);
encode_lenenc!(Vec<u8>, Blob);

impl<'a> Encode<'a> for &'a String {
    fn encode(self) -> Encoded<'a> {
        self.as_str().encode()
    }
}

impl<'q, T: Encode<'q>> Encode<'q> for Option<T> {
    fn encode(self) -> Encoded<'q> {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(),
        }
    }
}
