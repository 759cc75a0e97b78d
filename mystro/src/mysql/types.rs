use super::error::ProtocolError;

/// Column type code carried by column definitions and binary parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MySqlType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0a,
    Time = 0x0b,
    Datetime = 0x0c,
    Year = 0x0d,
    Varchar = 0x0f,
    Bit = 0x10,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    TinyBlob = 0xf9,
    MediumBlob = 0xfa,
    LongBlob = 0xfb,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
    Geometry = 0xff,
}

impl MySqlType {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Ok(match code {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0a => Self::Date,
            0x0b => Self::Time,
            0x0c => Self::Datetime,
            0x0d => Self::Year,
            0x0f => Self::Varchar,
            0x10 => Self::Bit,
            0xf5 => Self::Json,
            0xf6 => Self::NewDecimal,
            0xf7 => Self::Enum,
            0xf8 => Self::Set,
            0xf9 => Self::TinyBlob,
            0xfa => Self::MediumBlob,
            0xfb => Self::LongBlob,
            0xfc => Self::Blob,
            0xfd => Self::VarString,
            0xfe => Self::String,
            0xff => Self::Geometry,
            found => return Err(ProtocolError::unexpected_byte(found, "column type")),
        })
    }

    /// Fixed width of the binary protocol encoding, [`None`] for
    /// length-encoded types.
    pub(crate) const fn binary_len(self) -> Option<usize> {
        Some(match self {
            Self::Null => 0,
            Self::Tiny => 1,
            Self::Short | Self::Year => 2,
            Self::Long | Self::Int24 | Self::Float => 4,
            Self::LongLong | Self::Double => 8,
            _ => return None,
        })
    }

    pub(crate) const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Datetime | Self::Timestamp)
    }
}
