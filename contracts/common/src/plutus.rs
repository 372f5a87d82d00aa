//! PlutusData Wire Codec
//!
//! Datums and redeemers are PlutusData serialized as CBOR. The validators
//! hash and compare these bytes, so the encoder reproduces the canonical
//! layout used by the ledger tooling exactly:
//!
//! - constructors 0..=6 use tags 121..=127, 7..=127 use 1280.., larger
//!   indices use the general tag 102 form
//! - non-empty constructor fields and lists are indefinite-length arrays,
//!   empty ones are the definite `0x80`
//! - maps are definite-length
//! - byte strings longer than 64 bytes are chunked
//! - integers outside the 64-bit CBOR range become tag 2/3 bignums
//!
//! Decoding accepts any of the equivalent encodings.

use ciborium::value::Value as CborValue;
use ciborium_ll::{Encoder, Header};

use crate::errors::{LendingError, LendingResult};

/// Maximum byte string chunk length
const BYTES_CHUNK: usize = 64;

/// CBOR tag of the general constructor form
const TAG_GENERAL_CONSTR: u64 = 102;

/// Structured on-chain data
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Int(i128),
    Bytes(Vec<u8>),
}

/// Conversion into the on-chain schema
pub trait ToPlutusData {
    fn to_plutus_data(&self) -> PlutusData;
}

/// Strict conversion out of the on-chain schema
///
/// Implementations reject any constructor index or field count other than
/// the one their schema defines.
pub trait FromPlutusData: Sized {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self>;
}

impl PlutusData {
    pub fn constr(tag: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr { tag, fields }
    }

    /// Field-less constructor
    pub fn unit(tag: u64) -> Self {
        PlutusData::Constr {
            tag,
            fields: Vec::new(),
        }
    }

    /// The unit value `Void` (`Constr 0 []`)
    pub fn void() -> Self {
        Self::unit(0)
    }

    pub fn int(value: impl Into<i128>) -> Self {
        PlutusData::Int(value.into())
    }

    pub fn bytes(value: &[u8]) -> Self {
        PlutusData::Bytes(value.to_vec())
    }

    // ============ Encoding ============

    /// Serialize to CBOR bytes
    pub fn to_cbor(&self) -> LendingResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut encoder = Encoder::from(&mut buf);
        encode(self, &mut encoder)?;
        Ok(buf)
    }

    /// Serialize to lowercase hex CBOR
    pub fn to_cbor_hex(&self) -> LendingResult<String> {
        Ok(hex::encode(self.to_cbor()?))
    }

    // ============ Decoding ============

    /// Parse CBOR bytes
    pub fn from_cbor(bytes: &[u8]) -> LendingResult<Self> {
        let value: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| LendingError::Codec(format!("{e:?}")))?;
        from_cbor_value(&value)
    }

    /// Parse hex CBOR
    pub fn from_cbor_hex(cbor_hex: &str) -> LendingResult<Self> {
        Self::from_cbor(&hex::decode(cbor_hex)?)
    }

    // ============ Accessors ============

    /// Constructor index and fields of any constructor
    pub fn as_variant(&self) -> LendingResult<(u64, &[PlutusData])> {
        match self {
            PlutusData::Constr { tag, fields } => Ok((*tag, fields.as_slice())),
            _ => Err(LendingError::InvalidDatumShape {
                expected: "constructor",
            }),
        }
    }

    /// Fields of a constructor with exactly this index and arity
    pub fn fields(
        &self,
        tag: u64,
        arity: usize,
        expected: &'static str,
    ) -> LendingResult<&[PlutusData]> {
        match self {
            PlutusData::Constr { tag: t, fields } if *t == tag && fields.len() == arity => {
                Ok(fields.as_slice())
            }
            _ => Err(LendingError::InvalidDatumShape { expected }),
        }
    }

    pub fn as_int(&self) -> LendingResult<i128> {
        match self {
            PlutusData::Int(v) => Ok(*v),
            _ => Err(LendingError::InvalidDatumShape { expected: "integer" }),
        }
    }

    pub fn as_u64(&self) -> LendingResult<u64> {
        u64::try_from(self.as_int()?).map_err(|_| LendingError::InvalidDatumShape {
            expected: "unsigned 64-bit integer",
        })
    }

    pub fn as_i64(&self) -> LendingResult<i64> {
        i64::try_from(self.as_int()?).map_err(|_| LendingError::InvalidDatumShape {
            expected: "signed 64-bit integer",
        })
    }

    pub fn as_bytes(&self) -> LendingResult<&[u8]> {
        match self {
            PlutusData::Bytes(b) => Ok(b.as_slice()),
            _ => Err(LendingError::InvalidDatumShape { expected: "bytes" }),
        }
    }

    pub fn as_list(&self) -> LendingResult<&[PlutusData]> {
        match self {
            PlutusData::List(items) => Ok(items.as_slice()),
            _ => Err(LendingError::InvalidDatumShape { expected: "list" }),
        }
    }

    pub fn as_map(&self) -> LendingResult<&[(PlutusData, PlutusData)]> {
        match self {
            PlutusData::Map(entries) => Ok(entries.as_slice()),
            _ => Err(LendingError::InvalidDatumShape { expected: "map" }),
        }
    }
}

fn encode(data: &PlutusData, enc: &mut Encoder<&mut Vec<u8>>) -> std::io::Result<()> {
    match data {
        PlutusData::Constr { tag, fields } => {
            match *tag {
                0..=6 => enc.push(Header::Tag(121 + tag))?,
                7..=127 => enc.push(Header::Tag(1280 + tag - 7))?,
                _ => {
                    enc.push(Header::Tag(TAG_GENERAL_CONSTR))?;
                    enc.push(Header::Array(Some(2)))?;
                    enc.push(Header::Positive(*tag))?;
                }
            }
            encode_array(fields, enc)
        }
        PlutusData::List(items) => encode_array(items, enc),
        PlutusData::Map(entries) => {
            enc.push(Header::Map(Some(entries.len())))?;
            for (key, value) in entries {
                encode(key, enc)?;
                encode(value, enc)?;
            }
            Ok(())
        }
        PlutusData::Int(value) => encode_int(*value, enc),
        PlutusData::Bytes(bytes) => enc.bytes(bytes, BYTES_CHUNK),
    }
}

fn encode_array(items: &[PlutusData], enc: &mut Encoder<&mut Vec<u8>>) -> std::io::Result<()> {
    if items.is_empty() {
        return enc.push(Header::Array(Some(0)));
    }
    enc.push(Header::Array(None))?;
    for item in items {
        encode(item, enc)?;
    }
    enc.push(Header::Break)
}

fn encode_int(value: i128, enc: &mut Encoder<&mut Vec<u8>>) -> std::io::Result<()> {
    if value >= 0 {
        match u64::try_from(value) {
            Ok(v) => enc.push(Header::Positive(v)),
            Err(_) => {
                enc.push(Header::Tag(2))?;
                enc.bytes(&magnitude_bytes(value as u128), BYTES_CHUNK)
            }
        }
    } else {
        // CBOR negative integers carry -1 - n
        let magnitude = (-1 - value) as u128;
        match u64::try_from(magnitude) {
            Ok(v) => enc.push(Header::Negative(v)),
            Err(_) => {
                enc.push(Header::Tag(3))?;
                enc.bytes(&magnitude_bytes(magnitude), BYTES_CHUNK)
            }
        }
    }
}

fn magnitude_bytes(value: u128) -> Vec<u8> {
    let raw = value.to_be_bytes();
    let first = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
    raw[first..].to_vec()
}

fn from_cbor_value(value: &CborValue) -> LendingResult<PlutusData> {
    match value {
        CborValue::Integer(i) => Ok(PlutusData::Int(i128::from(*i))),
        CborValue::Bytes(b) => Ok(PlutusData::Bytes(b.clone())),
        CborValue::Array(items) => Ok(PlutusData::List(
            items
                .iter()
                .map(from_cbor_value)
                .collect::<LendingResult<Vec<_>>>()?,
        )),
        CborValue::Map(entries) => Ok(PlutusData::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<LendingResult<Vec<_>>>()?,
        )),
        CborValue::Tag(tag, inner) => match *tag {
            121..=127 => Ok(PlutusData::Constr {
                tag: tag - 121,
                fields: array_items(inner)?,
            }),
            1280..=1400 => Ok(PlutusData::Constr {
                tag: tag - 1280 + 7,
                fields: array_items(inner)?,
            }),
            TAG_GENERAL_CONSTR => match inner.as_ref() {
                CborValue::Array(pair) if pair.len() == 2 => {
                    let index = match &pair[0] {
                        CborValue::Integer(i) => u64::try_from(i128::from(*i))
                            .map_err(|_| LendingError::Codec("constructor index".into()))?,
                        _ => return Err(LendingError::Codec("constructor index".into())),
                    };
                    Ok(PlutusData::Constr {
                        tag: index,
                        fields: array_items(&pair[1])?,
                    })
                }
                _ => Err(LendingError::Codec("malformed general constructor".into())),
            },
            2 | 3 => {
                let raw = match inner.as_ref() {
                    CborValue::Bytes(b) if b.len() <= 16 => b,
                    _ => return Err(LendingError::Codec("bignum out of range".into())),
                };
                let magnitude = raw.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b));
                let magnitude = i128::try_from(magnitude)
                    .map_err(|_| LendingError::Codec("bignum out of range".into()))?;
                Ok(PlutusData::Int(if *tag == 2 { magnitude } else { -1 - magnitude }))
            }
            other => Err(LendingError::Codec(format!("unexpected cbor tag {other}"))),
        },
        other => Err(LendingError::Codec(format!("unexpected cbor item {other:?}"))),
    }
}

fn array_items(value: &CborValue) -> LendingResult<Vec<PlutusData>> {
    match value {
        CborValue::Array(items) => items.iter().map(from_cbor_value).collect(),
        _ => Err(LendingError::Codec("constructor fields must be an array".into())),
    }
}

// ============ Primitive Schemas ============

impl ToPlutusData for u64 {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::Int(i128::from(*self))
    }
}

impl FromPlutusData for u64 {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        data.as_u64()
    }
}

impl ToPlutusData for i64 {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::Int(i128::from(*self))
    }
}

impl FromPlutusData for i64 {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        data.as_i64()
    }
}

/// `Some(x)` is `Constr 0 [x]`, `None` is `Constr 1 []`
impl<T: ToPlutusData> ToPlutusData for Option<T> {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Some(inner) => PlutusData::constr(0, vec![inner.to_plutus_data()]),
            None => PlutusData::unit(1),
        }
    }
}

impl<T: FromPlutusData> FromPlutusData for Option<T> {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        match data.as_variant()? {
            (0, [inner]) => Ok(Some(T::from_plutus_data(inner)?)),
            (1, []) => Ok(None),
            _ => Err(LendingError::InvalidDatumShape { expected: "optional" }),
        }
    }
}

impl ToPlutusData for PlutusData {
    fn to_plutus_data(&self) -> PlutusData {
        self.clone()
    }
}

impl FromPlutusData for PlutusData {
    fn from_plutus_data(data: &PlutusData) -> LendingResult<Self> {
        Ok(data.clone())
    }
}
