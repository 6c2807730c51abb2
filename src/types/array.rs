//! Decode/Encode for one-dimensional postgres arrays, via [`Array<T>`].
use bytes::{Buf, BufMut};
use std::ops::Deref;

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType, well_known},
    row::Column,
};

/// A one-dimensional postgres array of `T`.
///
/// Multi-dimensional arrays are not supported; [`DecodeError::Unsupported`]
/// is returned for anything with `ndim != 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T>(pub Vec<T>);

impl<T> From<Vec<T>> for Array<T> {
    fn from(value: Vec<T>) -> Self {
        Self(value)
    }
}

impl<T> Deref for Array<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.0
    }
}

/// Maps a scalar element's oid to its corresponding postgres array oid.
pub trait PgArrayElement: PgType {
    const ARRAY_OID: Oid;
}

macro_rules! array_oid {
    ($ty:ty, $oid:expr) => {
        impl PgArrayElement for $ty {
            const ARRAY_OID: Oid = $oid;
        }
    };
}

array_oid!(bool, well_known::BOOL_ARRAY);
array_oid!(i16, well_known::INT2_ARRAY);
array_oid!(i32, well_known::INT4_ARRAY);
array_oid!(i64, well_known::INT8_ARRAY);
array_oid!(f32, well_known::FLOAT4_ARRAY);
array_oid!(f64, well_known::FLOAT8_ARRAY);
array_oid!(String, well_known::TEXT_ARRAY);

impl<T> PgType for Array<T>
where
    T: PgArrayElement,
{
    const OID: Oid = T::ARRAY_OID;
}

impl<T> Decode for Array<T>
where
    T: Decode + PgArrayElement,
{
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        if value.remaining() < 12 {
            return Err(DecodeError::FieldCountMismatch { expected: 12, got: value.remaining() as u16 });
        }

        let ndim = value.get_i32();
        let _has_null = value.get_i32();
        let elem_oid = value.get_u32();
        if elem_oid != T::OID {
            return Err(DecodeError::OidMissmatch);
        }
        if ndim == 0 {
            return Ok(Array(Vec::new()));
        }
        if ndim != 1 {
            return Err(DecodeError::Unsupported(Self::OID));
        }
        if value.remaining() < 8 {
            return Err(DecodeError::FieldCountMismatch { expected: 8, got: value.remaining() as u16 });
        }
        let len = value.get_i32();
        let _lower_bound = value.get_i32();

        let mut items = Vec::with_capacity(len.max(0) as usize);
        for _ in 0..len {
            if value.remaining() < 4 {
                return Err(DecodeError::FieldCountMismatch { expected: 4, got: value.remaining() as u16 });
            }
            let item_len = value.get_i32();
            let item_value = match item_len {
                -1 => None,
                n => Some(value.split_to(n as usize)),
            };
            items.push(T::decode(Column::from_value(T::OID, item_value))?);
        }
        Ok(Array(items))
    }
}

impl<T> Encode<'static> for Array<T>
where
    T: Encode<'static> + PgArrayElement,
{
    fn encode(self) -> Encoded<'static> {
        let count = self.0.len();

        let mut body = Vec::new();
        for item in self.0 {
            let mut encoded = item.encode();
            let len = encoded.remaining();
            let bytes = encoded.copy_to_bytes(len);
            body.put_i32(len as i32);
            body.extend_from_slice(&bytes);
        }

        let mut buf = Vec::with_capacity(20 + body.len());
        buf.put_i32(1); // ndim
        buf.put_i32(0); // has_null, conservatively always unset
        buf.put_u32(T::OID);
        buf.put_i32(count as i32);
        buf.put_i32(1); // lower bound
        buf.extend_from_slice(&body);

        Encoded::owned(buf, Self::OID)
    }
}
