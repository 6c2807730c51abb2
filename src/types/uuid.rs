//! Decode/Encode for [`uuid::Uuid`].
use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::PgType,
    row::Column,
};

impl Decode for uuid::Uuid {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        if value.len() != 16 {
            return Err(DecodeError::FieldCountMismatch { expected: 16, got: value.len() as u16 });
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&value);
        Ok(uuid::Uuid::from_bytes(bytes))
    }
}

impl Encode<'static> for uuid::Uuid {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self.as_bytes().to_vec(), Self::OID)
    }
}
