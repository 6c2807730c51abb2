use time::{Duration, PrimitiveDateTime, UtcDateTime};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType},
    row::Column,
};

impl PgType for PrimitiveDateTime {
    /// date and time
    const OID: Oid = 1114;
}

impl PgType for UtcDateTime {
    /// date and time with timezone
    const OID: Oid = 1184;
}

const PRIMITIVE_PG_EPOCH: PrimitiveDateTime = {
    // source: `from_julian_day` docs
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("for fuck sake"),
    };
    PrimitiveDateTime::new(date, time::Time::MIDNIGHT)
};

const UTC_PG_EPOCH: UtcDateTime = {
    // source: `from_julian_day` docs
    let date = match time::Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("for fuck sake"),
    };
    UtcDateTime::new(date, time::Time::MIDNIGHT)
};

/// Read a big-endian `i64` microsecond offset from a binary column value.
fn read_micros(value: bytes::Bytes) -> Result<i64, DecodeError> {
    if value.len() != size_of::<i64>() {
        return Err(DecodeError::FieldCountMismatch {
            expected: size_of::<i64>() as u16,
            got: value.len() as u16,
        });
    }
    Ok(i64::from_be_bytes(value[..].try_into().unwrap()))
}

impl Decode for PrimitiveDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let micros = read_micros(column.try_into_value()?)?;
        Ok(PRIMITIVE_PG_EPOCH.saturating_add(Duration::microseconds(micros)))
    }
}

impl Decode for UtcDateTime {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let micros = read_micros(column.try_into_value()?)?;
        Ok(UTC_PG_EPOCH.saturating_add(Duration::microseconds(micros)))
    }
}

impl Encode<'static> for PrimitiveDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - PRIMITIVE_PG_EPOCH).whole_microseconds() as i64;
        Encoded::owned(micros.to_be_bytes().to_vec(), Self::OID)
    }
}

impl Encode<'static> for UtcDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - UTC_PG_EPOCH).whole_microseconds() as i64;
        Encoded::owned(micros.to_be_bytes().to_vec(), Self::OID)
    }
}

const DATE_PG_EPOCH: time::Date = match time::Date::from_julian_day(2_451_545) {
    Ok(ok) => ok,
    Err(_) => panic!("for fuck sake"),
};

impl Decode for time::Date {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let value = column.try_into_value()?;
        if value.len() != size_of::<i32>() {
            return Err(DecodeError::FieldCountMismatch { expected: 4, got: value.len() as u16 });
        }
        let days = i32::from_be_bytes(value[..].try_into().unwrap());
        Ok(DATE_PG_EPOCH.saturating_add(Duration::days(days as i64)))
    }
}

impl Encode<'static> for time::Date {
    fn encode(self) -> Encoded<'static> {
        let days = (self - DATE_PG_EPOCH).whole_days() as i32;
        Encoded::owned(days.to_be_bytes().to_vec(), Self::OID)
    }
}

impl Decode for time::Time {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let micros = read_micros(column.try_into_value()?)?;
        Ok(time::Time::MIDNIGHT + Duration::microseconds(micros))
    }
}

impl Encode<'static> for time::Time {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - time::Time::MIDNIGHT).whole_microseconds() as i64;
        Encoded::owned(micros.to_be_bytes().to_vec(), Self::OID)
    }
}

/// `interval`, a postgres month/day/microsecond span.
///
/// Kept as three separate components rather than folded into a single
/// duration, matching how postgres itself refuses to collapse "1 month"
/// into a fixed number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl crate::postgres::PgType for Interval {
    /// `interval`, time span
    const OID: Oid = crate::postgres::well_known::INTERVAL;
}

impl Decode for Interval {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        if value.len() != 16 {
            return Err(DecodeError::FieldCountMismatch { expected: 16, got: value.len() as u16 });
        }
        use bytes::Buf;
        let microseconds = value.get_i64();
        let days = value.get_i32();
        let months = value.get_i32();
        Ok(Interval { months, days, microseconds })
    }
}

impl Encode<'static> for Interval {
    fn encode(self) -> Encoded<'static> {
        use bytes::BufMut;
        let mut buf = Vec::with_capacity(16);
        buf.put_i64(self.microseconds);
        buf.put_i32(self.days);
        buf.put_i32(self.months);
        Encoded::owned(buf, Self::OID)
    }
}

