//! Decode/Encode for [`rust_decimal::Decimal`] (postgres `numeric`).
use bytes::{Buf, BufMut};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType, well_known},
    row::Column,
};

impl PgType for Decimal {
    /// `numeric`, exact arbitrary-precision number
    const OID: Oid = well_known::NUMERIC;
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

impl Decode for Decimal {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        if value.remaining() < 8 {
            return Err(DecodeError::FieldCountMismatch { expected: 8, got: value.remaining() as u16 });
        }

        let ndigits = value.get_u16();
        let weight = value.get_i16();
        let sign = value.get_u16();
        let dscale = value.get_u16();

        if sign == NUMERIC_NAN {
            return Err(DecodeError::Unsupported(Self::OID));
        }
        if value.remaining() != ndigits as usize * 2 {
            return Err(DecodeError::FieldCountMismatch {
                expected: ndigits * 2,
                got: value.remaining() as u16,
            });
        }

        let mut digit_str = String::with_capacity(ndigits as usize * 4);
        for _ in 0..ndigits {
            digit_str.push_str(&format!("{:04}", value.get_u16()));
        }

        let int_digits = (weight as i32 + 1) * 4;
        let total_len = digit_str.len() as i32;

        let mut s = String::with_capacity(digit_str.len() + 2);
        if sign == NUMERIC_NEG {
            s.push('-');
        }

        if int_digits <= 0 {
            s.push_str("0.");
            s.push_str(&"0".repeat((-int_digits) as usize));
            s.push_str(&digit_str);
        } else if int_digits >= total_len {
            s.push_str(&digit_str);
            s.push_str(&"0".repeat((int_digits - total_len) as usize));
        } else {
            let (int_part, frac_part) = digit_str.split_at(int_digits as usize);
            s.push_str(int_part);
            s.push('.');
            s.push_str(frac_part);
        }

        let mut decimal = Decimal::from_str(&s).map_err(|_| DecodeError::Unsupported(Self::OID))?;
        decimal.rescale(dscale as u32);
        Ok(decimal)
    }
}

impl Encode<'static> for Decimal {
    fn encode(self) -> Encoded<'static> {
        let dscale = self.scale() as u16;

        if self.is_zero() {
            let mut buf = Vec::with_capacity(8);
            buf.put_u16(0);
            buf.put_i16(0);
            buf.put_u16(0);
            buf.put_u16(dscale);
            return Encoded::owned(buf, Self::OID);
        }

        let sign = if self.is_sign_negative() { NUMERIC_NEG } else { 0 };
        let text = self.abs().to_string();
        let (int_part, frac_part) = match text.split_once('.') {
            Some((i, f)) => (i, f),
            None => (text.as_str(), ""),
        };

        let frac_pad = (4 - frac_part.len() % 4) % 4;
        let mut frac = frac_part.to_string();
        frac.push_str(&"0".repeat(frac_pad));

        let int_pad = (4 - int_part.len() % 4) % 4;
        let mut int_full = "0".repeat(int_pad);
        int_full.push_str(int_part);

        let mut weight = (int_full.len() / 4) as i32 - 1;
        let combined = format!("{int_full}{frac}");
        let mut digits: Vec<u16> = combined
            .as_bytes()
            .chunks(4)
            .map(|c| std::str::from_utf8(c).unwrap().parse().unwrap())
            .collect();

        while digits.len() > 1 && digits[0] == 0 {
            digits.remove(0);
            weight -= 1;
        }
        while digits.len() > 1 && *digits.last().unwrap() == 0 {
            digits.pop();
        }

        let mut buf = Vec::with_capacity(8 + digits.len() * 2);
        buf.put_u16(digits.len() as u16);
        buf.put_i16(weight as i16);
        buf.put_u16(sign);
        buf.put_u16(dscale);
        for d in digits {
            buf.put_u16(d);
        }

        Encoded::owned(buf, Self::OID)
    }
}
