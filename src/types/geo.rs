//! Decode/Encode for postgres geometric types.
//!
//! These are plain binary layouts with no external crate dependency, so
//! unlike [`Json`][super::Json] or the `time` bindings they are always
//! compiled in.
use bytes::{Buf, BufMut};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{Oid, PgType, well_known},
    row::Column,
};

fn read_exact(value: &bytes::Bytes, expected: usize) -> Result<(), DecodeError> {
    if value.len() != expected {
        return Err(DecodeError::FieldCountMismatch { expected: expected as u16, got: value.len() as u16 });
    }
    Ok(())
}

/// `point`, a geometric point `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl PgType for Point {
    const OID: Oid = well_known::POINT;
}

impl Decode for Point {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        read_exact(&value, 16)?;
        Ok(Point { x: value.get_f64(), y: value.get_f64() })
    }
}

impl Encode<'static> for Point {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(16);
        buf.put_f64(self.x);
        buf.put_f64(self.y);
        Encoded::owned(buf, Self::OID)
    }
}

/// `line`, an infinite line `Ax + By + C = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl PgType for Line {
    const OID: Oid = well_known::LINE;
}

impl Decode for Line {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        read_exact(&value, 24)?;
        Ok(Line { a: value.get_f64(), b: value.get_f64(), c: value.get_f64() })
    }
}

impl Encode<'static> for Line {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(24);
        buf.put_f64(self.a);
        buf.put_f64(self.b);
        buf.put_f64(self.c);
        Encoded::owned(buf, Self::OID)
    }
}

/// `lseg`, a finite line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

impl PgType for LineSegment {
    const OID: Oid = well_known::LSEG;
}

impl Decode for LineSegment {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        read_exact(&value, 32)?;
        let start = Point { x: value.get_f64(), y: value.get_f64() };
        let end = Point { x: value.get_f64(), y: value.get_f64() };
        Ok(LineSegment { start, end })
    }
}

impl Encode<'static> for LineSegment {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(32);
        buf.put_f64(self.start.x);
        buf.put_f64(self.start.y);
        buf.put_f64(self.end.x);
        buf.put_f64(self.end.y);
        Encoded::owned(buf, Self::OID)
    }
}

/// `box`, a rectangle given by its two opposite corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub high: Point,
    pub low: Point,
}

impl PgType for BoundingBox {
    const OID: Oid = well_known::BOX;
}

impl Decode for BoundingBox {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        read_exact(&value, 32)?;
        let high = Point { x: value.get_f64(), y: value.get_f64() };
        let low = Point { x: value.get_f64(), y: value.get_f64() };
        Ok(BoundingBox { high, low })
    }
}

impl Encode<'static> for BoundingBox {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(32);
        buf.put_f64(self.high.x);
        buf.put_f64(self.high.y);
        buf.put_f64(self.low.x);
        buf.put_f64(self.low.y);
        Encoded::owned(buf, Self::OID)
    }
}

/// `path`, an open or closed sequence of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub closed: bool,
    pub points: Vec<Point>,
}

impl PgType for Path {
    const OID: Oid = well_known::PATH;
}

impl Decode for Path {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        if value.remaining() < 5 {
            return Err(DecodeError::FieldCountMismatch { expected: 5, got: value.remaining() as u16 });
        }
        let closed = value.get_u8() != 0;
        let npts = value.get_i32();
        if value.remaining() != npts as usize * 16 {
            return Err(DecodeError::FieldCountMismatch {
                expected: (npts * 16) as u16,
                got: value.remaining() as u16,
            });
        }
        let mut points = Vec::with_capacity(npts.max(0) as usize);
        for _ in 0..npts {
            points.push(Point { x: value.get_f64(), y: value.get_f64() });
        }
        Ok(Path { closed, points })
    }
}

impl Encode<'static> for Path {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(5 + self.points.len() * 16);
        buf.put_u8(self.closed as u8);
        buf.put_i32(self.points.len() as i32);
        for p in self.points {
            buf.put_f64(p.x);
            buf.put_f64(p.y);
        }
        Encoded::owned(buf, Self::OID)
    }
}

/// `polygon`, an implicitly closed sequence of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl PgType for Polygon {
    const OID: Oid = well_known::POLYGON;
}

impl Decode for Polygon {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        if value.remaining() < 4 {
            return Err(DecodeError::FieldCountMismatch { expected: 4, got: value.remaining() as u16 });
        }
        let npts = value.get_i32();
        if value.remaining() != npts as usize * 16 {
            return Err(DecodeError::FieldCountMismatch {
                expected: (npts * 16) as u16,
                got: value.remaining() as u16,
            });
        }
        let mut points = Vec::with_capacity(npts.max(0) as usize);
        for _ in 0..npts {
            points.push(Point { x: value.get_f64(), y: value.get_f64() });
        }
        Ok(Polygon { points })
    }
}

impl Encode<'static> for Polygon {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(4 + self.points.len() * 16);
        buf.put_i32(self.points.len() as i32);
        for p in self.points {
            buf.put_f64(p.x);
            buf.put_f64(p.y);
        }
        Encoded::owned(buf, Self::OID)
    }
}

/// `circle`, a center point and a radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl PgType for Circle {
    const OID: Oid = well_known::CIRCLE;
}

impl Decode for Circle {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if column.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let mut value = column.try_into_value()?;
        read_exact(&value, 24)?;
        let center = Point { x: value.get_f64(), y: value.get_f64() };
        let radius = value.get_f64();
        Ok(Circle { center, radius })
    }
}

impl Encode<'static> for Circle {
    fn encode(self) -> Encoded<'static> {
        let mut buf = Vec::with_capacity(24);
        buf.put_f64(self.center.x);
        buf.put_f64(self.center.y);
        buf.put_f64(self.radius);
        Encoded::owned(buf, Self::OID)
    }
}
