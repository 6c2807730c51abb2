//! Type integration with external types
//!
//! Implementation [`Decode`][d], [`Encode`][e], and [`FromRow`][f] for external types.
//!
//! Available for:
//!
//! - [`serde`]'s [`Deserialize`][sd] and [`Serialize`][ss] via [`Json`], requires `json` feature
//! - [`time`][::time]'s [`PrimitiveDateTime`][tp], [`UtcDateTime`][tu], [`Date`][td], [`Time`][tt]
//!   and [`Interval`], requires `time` feature
//! - [`uuid::Uuid`], requires `uuid` feature
//! - [`rust_decimal::Decimal`], requires `numeric` feature
//! - postgres geometric types ([`Point`], [`Line`], [`LineSegment`], [`BoundingBox`], [`Path`],
//!   [`Polygon`], [`Circle`]), always available
//! - one-dimensional postgres arrays via [`Array`]
//!
//! [d]: crate::Decode
//! [e]: crate::Encode
//! [f]: crate::FromRow
//! [sd]: serde::Deserialize
//! [ss]: serde::Serialize
//! [tp]: ::time::PrimitiveDateTime
//! [tu]: ::time::UtcDateTime
//! [td]: ::time::Date
//! [tt]: ::time::Time

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::Json;

#[cfg(feature = "time")]
mod time;
#[cfg(feature = "time")]
pub use time::Interval;

#[cfg(feature = "uuid")]
mod uuid;

#[cfg(feature = "numeric")]
mod numeric;

mod geo;
pub use geo::{BoundingBox, Circle, Line, LineSegment, Path, Point, Polygon};

mod array;
pub use array::{Array, PgArrayElement};

