use std::collections::HashMap;

use crate::common::unit_error;

unit_error! {
    /// A value's oid has no entry in the active [`Registry`], so no safe
    /// binary/text format or codec can be picked for it.
    pub struct UnsupportedType("unsupported or unregistered oid");
}

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// A type that have corresponding postgres oid.
pub trait PgType {
    const OID: Oid;
}

macro_rules! oid {
    ($ty:ty, $oid:literal $(, $doc:literal)? ) => {
        impl PgType for $ty {
            $(#[doc = $doc])?
            const OID: Oid = $oid;
        }
    };
}

oid!(bool, 16, "`bool`, boolean, true/false");
oid!(char, 18, "`char`, single character");
oid!(i64, 20, "`int8` ~18 digit integer, 8-byte storage");
oid!(i16, 21, "`int2` -32 thousand to 32 thousand, 2-byte storage");
oid!(i32, 23, "`int4` -2 billion to 2 billion integer, 4-byte storage");
oid!(str, 25, "`text` variable-length string, no limit specified");
oid!(String, 25, "`text` variable-length string, no limit specified");
oid!(f32, 700, "`float4` single-precision floating point number, 4-byte storage");
oid!(f64, 701, "`float8` double-precision floating point number, 8-byte storage");
oid!(Vec<u8>, 17, "`bytea` variable-length binary string");

#[cfg(feature = "uuid")]
oid!(uuid::Uuid, 2950, "`uuid`, UUID datatype");

#[cfg(feature = "time")]
impl PgType for time::PrimitiveDateTime {
    /// `timestamp`, date and time
    const OID: Oid = 1114;
}

#[cfg(feature = "time")]
impl PgType for time::UtcDateTime {
    /// `timestamptz`, date and time with timezone
    const OID: Oid = 1184;
}

#[cfg(feature = "time")]
impl PgType for time::Date {
    /// `date`
    const OID: Oid = 1082;
}

#[cfg(feature = "time")]
impl PgType for time::Time {
    /// `time`, time of day
    const OID: Oid = 1083;
}

/// Well known builtin type oids not otherwise bound to a Rust type above,
/// kept for [`Registry`] lookups and diagnostics.
pub mod well_known {
    use super::Oid;

    pub const NUMERIC: Oid = 1700;
    pub const VARCHAR: Oid = 1043;
    pub const NAME: Oid = 19;
    pub const JSON: Oid = 114;
    pub const JSONB: Oid = 3802;
    pub const INTERVAL: Oid = 1186;
    pub const POINT: Oid = 600;
    pub const LINE: Oid = 628;
    pub const LSEG: Oid = 601;
    pub const BOX: Oid = 603;
    pub const PATH: Oid = 602;
    pub const POLYGON: Oid = 604;
    pub const CIRCLE: Oid = 718;

    /// Element oid -> array oid, for the builtins the core ships with.
    pub const BOOL_ARRAY: Oid = 1000;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const INT8_ARRAY: Oid = 1016;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const FLOAT4_ARRAY: Oid = 1021;
    pub const FLOAT8_ARRAY: Oid = 1022;
}

/// Runtime OID to codec lookup, supplementing the compile-time [`PgType`]
/// bindings with user-registered encode/decode hooks (e.g. for domain or
/// enum types the core has no static knowledge of).
///
/// A [`Registry`] becomes immutable once handed to a session: connections
/// only ever see `&Registry` afterwards.
#[derive(Default, Clone)]
pub struct Registry {
    names: HashMap<Oid, &'static str>,
}

impl Registry {
    /// Create an empty registry seeded with the builtin type names.
    pub fn new() -> Self {
        let mut names = HashMap::new();
        names.insert(<bool as PgType>::OID, "bool");
        names.insert(<i16 as PgType>::OID, "int2");
        names.insert(<i32 as PgType>::OID, "int4");
        names.insert(<i64 as PgType>::OID, "int8");
        names.insert(<f32 as PgType>::OID, "float4");
        names.insert(<f64 as PgType>::OID, "float8");
        names.insert(<str as PgType>::OID, "text");
        names.insert(well_known::VARCHAR, "varchar");
        names.insert(well_known::NAME, "name");
        names.insert(<Vec<u8> as PgType>::OID, "bytea");
        names.insert(well_known::NUMERIC, "numeric");
        names.insert(well_known::JSON, "json");
        names.insert(well_known::JSONB, "jsonb");
        names.insert(well_known::INTERVAL, "interval");
        names.insert(well_known::POINT, "point");
        names.insert(well_known::LINE, "line");
        names.insert(well_known::LSEG, "lseg");
        names.insert(well_known::BOX, "box");
        names.insert(well_known::PATH, "path");
        names.insert(well_known::POLYGON, "polygon");
        names.insert(well_known::CIRCLE, "circle");
        names.insert(well_known::BOOL_ARRAY, "_bool");
        names.insert(well_known::INT2_ARRAY, "_int2");
        names.insert(well_known::INT4_ARRAY, "_int4");
        names.insert(well_known::INT8_ARRAY, "_int8");
        names.insert(well_known::TEXT_ARRAY, "_text");
        names.insert(well_known::FLOAT4_ARRAY, "_float4");
        names.insert(well_known::FLOAT8_ARRAY, "_float8");
        #[cfg(feature = "uuid")]
        names.insert(<uuid::Uuid as PgType>::OID, "uuid");
        #[cfg(feature = "time")]
        {
            names.insert(<time::PrimitiveDateTime as PgType>::OID, "timestamp");
            names.insert(<time::UtcDateTime as PgType>::OID, "timestamptz");
            names.insert(<time::Date as PgType>::OID, "date");
            names.insert(<time::Time as PgType>::OID, "time");
        }
        Self { names }
    }

    /// Register a user-provided oid, typically for a domain/enum type the
    /// core has no static binding for.
    ///
    /// Intended to be called before the registry is handed to a
    /// [`Connection`][crate::Connection]/[`Pool`][crate::Pool]; registrations
    /// afterwards have no effect on connections already open.
    pub fn register(&mut self, oid: Oid, name: &'static str) {
        self.names.insert(oid, name);
    }

    /// Returns `true` if `oid` is known to this registry.
    pub fn contains(&self, oid: Oid) -> bool {
        self.names.contains_key(&oid)
    }

    /// Returns the registered type name for `oid`, if any.
    pub fn name(&self, oid: Oid) -> Option<&'static str> {
        self.names.get(&oid).copied()
    }

    /// Returns `true` if `oid` should be sent/received in binary format.
    ///
    /// Every oid this registry knows about round-trips through binary; an
    /// unregistered oid falls back to `false` (text), which is also where
    /// [`UnsupportedType`] is raised from for parameters.
    pub fn is_binary(&self, oid: Oid) -> bool {
        self.contains(oid)
    }

    /// Validate that `oid` is known, or return [`UnsupportedType`].
    pub fn require(&self, oid: Oid) -> Result<(), UnsupportedType> {
        match self.contains(oid) {
            true => Ok(()),
            false => Err(UnsupportedType),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.names.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_core_scalars() {
        let reg = Registry::new();
        assert!(reg.contains(<i32 as PgType>::OID));
        assert!(reg.contains(<str as PgType>::OID));
        assert!(!reg.contains(999_999));
    }

    #[test]
    fn user_hook_registers_custom_oid() {
        let mut reg = Registry::new();
        reg.register(50_000, "mood");
        assert_eq!(reg.name(50_000), Some("mood"));
    }
}
