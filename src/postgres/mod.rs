//! Postgres wire protocol v3 message types.
mod pg_type;
mod pg_format;
pub mod frontend;
pub mod backend;

pub use pg_type::{Oid, PgType, Registry, UnsupportedType, well_known};
pub use pg_format::PgFormat;
pub use backend::{BackendMessage, BackendProtocol, ProtocolError};
pub use frontend::FrontendProtocol;
