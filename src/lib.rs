//! Schema-validated data access over Postgres.
//!
//! Entities are declared in a [`Registry`], read and written through a
//! [`Session`] leased from a [`Database`]. Filters are plain maps compiled to
//! parameterized SQL, mutations fire events once their transaction commits.
pub use ::strata_core::*;
