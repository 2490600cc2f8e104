mod as_value;
pub mod codec;
mod compiler;
mod database;
mod error;
mod event;
mod executor;
mod filter;
mod model;
mod projection;
mod schema;
mod session;
mod sql_writer;
mod table;
mod util;
mod value;
mod view;

pub use ::anyhow::Context;
pub use as_value::*;
pub use compiler::*;
pub use database::{Database, DatabaseBuilder, Health};
pub use error::*;
pub use event::*;
pub use executor::*;
pub use filter::*;
pub use model::*;
pub use projection::*;
pub use schema::*;
pub use session::*;
pub use sql_writer::*;
pub use table::*;
pub use util::*;
pub use value::*;
pub use view::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
