mod driver;
mod pool;
mod sql_writer;
mod transaction;
mod util;
mod value_holder;

pub use driver::*;
pub use pool::*;
pub use sql_writer::*;
pub use transaction::*;
pub(crate) use value_holder::ValueHolder;
