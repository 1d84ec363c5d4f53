mod adapter;
mod column;
mod connection;
mod cursor;
mod dialect;
mod error;
mod formatter;
mod parse;
mod query;
mod relation;
mod row;
mod schema;
mod statement;
mod util;
mod value;

pub use adapter::*;
pub use column::*;
pub use connection::*;
pub use cursor::*;
pub use dialect::*;
pub use error::*;
pub use formatter::*;
pub use parse::*;
pub use query::*;
pub use relation::*;
pub use row::*;
pub use schema::*;
pub use statement::*;
pub use util::*;
pub use value::*;
