pub mod parser;
pub mod schema;

pub use parser::{parse_dsl, DslFormat};
pub use schema::*;
