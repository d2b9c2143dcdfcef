pub mod params;
pub mod record;
pub mod table;
pub mod value;

pub use params::{ParamValue, Params};
pub use record::QueryResult;
pub use value::Value;
