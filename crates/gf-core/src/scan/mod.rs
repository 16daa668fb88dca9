mod resp;
mod writer;

pub use resp::RespValue;
pub use writer::{is_everything_query, PushParams, ScanWriter};
