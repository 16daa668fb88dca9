mod collection;
mod error;
mod fence;
mod hook;
mod object;
mod query;
mod scan;
mod stats;
mod util;

pub use collection::{Candidate, Collection, CollectionTable};
pub use error::{CoreError, CoreReason, CoreResult};
pub use fence::{evaluate as evaluate_fences, MutationEvent, Notification};
pub use hook::{Hook, HookDef, HookRegistry, SetOutcome};
pub use object::Object;
pub use query::{execute as execute_query, QueryOutcome};
pub use scan::{is_everything_query, PushParams, RespValue, ScanWriter};
pub use stats::{snapshot as server_stats, ServerStats};
