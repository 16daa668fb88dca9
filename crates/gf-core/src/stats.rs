use crate::collection::CollectionTable;
use crate::hook::HookRegistry;

/// Snapshot returned by `SERVER`: per-collection object counts plus
/// registry-wide hook/channel totals. Read-only introspection, no
/// metrics subsystem behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
    pub collections: Vec<(String, usize)>,
    pub num_hooks: usize,
    pub num_channels: usize,
}

pub fn snapshot(table: &CollectionTable, hooks: &HookRegistry) -> ServerStats {
    let collections = table
        .names()
        .map(|name| (name.to_string(), table.get(name).map(|c| c.len()).unwrap_or(0)))
        .collect();
    let num_hooks = hooks.list("*", false).len();
    let num_channels = hooks.list("*", true).len();
    ServerStats {
        collections,
        num_hooks,
        num_channels,
    }
}

impl ServerStats {
    pub fn to_json(&self) -> String {
        let mut buf = String::from("{\"ok\":true,\"stats\":{\"collections\":[");
        for (i, (name, count)) in self.collections.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            buf.push_str(&format!("{{\"key\":\"{name}\",\"num_objects\":{count}}}"));
        }
        buf.push_str(&format!(
            "],\"num_hooks\":{},\"num_channels\":{}}}}}",
            self.num_hooks, self.num_channels
        ));
        buf
    }
}
