use std::time::SystemTime;

/// `SystemTime` as nanos-since-epoch, so TTL/expiry heaps can order by it
/// without floating point comparisons. Shared by the collection's TTL
/// heap and the hook registry's expiry heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimeKey(u64);

pub(crate) fn time_key(t: SystemTime) -> TimeKey {
    TimeKey(
        t.duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    )
}
