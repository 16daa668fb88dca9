use std::time::{Duration, SystemTime};

use gf_lang::{FieldList, Geometry};

/// A single persisted entry in a [`crate::collection::Collection`].
///
/// `expires_at` is the object's own TTL (`SET ... EX seconds`), distinct
/// from a hook's expiry or a durable-queue entry's TTL.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: String,
    pub geometry: Geometry,
    pub expires_at: Option<SystemTime>,
    pub fields: FieldList,
}

impl Object {
    pub fn new(id: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            expires_at: None,
            fields: FieldList::new(),
        }
    }

    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.expires_at = Some(SystemTime::now() + Duration::from_secs(seconds));
        self
    }

    pub fn with_fields(mut self, fields: FieldList) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    pub fn persist(&mut self) {
        self.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_marks_expiry_in_the_future() {
        let obj = Object::new("t1", Geometry::point(33.5, -112.1, None)).with_ttl(60);
        assert!(!obj.is_expired(SystemTime::now()));
        assert!(obj.is_expired(SystemTime::now() + Duration::from_secs(61)));
    }

    #[test]
    fn persist_clears_ttl() {
        let mut obj = Object::new("t1", Geometry::point(33.5, -112.1, None)).with_ttl(1);
        obj.persist();
        assert!(obj.expires_at.is_none());
    }
}
