//! Allow-list response sanitizer.
//!
//! Only named safe fields ever leave the engine. A column added upstream stays
//! hidden until it is added here.

use std::collections::HashSet;

use serde_json::{Map, Value as JsonValue};

use crate::UserRecord;

/// Wire names that may appear in a response.
pub const SAFE_USER_FIELDS: &[&str] = &[
    "id",
    "tenantId",
    "role",
    "isActive",
    "deletedAt",
    "email",
    "firstName",
    "lastName",
    "createdAt",
    "updatedAt",
];

#[derive(Debug, Clone)]
pub struct ResponseSanitizer {
    safe: HashSet<&'static str>,
}

impl ResponseSanitizer {
    pub fn new(safe_fields: &[&'static str]) -> Self {
        Self {
            safe: safe_fields.iter().copied().collect(),
        }
    }

    pub fn user(&self, user: &UserRecord) -> JsonValue {
        match serde_json::to_value(user) {
            Ok(JsonValue::Object(map)) => JsonValue::Object(self.map(map)),
            // A record that does not serialize to an object yields nothing rather than something unfiltered.
            _ => JsonValue::Object(Map::new()),
        }
    }

    pub fn users<'a, I>(&self, users: I) -> JsonValue
    where
        I: IntoIterator<Item = &'a UserRecord>,
    {
        JsonValue::Array(users.into_iter().map(|u| self.user(u)).collect())
    }

    /// Keep only allow-listed keys of a flat payload (e.g. an update diff).
    pub fn map(&self, mut map: Map<String, JsonValue>) -> Map<String, JsonValue> {
        map.retain(|key, _| self.safe.contains(key.as_str()));
        map
    }
}

impl Default for ResponseSanitizer {
    fn default() -> Self {
        Self::new(SAFE_USER_FIELDS)
    }
}
