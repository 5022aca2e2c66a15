//! Endpoint descriptors for the REST API.

use crate::types::{CollectionKey, CollectionSource, MutationKind, UserId};
use serde_json::json;

/// HTTP method of an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A fully resolved request: method, path, query and optional JSON body.
///
/// The path is kept as raw segments; ids are escaped when the URL is
/// built.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Endpoint {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Unescaped path, for logs.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    fn with_query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Page `page` (1-based) of the collection behind `key`.
    pub fn page(key: &CollectionKey, page: u32, limit: u32) -> Self {
        let endpoint = match &key.source {
            CollectionSource::Feed { location } => {
                let endpoint = Self::new(Method::Get, &["api", "photos"]);
                match location {
                    Some(location) => endpoint.with_query("location", location),
                    None => endpoint,
                }
            }
            CollectionSource::Search => Self::new(Method::Get, &["api", "photos", "search"])
                .with_query("q", key.query.as_deref().unwrap_or_default()),
            CollectionSource::Saved => Self::new(Method::Get, &["api", "photos", "saved"]),
            CollectionSource::Followers { user } => {
                Self::new(Method::Get, &["api", "users", user.as_str(), "followers"])
            }
            CollectionSource::Following { user } => {
                Self::new(Method::Get, &["api", "users", user.as_str(), "following"])
            }
        };
        endpoint.with_query("page", page).with_query("limit", limit)
    }

    /// The confirming call for a mutation.
    pub fn mutation(kind: MutationKind, target: &str) -> Self {
        match kind {
            MutationKind::Like => Self::new(Method::Post, &["api", "photos", target, "like"]),
            MutationKind::Unlike => {
                Self::new(Method::Delete, &["api", "photos", target, "like"])
            }
            MutationKind::Save => Self::new(Method::Post, &["api", "photos", target, "save"]),
            MutationKind::Unsave => {
                Self::new(Method::Delete, &["api", "photos", target, "save"])
            }
            MutationKind::Delete => Self::new(Method::Delete, &["api", "photos", target]),
            MutationKind::Follow => {
                Self::new(Method::Post, &["api", "users", target, "follow"])
            }
            MutationKind::Unfollow => {
                Self::new(Method::Delete, &["api", "users", target, "follow"])
            }
            MutationKind::MarkRead => Self::new(Method::Put, &["api", "notifications", "read"])
                .with_body(json!({ "notificationIds": [target] })),
            MutationKind::MarkAllRead => Self::new(Method::Put, &["api", "notifications", "read-all"]),
            MutationKind::DeleteNotification => {
                Self::new(Method::Delete, &["api", "notifications", target])
            }
        }
    }

    pub fn notifications() -> Self {
        Self::new(Method::Get, &["api", "notifications"])
    }

    pub fn follow_status(user: &UserId) -> Self {
        Self::new(Method::Get, &["api", "users", user.as_str(), "follow"])
    }
}
