//! Decoding of REST response bodies.
//!
//! The service is not strict about field names (`id`/`_id`,
//! `liked`/`isLiked`, ...) so bodies are decoded from
//! `serde_json::Value` rather than fixed structs. Interaction fields are
//! lifted out of the object; everything else is kept as opaque payload.

use crate::error::{Result, SyncError};
use crate::types::{
    InteractionState, Item, ItemId, MutationAck, Notification, NotificationId, Page, UserId,
    UserProjection,
};
use serde_json::{Map, Value};

const ITEM_ARRAY_KEYS: &[&str] = &["items", "photos", "users", "notifications", "data"];

/// Remove the first present key and return its value.
fn take(obj: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| obj.remove(*key))
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A count may arrive as a number or as the array being counted.
fn count(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Array(arr) => Some(arr.len() as i64),
        _ => None,
    }
}

fn object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(SyncError::Serialization(format!(
            "expected {} object, got {}",
            what, other
        ))),
    }
}

/// Whether `viewer` appears in a like list of user ids or user objects.
fn likes_include(likes: &Value, viewer: &UserId) -> Option<bool> {
    let list = likes.as_array()?;
    Some(list.iter().any(|entry| match entry {
        Value::String(id) => id == viewer.as_str(),
        Value::Object(user) => {
            first(user, &["id", "_id", "userId"]).and_then(Value::as_str) == Some(viewer.as_str())
        }
        _ => false,
    }))
}

/// Decode a single collection entry.
///
/// Without an explicit `liked` flag, the item counts as liked when
/// `viewer` is in its `likes` list.
pub fn parse_item(value: Value, viewer: Option<&UserId>) -> Result<Item> {
    let mut obj = object(value, "item")?;

    let id = take(&mut obj, &["id", "_id"])
        .and_then(id_string)
        .ok_or_else(|| SyncError::Serialization("item without id".into()))?;

    let explicit = take(&mut obj, &["liked", "isLiked"]).and_then(|v| v.as_bool());
    let like_count_field = take(&mut obj, &["likeCount"]);
    let likes = take(&mut obj, &["likes"]);
    let like_count = like_count_field
        .as_ref()
        .or(likes.as_ref())
        .and_then(count)
        .unwrap_or(0);
    let liked = explicit
        .or_else(|| likes.as_ref().zip(viewer).and_then(|(l, v)| likes_include(l, v)))
        .unwrap_or(false);
    let saved = take(&mut obj, &["saved", "isSaved"])
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(Item {
        id: ItemId(id),
        payload: obj,
        interaction: InteractionState {
            liked,
            like_count,
            saved,
            ..Default::default()
        },
    })
}

/// Decode a page body. Accepts a bare array or an object holding the
/// array under one of the usual keys. A missing `hasMore` is inferred
/// from whether the page came back full.
pub fn parse_page(body: Value, limit: u32, viewer: Option<&UserId>) -> Result<Page> {
    let (raw_items, has_more) = match body {
        Value::Array(items) => (items, None),
        Value::Object(mut obj) => {
            let has_more = first(&obj, &["hasMore", "has_more"]).and_then(|v| v.as_bool());
            let items = match take(&mut obj, ITEM_ARRAY_KEYS) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(SyncError::Serialization(format!(
                        "expected item array, got {}",
                        other
                    )))
                }
                None => Vec::new(),
            };
            (items, has_more)
        }
        other => {
            return Err(SyncError::Serialization(format!(
                "unexpected page body: {}",
                other
            )))
        }
    };

    let items = raw_items
        .into_iter()
        .map(|raw| parse_item(raw, viewer))
        .collect::<Result<Vec<_>>>()?;
    let has_more = has_more.unwrap_or(items.len() as u32 >= limit && limit > 0);

    Ok(Page { items, has_more })
}

pub fn parse_notification(value: Value) -> Result<Notification> {
    let mut obj = object(value, "notification")?;

    let id = take(&mut obj, &["id", "_id"])
        .and_then(id_string)
        .ok_or_else(|| SyncError::Serialization("notification without id".into()))?;
    let read = take(&mut obj, &["read", "isRead"])
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let created_at = take(&mut obj, &["createdAt", "created_at"])
        .and_then(id_string)
        .unwrap_or_default();

    Ok(Notification {
        id: NotificationId(id),
        read,
        created_at,
        payload: obj,
    })
}

/// Decode the notification list (bare array or wrapped).
pub fn parse_notifications(body: Value) -> Result<Vec<Notification>> {
    let raw = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match take(&mut obj, ITEM_ARRAY_KEYS) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Null => Vec::new(),
        other => {
            return Err(SyncError::Serialization(format!(
                "unexpected notifications body: {}",
                other
            )))
        }
    };
    raw.into_iter().map(parse_notification).collect()
}

/// Authoritative values from a mutation response. Looks at the top level
/// and at a nested `photo`/`user`/`data` object. Unknown shapes yield an
/// empty ack (the optimistic values stand).
pub fn parse_ack(body: &Value) -> MutationAck {
    let mut ack = MutationAck::default();
    let Some(top) = body.as_object() else {
        return ack;
    };

    let nested = ["photo", "user", "data"]
        .iter()
        .filter_map(|key| top.get(*key).and_then(|v| v.as_object()));

    for obj in std::iter::once(top).chain(nested) {
        ack.liked = ack
            .liked
            .or_else(|| first(obj, &["liked", "isLiked"]).and_then(|v| v.as_bool()));
        ack.like_count = ack
            .like_count
            .or_else(|| first(obj, &["likeCount", "likes"]).and_then(count));
        ack.saved = ack
            .saved
            .or_else(|| first(obj, &["saved", "isSaved"]).and_then(|v| v.as_bool()));
        ack.following = ack
            .following
            .or_else(|| first(obj, &["following", "isFollowing"]).and_then(|v| v.as_bool()));
        ack.follower_count = ack.follower_count.or_else(|| {
            first(obj, &["followerCount", "followersCount", "followers"]).and_then(count)
        });
    }

    ack
}

pub fn parse_follow_status(user: &UserId, body: &Value) -> UserProjection {
    let ack = parse_ack(body);
    UserProjection::new(
        user.clone(),
        ack.following.unwrap_or(false),
        ack.follower_count.unwrap_or(0),
    )
}

/// Human-readable message from an error body.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;
    first(obj, &["message", "error"])
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
