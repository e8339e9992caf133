//! Push-notification payloads and the bounded JSON serializer.
//!
//! A [`Payload`] serializes to an `aps` object plus top-level custom
//! fields. The output is size-bounded: when the JSON exceeds the limit,
//! the alert text (and only the alert text) is truncated with a trailing
//! `"..."` and the payload is serialized once more.
//!
//! Key order is part of the contract: inside `aps` the declared order
//! (alert, badge, sound, category, content-available), inside a structured
//! alert the declared field order, and custom fields alphabetically after
//! `aps`. Tests assert exact bytes.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::PayloadError;

const ELLIPSIS: &str = "...";

/// A push notification addressed to one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Device token: 64 hex characters, 32 bytes decoded.
    pub token: String,
    /// Alert text for the simple `aps.alert` string form. Subject to
    /// truncation when the serialized payload exceeds the size limit.
    pub alert_text: String,
    /// Structured alert. When present and non-empty, `aps.alert` becomes
    /// an object and `alert_text` supplies the body if the structured
    /// body is empty.
    pub alert_body: Option<AlertBody>,
    /// App icon badge. `Some(0)` clears the badge; `None` leaves it alone
    /// and is omitted from the wire.
    pub badge: Option<u32>,
    /// Sound file name; empty means omit.
    pub sound: String,
    /// Notification category; empty means omit.
    pub category: String,
    /// `content-available` flag; 0 means omit.
    pub content_available: u32,
    /// Extra top-level fields outside the `aps` namespace. The key
    /// `"aps"` is reserved and fails serialization.
    pub custom_fields: BTreeMap<String, Value>,
    /// Seconds since the epoch after which Apple discards the
    /// notification; 0 means omit.
    pub expiration_time: u32,
    /// Delivery priority. Only the values 5 and 10 are put on the wire.
    pub priority: u8,
    /// Opaque caller bookkeeping. Never sent; returned intact in
    /// `ConnectionClose` so callers can identify failed work.
    pub extra_data: Option<Value>,
}

/// Structured `aps.alert` object, including the iOS >= 8.2 title fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertBody {
    pub body: String,
    pub action_loc_key: String,
    pub loc_key: String,
    pub loc_args: Vec<String>,
    pub launch_image: String,
    pub title: String,
    pub title_loc_key: String,
    pub title_loc_args: Vec<String>,
}

impl AlertBody {
    /// True when every field is empty, i.e. the simple string alert form
    /// applies.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
            && self.action_loc_key.is_empty()
            && self.loc_key.is_empty()
            && self.loc_args.is_empty()
            && self.launch_image.is_empty()
            && self.title.is_empty()
            && self.title_loc_key.is_empty()
            && self.title_loc_args.is_empty()
    }
}

fn str_empty(s: &&str) -> bool {
    s.is_empty()
}

fn u32_zero(n: &u32) -> bool {
    *n == 0
}

fn args_empty(v: &&[String]) -> bool {
    v.is_empty()
}

#[derive(Serialize)]
struct SimpleAps<'a> {
    #[serde(skip_serializing_if = "str_empty")]
    alert: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "str_empty")]
    sound: &'a str,
    #[serde(skip_serializing_if = "str_empty")]
    category: &'a str,
    #[serde(rename = "content-available", skip_serializing_if = "u32_zero")]
    content_available: u32,
}

#[derive(Serialize)]
struct AlertJson<'a> {
    #[serde(skip_serializing_if = "str_empty")]
    body: &'a str,
    #[serde(rename = "action-loc-key", skip_serializing_if = "str_empty")]
    action_loc_key: &'a str,
    #[serde(rename = "loc-key", skip_serializing_if = "str_empty")]
    loc_key: &'a str,
    #[serde(rename = "loc-args", skip_serializing_if = "args_empty")]
    loc_args: &'a [String],
    #[serde(rename = "launch-image", skip_serializing_if = "str_empty")]
    launch_image: &'a str,
    #[serde(skip_serializing_if = "str_empty")]
    title: &'a str,
    #[serde(rename = "title-loc-key", skip_serializing_if = "str_empty")]
    title_loc_key: &'a str,
    #[serde(rename = "title-loc-args", skip_serializing_if = "args_empty")]
    title_loc_args: &'a [String],
}

#[derive(Serialize)]
struct BodyAps<'a> {
    alert: AlertJson<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(skip_serializing_if = "str_empty")]
    sound: &'a str,
    #[serde(skip_serializing_if = "str_empty")]
    category: &'a str,
    #[serde(rename = "content-available", skip_serializing_if = "u32_zero")]
    content_available: u32,
}

/// Top level: `aps` first, then custom fields in `BTreeMap` (alphabetical)
/// order.
struct FullPayload<'a, A> {
    aps: &'a A,
    custom: &'a BTreeMap<String, Value>,
}

impl<A: Serialize> Serialize for FullPayload<'_, A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.custom.len()))?;
        map.serialize_entry("aps", self.aps)?;
        for (key, value) in self.custom {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Payload {
    /// Serialize to JSON bytes no longer than `max_payload_size`.
    ///
    /// If the first pass is too long, `len - max + 3` bytes are cut from
    /// the alert text (the only shrinkable field) and `"..."` appended,
    /// then the payload is serialized once more. Fails with
    /// [`PayloadError::TooLarge`] when the overrun exceeds the alert text
    /// itself. The cut index is floored to a `char` boundary, so multibyte
    /// text never splits a code point; ASCII is cut exactly.
    pub fn to_json(&self, max_payload_size: usize) -> Result<Vec<u8>, PayloadError> {
        if self.custom_fields.contains_key("aps") {
            return Err(PayloadError::ReservedKey);
        }
        match self.alert_body.as_ref().filter(|b| !b.is_empty()) {
            None => self.simple_json(max_payload_size),
            Some(alert_body) => self.structured_json(alert_body, max_payload_size),
        }
    }

    fn simple_aps<'a>(&'a self, alert: &'a str) -> SimpleAps<'a> {
        SimpleAps {
            alert,
            badge: self.badge,
            sound: &self.sound,
            category: &self.category,
            content_available: self.content_available,
        }
    }

    fn simple_json(&self, max: usize) -> Result<Vec<u8>, PayloadError> {
        let first = serde_json::to_vec(&FullPayload {
            aps: &self.simple_aps(&self.alert_text),
            custom: &self.custom_fields,
        })?;
        if first.len() <= max {
            return Ok(first);
        }

        let clip = first.len() - max + ELLIPSIS.len();
        if clip > self.alert_text.len() {
            return Err(PayloadError::TooLarge { limit: max });
        }
        let truncated = truncate_with_ellipsis(&self.alert_text, clip);
        let second = serde_json::to_vec(&FullPayload {
            aps: &self.simple_aps(&truncated),
            custom: &self.custom_fields,
        })?;
        Ok(second)
    }

    fn body_aps<'a>(&'a self, alert_body: &'a AlertBody, body: &'a str) -> BodyAps<'a> {
        BodyAps {
            alert: AlertJson {
                body,
                action_loc_key: &alert_body.action_loc_key,
                loc_key: &alert_body.loc_key,
                loc_args: &alert_body.loc_args,
                launch_image: &alert_body.launch_image,
                title: &alert_body.title,
                title_loc_key: &alert_body.title_loc_key,
                title_loc_args: &alert_body.title_loc_args,
            },
            badge: self.badge,
            sound: &self.sound,
            category: &self.category,
            content_available: self.content_available,
        }
    }

    fn structured_json(&self, alert_body: &AlertBody, max: usize) -> Result<Vec<u8>, PayloadError> {
        // alert_text stands in for the body when the structured body is
        // empty; truncation applies to whichever supplied it.
        let body: &str = if alert_body.body.is_empty() {
            &self.alert_text
        } else {
            &alert_body.body
        };

        let first = serde_json::to_vec(&FullPayload {
            aps: &self.body_aps(alert_body, body),
            custom: &self.custom_fields,
        })?;
        if first.len() <= max {
            return Ok(first);
        }

        let clip = first.len() - max + ELLIPSIS.len();
        if clip > body.len() {
            return Err(PayloadError::TooLarge { limit: max });
        }
        let truncated = truncate_with_ellipsis(body, clip);
        let second = serde_json::to_vec(&FullPayload {
            aps: &self.body_aps(alert_body, &truncated),
            custom: &self.custom_fields,
        })?;
        Ok(second)
    }
}

/// Cut `clip` bytes from the end of `source` and append `"..."`, backing
/// up to the previous `char` boundary if the cut would split a code point.
fn truncate_with_ellipsis(source: &str, clip: usize) -> String {
    let mut cut = source.len() - clip;
    while !source.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + ELLIPSIS.len());
    out.push_str(&source[..cut]);
    out.push_str(ELLIPSIS);
    out
}
