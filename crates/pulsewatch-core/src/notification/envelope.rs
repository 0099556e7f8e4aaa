//! Stored notification envelopes
//!
//! Registry entries are `<tag>:<b64(api_key)>:<b64(json)>` and queue entries
//! are `<tag>:<b64(json)>`. Fields after the tag are base64 so no payload can
//! collide with the delimiter.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};
use crate::models::{Notification, NotificationKind};

const DELIMITER: char = ':';

/// Encode a registry entry
pub fn encode_entry(api_key: &str, notification: &Notification) -> Result<String> {
    let payload = notification.payload_json()?;
    Ok(format!(
        "{}{DELIMITER}{}{DELIMITER}{}",
        notification.kind().tag(),
        STANDARD.encode(api_key),
        STANDARD.encode(payload)
    ))
}

/// Decode a registry entry into its api key and notification
pub fn decode_entry(raw: &[u8]) -> Result<(String, Notification)> {
    let raw = as_text(raw)?;
    let fields: Vec<&str> = raw.splitn(3, DELIMITER).collect();
    let [tag, key, payload] = fields.as_slice() else {
        return Err(Error::encoding(format!(
            "registry entry has {} fields, expected 3",
            fields.len()
        )));
    };

    let kind = NotificationKind::from_tag(tag)?;
    let key = String::from_utf8(decode_field(key)?)
        .map_err(|e| Error::encoding(format!("api key is not UTF-8: {e}")))?;
    let notification = Notification::from_payload(kind, &decode_field(payload)?)?;

    Ok((key, notification))
}

/// Encode a queue entry
pub fn encode_queued(notification: &Notification) -> Result<String> {
    let payload = notification.payload_json()?;
    Ok(format!(
        "{}{DELIMITER}{}",
        notification.kind().tag(),
        STANDARD.encode(payload)
    ))
}

/// Decode a queue entry
pub fn decode_queued(raw: &[u8]) -> Result<Notification> {
    let raw = as_text(raw)?;
    let Some((tag, payload)) = raw.split_once(DELIMITER) else {
        return Err(Error::encoding("queue entry has no type tag"));
    };
    if payload.contains(DELIMITER) {
        return Err(Error::encoding("queue entry has too many fields"));
    }

    let kind = NotificationKind::from_tag(tag)?;
    Notification::from_payload(kind, &decode_field(payload)?)
}

fn as_text(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw).map_err(|e| Error::encoding(format!("entry is not UTF-8: {e}")))
}

fn decode_field(field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(field)
        .map_err(|e| Error::encoding(format!("invalid base64: {e}")))
}
