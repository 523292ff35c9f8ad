//! Control-channel JSON messages.
//!
//! Control requests arrive as binary frames whose first byte is `{`.
//! They are dispatched on the `action` field; the original request
//! object is kept around because listing responses echo it back with a
//! `dir` array added.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::constants::CTRL_CHANNEL_ID;

/// A control-channel request, dispatched on `action`.
///
/// This is a closed set: unknown actions fail deserialization and the
/// session logs and drops them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlRequest {
    /// List a virtual folder.
    Ls(ListRequest),
    /// Delete files from a virtual folder.
    Rm(RemoveRequest),
    /// Open an upload destination.
    Upload(UploadRequest),
    /// Finalize the open upload.
    UploadDone(UploadDoneRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListRequest {
    pub path: String,
    #[serde(default)]
    pub reqid: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveRequest {
    pub path: String,
    pub delfiles: Vec<String>,
    #[serde(default)]
    pub reqid: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub reqid: Value,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadDoneRequest {
    #[serde(default)]
    pub reqid: Value,
}

/// Parses a control frame, returning both the typed request and the raw
/// object (needed for listing echo-back).
pub fn parse_control(frame: &[u8]) -> Result<(ControlRequest, Value), serde_json::Error> {
    let raw: Value = serde_json::from_slice(frame)?;
    let request = serde_json::from_value(raw.clone())?;
    Ok((request, raw))
}

/// Directory entry kind on the wire: `2` = directory, `3` = file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

impl Serialize for EntryKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            Self::Directory => 2,
            Self::File => 3,
        })
    }
}

impl<'de> Deserialize<'de> for EntryKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            2 => Ok(Self::Directory),
            3 => Ok(Self::File),
            other => Err(serde::de::Error::custom(format!(
                "unknown entry kind {other}"
            ))),
        }
    }
}

/// One entry of a directory listing, in the compact wire shape
/// `{"n":name,"t":kind,"s":size,"d":modified}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "t")]
    pub kind: EntryKind,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

impl ListingEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: None,
            modified: None,
        }
    }

    pub fn file(name: impl Into<String>, size: u64, modified: i64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size: Some(size),
            modified: Some(modified),
        }
    }
}

/// Echoes a listing request back with its `dir` array filled in.
pub fn listing_response(request: &Value, entries: &[ListingEntry]) -> Value {
    let mut response = request.clone();
    if let Some(obj) = response.as_object_mut() {
        obj.insert(
            "dir".into(),
            serde_json::to_value(entries).unwrap_or(Value::Array(Vec::new())),
        );
    }
    response
}

pub fn upload_start(reqid: &Value) -> Value {
    json!({"action": "uploadstart", "reqid": reqid})
}

pub fn upload_ack(reqid: &Value) -> Value {
    json!({"action": "uploadack", "reqid": reqid})
}

pub fn upload_error(reqid: &Value) -> Value {
    json!({"action": "uploaderror", "reqid": reqid})
}

pub fn upload_done(reqid: &Value) -> Value {
    json!({"action": "uploaddone", "reqid": reqid})
}

pub fn remove_response(reqid: &Value, success: bool) -> Value {
    json!({"action": "rm", "reqid": reqid, "success": success})
}

/// Desktop consent progress message (`msgid` 1 = waiting, 0 = clear).
pub fn console_message(msg: Option<&str>, msgid: i64) -> Value {
    json!({"type": "console", "msg": msg, "msgid": msgid})
}

/// Wraps a control response with the fixed `ctrlChannel` discriminator.
pub fn ctrl_response(values: &Value) -> Value {
    let mut response = json!({"ctrlChannel": CTRL_CHANNEL_ID});
    if let (Some(out), Some(src)) = (response.as_object_mut(), values.as_object()) {
        for (k, v) in src {
            out.insert(k.clone(), v.clone());
        }
    }
    response
}

/// A negotiation text frame, after the hello.
#[derive(Debug, PartialEq)]
pub enum NegotiationText {
    /// `{"type":"options",...}` — retained for file transfers.
    Options(Value),
    /// Some other JSON object; ignored.
    OtherJson(Value),
    /// Bare integer usage code.
    Usage(i64),
    /// Neither JSON nor an integer.
    Invalid,
}

/// Classifies the second-step negotiation text.
pub fn parse_negotiation(text: &str) -> NegotiationText {
    if text.starts_with('{') {
        match serde_json::from_str::<Value>(text) {
            Ok(v) if v.get("type").and_then(Value::as_str) == Some("options") => {
                NegotiationText::Options(v)
            }
            Ok(v) => NegotiationText::OtherJson(v),
            Err(_) => NegotiationText::Invalid,
        }
    } else {
        match text.trim().parse::<i64>() {
            Ok(code) => NegotiationText::Usage(code),
            Err(_) => NegotiationText::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upload_request() {
        let frame =
            br#"{"action":"upload","reqid":7,"path":"Images","name":"cat.jpg","size":1024}"#;
        let (req, raw) = parse_control(frame).unwrap();
        match req {
            ControlRequest::Upload(u) => {
                assert_eq!(u.path, "Images");
                assert_eq!(u.name, "cat.jpg");
                assert_eq!(u.reqid, json!(7));
                assert_eq!(u.size, Some(1024));
            }
            other => panic!("expected upload, got {other:?}"),
        }
        assert_eq!(raw["action"], "upload");
    }

    #[test]
    fn parse_uploaddone_request() {
        let (req, _) = parse_control(br#"{"action":"uploaddone"}"#).unwrap();
        assert!(matches!(req, ControlRequest::UploadDone(_)));
    }

    #[test]
    fn parse_rm_request() {
        let frame = br#"{"action":"rm","reqid":"3","path":"Images","delfiles":["a.jpg","b.jpg"]}"#;
        let (req, _) = parse_control(frame).unwrap();
        match req {
            ControlRequest::Rm(rm) => {
                assert_eq!(rm.delfiles, vec!["a.jpg", "b.jpg"]);
                assert_eq!(rm.reqid, json!("3"));
            }
            other => panic!("expected rm, got {other:?}"),
        }
    }

    #[test]
    fn unknown_action_fails_closed() {
        assert!(parse_control(br#"{"action":"format_disk"}"#).is_err());
    }

    #[test]
    fn listing_response_echoes_request() {
        let raw: Value = serde_json::from_str(r#"{"action":"ls","reqid":5,"path":"Images"}"#)
            .unwrap();
        let entries = vec![ListingEntry::file("cat.jpg", 100, 1700000000)];
        let resp = listing_response(&raw, &entries);
        assert_eq!(resp["action"], "ls");
        assert_eq!(resp["reqid"], 5);
        assert_eq!(resp["dir"][0]["n"], "cat.jpg");
        assert_eq!(resp["dir"][0]["t"], 3);
        assert_eq!(resp["dir"][0]["s"], 100);
    }

    #[test]
    fn directory_entry_omits_size() {
        let json = serde_json::to_string(&ListingEntry::directory("Images")).unwrap();
        assert_eq!(json, r#"{"n":"Images","t":2}"#);
    }

    #[test]
    fn upload_responses_carry_reqid() {
        let reqid = json!(42);
        assert_eq!(
            upload_ack(&reqid),
            json!({"action": "uploadack", "reqid": 42})
        );
        assert_eq!(
            upload_error(&reqid),
            json!({"action": "uploaderror", "reqid": 42})
        );
    }

    #[test]
    fn ctrl_response_merges_fields() {
        let resp = ctrl_response(&console_message(Some("Waiting..."), 1));
        assert_eq!(resp["ctrlChannel"], CTRL_CHANNEL_ID);
        assert_eq!(resp["type"], "console");
        assert_eq!(resp["msgid"], 1);
    }

    #[test]
    fn negotiation_text_variants() {
        assert_eq!(parse_negotiation("2"), NegotiationText::Usage(2));
        assert_eq!(parse_negotiation("10"), NegotiationText::Usage(10));
        assert!(matches!(
            parse_negotiation(r#"{"type":"options","file":"Images/a.jpg"}"#),
            NegotiationText::Options(_)
        ));
        assert!(matches!(
            parse_negotiation(r#"{"type":"other"}"#),
            NegotiationText::OtherJson(_)
        ));
        assert_eq!(parse_negotiation("banana"), NegotiationText::Invalid);
    }
}
