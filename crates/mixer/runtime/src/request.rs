//! Channel requests
//!
//! External callers ask for channels with a property map. A request matches
//! a channel kind when its fixed properties (channel type and target handle
//! type) agree with the kind, and every other property is one the kind
//! allows. Anything else is refused as not implemented.

use mixer_types::{
    iface, ChannelKind, ChannelParams, FileTransferParams, HandleId, HandleRef, HandleType,
    MixerError, MixerResult,
};
use serde_json::Value;
use std::collections::BTreeMap;

const TARGET_PROPERTIES: [&str; 3] = [
    iface::TARGET_HANDLE,
    iface::TARGET_ID,
    iface::TARGET_HANDLE_ID,
];

const FILE_TRANSFER_PROPERTIES: [&str; 5] = [
    "ContentType",
    "Filename",
    "Size",
    "Description",
    "InitialOffset",
];

/// A parsed request for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub kind: ChannelKind,
    pub target: Option<HandleRef>,
    pub params: ChannelParams,
}

impl ChannelRequest {
    pub fn text(target: impl Into<HandleRef>) -> Self {
        Self::targeted(ChannelKind::Text, target.into())
    }

    pub fn contact_list(name: &str) -> Self {
        Self::targeted(ChannelKind::ContactList, HandleRef::from(name))
    }

    pub fn group(name: &str) -> Self {
        Self::targeted(ChannelKind::Group, HandleRef::from(name))
    }

    pub fn room(target: impl Into<HandleRef>) -> Self {
        Self::targeted(ChannelKind::Room, target.into())
    }

    pub fn room_list() -> Self {
        Self {
            kind: ChannelKind::RoomList,
            target: None,
            params: ChannelParams::None,
        }
    }

    pub fn file_transfer(target: impl Into<HandleRef>, params: FileTransferParams) -> Self {
        Self {
            kind: ChannelKind::FileTransfer,
            target: Some(target.into()),
            params: ChannelParams::FileTransfer(params),
        }
    }

    fn targeted(kind: ChannelKind, target: HandleRef) -> Self {
        Self {
            kind,
            target: Some(target),
            params: ChannelParams::None,
        }
    }

    /// Handle type the target must resolve to.
    pub fn target_handle_type(&self) -> HandleType {
        self.kind.target_handle_type()
    }

    /// Match a property map against the channel kinds we can create.
    pub fn from_properties(props: &BTreeMap<String, Value>) -> MixerResult<Self> {
        let channel_type = props
            .get(iface::CHANNEL_TYPE)
            .and_then(Value::as_str)
            .ok_or_else(|| MixerError::NotImplemented("request has no channel type".into()))?;
        let handle_type = match props.get(iface::TARGET_HANDLE_TYPE) {
            None => HandleType::None,
            Some(value) => value
                .as_u64()
                .and_then(|code| u32::try_from(code).ok())
                .and_then(HandleType::from_code)
                .ok_or_else(|| {
                    MixerError::NotImplemented(format!("bad target handle type {}", value))
                })?,
        };
        let kind = ChannelKind::from_request(channel_type, handle_type).ok_or_else(|| {
            MixerError::NotImplemented(format!(
                "no channel of type {} for {:?} targets",
                channel_type, handle_type
            ))
        })?;

        for name in props.keys() {
            if !Self::allows(kind, name) {
                return Err(MixerError::NotImplemented(format!(
                    "property {} not supported for {} channels",
                    name, kind
                )));
            }
        }

        let target = Self::target_from(kind, props)?;
        let params = match kind {
            ChannelKind::FileTransfer => ChannelParams::FileTransfer(Self::file_params(props)?),
            _ => ChannelParams::None,
        };
        Ok(Self {
            kind,
            target,
            params,
        })
    }

    fn allows(kind: ChannelKind, name: &str) -> bool {
        if name == iface::CHANNEL_TYPE || name == iface::TARGET_HANDLE_TYPE {
            return true;
        }
        if kind != ChannelKind::RoomList && TARGET_PROPERTIES.contains(&name) {
            return true;
        }
        kind == ChannelKind::FileTransfer
            && name
                .strip_prefix(iface::CHANNEL_TYPE_FILE_TRANSFER)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| FILE_TRANSFER_PROPERTIES.contains(&rest))
                .unwrap_or(false)
    }

    fn target_from(kind: ChannelKind, props: &BTreeMap<String, Value>) -> MixerResult<Option<HandleRef>> {
        let by_id = props.get(iface::TARGET_HANDLE);
        let by_name = props
            .get(iface::TARGET_ID)
            .or_else(|| props.get(iface::TARGET_HANDLE_ID));

        if kind == ChannelKind::RoomList {
            return Ok(None);
        }
        match (by_id, by_name) {
            (Some(_), Some(_)) => Err(MixerError::NotImplemented(
                "TargetHandle and TargetID are mutually exclusive".into(),
            )),
            (Some(id), None) => id
                .as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .map(|id| Some(HandleRef::Id(HandleId(id))))
                .ok_or_else(|| MixerError::NotImplemented(format!("bad target handle {}", id))),
            (None, Some(name)) => name
                .as_str()
                .map(|name| Some(HandleRef::Name(name.to_string())))
                .ok_or_else(|| MixerError::NotImplemented(format!("bad target id {}", name))),
            (None, None) => Err(MixerError::NotImplemented(format!(
                "{} channels need a target",
                kind
            ))),
        }
    }

    fn file_params(props: &BTreeMap<String, Value>) -> MixerResult<FileTransferParams> {
        let get = |name: &str| props.get(&iface::qualified(iface::CHANNEL_TYPE_FILE_TRANSFER, name));
        let text = |name: &str| -> MixerResult<Option<String>> {
            match get(name) {
                None => Ok(None),
                Some(value) => value
                    .as_str()
                    .map(|s| Some(s.to_string()))
                    .ok_or_else(|| MixerError::NotImplemented(format!("{} must be a string", name))),
            }
        };
        let number = |name: &str| -> MixerResult<Option<u64>> {
            match get(name) {
                None => Ok(None),
                Some(value) => value
                    .as_u64()
                    .map(Some)
                    .ok_or_else(|| MixerError::NotImplemented(format!("{} must be a number", name))),
            }
        };

        let defaults = FileTransferParams::default();
        Ok(FileTransferParams {
            filename: text("Filename")?.unwrap_or(defaults.filename),
            content_type: text("ContentType")?.unwrap_or(defaults.content_type),
            size: number("Size")?.unwrap_or(defaults.size),
            description: text("Description")?.unwrap_or(defaults.description),
            initial_offset: number("InitialOffset")?.unwrap_or(defaults.initial_offset),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn text_by_target_id() {
        let request = ChannelRequest::from_properties(&props(&[
            (iface::CHANNEL_TYPE, json!(iface::CHANNEL_TYPE_TEXT)),
            (iface::TARGET_HANDLE_TYPE, json!(1)),
            (iface::TARGET_ID, json!("alice@mxit")),
        ]))
        .unwrap();
        assert_eq!(request, ChannelRequest::text("alice@mxit"));
    }

    #[test]
    fn group_by_handle() {
        let request = ChannelRequest::from_properties(&props(&[
            (iface::CHANNEL_TYPE, json!(iface::CHANNEL_TYPE_CONTACT_LIST)),
            (iface::TARGET_HANDLE_TYPE, json!(4)),
            (iface::TARGET_HANDLE, json!(12)),
        ]))
        .unwrap();
        assert_eq!(request.kind, ChannelKind::Group);
        assert_eq!(request.target, Some(HandleRef::Id(HandleId(12))));
    }

    #[test]
    fn unknown_properties_are_refused() {
        let err = ChannelRequest::from_properties(&props(&[
            (iface::CHANNEL_TYPE, json!(iface::CHANNEL_TYPE_TEXT)),
            (iface::TARGET_HANDLE_TYPE, json!(1)),
            (iface::TARGET_ID, json!("alice@mxit")),
            ("org.example.Color", json!("blue")),
        ]))
        .unwrap_err();
        assert!(matches!(err, MixerError::NotImplemented(_)));
    }

    #[test]
    fn mismatched_handle_type_is_refused() {
        let err = ChannelRequest::from_properties(&props(&[
            (iface::CHANNEL_TYPE, json!(iface::CHANNEL_TYPE_TEXT)),
            (iface::TARGET_HANDLE_TYPE, json!(3)),
            (iface::TARGET_ID, json!("subscribe")),
        ]))
        .unwrap_err();
        assert!(matches!(err, MixerError::NotImplemented(_)));
    }

    #[test]
    fn room_list_takes_no_target() {
        let request = ChannelRequest::from_properties(&props(&[(
            iface::CHANNEL_TYPE,
            json!(iface::CHANNEL_TYPE_ROOM_LIST),
        )]))
        .unwrap();
        assert_eq!(request, ChannelRequest::room_list());
    }

    #[test]
    fn file_transfer_metadata_is_parsed() {
        let ft = |name: &str| iface::qualified(iface::CHANNEL_TYPE_FILE_TRANSFER, name);
        let mut map = props(&[
            (iface::CHANNEL_TYPE, json!(iface::CHANNEL_TYPE_FILE_TRANSFER)),
            (iface::TARGET_HANDLE_TYPE, json!(1)),
            (iface::TARGET_ID, json!("bob@mxit")),
        ]);
        map.insert(ft("Filename"), json!("report.pdf"));
        map.insert(ft("Size"), json!(4096));
        let request = ChannelRequest::from_properties(&map).unwrap();
        match request.params {
            ChannelParams::FileTransfer(params) => {
                assert_eq!(params.filename, "report.pdf");
                assert_eq!(params.size, 4096);
                assert_eq!(params.content_type, "application/octet-stream");
            }
            other => panic!("unexpected params {:?}", other),
        }
    }
}
