//! Protocol message definitions and the JSON codec

use serde::{Deserialize, Serialize};

use super::item::{now_millis, ItemKind, TransferItem};
use crate::{Error, Result};

/// All protocol messages. On the wire each is a JSON object whose `type`
/// field selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Probe sent by a scanning device
    #[serde(rename_all = "camelCase")]
    Discovery {
        device_name: String,
        network_name: String,
    },

    /// Answer to a discovery probe
    #[serde(rename_all = "camelCase")]
    DiscoveryResponse {
        device_id: String,
        device_name: String,
        network_name: String,
    },

    /// Request to pair (step 1 of the handshake)
    PairRequest(PairRequest),

    /// Pairing verdict (step 2 of the handshake)
    #[serde(rename_all = "camelCase")]
    PairResponse { accepted: bool, device_name: String },

    /// Clipboard text
    ClipboardData { data: TransferItem, timestamp: u64 },

    /// File payload, base64 in `data.content`
    FileData { data: TransferItem, timestamp: u64 },

    #[serde(rename_all = "camelCase")]
    ClipboardAck { item_id: String, timestamp: u64 },

    #[serde(rename_all = "camelCase")]
    FileAck { item_id: String, timestamp: u64 },

    Heartbeat { timestamp: u64 },

    HeartbeatResponse { timestamp: u64 },
}

/// Pairing request sent by the initiating side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
    pub device_id: String,
    pub device_name: String,
    pub network_name: String,
    pub is_reconnection: bool,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize and validate a message. Any failure is a protocol error
    /// that concerns this message only.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let message: Message =
            serde_json::from_slice(bytes).map_err(|e| Error::Protocol(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<()> {
        let (data, expected) = match self {
            Message::ClipboardData { data, .. } => (data, ItemKind::Text),
            Message::FileData { data, .. } => (data, ItemKind::File),
            _ => return Ok(()),
        };
        if data.kind != expected {
            return Err(Error::Protocol(format!(
                "{} carries a {:?} item",
                self.kind(),
                data.kind
            )));
        }
        Ok(())
    }

    /// Wire name of this message's type
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Discovery { .. } => "discovery",
            Message::DiscoveryResponse { .. } => "discovery_response",
            Message::PairRequest(_) => "pair_request",
            Message::PairResponse { .. } => "pair_response",
            Message::ClipboardData { .. } => "clipboard_data",
            Message::FileData { .. } => "file_data",
            Message::ClipboardAck { .. } => "clipboard_ack",
            Message::FileAck { .. } => "file_ack",
            Message::Heartbeat { .. } => "heartbeat",
            Message::HeartbeatResponse { .. } => "heartbeat_response",
        }
    }

    pub fn heartbeat() -> Self {
        Message::Heartbeat {
            timestamp: now_millis(),
        }
    }

    pub fn heartbeat_response() -> Self {
        Message::HeartbeatResponse {
            timestamp: now_millis(),
        }
    }

    /// Wrap an item in the data message matching its kind
    pub fn data(item: TransferItem) -> Result<Self> {
        let timestamp = now_millis();
        match item.kind {
            ItemKind::Text => Ok(Message::ClipboardData { data: item, timestamp }),
            ItemKind::File => Ok(Message::FileData { data: item, timestamp }),
            ItemKind::Image => Err(Error::InvalidContent(
                "image items are not transferable".to_string(),
            )),
        }
    }

    /// Acknowledgment for a received item
    pub fn ack(item: &TransferItem) -> Self {
        let item_id = item.id.clone();
        let timestamp = now_millis();
        match item.kind {
            ItemKind::File => Message::FileAck { item_id, timestamp },
            _ => Message::ClipboardAck { item_id, timestamp },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Message> {
        vec![
            Message::Discovery {
                device_name: "laptop".into(),
                network_name: "wlan0".into(),
            },
            Message::DiscoveryResponse {
                device_id: "phone".into(),
                device_name: "Phone".into(),
                network_name: "wlan0".into(),
            },
            Message::PairRequest(PairRequest {
                device_id: "laptop".into(),
                device_name: "laptop".into(),
                network_name: "wlan0".into(),
                is_reconnection: true,
            }),
            Message::PairResponse {
                accepted: false,
                device_name: "phone".into(),
            },
            Message::data(TransferItem::text("1".into(), "hello", "laptop")).unwrap(),
            Message::data(TransferItem::file("2".into(), "a.bin", &[0, 1, 2], None, "laptop"))
                .unwrap(),
            Message::ClipboardAck { item_id: "1".into(), timestamp: 5 },
            Message::FileAck { item_id: "2".into(), timestamp: 6 },
            Message::heartbeat(),
            Message::heartbeat_response(),
        ]
    }

    #[test]
    fn test_message_roundtrip() {
        for msg in samples() {
            let bytes = msg.encode().unwrap();
            assert_eq!(Message::decode(&bytes).unwrap(), msg, "{}", msg.kind());
        }
    }

    #[test]
    fn test_type_discriminator_matches_kind() {
        for msg in samples() {
            let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
            assert_eq!(value["type"], msg.kind());
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = r#"{"type":"pair_request","deviceId":"a","deviceName":"A","networkName":"lan","isReconnection":false}"#;
        match Message::decode(json.as_bytes()).unwrap() {
            Message::PairRequest(req) => {
                assert_eq!(req.device_id, "a");
                assert!(!req.is_reconnection);
            }
            other => panic!("wrong message type: {:?}", other),
        }

        let ack = Message::ClipboardAck { item_id: "1".into(), timestamp: 9 };
        let text = String::from_utf8(ack.encode().unwrap()).unwrap();
        assert!(text.contains("\"itemId\":\"1\""));
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        let result = Message::decode(br#"{"type":"teleport","timestamp":1}"#);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_malformed_input_is_protocol_error() {
        let inputs: [&[u8]; 5] = [b"{not json", b"", b"[]", br#"{"type":"heartbeat"}"#, &[0xff, 0xfe]];
        for input in inputs {
            assert!(matches!(Message::decode(input), Err(Error::Protocol(_))));
        }
    }

    #[test]
    fn test_kind_mismatch_is_protocol_error() {
        let item = TransferItem::file("3".into(), "x", b"x", None, "laptop");
        let msg = Message::ClipboardData { data: item, timestamp: 1 };
        let bytes = msg.encode().unwrap();
        assert!(matches!(Message::decode(&bytes), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_file_payload_bytes_roundtrip() {
        let bytes: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect();
        let msg = Message::data(TransferItem::file("4".into(), "blob", &bytes, None, "laptop")).unwrap();
        match Message::decode(&msg.encode().unwrap()).unwrap() {
            Message::FileData { data, .. } => assert_eq!(data.file_bytes().unwrap(), bytes),
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_ack_follows_item_kind() {
        let text = TransferItem::text("1".into(), "t", "laptop");
        let file = TransferItem::file("2".into(), "f", b"f", None, "laptop");
        assert_eq!(Message::ack(&text).kind(), "clipboard_ack");
        assert_eq!(Message::ack(&file).kind(), "file_ack");
    }
}
