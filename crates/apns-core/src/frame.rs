//! APNs v2 "enhanced" frame codec.
//!
//! A notification goes on the wire as:
//!
//! ```text
//! [1]  command = 2
//! [4]  frame length (big-endian), total size of the items
//! items, each:
//!   [1]  item id
//!   [2]  item length (big-endian)
//!   [N]  item body
//! ```
//!
//! The gateway answers at most once, with a 6-byte reply:
//! `[1] command = 8 | [1] status | [4] message id (big-endian)`.

use bytes::{BufMut, BytesMut};

use crate::error::{status, TokenError};

/// Command byte of an outbound notification frame.
pub const NOTIFICATION_COMMAND: u8 = 2;
/// Command byte of the gateway's error reply.
pub const ERROR_REPLY_COMMAND: u8 = 8;
/// Bytes of framing overhead per notification: command + frame length.
pub const NOTIFICATION_HEADER_SIZE: usize = 5;
/// Decoded device-token length.
pub const TOKEN_SIZE: usize = 32;
/// Size of the gateway's error reply.
pub const ERROR_REPLY_SIZE: usize = 6;
/// Largest outbound TCP frame the client will accumulate.
pub const TCP_FRAME_MAX: usize = 65535;

/// Frame item identifiers.
pub mod item {
    pub const DEVICE_TOKEN: u8 = 1;
    pub const PAYLOAD: u8 = 2;
    pub const IDENTIFIER: u8 = 3;
    pub const EXPIRATION: u8 = 4;
    pub const PRIORITY: u8 = 5;
}

/// Hex-decode a device token and require exactly [`TOKEN_SIZE`] bytes.
pub fn decode_token(token: &str) -> Result<[u8; TOKEN_SIZE], TokenError> {
    let bytes = hex::decode(token)?;
    if bytes.len() != TOKEN_SIZE {
        return Err(TokenError::Length { len: bytes.len() });
    }
    let mut out = [0u8; TOKEN_SIZE];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Encode one notification's items into `scratch`.
///
/// Token, payload, and identifier are always present. Expiration is
/// omitted when 0; the priority item is emitted only for the two values
/// Apple defines, and its body is a single byte.
pub fn encode_items(
    scratch: &mut BytesMut,
    token: &[u8; TOKEN_SIZE],
    payload_json: &[u8],
    id: u32,
    expiration: u32,
    priority: u8,
) {
    scratch.put_u8(item::DEVICE_TOKEN);
    scratch.put_u16(TOKEN_SIZE as u16);
    scratch.put_slice(token);

    scratch.put_u8(item::PAYLOAD);
    scratch.put_u16(payload_json.len() as u16);
    scratch.put_slice(payload_json);

    scratch.put_u8(item::IDENTIFIER);
    scratch.put_u16(4);
    scratch.put_u32(id);

    if expiration != 0 {
        scratch.put_u8(item::EXPIRATION);
        scratch.put_u16(4);
        scratch.put_u32(expiration);
    }

    if priority == 5 || priority == 10 {
        scratch.put_u8(item::PRIORITY);
        scratch.put_u16(1);
        scratch.put_u8(priority);
    }
}

/// Append a complete notification frame (header + items) to the outbound
/// buffer. `items` must hold fully assembled items; the outbound buffer
/// never receives a partial item.
pub fn append_notification(frame: &mut BytesMut, items: &[u8]) {
    frame.put_u8(NOTIFICATION_COMMAND);
    frame.put_u32(items.len() as u32);
    frame.put_slice(items);
}

/// A parsed gateway error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReply {
    pub status: u8,
    pub message_id: u32,
}

/// Decode the gateway's reply. Anything shorter than the 6-byte form is
/// malformed and reads as `UNKNOWN` with no message id.
pub fn decode_error_reply(buf: &[u8]) -> ErrorReply {
    if buf.len() < ERROR_REPLY_SIZE {
        return ErrorReply {
            status: status::UNKNOWN,
            message_id: 0,
        };
    }
    ErrorReply {
        status: buf[1],
        message_id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "4ec500020d8350072d2417ba566feda10b2b266558371a65ba67fede21393c8f";

    /// Test-side frame parser: walks the item list back out of the bytes.
    fn parse_items(mut body: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut items = Vec::new();
        while !body.is_empty() {
            let id = body[0];
            let len = u16::from_be_bytes([body[1], body[2]]) as usize;
            items.push((id, body[3..3 + len].to_vec()));
            body = &body[3 + len..];
        }
        items
    }

    #[test]
    fn decode_token_round_trips() {
        let decoded = decode_token(TOKEN).unwrap();
        assert_eq!(hex::encode(decoded), TOKEN);
    }

    #[test]
    fn decode_token_rejects_bad_hex_and_bad_length() {
        assert!(matches!(decode_token("zz"), Err(TokenError::Hex(_))));
        assert!(matches!(
            decode_token("4ec5"),
            Err(TokenError::Length { len: 2 })
        ));
    }

    #[test]
    fn encode_always_emits_token_payload_identifier() {
        let token = decode_token(TOKEN).unwrap();
        let mut scratch = BytesMut::new();
        encode_items(&mut scratch, &token, b"{\"aps\":{}}", 7, 0, 0);

        let items = parse_items(&scratch);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].0, item::DEVICE_TOKEN);
        assert_eq!(items[0].1, token);
        assert_eq!(items[1].0, item::PAYLOAD);
        assert_eq!(items[1].1, b"{\"aps\":{}}");
        assert_eq!(items[2].0, item::IDENTIFIER);
        assert_eq!(items[2].1, 7u32.to_be_bytes());
    }

    #[test]
    fn expiration_and_priority_are_conditional() {
        let token = decode_token(TOKEN).unwrap();

        let mut scratch = BytesMut::new();
        encode_items(&mut scratch, &token, b"{}", 1, 837431, 10);
        let items = parse_items(&scratch);
        assert_eq!(items.len(), 5);
        assert_eq!(items[3].0, item::EXPIRATION);
        assert_eq!(items[3].1, 837431u32.to_be_bytes());
        assert_eq!(items[4].0, item::PRIORITY);
        // The priority body is one byte, not four.
        assert_eq!(items[4].1, [10]);

        // Priority values outside {5, 10} are not put on the wire.
        let mut scratch = BytesMut::new();
        encode_items(&mut scratch, &token, b"{}", 1, 0, 7);
        assert_eq!(parse_items(&scratch).len(), 3);
    }

    #[test]
    fn frame_header_carries_the_item_length() {
        let token = decode_token(TOKEN).unwrap();
        let mut scratch = BytesMut::new();
        encode_items(&mut scratch, &token, b"{\"aps\":{}}", 3, 0, 5);

        let mut frame = BytesMut::new();
        append_notification(&mut frame, &scratch);

        assert_eq!(frame[0], NOTIFICATION_COMMAND);
        let frame_len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(frame_len, scratch.len());
        assert_eq!(frame.len(), NOTIFICATION_HEADER_SIZE + frame_len);

        // frame length equals the sum of 3 + item_length over the items.
        let total: usize = parse_items(&frame[NOTIFICATION_HEADER_SIZE..])
            .iter()
            .map(|(_, body)| 3 + body.len())
            .sum();
        assert_eq!(total, frame_len);
    }

    #[test]
    fn error_reply_decodes_big_endian_id() {
        let reply = decode_error_reply(&[8, 8, 0, 0, 0, 2]);
        assert_eq!(
            reply,
            ErrorReply {
                status: 8,
                message_id: 2
            }
        );

        let reply = decode_error_reply(&[8, 10, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(reply.status, 10);
        assert_eq!(reply.message_id, 0xdead_beef);
    }

    #[test]
    fn short_reply_reads_as_unknown() {
        let reply = decode_error_reply(&[8, 8, 0]);
        assert_eq!(reply.status, status::UNKNOWN);
        assert_eq!(reply.message_id, 0);
    }
}
