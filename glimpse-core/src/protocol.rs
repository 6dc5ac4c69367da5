//! Inbound control protocol: decoding of client→server frames.
//!
//! ## Wire format
//!
//! Every frame starts with a little-endian `u32` type field:
//!
//! ```text
//! | type:u32 | body |
//! ```
//!
//! | type | body |
//! |------|------|
//! | 1    | UTF-8 text, whitespace-separated `path reqId nIdxs i0 … i_{n-1}` groups |
//! | 2    | packed `i32` request ids (length must be an exact multiple) |
//! | 3    | empty |
//! | 4    | opaque application payload |
//!
//! Decoding is context-free: `−1` index substitution and table lookups
//! happen in the engine, which knows the client.

use crate::error::GlimpseError;

/// One parsed group from a subscribe (type 1) body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub path: String,
    pub request_id: i32,
    pub idxs: Vec<i32>,
}

/// A decoded client→server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage<'a> {
    /// Type 1: install or replace subscriptions.
    Subscribe(Vec<Subscription>),
    /// Type 2: declare the currently wanted request ids.
    Poll(Vec<i32>),
    /// Type 3: refresh the activity window of the last polled set.
    Refresh,
    /// Type 4: opaque payload for the host's event handler.
    Custom(&'a [u8]),
}

/// Decode one inbound frame.
pub fn parse(frame: &[u8]) -> Result<ClientMessage<'_>, GlimpseError> {
    if frame.len() < 4 {
        return Err(GlimpseError::MessageTooShort(frame.len()));
    }
    let kind = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let body = &frame[4..];

    match kind {
        1 => Ok(ClientMessage::Subscribe(parse_subscriptions(body))),
        2 => {
            if body.len() % 4 != 0 {
                return Err(GlimpseError::InvalidPollLength(body.len()));
            }
            let ids = body
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(ClientMessage::Poll(ids))
        }
        3 => Ok(ClientMessage::Refresh),
        4 => Ok(ClientMessage::Custom(body)),
        other => Err(GlimpseError::UnknownMessageType(other)),
    }
}

/// Parse the whitespace-token stream of a subscribe body.
///
/// Parsing stops at end-of-stream or at the first token that fails to
/// parse; a group cut short contributes nothing. Invalid UTF-8 bytes are
/// replaced, which at worst mangles one path into an unknown one.
fn parse_subscriptions(body: &[u8]) -> Vec<Subscription> {
    let text = String::from_utf8_lossy(body);
    let mut tokens = text.split_whitespace();
    let mut subs = Vec::new();

    loop {
        let Some(path) = tokens.next() else { break };
        let Some(Ok(request_id)) = tokens.next().map(str::parse::<i32>) else {
            break;
        };
        let Some(Ok(nidxs)) = tokens.next().map(str::parse::<i32>) else {
            break;
        };

        let mut idxs = Vec::with_capacity(nidxs.max(0) as usize);
        let mut complete = true;
        for _ in 0..nidxs.max(0) {
            match tokens.next().map(str::parse::<i32>) {
                Some(Ok(idx)) => idxs.push(idx),
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            break;
        }

        subs.push(Subscription {
            path: path.to_string(),
            request_id,
            idxs,
        });
    }

    subs
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: u32, body: &[u8]) -> Vec<u8> {
        let mut f = kind.to_le_bytes().to_vec();
        f.extend_from_slice(body);
        f
    }

    #[test]
    fn rejects_short_frames() {
        assert!(matches!(
            parse(&[1, 0]),
            Err(GlimpseError::MessageTooShort(2))
        ));
        assert!(matches!(parse(&[]), Err(GlimpseError::MessageTooShort(0))));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            parse(&frame(99, &[])),
            Err(GlimpseError::UnknownMessageType(99))
        ));
    }

    #[test]
    fn subscribe_single_group_no_indices() {
        let binding = frame(1, b"counter 7 0");
        let msg = parse(&binding).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe(vec![Subscription {
                path: "counter".into(),
                request_id: 7,
                idxs: vec![],
            }])
        );
    }

    #[test]
    fn subscribe_multiple_groups_with_indices() {
        let binding = frame(1, b"node[%d].v 3 1 5 grid[%d][%d] 4 2 -1 9");
        let msg = parse(&binding).unwrap();
        let ClientMessage::Subscribe(subs) = msg else {
            panic!("not a subscribe")
        };
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].path, "node[%d].v");
        assert_eq!(subs[0].idxs, vec![5]);
        assert_eq!(subs[1].request_id, 4);
        assert_eq!(subs[1].idxs, vec![-1, 9]);
    }

    #[test]
    fn subscribe_truncated_group_is_dropped() {
        // Second group ends mid-indices: only the first installs.
        let binding = frame(1, b"a 1 0 b 2 3 10");
        let msg = parse(&binding).unwrap();
        let ClientMessage::Subscribe(subs) = msg else {
            panic!("not a subscribe")
        };
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].path, "a");
    }

    #[test]
    fn subscribe_garbage_request_id_stops_parse() {
        let binding = frame(1, b"a xyz 0");
        let msg = parse(&binding).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe(vec![]));
    }

    #[test]
    fn subscribe_empty_body() {
        let binding = frame(1, b"");
        let msg = parse(&binding).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe(vec![]));
    }

    #[test]
    fn poll_parses_packed_ids() {
        let mut body = Vec::new();
        for id in [7i32, -2, 40] {
            body.extend_from_slice(&id.to_le_bytes());
        }
        let binding = frame(2, &body);
        let msg = parse(&binding).unwrap();
        assert_eq!(msg, ClientMessage::Poll(vec![7, -2, 40]));
    }

    #[test]
    fn poll_empty_body_is_valid() {
        assert_eq!(parse(&frame(2, &[])).unwrap(), ClientMessage::Poll(vec![]));
    }

    #[test]
    fn poll_rejects_ragged_length() {
        assert!(matches!(
            parse(&frame(2, &[1, 2, 3])),
            Err(GlimpseError::InvalidPollLength(3))
        ));
    }

    #[test]
    fn refresh_and_custom() {
        assert_eq!(parse(&frame(3, &[])).unwrap(), ClientMessage::Refresh);
        assert_eq!(
            parse(&frame(4, b"ping")).unwrap(),
            ClientMessage::Custom(b"ping")
        );
        assert_eq!(parse(&frame(4, b"")).unwrap(), ClientMessage::Custom(b""));
    }
}
