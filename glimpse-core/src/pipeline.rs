//! Per-tick snapshot pipeline: getter invocation, per-request framing,
//! and whole-message diffing for one client.
//!
//! ## Outbound wire format
//!
//! ```text
//! | msgType:u32 |  0 = full message, 1 = whole-message diff
//! ```
//!
//! A full message body is a concatenation of per-request records:
//!
//! ```text
//! | requestId:i32 | reqType:i32 | size:i32 | bytes[size] |
//! ```
//!
//! `reqType = 0` → `bytes` is the request's data, zero-padded to a word
//! boundary; `reqType = 1` → `bytes` is the diff stream against the
//! previous padded data (and `size` is the diff's size, not the data's).
//! A whole-message diff body is the diff stream over the prior full
//! message starting past its own 4-byte header.

use tracing::warn;

use crate::client::ClientState;
use crate::config::Parameters;
use crate::diff;
use crate::registry::GetterRegistry;
use crate::transport::ClientTransport;

/// Smallest payload worth asking the transport to compress.
const COMPRESS_THRESHOLD_BYTES: usize = 64;

/// Smallest buffer worth diffing instead of sending whole.
const DIFF_THRESHOLD_BYTES: usize = 256;

/// What one client's tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The transport still holds unsent bytes; nothing was advanced.
    SkippedBackpressure,
    /// No request produced bytes; nothing was sent.
    Idle,
    /// A frame went out; `logical_bytes` is the pre-diff message size.
    Sent { logical_bytes: usize },
}

/// Run one tick for one client.
pub(crate) fn tick_client<T: ClientTransport>(
    client_id: i32,
    cd: &mut ClientState<T>,
    registry: &GetterRegistry,
    params: &Parameters,
    now_ms: i64,
) -> TickOutcome {
    let buffered = cd.transport.buffered_amount();
    if buffered > 0 {
        warn!(
            client_id,
            buffered, "send buffer not drained, skipping updates for client"
        );
        return TickOutcome::SkippedBackpressure;
    }

    // ── Per-request pass ─────────────────────────────────────────
    let cur = &mut cd.cur;
    cur.clear();
    cur.extend_from_slice(&0u32.to_le_bytes());

    for (&request_id, req) in cd.requests.iter_mut() {
        let Some(getter) = registry.get(req.getter_id) else {
            continue;
        };
        if !req.should_update(now_ms) {
            continue;
        }
        if req.t_last_request_timeout_ms < 0 {
            // One-shot fired: disarm until the next poll.
            req.t_last_requested_ms = 0;
        }

        let cur_data = getter(&req.idxs);
        req.t_last_updated_ms = now_ms;

        let padded_size = diff::padded_len(cur_data.len());
        let use_diff =
            req.prev_data.len() == padded_size && cur_data.len() > DIFF_THRESHOLD_BYTES;

        cur.extend_from_slice(&request_id.to_le_bytes());
        cur.extend_from_slice(&(use_diff as i32).to_le_bytes());

        if use_diff {
            req.diff_data.clear();
            diff::encode(&req.prev_data, &cur_data, &mut req.diff_data);
            cur.extend_from_slice(&(req.diff_data.len() as i32).to_le_bytes());
            cur.extend_from_slice(&req.diff_data);
        } else {
            cur.extend_from_slice(&(padded_size as i32).to_le_bytes());
            cur.extend_from_slice(&cur_data);
            cur.resize(cur.len() + (padded_size - cur_data.len()), 0);
        }

        req.prev_data.clear();
        req.prev_data.extend_from_slice(&cur_data);
        req.prev_data.resize(padded_size, 0);
    }

    if cur.len() <= 4 {
        return TickOutcome::Idle;
    }
    let logical_bytes = cur.len();

    // ── Whole-message pass ───────────────────────────────────────
    let payload: &[u8] =
        if cur.len() == cd.prev.len() && cur.len() > DIFF_THRESHOLD_BYTES {
            cd.diff.clear();
            cd.diff.extend_from_slice(&1u32.to_le_bytes());
            diff::encode(&cd.prev[4..], &cur[4..], &mut cd.diff);
            &cd.diff
        } else {
            cur
        };

    if payload.len() > params.max_payload_bytes {
        warn!(
            client_id,
            size = payload.len(),
            max = params.max_payload_bytes,
            "outbound frame exceeds max payload size"
        );
    }

    let compress = payload.len() > COMPRESS_THRESHOLD_BYTES;
    if !cd.transport.send_binary(payload, compress) {
        warn!(client_id, "transport rejected frame, backpressure increasing");
    }

    std::mem::swap(&mut cd.prev, &mut cd.cur);
    TickOutcome::Sent { logical_bytes }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    /// Transport double: records frames, with a controllable buffer gauge
    /// and accept/reject switch.
    #[derive(Clone, Default)]
    struct FakeTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        compressed: Arc<Mutex<Vec<bool>>>,
        buffered: Arc<AtomicUsize>,
        reject: bool,
    }

    impl ClientTransport for FakeTransport {
        fn send_binary(&mut self, bytes: &[u8], compress: bool) -> bool {
            if self.reject {
                return false;
            }
            self.sent.lock().push(bytes.to_vec());
            self.compressed.lock().push(compress);
            true
        }

        fn buffered_amount(&self) -> usize {
            self.buffered.load(Ordering::Relaxed)
        }
    }

    fn registry_with_blob(blob: Arc<Mutex<Vec<u8>>>) -> GetterRegistry {
        let mut reg = GetterRegistry::new();
        reg.var("blob", move |_| blob.lock().clone());
        reg
    }

    /// A client with one polled request against getter 0.
    fn client_with_request(transport: FakeTransport, now_ms: i64) -> ClientState<FakeTransport> {
        let mut cd = ClientState::new(now_ms, [127, 0, 0, 1], transport);
        let mut req = Request::new(0, Vec::new());
        req.mark_requested(now_ms, 3000);
        cd.requests.insert(7, req);
        cd.last_requests.push(7);
        cd
    }

    #[test]
    fn first_update_sends_full_record() {
        let blob = Arc::new(Mutex::new(vec![1u8, 2, 3, 4]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        assert_eq!(out, TickOutcome::Sent { logical_bytes: 20 });

        let frames = sent.lock();
        assert_eq!(frames.len(), 1);
        #[rustfmt::skip]
        assert_eq!(
            frames[0],
            [
                0, 0, 0, 0,   // full message
                7, 0, 0, 0,   // request id
                0, 0, 0, 0,   // full record
                4, 0, 0, 0,   // padded size
                1, 2, 3, 4,   // data
            ]
        );
    }

    #[test]
    fn unaligned_data_is_zero_padded() {
        let blob = Arc::new(Mutex::new(vec![0xAB; 5]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);

        let frames = sent.lock();
        let frame = &frames[0];
        assert_eq!(&frame[12..16], &8i32.to_le_bytes());
        assert_eq!(&frame[16..24], &[0xAB, 0xAB, 0xAB, 0xAB, 0xAB, 0, 0, 0]);
        assert_eq!(cd.requests[&7].prev_data.len(), 8);
    }

    #[test]
    fn second_update_of_large_blob_sends_request_diff() {
        let blob = Arc::new(Mutex::new(vec![0xAA; 1024]));
        let reg = registry_with_blob(blob.clone());
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        {
            let mut b = blob.lock();
            for byte in &mut b[256..264] {
                *byte = 0xBB;
            }
        }
        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1020);
        // 4 header + 12 record header + 3 diff pairs.
        assert_eq!(out, TickOutcome::Sent { logical_bytes: 40 });

        let frames = sent.lock();
        let frame = &frames[1];
        assert_eq!(&frame[0..4], &[0, 0, 0, 0]);
        assert_eq!(&frame[4..8], &7i32.to_le_bytes());
        assert_eq!(&frame[8..12], &1i32.to_le_bytes()); // diff record
        assert_eq!(&frame[12..16], &24i32.to_le_bytes());
        // Runs: 64 clean, 2 changed, 190 clean.
        assert_eq!(&frame[16..20], &64u32.to_le_bytes());
        assert_eq!(&frame[24..28], &2u32.to_le_bytes());
        assert_eq!(&frame[28..32], &0x11111111u32.to_le_bytes());
        assert_eq!(&frame[32..36], &190u32.to_le_bytes());
    }

    #[test]
    fn equal_sized_large_messages_go_out_as_whole_message_diff() {
        // 250 data bytes stay under the per-request diff threshold, so
        // every tick emits a same-sized full record and the message as a
        // whole (268 bytes) qualifies for whole-message diffing.
        let blob = Arc::new(Mutex::new(vec![0x42; 250]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1020);
        assert_eq!(out, TickOutcome::Sent { logical_bytes: 268 });

        let frames = sent.lock();
        assert_eq!(frames.len(), 2);
        // First frame is the full message.
        assert_eq!(&frames[0][0..4], &[0, 0, 0, 0]);
        assert_eq!(frames[0].len(), 268);
        // Second frame: nothing changed, so the whole-message diff is a
        // header plus a single zero run covering all 66 words.
        assert_eq!(&frames[1][0..4], &[1, 0, 0, 0]);
        assert_eq!(&frames[1][4..8], &66u32.to_le_bytes());
        assert_eq!(&frames[1][8..12], &0u32.to_le_bytes());
        assert_eq!(frames[1].len(), 12);
    }

    #[test]
    fn idle_client_sends_nothing() {
        let reg = registry_with_blob(Arc::new(Mutex::new(vec![1])));
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        // No requests at all.
        let mut cd = ClientState::new(1000, [127, 0, 0, 1], transport);

        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        assert_eq!(out, TickOutcome::Idle);
        assert!(sent.lock().is_empty());
        assert!(cd.prev.is_empty());
    }

    #[test]
    fn backpressure_gate_freezes_all_state() {
        let blob = Arc::new(Mutex::new(vec![9u8; 16]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        transport.buffered.store(100, Ordering::Relaxed);
        let mut cd = client_with_request(transport, 1000);

        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        assert_eq!(out, TickOutcome::SkippedBackpressure);
        assert!(sent.lock().is_empty());
        let req = &cd.requests[&7];
        assert!(req.prev_data.is_empty());
        assert_eq!(req.t_last_updated_ms, -1);
    }

    #[test]
    fn stale_request_stops_updating() {
        let blob = Arc::new(Mutex::new(vec![9u8; 16]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        // Inside the window: updates.
        tick_client(5, &mut cd, &reg, &Parameters::default(), 1100);
        // Window expired, request still installed but not re-polled.
        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1100 + 3000);
        assert_eq!(out, TickOutcome::Idle);
        assert_eq!(sent.lock().len(), 1);
        assert!(cd.requests.contains_key(&7));
    }

    #[test]
    fn one_shot_request_fires_once_until_repolled() {
        let blob = Arc::new(Mutex::new(vec![9u8; 16]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = ClientState::new(1000, [127, 0, 0, 1], transport);
        let mut req = Request::new(0, Vec::new());
        req.mark_requested(1000, -1);
        cd.requests.insert(1, req);
        cd.last_requests.push(1);

        tick_client(5, &mut cd, &reg, &Parameters::default(), 2000);
        assert_eq!(sent.lock().len(), 1);
        // Disarmed: a much later tick sends nothing.
        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 60_000);
        assert_eq!(out, TickOutcome::Idle);

        // Re-polling re-arms it.
        cd.requests.get_mut(&1).unwrap().mark_requested(61_000, -1);
        tick_client(5, &mut cd, &reg, &Parameters::default(), 62_000);
        assert_eq!(sent.lock().len(), 2);
    }

    #[test]
    fn min_update_interval_coalesces_ticks() {
        let blob = Arc::new(Mutex::new(vec![9u8; 16]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();
        let mut cd = client_with_request(transport, 1000);

        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        // 10 ms later: inside the min-update interval, nothing goes out.
        tick_client(5, &mut cd, &reg, &Parameters::default(), 1010);
        assert_eq!(sent.lock().len(), 1);
        tick_client(5, &mut cd, &reg, &Parameters::default(), 1017);
        assert_eq!(sent.lock().len(), 2);
    }

    #[test]
    fn compression_requested_only_above_threshold() {
        let small = Arc::new(Mutex::new(vec![1u8; 4]));
        let reg = registry_with_blob(small);
        let transport = FakeTransport::default();
        let compressed = transport.compressed.clone();
        let mut cd = client_with_request(transport, 1000);
        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        assert_eq!(compressed.lock().as_slice(), &[false]);

        let big = Arc::new(Mutex::new(vec![1u8; 128]));
        let reg = registry_with_blob(big);
        let transport = FakeTransport::default();
        let compressed = transport.compressed.clone();
        let mut cd = client_with_request(transport, 1000);
        tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        assert_eq!(compressed.lock().as_slice(), &[true]);
    }

    #[test]
    fn rejected_send_still_counts_and_advances() {
        let blob = Arc::new(Mutex::new(vec![9u8; 16]));
        let reg = registry_with_blob(blob);
        let transport = FakeTransport {
            reject: true,
            ..FakeTransport::default()
        };
        let mut cd = client_with_request(transport, 1000);

        let out = tick_client(5, &mut cd, &reg, &Parameters::default(), 1000);
        // No rollback: the tick reports the logical bytes and prev advances.
        assert_eq!(out, TickOutcome::Sent { logical_bytes: 32 });
        assert_eq!(cd.prev.len(), 32);
    }
}
