/// Datagram body the relay sends once per new phone connection.
pub const CONNECT_PAYLOAD: &str = "CONNECT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Connect,
    Lane(usize),
}

/// Decodes one datagram body: `CONNECT`, or the decimal index of a lane below `lane_count`.
/// Anything else yields `None` and is meant to be dropped without a word.
pub fn decode_payload(bytes: &[u8], lane_count: usize) -> Option<Payload> {
    let text = std::str::from_utf8(bytes)
        .ok()?
        .trim_matches(|c: char| c.is_ascii_whitespace());

    if text == CONNECT_PAYLOAD {
        return Some(Payload::Connect);
    }

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let lane: usize = text.parse().ok()?;
    (lane < lane_count).then_some(Payload::Lane(lane))
}
