//------------ Address Codec ----------------------------------------------------------
//
// Wire opcodes, the per-frame decode/encode contexts, and the
// please-explain request/response machinery described in the design.

use log::debug;

use crate::broadcast_cache::{Bpi, BroadcastCache, BPI_LEN};
use crate::collaborators::{Buffer, FrameType, InterfaceTable, PacketQueue, QueueClass, QueuedFrame};
use crate::directory::{Directory, Lookup};
use crate::errors::CodecError;
use crate::node_id::{NodeId, BROADCAST_SID};
use crate::reachability;
use crate::subscriber::{Reachable, SubscriberId};

pub mod opcode {
    pub const IDX1: u8 = 0x01;
    pub const PFX3: u8 = 0x05;
    pub const PFX7: u8 = 0x06;
    pub const PFX11: u8 = 0x07;
    pub const FULL_IDX1: u8 = 0x08;
    pub const PFX3_IDX1: u8 = 0x09;
    pub const PFX7_IDX1: u8 = 0x0A;
    pub const PFX11_IDX1: u8 = 0x0B;
    pub const PFX11_IDX2: u8 = 0x0D;
    pub const FULL_IDX2: u8 = 0x0E;
    pub const BROADCAST: u8 = 0x0F;
    pub const OA_PREVIOUS: u8 = 0xFE;
    pub const OA_SELF: u8 = 0xFF;
}

/// Maximum number of records a single please-explain payload may carry.
/// Not part of the wire contract; a local bound so a pathologically
/// large ambiguous subtree cannot grow a reply without limit.
const MAX_EXPLAIN_RECORDS: usize = 32;

/// One record of a please-explain payload: either a full 32-byte id
/// being taught to the peer (`len == 32`), or the unresolved prefix the
/// peer is being asked to explain (`len < 32`).
#[derive(Debug, Clone, Copy)]
pub struct ExplainRecord {
    pub len: u8,
    pub bytes: [u8; 32],
}

impl ExplainRecord {
    fn full(sid: &NodeId) -> Self {
        ExplainRecord {
            len: 32,
            bytes: *sid.as_bytes(),
        }
    }

    fn query(prefix: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..prefix.len()].copy_from_slice(prefix);
        ExplainRecord {
            len: prefix.len() as u8,
            bytes,
        }
    }

    /// A marker record produced when an index-carrying opcode is
    /// received; carries no addressable prefix.
    fn unsupported() -> Self {
        ExplainRecord {
            len: 0,
            bytes: [0u8; 32],
        }
    }
}

/// Per-frame encoding state. `sender`/`previous` never survive across
/// frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeContext {
    pub sender: Option<SubscriberId>,
    pub previous: Option<SubscriberId>,
}

/// Per-frame decoding state.
#[derive(Debug, Clone, Default)]
pub struct DecodeContext {
    pub sender: Option<SubscriberId>,
    pub previous: Option<SubscriberId>,
    pub invalid_addresses: bool,
    pub please_explain: Vec<ExplainRecord>,
}

/// The three shapes a successful decode can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// Resolved via `OA_SELF` or `OA_PREVIOUS`.
    Sentinel(SubscriberId),
    /// Resolved via a length-prefixed lookup.
    Subscriber(SubscriberId),
    /// The link-local broadcast marker (`0x0F`, 32 bytes of `0xFF`).
    Broadcast,
}

fn literal_len(b: u8) -> Option<usize> {
    match b {
        opcode::PFX3 => Some(3),
        opcode::PFX7 => Some(7),
        opcode::PFX11 => Some(11),
        0x10..=0x20 => Some(b as usize),
        _ => None,
    }
}

/// Number of payload bytes following an index-carrying opcode, so the
/// decoder can skip past it without desyncing the frame even though the
/// index table itself is unimplemented.
fn unsupported_payload_len(b: u8) -> Option<usize> {
    match b {
        opcode::IDX1 => Some(1),
        opcode::FULL_IDX1 => Some(33),
        opcode::PFX3_IDX1 => Some(4),
        opcode::PFX7_IDX1 => Some(8),
        opcode::PFX11_IDX1 => Some(12),
        opcode::PFX11_IDX2 => Some(13),
        opcode::FULL_IDX2 => Some(34),
        _ => None,
    }
}

/// Snaps a computed byte length up to the smallest length the wire
/// format can actually carry: the three short aliases (3, 7, 11) below
/// the literal range, or a literal length in `16..=32` above it. This
/// never shortens the prefix, so the result still resolves to the same
/// subscriber; it only ever sends a few extra bytes.
fn wire_len(l: usize) -> u8 {
    match l {
        0..=3 => 3,
        4..=7 => 7,
        8..=11 => 11,
        12..=32 => l.max(16) as u8,
        _ => 32,
    }
}

fn emit_len_prefixed(buf: &mut dyn Buffer, sid: &NodeId, l: u8) {
    let op = match l {
        3 => opcode::PFX3,
        7 => opcode::PFX7,
        11 => opcode::PFX11,
        other => other,
    };
    buf.append_byte(op);
    buf.append_bytes(&sid.as_bytes()[..l as usize]);
}

/// Encodes `subscriber` into `buf` using the shortest safe form: `OA_SELF`
/// if it is the frame's sender, `OA_PREVIOUS` if it is the subscriber most
/// recently encoded in this frame, else a length-prefixed prefix of its
/// id, long enough to stay unambiguous.
pub fn encode(dir: &mut Directory, ctx: &mut EncodeContext, buf: &mut dyn Buffer, subscriber: SubscriberId) {
    if ctx.sender == Some(subscriber) {
        buf.append_byte(opcode::OA_SELF);
        ctx.previous = Some(subscriber);
        return;
    }
    if ctx.previous == Some(subscriber) {
        buf.append_byte(opcode::OA_PREVIOUS);
        ctx.previous = Some(subscriber);
        return;
    }

    let sid;
    let l;
    {
        let sub = dir.get_mut(subscriber);
        sid = sub.sid;
        l = if sub.send_full {
            sub.send_full = false;
            32
        } else {
            let base = (sub.abbreviate_len as usize + 3) / 2;
            let bumped = if sub.reachable.contains(Reachable::SELF_) {
                base + 1
            } else {
                base
            };
            wire_len(bumped.min(32)) as usize
        };
    }
    emit_len_prefixed(buf, &sid, l as u8);
    ctx.previous = Some(subscriber);
}

/// Decodes one address reference from `buf`, resolving it against
/// `dir` and recording any please-explain obligations on `ctx`.
///
/// On `Err`, `ctx.invalid_addresses` has already been set for every
/// variant except [`CodecError::ParseError`], which is fatal for the
/// whole frame: the caller must stop decoding rather than continue.
pub fn decode(dir: &mut Directory, ctx: &mut DecodeContext, buf: &mut dyn Buffer) -> Result<Decoded, CodecError> {
    let b = buf.read_byte().ok_or(CodecError::ParseError)?;

    match b {
        opcode::OA_SELF => match ctx.sender {
            Some(s) => {
                ctx.previous = Some(s);
                Ok(Decoded::Sentinel(s))
            }
            None => {
                ctx.invalid_addresses = true;
                Err(CodecError::UnknownSender)
            }
        },
        opcode::OA_PREVIOUS => match ctx.previous {
            Some(s) => {
                ctx.previous = Some(s);
                Ok(Decoded::Sentinel(s))
            }
            None => {
                ctx.invalid_addresses = true;
                Err(CodecError::UnknownPrevious)
            }
        },
        opcode::BROADCAST => {
            let bytes = buf.read_bytes_ptr(32).ok_or(CodecError::ParseError)?;
            if bytes != &BROADCAST_SID.as_bytes()[..] {
                return Err(CodecError::ParseError);
            }
            Ok(Decoded::Broadcast)
        }
        b if unsupported_payload_len(b).is_some() => {
            let len = unsupported_payload_len(b).unwrap();
            buf.read_bytes_ptr(len).ok_or(CodecError::ParseError)?;
            ctx.invalid_addresses = true;
            ctx.please_explain.push(ExplainRecord::unsupported());
            debug!("codec: received unsupported index-carrying opcode {b:#04x}");
            Err(CodecError::UnsupportedOpcode)
        }
        b if literal_len(b).is_some() => {
            let len = literal_len(b).unwrap();
            let bytes = buf.read_bytes_ptr(len).ok_or(CodecError::ParseError)?;
            let mut full = [0u8; 32];
            full[..len].copy_from_slice(bytes);
            let id = NodeId::new(full);
            match dir.find_or_insert(&id, len, true) {
                Lookup::Found(sid) => {
                    ctx.previous = Some(sid);
                    Ok(Decoded::Subscriber(sid))
                }
                Lookup::Ambiguous | Lookup::NotFound => {
                    ctx.invalid_addresses = true;
                    let candidates = collect_candidates(dir, &full[..len]);
                    for candidate in candidates {
                        add_explain_response(dir, ctx, candidate);
                    }
                    ctx.please_explain.push(ExplainRecord::query(&full[..len]));
                    debug!("codec: ambiguous/unresolved prefix of length {len}");
                    Err(CodecError::AmbiguousAbbreviation)
                }
            }
        }
        _ => Err(CodecError::ParseError),
    }
}

fn collect_candidates(dir: &Directory, prefix: &[u8]) -> Vec<SubscriberId> {
    let mut found = Vec::new();
    dir.enumerate(Some(prefix), Some(prefix), |sid, _| {
        found.push(sid);
        false
    });
    found
}

/// Appends a full-id record for `candidate` to `ctx.please_explain`. If
/// `candidate` is `my_subscriber`, also arms `send_full` so a subsequent
/// outbound frame carries the full id. Stops silently once the payload
/// has reached [`MAX_EXPLAIN_RECORDS`].
pub fn add_explain_response(dir: &mut Directory, ctx: &mut DecodeContext, candidate: SubscriberId) {
    if ctx.please_explain.len() >= MAX_EXPLAIN_RECORDS {
        return;
    }
    let sid = dir.get(candidate).sid;
    ctx.please_explain.push(ExplainRecord::full(&sid));
    if dir.get(candidate).reachable.contains(Reachable::SELF_) {
        dir.get_mut(candidate).send_full = true;
    }
}

/// Consumes a received please-explain payload: full-id records teach us
/// a new subscriber, the trailing query record (if any) is answered by
/// enumerating local matches and returning them as a fresh payload to
/// send back to the requester.
pub fn process_explain(dir: &mut Directory, records: &[ExplainRecord]) -> Vec<ExplainRecord> {
    let mut response = Vec::new();
    for record in records {
        match record.len {
            0 => continue, // unsupported-opcode marker: nothing to teach or answer
            32 => {
                dir.find_or_insert(&NodeId::new(record.bytes), 32, true);
            }
            len => {
                let prefix = &record.bytes[..len as usize];
                dir.enumerate(Some(prefix), Some(prefix), |_, sub| {
                    response.push(ExplainRecord::full(&sub.sid));
                    false
                });
            }
        }
    }
    response
}

/// Turns a please-explain payload gathered during decode into an
/// outbound frame and hands it to the packet queue: unicast with TTL 64
/// if `destination` is currently reachable by any mode, else broadcast
/// with TTL 1 under a freshly generated BPI.
pub fn send_please_explain(
    dir: &Directory,
    interfaces: &dyn InterfaceTable,
    queue: &mut dyn PacketQueue,
    destination: Option<SubscriberId>,
    records: &[ExplainRecord],
) -> bool {
    let reachable = reachability::resolve(dir, interfaces, destination);
    let mut payload = Vec::new();

    let (dest, ttl) = if !reachable.is_none() {
        (destination, 64)
    } else {
        let mut bpi: Bpi = [0u8; BPI_LEN];
        BroadcastCache::generate_address(&mut bpi);
        payload.extend_from_slice(&bpi);
        (None, 1)
    };

    for record in records {
        payload.push(record.len);
        payload.extend_from_slice(&record.bytes[..record.len as usize]);
    }

    queue.enqueue(QueuedFrame {
        frame_type: FrameType::PleaseExplain,
        class: QueueClass::MeshManagement,
        destination: dest,
        ttl,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FrameBuffer, Interface, InterfaceState, MemoryPacketQueue};
    use crate::subscriber::InterfaceId;

    struct FakeInterfaces(Vec<Interface>);

    impl InterfaceTable for FakeInterfaces {
        fn find_by_name(&self, name: &str) -> Option<InterfaceId> {
            self.0.iter().position(|i| i.name == name).map(|idx| InterfaceId(idx as u32))
        }

        fn interface(&self, id: InterfaceId) -> Option<&Interface> {
            self.0.get(id.0 as usize)
        }
    }

    fn id(first: u8, second: u8) -> NodeId {
        let mut bytes = [0u8; 32];
        bytes[0] = first;
        bytes[1] = second;
        NodeId::new(bytes)
    }

    #[test]
    fn encode_self_then_previous() {
        let mut dir = Directory::new(id(0x10, 0x00));
        let s = dir.my_subscriber();
        let t = dir.find_or_insert(&id(0x20, 0x00), 32, true).subscriber().unwrap();

        let mut ctx = EncodeContext {
            sender: Some(s),
            previous: None,
        };
        let mut buf = FrameBuffer::new(128);
        encode(&mut dir, &mut ctx, &mut buf, s);
        encode(&mut dir, &mut ctx, &mut buf, s);
        encode(&mut dir, &mut ctx, &mut buf, t);

        let bytes = buf.as_slice();
        assert_eq!(bytes[0], opcode::OA_SELF);
        assert_eq!(bytes[1], opcode::OA_PREVIOUS);
        assert!(bytes[2] >= 0x03);
    }

    #[test]
    fn round_trip_full_id_on_empty_context() {
        let mut dir = Directory::new(id(0x10, 0x00));
        let t = dir.find_or_insert(&id(0x20, 0x00), 32, true).subscriber().unwrap();
        dir.get_mut(t).send_full = true;

        let mut enc_ctx = EncodeContext::default();
        let mut buf = FrameBuffer::new(64);
        encode(&mut dir, &mut enc_ctx, &mut buf, t);
        assert_eq!(buf.as_slice()[0], 32);

        let mut dec_dir = Directory::new(id(0x30, 0x00));
        let mut dec_ctx = DecodeContext::default();
        let mut read_buf = FrameBuffer::from_bytes(buf.as_slice());
        let decoded = decode(&mut dec_dir, &mut dec_ctx, &mut read_buf).unwrap();
        match decoded {
            Decoded::Subscriber(sid) => {
                assert_eq!(dec_dir.get(sid).sid, id(0x20, 0x00));
            }
            _ => panic!("expected a resolved subscriber"),
        }
    }

    fn mkid(b0: u8, b1: u8, b2: u8, b3: u8) -> NodeId {
        let mut bytes = [0u8; 32];
        bytes[0] = b0;
        bytes[1] = b1;
        bytes[2] = b2;
        bytes[3] = b3;
        NodeId::new(bytes)
    }

    #[test]
    fn unsupported_index_opcode_is_parsed_off_the_wire() {
        let mut dir = Directory::new(id(0x99, 0x00));
        let mut ctx = DecodeContext::default();
        let mut buf = FrameBuffer::new(16);
        buf.append_byte(opcode::IDX1);
        buf.append_bytes(&[0x40]);
        let err = decode(&mut dir, &mut ctx, &mut buf).unwrap_err();
        assert_eq!(err, CodecError::UnsupportedOpcode);
        assert!(ctx.invalid_addresses);
    }

    #[test]
    fn please_explain_round_trip_for_ambiguous_prefix() {
        // x and y share every nibble up through index 6 and diverge only
        // in the last nibble of the fourth byte, so a 3-byte (6-nibble)
        // literal prefix still lands on an internal trie node rather
        // than a unique leaf.
        let mut dir = Directory::new(id(0x99, 0x00));
        let x = dir.find_or_insert(&mkid(0x40, 0x11, 0x22, 0x30), 32, true).subscriber().unwrap();
        let y = dir.find_or_insert(&mkid(0x40, 0x11, 0x22, 0x31), 32, true).subscriber().unwrap();

        let mut ctx = DecodeContext::default();
        let mut buf = FrameBuffer::new(16);
        buf.append_byte(opcode::PFX3);
        buf.append_bytes(&[0x40, 0x11, 0x22]);
        let err = decode(&mut dir, &mut ctx, &mut buf).unwrap_err();
        assert_eq!(err, CodecError::AmbiguousAbbreviation);
        assert!(ctx.invalid_addresses);

        let full_records: Vec<_> = ctx.please_explain.iter().filter(|r| r.len == 32).collect();
        assert_eq!(full_records.len(), 2);
        let ids: Vec<NodeId> = full_records.iter().map(|r| NodeId::new(r.bytes)).collect();
        assert!(ids.contains(&dir.get(x).sid));
        assert!(ids.contains(&dir.get(y).sid));
        assert_eq!(ctx.please_explain.last().unwrap().len, 3);

        let mut peer = Directory::new(id(0xAA, 0x00));
        let response = process_explain(&mut peer, &ctx.please_explain);
        assert!(response.is_empty());
        assert!(peer.find_or_insert(&dir.get(x).sid, 32, false).subscriber().is_some());
        assert!(peer.find_or_insert(&dir.get(y).sid, 32, false).subscriber().is_some());
    }

    #[test]
    fn send_please_explain_unicasts_when_destination_is_reachable() {
        use crate::reachability::set_reachable;
        use crate::collaborators::NullKeyring;

        let mut dir = Directory::new(id(0x10, 0x00));
        let dest = dir.find_or_insert(&id(0x20, 0x00), 32, true).subscriber().unwrap();
        let interfaces = FakeInterfaces(vec![Interface {
            name: "wifi0".into(),
            state: InterfaceState::Up,
        }]);
        dir.get_mut(dest).interface = Some(InterfaceId(0));
        set_reachable(&mut dir, &mut NullKeyring, None, dest, Reachable::UNICAST);

        let records = vec![ExplainRecord::full(&dir.get(dest).sid)];
        let mut queue = MemoryPacketQueue::default();
        assert!(send_please_explain(&dir, &interfaces, &mut queue, Some(dest), &records));

        assert_eq!(queue.frames.len(), 1);
        let frame = &queue.frames[0];
        assert_eq!(frame.ttl, 64);
        assert_eq!(frame.destination, Some(dest));
        assert_eq!(frame.payload[0], 32);
    }

    #[test]
    fn send_please_explain_broadcasts_with_fresh_bpi_when_unreachable() {
        let mut dir = Directory::new(id(0x10, 0x00));
        let dest = dir.find_or_insert(&id(0x20, 0x00), 32, true).subscriber().unwrap();
        let interfaces = FakeInterfaces(vec![]);

        let records = vec![ExplainRecord::query(&[0x20])];
        let mut queue = MemoryPacketQueue::default();
        assert!(send_please_explain(&dir, &interfaces, &mut queue, Some(dest), &records));

        assert_eq!(queue.frames.len(), 1);
        let frame = &queue.frames[0];
        assert_eq!(frame.ttl, 1);
        assert_eq!(frame.destination, None);
        // BPI (8 bytes) followed by the one record's length byte and its bytes.
        assert_eq!(frame.payload.len(), BPI_LEN + 1 + 1);
        assert_ne!(&frame.payload[..BPI_LEN], &[0u8; BPI_LEN][..]);
    }
}
