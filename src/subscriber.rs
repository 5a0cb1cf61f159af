//------------ Subscriber ----------------------------------------------------------

use std::fmt;
use std::net::SocketAddrV4;
use std::ops::{BitOr, BitOrAssign};

use crate::node_id::NodeId;

/// Opaque arena index for a [`Subscriber`] held by a [`crate::directory::Directory`].
///
/// Subscribers are never freed, so a plain index is sound for the
/// lifetime of the process: see the design notes on cyclic next-hop
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u32);

/// Opaque index into an [`crate::collaborators::InterfaceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceId(pub u32);

/// Reachability bitset.
///
/// `UNICAST` and `BROADCAST` both imply `DIRECT`; `ASSUMED` may be OR'd
/// onto `UNICAST` or `BROADCAST` to mark a probed-but-unconfirmed link.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Reachable(u8);

impl Reachable {
    pub const NONE: Reachable = Reachable(0);
    pub const SELF_: Reachable = Reachable(1 << 0);
    pub const DIRECT: Reachable = Reachable(1 << 1);
    pub const INDIRECT: Reachable = Reachable(1 << 2);
    pub const UNICAST: Reachable = Reachable(1 << 3 | 1 << 1);
    pub const BROADCAST: Reachable = Reachable(1 << 4 | 1 << 1);
    pub const ASSUMED: Reachable = Reachable(1 << 5);

    pub fn contains(self, other: Reachable) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn remove(self, other: Reachable) -> Reachable {
        Reachable(self.0 & !other.0)
    }
}

impl BitOr for Reachable {
    type Output = Reachable;
    fn bitor(self, rhs: Reachable) -> Reachable {
        Reachable(self.0 | rhs.0)
    }
}

impl BitOrAssign for Reachable {
    fn bitor_assign(&mut self, rhs: Reachable) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Reachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "NONE");
        }
        let mut names = Vec::new();
        if self.contains(Reachable::SELF_) {
            names.push("SELF");
        }
        if self.contains(Reachable::UNICAST) {
            names.push("UNICAST");
        } else if self.contains(Reachable::BROADCAST) {
            names.push("BROADCAST");
        } else if self.contains(Reachable::DIRECT) {
            names.push("DIRECT");
        }
        if self.contains(Reachable::INDIRECT) {
            names.push("INDIRECT");
        }
        if self.contains(Reachable::ASSUMED) {
            names.push("ASSUMED");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// The per-node state held by a directory slot.
///
/// Owned uniquely by the directory arena; referenced elsewhere only by
/// [`SubscriberId`].
pub struct Subscriber {
    pub sid: NodeId,
    /// Minimum prefix length, in nibbles, that uniquely identifies this
    /// subscriber within the current directory population.
    pub abbreviate_len: u8,
    pub reachable: Reachable,
    /// Valid only when `reachable` includes `INDIRECT`.
    pub next_hop: Option<SubscriberId>,
    /// Valid when `reachable` includes `DIRECT`.
    pub interface: Option<InterfaceId>,
    /// Valid when `reachable` includes `UNICAST`.
    pub address: Option<SocketAddrV4>,
    /// One-shot: the next outbound encoding of this subscriber must
    /// carry the full 32-byte id.
    pub send_full: bool,
    /// Whether the signing-key lookup for this subscriber has completed.
    pub sas_valid: bool,
}

impl Subscriber {
    pub(crate) fn new(sid: NodeId, abbreviate_len: u8) -> Self {
        Subscriber {
            sid,
            abbreviate_len,
            reachable: Reachable::NONE,
            next_hop: None,
            interface: None,
            address: None,
            send_full: false,
            sas_valid: false,
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("sid", &self.sid)
            .field("abbreviate_len", &self.abbreviate_len)
            .field("reachable", &self.reachable)
            .finish()
    }
}
