//------------ External Collaborators ----------------------------------------------------------
//
// The core treats the link layer, key directory, packet queue, transport
// and hostfile loader as opaque collaborators reached only through the
// traits below. Concrete implementations here exist to make the core
// testable end-to-end; an embedding application is expected to supply
// its own.

use std::net::Ipv4Addr;

use log::{info, warn};

use crate::node_id::NodeId;
use crate::subscriber::{InterfaceId, SubscriberId};

//------------ Buffer ---------------------------------------------------------------

/// Minimal byte-buffer primitives the codec needs to read and write a
/// frame. A cursor-style trait rather than a concrete `Vec<u8>` so the
/// codec can be driven by whatever buffer type the surrounding packet
/// machinery already uses.
pub trait Buffer {
    fn append_byte(&mut self, b: u8);
    fn append_bytes(&mut self, bytes: &[u8]);
    fn read_byte(&mut self) -> Option<u8>;
    fn read_bytes_ptr(&mut self, len: usize) -> Option<&[u8]>;
    fn remaining(&self) -> usize;
    fn limit_size(&self) -> usize;
}

/// A `Vec<u8>`-backed [`Buffer`] used by tests and the CLI binary.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl FrameBuffer {
    pub fn new(limit: usize) -> Self {
        FrameBuffer {
            data: Vec::new(),
            pos: 0,
            limit,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        FrameBuffer {
            data: bytes.to_vec(),
            pos: 0,
            limit: bytes.len(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Buffer for FrameBuffer {
    fn append_byte(&mut self, b: u8) {
        self.data.push(b);
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_bytes_ptr(&mut self, len: usize) -> Option<&[u8]> {
        if self.pos + len > self.data.len() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn limit_size(&self) -> usize {
        self.limit
    }
}

//------------ InterfaceTable ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub state: InterfaceState,
}

pub trait InterfaceTable {
    fn find_by_name(&self, name: &str) -> Option<InterfaceId>;
    fn interface(&self, id: InterfaceId) -> Option<&Interface>;
}

//------------ Keyring ---------------------------------------------------------------

pub trait Keyring {
    fn request_signing_key(&mut self, subscriber: SubscriberId);
}

/// Logs the request and otherwise does nothing; an embedding
/// application supplies a real key exchange.
#[derive(Debug, Default)]
pub struct NullKeyring;

impl Keyring for NullKeyring {
    fn request_signing_key(&mut self, subscriber: SubscriberId) {
        info!("keyring: requested signing key for {subscriber:?}");
    }
}

//------------ PacketQueue ---------------------------------------------------------------

/// Queue classes a frame can be submitted on. Only the one class the
/// core emits to is named here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueClass {
    MeshManagement,
}

/// Frame types the core can submit to the packet queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    PleaseExplain,
}

#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub frame_type: FrameType,
    pub class: QueueClass,
    pub destination: Option<SubscriberId>,
    pub ttl: u8,
    pub payload: Vec<u8>,
}

pub trait PacketQueue {
    fn enqueue(&mut self, frame: QueuedFrame) -> bool;
}

/// An in-memory FIFO used by tests and the CLI binary.
#[derive(Debug, Default)]
pub struct MemoryPacketQueue {
    pub frames: Vec<QueuedFrame>,
}

impl PacketQueue for MemoryPacketQueue {
    fn enqueue(&mut self, frame: QueuedFrame) -> bool {
        info!(
            "packet queue: enqueued {:?} ttl={} on {:?}",
            frame.frame_type, frame.ttl, frame.class
        );
        self.frames.push(frame);
        true
    }
}

//------------ Transport ---------------------------------------------------------------

pub trait Transport {
    fn send_probe(&mut self, subscriber: SubscriberId, addr: std::net::SocketAddrV4, interface: InterfaceId);
}

#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_probe(&mut self, subscriber: SubscriberId, addr: std::net::SocketAddrV4, interface: InterfaceId) {
        info!("transport: probe sent to {subscriber:?} at {addr} via {interface:?}");
    }
}

//------------ Hosts ---------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub interface_name: Option<String>,
    pub ipv4: Ipv4Addr,
    pub port: u16,
}

pub trait Hosts {
    fn lookup(&self, sid: &NodeId) -> Option<HostConfig>;
}

/// Raised when [`crate::reachability::load_subscriber_address`] cannot
/// resolve the interface named by a host record.
pub fn warn_unknown_interface(name: &str) {
    warn!("hosts: host record references unknown interface '{name}'");
}
