//! Addressing and abbreviation core for a delay-tolerant mesh overlay:
//! a nibble-indexed directory of subscribers, a reachability resolver,
//! a shortest-safe-form address codec, and a broadcast duplicate
//! suppression cache.

pub mod broadcast_cache;
pub mod codec;
pub mod collaborators;
pub mod config;
pub mod directory;
pub mod errors;
pub mod node_id;
pub mod reachability;
pub mod subscriber;

pub use broadcast_cache::{Bpi, BroadcastCache, BroadcastCacheStats};
pub use codec::{decode, encode, process_explain, DecodeContext, Decoded, EncodeContext, ExplainRecord};
pub use directory::{Directory, DirectoryStats, Lookup};
pub use errors::{CodecError, ConfigError, ReachabilityError};
pub use node_id::NodeId;
pub use subscriber::{InterfaceId, Reachable, Subscriber, SubscriberId};
