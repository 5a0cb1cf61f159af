//------------ Error Types ----------------------------------------------------------

use std::fmt;

/// Errors returned while decoding an inbound address reference or a
/// please-explain payload.
///
/// `ParseError` is the only fatal variant: it aborts decoding of the
/// current frame. The others are reported to the caller so that a
/// please-explain reply can be formed, but decoding of the rest of the
/// frame continues.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ran out of bytes before the announced payload length,
    /// or the leading byte is not a recognised opcode or literal length.
    ParseError,
    /// A prefix matched no subscriber uniquely; a please-explain entry
    /// has been queued for it.
    AmbiguousAbbreviation,
    /// `OA_SELF` was decoded before `ctx.sender` was established.
    UnknownSender,
    /// `OA_PREVIOUS` was decoded before any address had been resolved in
    /// this frame.
    UnknownPrevious,
    /// An index-carrying opcode (0x01, 0x08-0x0E) was received. The
    /// per-peer index table subsystem is unimplemented (see the design
    /// notes); the opcode is parsed off the wire but not resolved.
    UnsupportedOpcode,
}

impl std::error::Error for CodecError {}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CodecError::ParseError => {
                write!(f, "Error: malformed address opcode or buffer underrun.")
            }
            CodecError::AmbiguousAbbreviation => {
                write!(f, "Error: abbreviation matches no subscriber uniquely.")
            }
            CodecError::UnknownSender => {
                write!(f, "Error: OA_SELF used before a sender was established.")
            }
            CodecError::UnknownPrevious => {
                write!(f, "Error: OA_PREVIOUS used before any address was resolved.")
            }
            CodecError::UnsupportedOpcode => {
                write!(f, "Error: index-carrying opcode is not supported by this build.")
            }
        }
    }
}

/// Errors returned by the reachability resolver.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReachabilityError {
    /// `reachable_unicast` was called on a subscriber that is already
    /// reachable by some mode, or already has a routing-layer presence.
    AlreadyReachable,
}

impl std::error::Error for ReachabilityError {}

impl fmt::Display for ReachabilityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReachabilityError::AlreadyReachable => {
                write!(f, "Warning: subscriber is already reachable.")
            }
        }
    }
}

/// Errors raised while loading or applying node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A hosts-table record names an interface that does not appear in
    /// the interface table.
    UnknownInterface(String),
    /// The configuration file could not be parsed.
    Malformed(String),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::UnknownInterface(name) => {
                write!(f, "Error: host record references unknown interface '{name}'.")
            }
            ConfigError::Malformed(reason) => {
                write!(f, "Error: configuration is malformed: {reason}")
            }
        }
    }
}
