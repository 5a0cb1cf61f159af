//------------ Reachability Resolver ----------------------------------------------------------

use log::info;

use crate::collaborators::{HostConfig, Hosts, InterfaceState, InterfaceTable, Transport};
use crate::directory::Directory;
use crate::errors::ReachabilityError;
use crate::node_id::NodeId;
use crate::subscriber::{InterfaceId, Reachable, SubscriberId};

/// Recursion cap for `resolve`'s next-hop chase. The directory never
/// forms a real next-hop cycle, but an accidentally-misconfigured chain
/// should not be able to hang the event loop.
const MAX_HOP_CHASE: usize = 64;

/// Computes the effective reachability of `subscriber`, validating
/// rather than merely reading the stored value.
///
/// `subscriber` is `None` for the "null subscriber" case described in
/// the design (always resolves to `NONE`).
pub fn resolve(
    dir: &Directory,
    interfaces: &dyn InterfaceTable,
    subscriber: Option<SubscriberId>,
) -> Reachable {
    resolve_capped(dir, interfaces, subscriber, MAX_HOP_CHASE)
}

fn resolve_capped(
    dir: &Directory,
    interfaces: &dyn InterfaceTable,
    subscriber: Option<SubscriberId>,
    hops_left: usize,
) -> Reachable {
    let Some(id) = subscriber else {
        return Reachable::NONE;
    };
    let s = dir.get(id);
    if s.reachable.contains(Reachable::INDIRECT) {
        if hops_left == 0 {
            return Reachable::NONE;
        }
        let Some(next_hop) = s.next_hop else {
            return Reachable::NONE;
        };
        let next = dir.get(next_hop);
        if !next.reachable.contains(Reachable::DIRECT) {
            return Reachable::NONE;
        }
        let next_resolved = resolve_capped(dir, interfaces, Some(next_hop), hops_left - 1);
        if !next_resolved.contains(Reachable::DIRECT) || next_resolved.contains(Reachable::ASSUMED) {
            return Reachable::NONE;
        }
        return s.reachable;
    }
    if s.reachable.contains(Reachable::DIRECT) {
        let Some(iface_id) = s.interface else {
            return Reachable::NONE;
        };
        let Some(iface) = interfaces.interface(iface_id) else {
            return Reachable::NONE;
        };
        if iface.state != InterfaceState::Up {
            return Reachable::NONE;
        }
        return s.reachable;
    }
    s.reachable
}

/// Transitions `subscriber`'s stored reachability to `new`, logging the
/// change and firing the signing-key and directory-registration
/// side-effects described in the design when the state actually
/// changes.
pub fn set_reachable<K: crate::collaborators::Keyring>(
    dir: &mut Directory,
    keyring: &mut K,
    directory_service: Option<SubscriberId>,
    subscriber: SubscriberId,
    new: Reachable,
) {
    let prior = dir.get(subscriber).reachable;
    if prior == new {
        return;
    }
    info!(
        "reachability: {:?} {:?} -> {:?}",
        dir.get(subscriber).sid,
        prior,
        new
    );
    dir.get_mut(subscriber).reachable = new;
    if !new.is_none() && !dir.get(subscriber).sas_valid {
        keyring.request_signing_key(subscriber);
    }
    if directory_service == Some(subscriber) {
        dir.register_self();
    }
}

/// Records a direct unicast path to `subscriber` and transitions it to
/// `UNICAST`. Refuses if the subscriber is already reachable by any
/// mode, or already has a routing-layer presence: a `next_hop` assigned
/// by an indirect route, even one not yet promoted to `INDIRECT`
/// reachability. Stepping on either without tearing it down first would
/// silently orphan the existing route.
pub fn reachable_unicast<K: crate::collaborators::Keyring>(
    dir: &mut Directory,
    keyring: &mut K,
    directory_service: Option<SubscriberId>,
    subscriber: SubscriberId,
    interface: InterfaceId,
    addr: std::net::SocketAddrV4,
) -> Result<(), ReachabilityError> {
    let s = dir.get(subscriber);
    if !s.reachable.is_none() || s.next_hop.is_some() {
        return Err(ReachabilityError::AlreadyReachable);
    }
    {
        let s = dir.get_mut(subscriber);
        s.interface = Some(interface);
        s.address = Some(addr);
    }
    set_reachable(dir, keyring, directory_service, subscriber, Reachable::UNICAST);
    Ok(())
}

/// Consults the hosts configuration for `sid`; if a record exists,
/// builds the IPv4 address and asks the transport to send a probe on
/// the named interface. Only kicks the probe: the subscriber becomes
/// `UNICAST|ASSUMED` elsewhere, once the probe reply arrives.
pub fn load_subscriber_address<H: Hosts, I: InterfaceTable, T: Transport>(
    hosts: &H,
    interfaces: &I,
    transport: &mut T,
    subscriber: SubscriberId,
    sid: &NodeId,
) {
    let Some(HostConfig {
        interface_name,
        ipv4,
        port,
    }) = hosts.lookup(sid)
    else {
        return;
    };
    let Some(name) = interface_name else {
        return;
    };
    let Some(iface_id) = interfaces.find_by_name(&name) else {
        crate::collaborators::warn_unknown_interface(&name);
        return;
    };
    let addr = std::net::SocketAddrV4::new(ipv4, port);
    transport.send_probe(subscriber, addr, iface_id);
}
