//! Endpoint addresses (spec §3): a socket address plus the flag set that
//! explains how it was learned, kept in sets that OR-merge duplicates
//! rather than storing the same address twice under different flags.

use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointFlag {
    Configured,
    Discovered,
    Advertised,
    LinkLocal,
    Primary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFlags(u8);

impl EndpointFlags {
    const fn bit(flag: EndpointFlag) -> u8 {
        match flag {
            EndpointFlag::Configured => 0b00001,
            EndpointFlag::Discovered => 0b00010,
            EndpointFlag::Advertised => 0b00100,
            EndpointFlag::LinkLocal => 0b01000,
            EndpointFlag::Primary => 0b10000,
        }
    }

    pub fn new() -> EndpointFlags {
        EndpointFlags(0)
    }

    pub fn with(mut self, flag: EndpointFlag) -> EndpointFlags {
        self.0 |= Self::bit(flag);
        self
    }

    pub fn has(&self, flag: EndpointFlag) -> bool {
        self.0 & Self::bit(flag) != 0
    }

    fn merge(&mut self, other: &EndpointFlags) {
        self.0 |= other.0;
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub flags: EndpointFlags,
}

/// An ordered set of endpoints, keyed by address, that OR-merges the flag
/// set on a duplicate insert instead of rejecting or overwriting it.
#[derive(Debug, Default)]
pub struct EndpointSet {
    by_addr: HashMap<SocketAddr, EndpointFlags>,
    order: Vec<SocketAddr>,
}

impl EndpointSet {
    pub fn new() -> EndpointSet {
        EndpointSet::default()
    }

    pub fn insert(&mut self, addr: SocketAddr, flags: EndpointFlags) {
        match self.by_addr.get_mut(&addr) {
            Some(existing) => existing.merge(&flags),
            None => {
                self.by_addr.insert(addr, flags);
                self.order.push(addr);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.order.iter().map(move |addr| Endpoint {
            addr: *addr,
            flags: self.by_addr[addr].clone(),
        })
    }

    pub fn filter(&self, flag: EndpointFlag) -> impl Iterator<Item = Endpoint> + '_ {
        self.iter().filter(move |e| e.flags.has(flag))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_on_duplicate_insert() {
        let mut set = EndpointSet::new();
        let addr: SocketAddr = "127.0.0.1:3868".parse().unwrap();
        set.insert(addr, EndpointFlags::new().with(EndpointFlag::Configured));
        set.insert(addr, EndpointFlags::new().with(EndpointFlag::Primary));

        assert_eq!(set.len(), 1);
        let e = set.iter().next().unwrap();
        assert!(e.flags.has(EndpointFlag::Configured));
        assert!(e.flags.has(EndpointFlag::Primary));
    }

    #[test]
    fn test_filter_by_flag() {
        let mut set = EndpointSet::new();
        let a: SocketAddr = "127.0.0.1:3868".parse().unwrap();
        let b: SocketAddr = "127.0.0.2:3868".parse().unwrap();
        set.insert(a, EndpointFlags::new().with(EndpointFlag::Primary));
        set.insert(b, EndpointFlags::new().with(EndpointFlag::Discovered));

        let primary: Vec<_> = set.filter(EndpointFlag::Primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].addr, a);
    }
}
