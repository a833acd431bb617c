//! Routing-In / Routing-Out / Dispatch (spec §4.7, component J): the three
//! cooperating stages that move a message between ingress, forwarding, and
//! local delivery.

use std::collections::HashSet;
use std::sync::Arc;

use crate::avp::Avp;
use crate::diameter::{DiameterMessage, ResultCode};
use crate::error::{Error, Result};
use crate::peer::{diameter_id_eq, Peer, PeerTable};

/// What Routing-In decided to do with an inbound message.
pub enum RoutingDecision {
    /// Deliver locally via the dispatch chain.
    Local(DiameterMessage),
    /// Forward to the named next-hop candidate set (already loop-pruned).
    Forward(DiameterMessage),
    /// Re-enqueue at Routing-In's own ingress after a decorated-NAI rewrite.
    Reenqueue(DiameterMessage),
    /// Reply with this error answer instead of routing further.
    Reply(DiameterMessage),
    /// A duplicate retransmission, already answered once — drop silently.
    Drop,
}

/// Bounded, time-windowed duplicate-detection cache keyed on
/// (Origin-Host, End-to-End-Id), per spec §11 supplement 1.
pub struct DuplicateCache {
    seen: std::sync::Mutex<HashSet<(String, u32)>>,
    capacity: usize,
}

impl DuplicateCache {
    pub fn new(capacity: usize) -> DuplicateCache {
        DuplicateCache {
            seen: std::sync::Mutex::new(HashSet::new()),
            capacity,
        }
    }

    /// Returns `true` if this (origin-host, e2e-id) pair was already seen.
    /// Not a perfect LRU — once at capacity, the cache is cleared, which
    /// only affects the true duplicate window, never correctness of
    /// individual answers.
    fn check_and_insert(&self, origin_host: &str, e2e_id: u32) -> bool {
        let mut seen = self.seen.lock().unwrap();
        let key = (origin_host.to_ascii_lowercase(), e2e_id);
        if seen.contains(&key) {
            return true;
        }
        if seen.len() >= self.capacity {
            seen.clear();
        }
        seen.insert(key);
        false
    }
}

pub struct RoutingIn {
    local_id: String,
    is_relay: bool,
    allow_forwarding: bool,
    dup_cache: DuplicateCache,
}

impl RoutingIn {
    pub fn new(local_id: &str, is_relay: bool, allow_forwarding: bool) -> RoutingIn {
        RoutingIn {
            local_id: local_id.to_string(),
            is_relay,
            allow_forwarding,
            dup_cache: DuplicateCache::new(4096),
        }
    }

    /// Classifies one inbound message per spec §4.7 steps 1-8.
    pub fn classify(&self, msg: DiameterMessage) -> RoutingDecision {
        if msg.header.flags.request && msg.header.flags.error {
            return RoutingDecision::Drop;
        }

        if !msg.is_request() {
            // Answers are matched against the sent-request table by the
            // caller (peer.rs / node.rs), not here.
            return RoutingDecision::Local(msg);
        }

        if let Some(origin_host) = msg.get_avp(264).and_then(|a| a.as_identity()).map(String::from) {
            if self.dup_cache.check_and_insert(&origin_host, msg.header.end_to_end_id) {
                log::debug!("dropping duplicate retransmission from {}", origin_host);
                return RoutingDecision::Drop;
            }
        }

        if msg.header.application_id == 0 && !self.is_relay {
            return RoutingDecision::Reply(
                msg.new_error_answer(ResultCode::DIAMETER_APPLICATION_UNSUPPORTED),
            );
        }

        let destination_host = msg.get_avp(293).and_then(|a| a.as_identity());
        let user_name = msg.get_avp(1).and_then(|a| a.as_utf8string());

        if let Some(dest) = destination_host {
            if diameter_id_eq(dest, &self.local_id) {
                return RoutingDecision::Local(msg);
            }
            if !self.allow_forwarding {
                return RoutingDecision::Reply(msg.new_error_answer(ResultCode::DIAMETER_UNABLE_TO_DELIVER));
            }
            return RoutingDecision::Forward(msg);
        }

        if let Some(name) = user_name {
            if let Some((realm, rest)) = decorated_nai_rewrite(name) {
                let rest = rest.to_string();
                let mut rewritten = msg;
                replace_avp(&mut rewritten, 1, Avp::new_utf8string(1, None, true, &rest));
                replace_avp(&mut rewritten, 283, Avp::new_identity(283, None, true, &realm));
                return RoutingDecision::Reenqueue(rewritten);
            }
        }

        RoutingDecision::Local(msg)
    }
}

fn replace_avp(msg: &mut DiameterMessage, code: u32, avp: Avp) {
    let mut removed_len = 0u32;
    msg.avps.retain(|a| {
        if a.code() == code {
            removed_len += a.wire_length();
            false
        } else {
            true
        }
    });
    msg.header.length -= removed_len;
    msg.add_avp(avp);
}

/// RFC 5729 decorated NAI: `realm!user@realm`. Returns `(realm, rest)`
/// where `rest` is the User-Name with the decoration stripped.
fn decorated_nai_rewrite(user_name: &str) -> Option<(String, &str)> {
    let bang = user_name.find('!')?;
    let (realm, rest) = user_name.split_at(bang);
    let rest = &rest[1..];
    if realm.is_empty() || rest.is_empty() {
        return None;
    }
    Some((realm.to_string(), rest))
}

/// One scored candidate for Routing-Out (spec §4.7).
struct Candidate {
    peer: Arc<Peer>,
    score: i64,
}

pub struct RoutingOut {
    no_delivery_penalty: i64,
    final_dest_score: i64,
    realm_score: i64,
}

impl Default for RoutingOut {
    fn default() -> RoutingOut {
        RoutingOut {
            no_delivery_penalty: -1000,
            final_dest_score: 1000,
            realm_score: 100,
        }
    }
}

impl RoutingOut {
    /// Builds the candidate set, scores it, and attempts delivery in
    /// descending-score order until one send succeeds.
    pub async fn route(&self, peers: &PeerTable, msg: &DiameterMessage) -> Result<()> {
        let route_record: HashSet<String> = msg
            .avps
            .iter()
            .filter(|a| a.code() == 282)
            .filter_map(|a| a.as_identity())
            .map(|s| s.to_ascii_lowercase())
            .collect();

        let mut candidates: Vec<Candidate> = peers
            .open_peers()
            .into_iter()
            .filter(|p| {
                !route_record.contains(&p.id.to_ascii_lowercase())
                    && !route_record.contains(&p.realm.to_ascii_lowercase())
            })
            .map(|peer| {
                let mut score = 0;
                if !peer.advertises(0xffffffff) && !peer.advertises(msg.header.application_id) {
                    score += self.no_delivery_penalty;
                }
                if let Some(dest_host) = msg.get_avp(293).and_then(|a| a.as_identity()) {
                    if diameter_id_eq(&peer.id, dest_host) {
                        score += self.final_dest_score;
                    }
                } else if let Some(dest_realm) = msg.get_avp(283).and_then(|a| a.as_identity()) {
                    if diameter_id_eq(&peer.realm, dest_realm) {
                        score += self.realm_score;
                    }
                }
                Candidate { peer, score }
            })
            .filter(|c| c.score >= 0)
            .collect();

        candidates.sort_by(|a, b| b.score.cmp(&a.score));

        for candidate in candidates {
            match candidate.peer.send_request(msg.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("delivery to {} failed: {}", candidate.peer.id, e);
                    continue;
                }
            }
        }

        Err(Error::NoRoute("no viable candidate peer".into()))
    }
}

/// Local-delivery handler chain (spec §4.7 "Dispatch"). Handlers are
/// indexed by Command code; if none consumes a request, the router answers
/// DIAMETER_COMMAND_UNSUPPORTED.
pub type DispatchHandler = Arc<dyn Fn(&DiameterMessage) -> Option<DiameterMessage> + Send + Sync>;

#[derive(Default)]
pub struct Dispatch {
    handlers: std::sync::RwLock<std::collections::HashMap<u32, Vec<DispatchHandler>>>,
}

impl Dispatch {
    pub fn new() -> Dispatch {
        Dispatch::default()
    }

    pub fn register(&self, command_code: u32, handler: DispatchHandler) {
        self.handlers
            .write()
            .unwrap()
            .entry(command_code)
            .or_default()
            .push(handler);
    }

    pub fn dispatch(&self, msg: &DiameterMessage) -> DiameterMessage {
        let handlers = self.handlers.read().unwrap();
        if let Some(chain) = handlers.get(&msg.header.code) {
            for handler in chain {
                if let Some(answer) = handler(msg) {
                    return answer;
                }
            }
        }
        msg.new_error_answer(ResultCode::DIAMETER_COMMAND_UNSUPPORTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diameter::CommandFlags;

    #[test]
    fn test_decorated_nai_rewrite() {
        let (realm, rest) = decorated_nai_rewrite("realm2.net!alice@realm1.net").unwrap();
        assert_eq!(realm, "realm2.net");
        assert_eq!(rest, "alice@realm1.net");
    }

    #[test]
    fn test_local_delivery_when_destination_host_matches() {
        let routing_in = RoutingIn::new("host.local.net", false, true);
        let mut msg = DiameterMessage::new(272, 4, CommandFlags::request(), 1, 1);
        msg.add_avp(Avp::new_identity(264, None, true, "peer.remote.net"));
        msg.add_avp(Avp::new_identity(293, None, true, "host.local.net"));
        match routing_in.classify(msg) {
            RoutingDecision::Local(_) => {}
            _ => panic!("expected Local"),
        }
    }

    #[test]
    fn test_forward_when_destination_host_is_remote() {
        let routing_in = RoutingIn::new("host.local.net", false, true);
        let mut msg = DiameterMessage::new(272, 4, CommandFlags::request(), 1, 2);
        msg.add_avp(Avp::new_identity(264, None, true, "peer.remote.net"));
        msg.add_avp(Avp::new_identity(293, None, true, "other.remote.net"));
        match routing_in.classify(msg) {
            RoutingDecision::Forward(_) => {}
            _ => panic!("expected Forward"),
        }
    }

    #[test]
    fn test_application_zero_rejected_by_non_relay() {
        let routing_in = RoutingIn::new("host.local.net", false, true);
        let mut msg = DiameterMessage::new(257, 0, CommandFlags::request(), 1, 3);
        msg.add_avp(Avp::new_identity(264, None, true, "peer.remote.net"));
        match routing_in.classify(msg) {
            RoutingDecision::Reply(answer) => {
                assert!(answer.is_error());
            }
            _ => panic!("expected Reply"),
        }
    }

    #[test]
    fn test_dispatch_unsupported_command() {
        let dispatch = Dispatch::new();
        let msg = DiameterMessage::new(999, 0, CommandFlags::request(), 1, 1);
        let answer = dispatch.dispatch(&msg);
        assert!(answer.is_error());
    }
}
