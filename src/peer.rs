//! Peer object, peer table, and the peer state machine (PSM) — spec §3/§4.6,
//! component G and H. The state machine itself (`Psm::handle_event`) is a
//! pure function from `(state, event)` to `(state, Vec<PsmAction>)` so it
//! can be exercised in tests without a real socket; the actions it returns
//! (send a message, close, schedule a reconnect) are carried out by the
//! async driver in `node.rs`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::diameter::{CommandFlags, DiameterMessage, DisconnectCause, ResultCode};
use crate::error::{Error, Result};
use crate::transport::Connection;

pub type DiameterId = String;

/// Diameter identifiers are case-insensitive for comparison but preserved
/// verbatim on the wire (spec §3).
pub fn diameter_id_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Election comparator: negative (Less) means `local` wins (spec §4.6).
pub fn diameter_id_cmp(remote: &str, local: &str) -> Ordering {
    remote.to_ascii_lowercase().cmp(&local.to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    Closed,
    WaitConnAck,
    WaitConnAckElect,
    WaitCEA,
    Open,
    OpenHandshake,
    Suspect,
    Reopen,
    Closing,
    Zombie,
}

/// Events the PSM reacts to (spec §4.6's event list).
#[derive(Debug)]
pub enum PsmEvent {
    Start,
    ConnCltRcvError,
    ConnCltCnxOk,
    RcvConnAck,
    RcvCer(DiameterMessage),
    RcvCea(DiameterMessage),
    Timeout,
    RcvDwr(DiameterMessage),
    RcvDwa(DiameterMessage),
    RcvDpr(DiameterMessage),
    RcvDpa,
    RcvMessage(DiameterMessage),
    StopRequested,
    WatchdogTick,
    PeerError,
}

/// Side effects the driver must carry out after a transition.
#[derive(Debug)]
pub enum PsmAction {
    Connect,
    SendCer,
    SendCea,
    SendDwr,
    SendDwa,
    SendDpa,
    SendDpr(DisconnectCause),
    RejectElectionLoser,
    CloseConnection,
    ScheduleReconnect(Duration),
    Deliver(DiameterMessage),
    RaiseRestartDetected,
    Log(String),
}

/// Reopen requires three clean watchdog round-trips before returning to
/// Open (spec §4.6 "Reopen substate").
const REOPEN_WATCHDOG_THRESHOLD: u32 = 3;

pub struct Psm {
    pub state: PeerState,
    local_id: DiameterId,
    remote_id: Option<DiameterId>,
    reopen_successes: u32,
    watchdog_pending: bool,
    last_origin_state_id: Option<u32>,
}

impl Psm {
    pub fn new(local_id: &str) -> Psm {
        Psm {
            state: PeerState::Closed,
            local_id: local_id.to_string(),
            remote_id: None,
            reopen_successes: 0,
            watchdog_pending: false,
            last_origin_state_id: None,
        }
    }

    fn check_restart(&mut self, origin_state_id: Option<u32>) -> Option<PsmAction> {
        match (self.last_origin_state_id, origin_state_id) {
            (Some(prev), Some(cur)) if cur > prev && self.state == PeerState::Open => {
                self.last_origin_state_id = Some(cur);
                Some(PsmAction::RaiseRestartDetected)
            }
            (_, Some(cur)) => {
                self.last_origin_state_id = Some(cur);
                None
            }
            _ => None,
        }
    }

    /// Transitions `self.state` per spec §4.6's table and returns the
    /// actions the driver must perform. `Tc` is the reconnect base
    /// interval used for the DPR cause → backoff mapping.
    pub fn handle_event(&mut self, event: PsmEvent, tc: Duration) -> Vec<PsmAction> {
        use PeerState::*;
        let mut actions = Vec::new();

        match (self.state, event) {
            (Closed, PsmEvent::Start) => {
                actions.push(PsmAction::Connect);
                self.state = WaitConnAck;
            }
            (WaitConnAck, PsmEvent::ConnCltCnxOk) => {
                actions.push(PsmAction::SendCer);
                self.state = WaitCEA;
            }
            (WaitConnAck, PsmEvent::ConnCltRcvError) => {
                actions.push(PsmAction::ScheduleReconnect(tc));
                self.state = Closed;
            }
            (WaitConnAck, PsmEvent::RcvCer(cer)) => {
                self.remote_id = cer.get_avp(264).and_then(|a| a.as_identity()).map(String::from);
                self.state = WaitConnAckElect;
            }
            (WaitConnAckElect, PsmEvent::ConnCltCnxOk) => {
                let remote = self.remote_id.clone().unwrap_or_default();
                if diameter_id_cmp(&remote, &self.local_id) == Ordering::Less {
                    // Remote wins: we drop our own outbound attempt and
                    // accept its incoming connection instead.
                    actions.push(PsmAction::CloseConnection);
                    actions.push(PsmAction::SendCea);
                    self.state = Open;
                } else {
                    actions.push(PsmAction::RejectElectionLoser);
                    actions.push(PsmAction::SendCer);
                    self.state = WaitCEA;
                }
            }
            (WaitCEA, PsmEvent::RcvCea(cea)) => {
                let rc = cea
                    .get_avp(268)
                    .and_then(|a| a.as_unsigned32())
                    .map(ResultCode);
                match rc {
                    Some(rc) if rc.is_success() => {
                        self.remote_id = cea.get_avp(264).and_then(|a| a.as_identity()).map(String::from);
                        if let Some(action) = self.check_restart(
                            cea.get_avp(278).and_then(|a| a.as_unsigned32()),
                        ) {
                            actions.push(action);
                        }
                        self.state = Open;
                    }
                    Some(ResultCode::DIAMETER_TOO_BUSY) => {
                        actions.push(PsmAction::CloseConnection);
                        actions.push(PsmAction::ScheduleReconnect(tc * 10));
                        self.state = Closed;
                    }
                    Some(ResultCode::DIAMETER_ELECTION_LOST) => {
                        // stay in WaitCEA, waiting for the other side's CEA
                    }
                    _ => {
                        actions.push(PsmAction::CloseConnection);
                        actions.push(PsmAction::ScheduleReconnect(tc));
                        self.state = Closed;
                    }
                }
            }
            (WaitCEA, PsmEvent::Timeout) => {
                actions.push(PsmAction::CloseConnection);
                actions.push(PsmAction::ScheduleReconnect(tc));
                self.state = Closed;
            }
            (Open, PsmEvent::WatchdogTick) if !self.watchdog_pending => {
                actions.push(PsmAction::SendDwr);
                self.watchdog_pending = true;
            }
            (Open, PsmEvent::RcvDwa(dwa)) => {
                self.watchdog_pending = false;
                if let Some(action) = self.check_restart(dwa.get_avp(278).and_then(|a| a.as_unsigned32())) {
                    actions.push(action);
                }
            }
            (Open, PsmEvent::Timeout) if self.watchdog_pending => {
                actions.push(PsmAction::CloseConnection);
                self.watchdog_pending = false;
                self.reopen_successes = 0;
                self.state = Suspect;
            }
            (Suspect, PsmEvent::ConnCltRcvError) | (Suspect, PsmEvent::PeerError) => {
                actions.push(PsmAction::ScheduleReconnect(tc));
                self.state = Reopen;
            }
            (Reopen, PsmEvent::RcvDwa(_)) => {
                self.reopen_successes += 1;
                if self.reopen_successes >= REOPEN_WATCHDOG_THRESHOLD {
                    self.state = Open;
                }
            }
            (Open, PsmEvent::RcvDpr(dpr)) => {
                let cause = dpr
                    .get_avp(273)
                    .and_then(|a| a.as_enumerated())
                    .and_then(DisconnectCause::from_i32)
                    .unwrap_or(DisconnectCause::Rebooting);
                actions.push(PsmAction::SendDpa);
                let backoff = match cause {
                    DisconnectCause::Rebooting => tc,
                    DisconnectCause::Busy => tc * 10,
                    DisconnectCause::DoNotWantToTalkToYou => tc * 200,
                };
                actions.push(PsmAction::ScheduleReconnect(backoff));
                self.state = Closed;
            }
            (Open, PsmEvent::RcvMessage(msg)) => {
                actions.push(PsmAction::Deliver(msg));
            }
            (Open, PsmEvent::RcvDwr(_)) => {
                actions.push(PsmAction::SendDwa);
            }
            (Open, PsmEvent::StopRequested) => {
                actions.push(PsmAction::SendDpr(DisconnectCause::Rebooting));
                self.state = Closing;
            }
            (Closing, PsmEvent::RcvDpa) | (Closing, PsmEvent::Timeout) => {
                actions.push(PsmAction::CloseConnection);
                self.state = Closed;
            }
            (state, event) => {
                actions.push(PsmAction::Log(format!(
                    "ignored event {:?} in state {:?}",
                    event, state
                )));
            }
        }

        actions
    }
}

/// An outstanding request, indexed by hop-by-hop id, kept strictly
/// increasing per peer (spec §3 Peer invariant iii).
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub code: u32,
    pub application_id: u32,
    pub sent_at: Instant,
}

#[derive(Default)]
pub struct SentRequestTable {
    entries: Mutex<BTreeMap<u32, SentRequest>>,
}

impl SentRequestTable {
    pub fn insert(&self, hop_by_hop_id: u32, code: u32, application_id: u32) {
        self.entries.lock().unwrap().insert(
            hop_by_hop_id,
            SentRequest {
                code,
                application_id,
                sent_at: Instant::now(),
            },
        );
    }

    /// Matches and removes an answer's originating request. A second call
    /// with the same id returns `None` (spec §8 testable property).
    pub fn take(&self, hop_by_hop_id: u32) -> Option<SentRequest> {
        self.entries.lock().unwrap().remove(&hop_by_hop_id)
    }
}

#[derive(Default)]
pub struct PeerCounters {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
}

pub struct Peer {
    pub id: DiameterId,
    pub realm: String,
    state: Mutex<PeerState>,
    connection: Mutex<Option<Arc<Connection>>>,
    hop_by_hop_counter: AtomicU32,
    pub sent_requests: SentRequestTable,
    pub counters: PeerCounters,
    pub applications: Mutex<Vec<u32>>,
    watchdog_pending: AtomicBool,
}

impl Peer {
    pub fn new(id: &str, realm: &str) -> Arc<Peer> {
        Arc::new(Peer {
            id: id.to_string(),
            realm: realm.to_string(),
            state: Mutex::new(PeerState::Closed),
            connection: Mutex::new(None),
            hop_by_hop_counter: AtomicU32::new(1),
            sent_requests: SentRequestTable::default(),
            counters: PeerCounters::default(),
            applications: Mutex::new(Vec::new()),
            watchdog_pending: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_open(&self) -> bool {
        self.state() == PeerState::Open
    }

    pub fn attach_connection(&self, cnx: Arc<Connection>) {
        *self.connection.lock().unwrap() = Some(cnx);
    }

    pub fn detach_connection(&self) {
        *self.connection.lock().unwrap() = None;
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().unwrap().clone()
    }

    pub fn next_hop_by_hop_id(&self) -> u32 {
        self.hop_by_hop_counter.fetch_add(1, AtomicOrdering::SeqCst)
    }

    pub fn advertises(&self, application_id: u32) -> bool {
        self.applications.lock().unwrap().contains(&application_id)
    }

    /// Sends a request and records it in the sent-request table before the
    /// bytes leave the socket is not literally true here (the table insert
    /// happens first, satisfying spec §5's ordering guarantee (ii): an
    /// answer arriving on another task will always find the entry).
    pub async fn send_request(&self, mut msg: DiameterMessage) -> Result<()> {
        let hbh = self.next_hop_by_hop_id();
        msg.header.hop_by_hop_id = hbh;
        self.sent_requests.insert(hbh, msg.header.code, msg.header.application_id);

        let cnx = self
            .connection()
            .ok_or_else(|| Error::NoRoute(format!("peer {} has no active connection", self.id)))?;
        cnx.send(&msg).await?;
        self.counters.messages_sent.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    pub async fn send(&self, msg: &DiameterMessage) -> Result<()> {
        let cnx = self
            .connection()
            .ok_or_else(|| Error::NoRoute(format!("peer {} has no active connection", self.id)))?;
        cnx.send(msg).await?;
        self.counters.messages_sent.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }
}

/// The global peer table (spec §3 invariant iv): peers are listed once,
/// keyed by DiameterId case-insensitively (the map key is lower-cased, the
/// `Peer::id` field keeps the original casing for the wire).
#[derive(Default)]
pub struct PeerTable {
    peers: RwLock<HashMap<String, Arc<Peer>>>,
}

impl PeerTable {
    pub fn new() -> PeerTable {
        PeerTable::default()
    }

    pub fn insert(&self, peer: Arc<Peer>) {
        self.peers.write().unwrap().insert(peer.id.to_ascii_lowercase(), peer);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.read().unwrap().get(&id.to_ascii_lowercase()).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.write().unwrap().remove(&id.to_ascii_lowercase())
    }

    /// Snapshot of peers currently in `Open`, used by routing-out to build
    /// its candidate set (spec §4.7).
    pub fn open_peers(&self) -> Vec<Arc<Peer>> {
        self.peers
            .read()
            .unwrap()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds a bare CER/CEA/DWR/DWA/DPR/DPA skeleton carrying only the
/// identity AVPs every capability/watchdog/disconnect exchange needs;
/// callers add application-specific AVPs (e.g. Vendor-Specific-Application-Id)
/// on top.
pub fn new_base_request(code: u32, local_id: &str, local_realm: &str, hop_by_hop_id: u32, end_to_end_id: u32) -> DiameterMessage {
    let mut msg = DiameterMessage::new(code, 0, CommandFlags::request(), hop_by_hop_id, end_to_end_id);
    msg.add_avp(crate::avp::Avp::new_identity(264, None, true, local_id));
    msg.add_avp(crate::avp::Avp::new_identity(296, None, true, local_realm));
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_law() {
        assert_eq!(diameter_id_cmp("a.example.com", "b.example.com"), Ordering::Less);
        assert_eq!(diameter_id_cmp("A.EXAMPLE.COM", "a.example.com"), Ordering::Equal);
    }

    #[test]
    fn test_psm_happy_path_initiator() {
        let mut psm = Psm::new("local.example.com");
        let tc = Duration::from_secs(30);

        let actions = psm.handle_event(PsmEvent::Start, tc);
        assert!(matches!(actions[0], PsmAction::Connect));
        assert_eq!(psm.state, PeerState::WaitConnAck);

        let actions = psm.handle_event(PsmEvent::ConnCltCnxOk, tc);
        assert!(matches!(actions[0], PsmAction::SendCer));
        assert_eq!(psm.state, PeerState::WaitCEA);

        let mut cea = DiameterMessage::new(257, 0, CommandFlags::request(), 1, 1);
        cea.add_avp(crate::avp::Avp::new_unsigned32(268, None, true, 2001));
        cea.add_avp(crate::avp::Avp::new_identity(264, None, true, "remote.example.com"));
        psm.handle_event(PsmEvent::RcvCea(cea), tc);
        assert_eq!(psm.state, PeerState::Open);
    }

    #[test]
    fn test_dpr_busy_uses_ten_times_backoff() {
        let mut psm = Psm::new("local.example.com");
        psm.state = PeerState::Open;
        let tc = Duration::from_secs(30);

        let mut dpr = DiameterMessage::new(282, 0, CommandFlags::request(), 1, 1);
        dpr.add_avp(crate::avp::Avp::new_enumerated(273, None, true, 1));
        let actions = psm.handle_event(PsmEvent::RcvDpr(dpr), tc);

        let backoff = actions.iter().find_map(|a| match a {
            PsmAction::ScheduleReconnect(d) => Some(*d),
            _ => None,
        });
        assert_eq!(backoff, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_reopen_requires_three_watchdogs() {
        let mut psm = Psm::new("local.example.com");
        psm.state = PeerState::Reopen;
        let tc = Duration::from_secs(30);

        for _ in 0..2 {
            psm.handle_event(PsmEvent::RcvDwa(DiameterMessage::new(280, 0, CommandFlags::request(), 1, 1)), tc);
            assert_eq!(psm.state, PeerState::Reopen);
        }
        psm.handle_event(PsmEvent::RcvDwa(DiameterMessage::new(280, 0, CommandFlags::request(), 1, 1)), tc);
        assert_eq!(psm.state, PeerState::Open);
    }

    #[test]
    fn test_sent_request_table_matches_once() {
        let table = SentRequestTable::default();
        table.insert(42, 272, 4);
        assert!(table.take(42).is_some());
        assert!(table.take(42).is_none());
    }

    #[test]
    fn test_peer_table_keyed_case_insensitively() {
        let table = PeerTable::new();
        table.insert(Peer::new("Host.Example.Com", "example.com"));
        assert!(table.get("host.example.com").is_some());
    }
}
