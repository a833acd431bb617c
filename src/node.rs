//! Node facade: wires `Config`, `Dictionary`, `PeerTable`, `SessionStore`,
//! `Dispatch`/routing, the acceptor, and the event bus together into the
//! single entry point an embedding application starts.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::diameter::{DiameterMessage, DisconnectCause, ResultCode};
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::peer::{new_base_request, Peer, PeerState, PeerTable, Psm, PsmAction, PsmEvent};
use crate::routing::{Dispatch, RoutingDecision, RoutingIn, RoutingOut};
use crate::session::SessionStore;
use crate::transport::{AcceptorConfig, Connection};

pub struct Node {
    pub config: Config,
    pub dictionary: Arc<Dictionary>,
    pub peers: Arc<PeerTable>,
    pub sessions: Arc<SessionStore>,
    pub dispatch: Arc<Dispatch>,
    pub events: EventBus,
    routing_in: Arc<RoutingIn>,
    routing_out: Arc<RoutingOut>,
}

impl Node {
    pub fn new(config: Config, dictionary: Arc<Dictionary>) -> Node {
        let routing_in = Arc::new(RoutingIn::new(&config.diameter_id, false, !config.flags.no_fwd));
        let sessions = SessionStore::new(&config.diameter_id);
        Node {
            config,
            dictionary,
            peers: Arc::new(PeerTable::new()),
            sessions,
            dispatch: Arc::new(Dispatch::new()),
            events: EventBus::default(),
            routing_in,
            routing_out: Arc::new(RoutingOut::default()),
        }
    }

    /// Starts the acceptor on `config.port` and the session expiry loop.
    /// Each accepted peer that presents a CER is run through the incoming
    /// CER validation policy (spec §11 supplement 3) and, if accepted,
    /// gets its own PSM driver task.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(sessions.run_expiry_loop());

        let addr = format!("0.0.0.0:{}", self.config.port);
        let mut acceptor =
            crate::transport::Acceptor::bind(&addr, AcceptorConfig::default(), Arc::clone(&self.dictionary)).await?;

        let node = Arc::clone(&self);
        acceptor
            .listen(move |cer, cnx, rx| {
                let node = Arc::clone(&node);
                async move {
                    node.accept_peer(cer, cnx, rx).await;
                }
            })
            .await
    }

    /// Default incoming-CER accept policy: only Origin-Hosts already
    /// present in the configured peer table (spec §11.3).
    fn accept_policy(&self, origin_host: &str) -> bool {
        self.peers.get(origin_host).is_some()
    }

    async fn accept_peer(
        self: Arc<Self>,
        cer: DiameterMessage,
        cnx: Arc<Connection>,
        rx: tokio::sync::mpsc::Receiver<DiameterMessage>,
    ) {
        let origin_host = match cer.get_avp(264).and_then(|a| a.as_identity()) {
            Some(h) => h.to_string(),
            None => {
                log::warn!("[{}] CER missing Origin-Host, dropping", cnx.peer_addr);
                return;
            }
        };

        if !self.accept_policy(&origin_host) {
            log::warn!("[{}] rejecting CER from unconfigured peer {}", cnx.peer_addr, origin_host);
            return;
        }

        let realm = cer
            .get_avp(296)
            .and_then(|a| a.as_identity())
            .map(String::from)
            .unwrap_or_else(|| self.config.realm());

        let peer = self.peers.get(&origin_host).unwrap_or_else(|| Peer::new(&origin_host, &realm));
        peer.attach_connection(Arc::clone(&cnx));
        self.peers.insert(Arc::clone(&peer));

        let cea = self.build_cea(&cer);
        if let Err(e) = cnx.send(&cea).await {
            log::warn!("[{}] failed to send CEA: {}", cnx.peer_addr, e);
            return;
        }

        peer.set_state(PeerState::Open);
        self.events.publish(Event::PeerUp(origin_host.clone()));

        self.drive_open_peer(peer, rx).await;
    }

    fn build_cea(&self, cer: &DiameterMessage) -> DiameterMessage {
        let mut cea = cer.new_answer();
        cea.add_avp(crate::avp::Avp::new_unsigned32(268, None, true, ResultCode::DIAMETER_SUCCESS.0));
        cea.add_avp(crate::avp::Avp::new_identity(264, None, true, &self.config.diameter_id));
        cea.add_avp(crate::avp::Avp::new_identity(296, None, true, &self.config.realm()));
        cea
    }

    /// Runs the post-handshake loop for an `Open` peer: every inbound
    /// message is classified by Routing-In and either delivered locally
    /// (spec §4.7 Dispatch) or handed to Routing-Out.
    async fn drive_open_peer(self: Arc<Self>, peer: Arc<Peer>, mut rx: tokio::sync::mpsc::Receiver<DiameterMessage>) {
        while let Some(msg) = rx.recv().await {
            peer.counters.messages_received.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            match msg.header.code {
                280 if msg.is_request() => {
                    let mut dwa = msg.new_answer();
                    dwa.add_avp(crate::avp::Avp::new_unsigned32(268, None, true, ResultCode::DIAMETER_SUCCESS.0));
                    let _ = peer.send(&dwa).await;
                    continue;
                }
                280 => continue, // DWA to our own DWR; watchdog bookkeeping lives in the PSM driver.
                282 if msg.is_request() => {
                    let cause = msg
                        .get_avp(273)
                        .and_then(|a| a.as_enumerated())
                        .and_then(DisconnectCause::from_i32)
                        .unwrap_or(DisconnectCause::Rebooting);
                    let mut dpa = msg.new_answer();
                    dpa.add_avp(crate::avp::Avp::new_unsigned32(268, None, true, ResultCode::DIAMETER_SUCCESS.0));
                    let _ = peer.send(&dpa).await;
                    peer.set_state(PeerState::Closed);
                    peer.detach_connection();
                    self.events.publish(Event::PeerDown(peer.id.clone()));
                    log::info!("peer {} disconnected ({:?})", peer.id, cause);
                    return;
                }
                _ => {}
            }

            if !msg.is_request() {
                if let Some(req) = peer.sent_requests.take(msg.header.hop_by_hop_id) {
                    log::trace!("matched answer for request code {}", req.code);
                }
                continue;
            }

            match self.routing_in.classify(msg) {
                RoutingDecision::Local(m) => {
                    let answer = self.dispatch.dispatch(&m);
                    let _ = peer.send(&answer).await;
                }
                RoutingDecision::Forward(m) => {
                    if let Err(e) = self.routing_out.route(&self.peers, &m).await {
                        let _ = peer.send(&m.new_error_answer(ResultCode::DIAMETER_UNABLE_TO_DELIVER)).await;
                        log::warn!("forward failed: {}", e);
                    }
                }
                RoutingDecision::Reenqueue(m) => {
                    // A single hop suffices for the cases this crate covers;
                    // re-run classification once instead of looping forever.
                    if let RoutingDecision::Local(m) = self.routing_in.classify(m) {
                        let answer = self.dispatch.dispatch(&m);
                        let _ = peer.send(&answer).await;
                    }
                }
                RoutingDecision::Reply(answer) => {
                    let _ = peer.send(&answer).await;
                }
                RoutingDecision::Drop => {}
            }
        }

        peer.set_state(PeerState::Closed);
        peer.detach_connection();
        self.events.publish(Event::PeerDown(peer.id.clone()));
    }

    /// Initiates an outbound connection to a configured peer and drives
    /// its PSM through the WaitConnAck/WaitCEA handshake (spec §4.6).
    pub async fn connect_peer(self: Arc<Self>, addr: &str, expected_id: &str, realm: &str) -> Result<()> {
        let peer = Peer::new(expected_id, realm);
        self.peers.insert(Arc::clone(&peer));

        let mut psm = Psm::new(&self.config.diameter_id);
        for action in psm.handle_event(PsmEvent::Start, self.config.tc) {
            self.log_action(&action);
        }

        let (cnx, mut rx) = crate::transport::connect(
            addr,
            &crate::transport::ConnectConfig {
                use_tls: self.config.flags.tls_inband,
                verify_cert: true,
            },
            Arc::clone(&self.dictionary),
        )
        .await?;
        peer.attach_connection(Arc::clone(&cnx));

        for action in psm.handle_event(PsmEvent::ConnCltCnxOk, self.config.tc) {
            if matches!(action, PsmAction::SendCer) {
                let cer = new_base_request(257, &self.config.diameter_id, &self.config.realm(), peer.next_hop_by_hop_id(), 1);
                cnx.send(&cer).await?;
            }
        }

        let cea = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .map_err(|_| crate::error::Error::ClientError("timed out waiting for CEA".into()))?
            .ok_or_else(|| crate::error::Error::ClientError("connection closed before CEA".into()))?;

        for action in psm.handle_event(PsmEvent::RcvCea(cea), self.config.tc) {
            self.log_action(&action);
        }

        if psm.state == PeerState::Open {
            peer.set_state(PeerState::Open);
            self.events.publish(Event::PeerUp(peer.id.clone()));
            tokio::spawn(Arc::clone(&self).drive_open_peer(peer, rx));
        }

        Ok(())
    }

    fn log_action(&self, action: &PsmAction) {
        if let PsmAction::Log(msg) = action {
            log::debug!("{}", msg);
        }
    }
}
