//! Networking layer.
//!
//! Provides a [`Transport`] trait abstracting over a remote server and an
//! in-process session, the protocol message types, and the iroh-based
//! server/client. The server owns the only [`Simulation`]; clients send
//! [`ClientRequest`]s and receive a [`ServerMessage::Frame`] every tick.

use crate::ecs::{EntityId, PlayerId, TargetPriority};
use crate::events::{EventBus, SimObserver};
use crate::game::{SimCommand, SimEvent, Simulation, WorldSnapshot};
use catalog::{Catalog, TowerKind};

use glam::Vec3;
use iroh::{
    Endpoint, EndpointAddr,
    endpoint::Connection,
    protocol::{AcceptError, ProtocolHandler, Router},
};
use n0_error::{Result, StdResultExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::{sync::Arc, time::Duration};
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ALPN: &[u8] = b"bulwark/0";
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024; // 10 MB
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// Frames a slow client may fall behind before it starts skipping.
const FRAME_BACKLOG: usize = 64;

// ---------------------------------------------------------------------------
// Protocol messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Must be the first request on a connection; later ones are ignored
    /// until it arrives.
    Join(String),
    PlaceTower { kind: TowerKind, position: Vec3 },
    UpgradeTower(EntityId),
    SetPriority {
        tower: EntityId,
        priority: TargetPriority,
    },
    StartWave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome { player: PlayerId, catalog: Catalog },
    Frame {
        snapshot: WorldSnapshot,
        events: Vec<SimEvent>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Client(ClientRequest),
    Server(ServerMessage),
}

/// Wire form of a [`Message`].
///
/// # Errors
/// Only if a value cannot be represented by the encoder.
pub fn encode(message: &Message) -> std::result::Result<Vec<u8>, bitcode::Error> {
    bitcode::serialize(message)
}

/// # Errors
/// Truncated or foreign bytes.
pub fn decode(bytes: &[u8]) -> std::result::Result<Message, bitcode::Error> {
    bitcode::deserialize(bytes)
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("the session has ended")]
    Closed,
}

/// What the viewer talks to, so that it does not care whether the simulation
/// runs in-process or on a remote server.
pub trait Transport: Send + 'static {
    /// Queue a request for the server.
    ///
    /// # Errors
    /// [`TransportError::Closed`] once the other side is gone.
    fn send(&mut self, request: ClientRequest) -> std::result::Result<(), TransportError>;
    /// Try to receive a message (non-blocking).
    fn try_recv(&mut self) -> Option<ServerMessage>;
}

/// Transport backed by the channels of a [`run_client_internal`] task.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<ClientRequest>,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Transport for ChannelTransport {
    fn send(&mut self, request: ClientRequest) -> std::result::Result<(), TransportError> {
        self.tx.send(request).map_err(|_closed| TransportError::Closed)
    }

    fn try_recv(&mut self) -> Option<ServerMessage> {
        self.rx.try_recv().ok()
    }
}

/// Single-player session: owns a [`ServerState`] and ticks it whenever the
/// viewer polls and a tick interval has passed.
#[derive(Debug)]
pub struct LocalSession {
    state: ServerState,
    player: Option<PlayerId>,
    outbox: VecDeque<ServerMessage>,
    last_tick: Option<std::time::Instant>,
}

impl LocalSession {
    pub fn new(sim: Simulation) -> Self {
        Self {
            state: ServerState::new(sim),
            player: None,
            outbox: VecDeque::new(),
            last_tick: None,
        }
    }
}

impl Transport for LocalSession {
    fn send(&mut self, request: ClientRequest) -> std::result::Result<(), TransportError> {
        if let Some(reply) = self.state.handle(&mut self.player, request) {
            self.outbox.push_back(reply);
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<ServerMessage> {
        if let Some(message) = self.outbox.pop_front() {
            return Some(message);
        }
        let now = std::time::Instant::now();
        let delta = match self.last_tick {
            None => Duration::ZERO,
            Some(last) if now.duration_since(last) >= TICK_INTERVAL => now.duration_since(last),
            Some(_) => return None,
        };
        self.last_tick = Some(now);
        Some(self.state.step(delta.as_secs_f32()))
    }
}

/// Wire a client task to a fresh [`ChannelTransport`] and join as `name`.
///
/// Must be called with a tokio runtime entered.
pub fn connect(addr: impl Into<EndpointAddr>, name: String) -> ChannelTransport {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let addr = addr.into();

    // Join goes out first; the send loop preserves order.
    if request_tx.send(ClientRequest::Join(name)).is_err() {
        log::warn!("Request channel closed before connecting");
    }
    tokio::spawn(async move {
        if let Err(e) = run_client_internal(addr, message_tx, request_rx).await {
            log::warn!("Client stopped: {e}");
        }
    });

    ChannelTransport {
        tx: request_tx,
        rx: message_rx,
    }
}

// ---------------------------------------------------------------------------
// Server state (simulation + networking bookkeeping)
// ---------------------------------------------------------------------------

/// State owned by the server: the authoritative simulation plus the
/// observers that hear about every tick.
#[derive(Debug)]
pub struct ServerState {
    sim: Simulation,
    bus: EventBus,
}

impl ServerState {
    pub fn new(sim: Simulation) -> Self {
        let mut bus = EventBus::new();
        let mut kills = 0_u32;
        bus.subscribe(move |event: &SimEvent| match event {
            SimEvent::EnemyDied { .. } => kills += 1,
            SimEvent::WaveCleared { number } => {
                log::info!("Wave {number} done, {kills} kills so far");
            }
            SimEvent::GameOver | SimEvent::Victory => {
                log::info!("Match decided after {kills} kills");
            }
            _ => {}
        });
        Self { sim, bus }
    }

    pub fn subscribe(&mut self, observer: impl SimObserver + 'static) {
        self.bus.subscribe(observer);
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Apply one request from a connection. `session` is the player bound to
    /// that connection, set by its `Join`. Returns a reply meant only for
    /// that connection.
    pub fn handle(
        &mut self,
        session: &mut Option<PlayerId>,
        request: ClientRequest,
    ) -> Option<ServerMessage> {
        let command = match (request, *session) {
            (ClientRequest::Join(name), _) => {
                let player = *session.get_or_insert_with(|| self.sim.register_player(name));
                return Some(ServerMessage::Welcome {
                    player,
                    catalog: self.sim.catalog().clone(),
                });
            }
            (request, None) => {
                log::warn!("Ignoring {request:?} from a connection that has not joined");
                return None;
            }
            (ClientRequest::PlaceTower { kind, position }, Some(player)) => {
                SimCommand::PlaceTower {
                    kind,
                    position,
                    requester: Some(player),
                }
            }
            (ClientRequest::UpgradeTower(tower), Some(player)) => SimCommand::UpgradeTower {
                tower,
                requester: Some(player),
            },
            (ClientRequest::SetPriority { tower, priority }, Some(player)) => {
                SimCommand::SetPriority {
                    tower,
                    priority,
                    requester: Some(player),
                }
            }
            (ClientRequest::StartWave, Some(_)) => SimCommand::StartWave,
        };
        self.sim.enqueue(command);
        None
    }

    /// The connection bound to `session` is gone; its player stops sharing
    /// rewards and lives.
    pub fn leave(&mut self, session: Option<PlayerId>) {
        if let Some(player) = session
            && let Some(purse) = self.sim.unregister_player(player)
        {
            log::info!("{} ({player:?}) left with {} gold", purse.name, purse.gold);
        }
    }

    /// Advance the simulation and build the frame every client receives.
    pub fn step(&mut self, delta: f32) -> ServerMessage {
        let events = self.sim.tick(delta);
        self.bus.publish(&events);
        ServerMessage::Frame {
            snapshot: self.sim.snapshot(),
            events,
        }
    }
}

// ---------------------------------------------------------------------------
// Iroh helpers
// ---------------------------------------------------------------------------

/// Send one message on a new unidirectional stream.
async fn send_one_way(conn: &Connection, msg: &Message) -> Result<()> {
    let mut send = conn.open_uni().await.anyerr()?;
    let encoded = encode(msg).anyerr()?;
    send.write_all(&encoded).await.anyerr()?;
    send.finish().anyerr()?;
    Ok(())
}

/// Receive one message from a unidirectional stream.
async fn recv_one_way(mut recv: iroh::endpoint::RecvStream) -> Result<Message> {
    let bytes = recv.read_to_end(MAX_MESSAGE_SIZE).await.anyerr()?;
    let msg = decode(&bytes).anyerr()?;
    Ok(msg)
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Bind an endpoint, start the tick loop and accept clients.
///
/// # Errors
/// Failure to bind the endpoint.
pub async fn run_server_internal(state: ServerState) -> Result<Router> {
    let endpoint = Endpoint::bind().await?;

    let state = Arc::new(Mutex::new(state));
    let (frames, _) = broadcast::channel(FRAME_BACKLOG);
    tokio::spawn(run_ticks(Arc::clone(&state), frames.clone()));

    let router = Router::builder(endpoint)
        .accept(ALPN, BulwarkProtocol { state, frames })
        .spawn();

    log::info!("Server started as {}", router.endpoint().id());
    Ok(router)
}

/// Tick at [`TICK_INTERVAL`] with the measured delta until the match is
/// decided, broadcasting a frame per tick.
async fn run_ticks(state: Arc<Mutex<ServerState>>, frames: broadcast::Sender<ServerMessage>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        interval.tick().await;
        let now = Instant::now();
        let delta = now.duration_since(last).as_secs_f32();
        last = now;

        let (frame, decided) = {
            let mut guard = state.lock().await;
            let frame = guard.step(delta);
            (frame, guard.simulation().outcome().is_some())
        };
        // No connected clients is not an error.
        frames.send(frame).ok();

        if decided {
            log::info!("Match decided, tick loop stopped");
            break;
        }
    }
}

#[derive(Debug, Clone)]
struct BulwarkProtocol {
    state: Arc<Mutex<ServerState>>,
    frames: broadcast::Sender<ServerMessage>,
}

impl ProtocolHandler for BulwarkProtocol {
    async fn accept(&self, connection: Connection) -> std::result::Result<(), AcceptError> {
        let remote = connection.remote_id();
        log::info!("Client {remote} connected");

        // Frame forwarding task
        let mut frames = self.frames.subscribe();
        let outbound = connection.clone();
        let forward = tokio::spawn(async move {
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        if let Err(e) = send_one_way(&outbound, &Message::Server(frame)).await {
                            log::warn!("Error sending frame to {remote}: {e}");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Client {remote} skipped {skipped} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Requests are handled in arrival order so `Join` precedes the rest.
        let mut session = None;
        while let Ok(recv) = connection.accept_uni().await {
            match recv_one_way(recv).await {
                Ok(Message::Client(request)) => {
                    let reply = self.state.lock().await.handle(&mut session, request);
                    if let Some(reply) = reply
                        && let Err(e) = send_one_way(&connection, &Message::Server(reply)).await
                    {
                        log::warn!("Error replying to {remote}: {e}");
                        break;
                    }
                }
                Ok(Message::Server(_)) => {
                    log::warn!("Client {remote} sent a server message");
                }
                Err(e) => {
                    log::warn!("Error receiving message from {remote}: {e}");
                }
            }
        }

        forward.abort();
        self.state.lock().await.leave(session);
        log::info!("Client {remote} disconnected");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Connect to a server and shuttle messages between it and the channels
/// until either side closes.
///
/// # Errors
/// Failure to bind or to connect.
pub async fn run_client_internal(
    addr: impl Into<EndpointAddr>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    mut rx: mpsc::UnboundedReceiver<ClientRequest>,
) -> Result<()> {
    let endpoint = Endpoint::bind().await?;
    let conn = endpoint.connect(addr, ALPN).await?;

    // Receive loop
    let conn_clone = conn.clone();
    tokio::spawn(async move {
        while let Ok(recv) = conn_clone.accept_uni().await {
            match recv_one_way(recv).await {
                Ok(Message::Server(msg)) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Ok(Message::Client(_)) => {
                    log::warn!("Server sent a client message");
                }
                Err(e) => {
                    log::warn!("Error receiving server message: {e}");
                }
            }
        }
    });

    // Send loop
    while let Some(request) = rx.recv().await {
        if let Err(e) = send_one_way(&conn, &Message::Client(request)).await {
            log::warn!("Error sending request: {e}");
            break;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::ecs::EntityKind;

    fn server() -> ServerState {
        let catalog = Catalog::builtin().expect("embedded catalog is valid");
        ServerState::new(Simulation::with_defaults(catalog, SimConfig::default()))
    }

    fn frame_snapshot(message: ServerMessage) -> WorldSnapshot {
        match message {
            ServerMessage::Frame { snapshot, .. } => snapshot,
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn join_binds_the_session_once() {
        let mut server = server();
        let mut session = None;

        let first = server.handle(&mut session, ClientRequest::Join("Alice".into()));
        let Some(ServerMessage::Welcome { player, .. }) = first else {
            panic!("expected a welcome, got {first:?}");
        };
        assert_eq!(session, Some(player));

        let again = server.handle(&mut session, ClientRequest::Join("Mallory".into()));
        assert!(matches!(again, Some(ServerMessage::Welcome { player: p, .. }) if p == player));
        assert_eq!(server.simulation().players().roster().len(), 1);
    }

    #[test]
    fn requests_before_join_are_dropped() {
        let mut server = server();
        let mut session = None;

        let reply = server.handle(&mut session, ClientRequest::StartWave);

        assert!(reply.is_none());
        assert_eq!(server.simulation().pending_commands(), 0);
    }

    #[test]
    fn placement_is_charged_to_the_session_player() {
        let mut server = server();
        let mut session = None;
        server.handle(&mut session, ClientRequest::Join("Alice".into()));
        server.handle(
            &mut session,
            ClientRequest::PlaceTower {
                kind: TowerKind::Archer,
                position: Vec3::new(10.0, 0.0, 10.0),
            },
        );

        let snapshot = frame_snapshot(server.step(0.05));

        assert_eq!(snapshot.towers.len(), 1);
        assert_eq!(snapshot.towers[0].owner, session);
        assert_eq!(snapshot.players[0].1.gold, 400);
    }

    #[test]
    fn frames_survive_the_wire() {
        let mut server = server();
        let mut session = None;
        server.handle(&mut session, ClientRequest::Join("Alice".into()));
        server.handle(&mut session, ClientRequest::StartWave);
        let frame = Message::Server(server.step(0.05));

        let bytes = encode(&frame).expect("encodable");
        let decoded = decode(&bytes).expect("decodable");

        assert_eq!(decoded, frame);
    }

    #[test]
    fn welcome_carries_the_catalog_over_the_wire() {
        let mut server = server();
        let mut session = None;
        let welcome = server
            .handle(&mut session, ClientRequest::Join("Alice".into()))
            .expect("join replies");
        let message = Message::Server(welcome);

        let decoded = decode(&encode(&message).expect("encodable")).expect("decodable");

        assert_eq!(decoded, message);
        let Message::Server(ServerMessage::Welcome { catalog, .. }) = decoded else {
            panic!("expected a welcome, got {decoded:?}");
        };
        assert_eq!(&catalog, server.simulation().catalog());
        assert!(catalog.path.waypoints().len() >= 2);
    }

    #[test]
    fn priority_requests_reach_the_tower() {
        let mut server = server();
        let mut session = None;
        server.handle(&mut session, ClientRequest::Join("Alice".into()));
        server.handle(
            &mut session,
            ClientRequest::PlaceTower {
                kind: TowerKind::Cannon,
                position: Vec3::new(10.0, 0.0, 10.0),
            },
        );
        let snapshot = frame_snapshot(server.step(0.05));
        let tower = snapshot.towers[0].id;

        server.handle(
            &mut session,
            ClientRequest::SetPriority {
                tower,
                priority: TargetPriority::Strongest,
            },
        );
        let snapshot = frame_snapshot(server.step(0.05));

        assert_eq!(snapshot.towers[0].priority, TargetPriority::Strongest);
    }

    #[test]
    fn leaving_removes_the_player() {
        let mut server = server();
        let mut alice = None;
        let mut bob = None;
        server.handle(&mut alice, ClientRequest::Join("Alice".into()));
        server.handle(&mut bob, ClientRequest::Join("Bob".into()));

        server.leave(alice);
        server.leave(None);

        let roster = server.simulation().players().roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(Some(roster[0].0), bob);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn local_session_replies_then_ticks() {
        let catalog = Catalog::builtin().expect("embedded catalog is valid");
        let mut session = LocalSession::new(Simulation::with_defaults(catalog, SimConfig::default()));

        session
            .send(ClientRequest::Join("Solo".into()))
            .expect("local sessions never close");
        session
            .send(ClientRequest::PlaceTower {
                kind: TowerKind::Mage,
                position: Vec3::new(10.0, 0.0, 10.0),
            })
            .expect("local sessions never close");

        assert!(matches!(
            session.try_recv(),
            Some(ServerMessage::Welcome { .. })
        ));
        let snapshot = frame_snapshot(session.try_recv().expect("first poll ticks"));
        assert_eq!(snapshot.towers.len(), 1);
        assert_eq!(
            session.state.simulation().store().count(EntityKind::Tower),
            1
        );
    }

    #[test]
    fn channel_transport_reports_closed_server() {
        let (tx, request_rx) = mpsc::unbounded_channel();
        let (_message_tx, rx) = mpsc::unbounded_channel();
        let mut transport = ChannelTransport { tx, rx };
        drop(request_rx);

        assert!(matches!(
            transport.send(ClientRequest::StartWave),
            Err(TransportError::Closed)
        ));
        assert!(transport.try_recv().is_none());
    }
}
