use std::time::{Duration, Instant};

use coplay_codec::event::{EventBody, RemotePlayEvent};
use coplay_codec::frame::{decode_frame, encode_event, InboundFrame, HEARTBEAT_FRAME};
use coplay_core::{ClientId, ClientKey, InstanceId, SessionDescriptor};
use coplay_transport::link::{
    is_normal_closure, LinkError, LinkEvent, SessionConnector, SessionLink, CLOSE_NORMAL,
};
use coplay_transport::url::session_url;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::sink::EventSink;

/// Connection lifecycle of a [`SessionTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session, or closed normally.
    Disconnected,
    /// Link opened, handshake not yet complete.
    Connecting,
    /// Handshake complete; events flow both ways.
    Connected,
    /// Closed abnormally; a reconnect may be scheduled.
    Reconnecting,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Event frames written to the link.
    pub frames_sent: usize,
    /// Text frames read from the link, heartbeats included.
    pub frames_received: usize,
    /// Inbound frames dropped because they failed to decode.
    pub malformed_frames: usize,
    /// Keepalive frames written.
    pub heartbeats_sent: usize,
    /// Sends the link refused.
    pub send_errors: usize,
    /// Error notifications from the link or connector.
    pub link_errors: usize,
    /// Reconnect timers armed after abnormal closures.
    pub reconnects_scheduled: usize,
    /// Events dropped because the session was not connected.
    pub dropped_outbound: usize,
}

/// Client half of a shared session: owns the link, the sequence counter mirror,
/// the heartbeat timer, and the reconnect schedule.
///
/// Time is injected: timers are deadlines checked by [`SessionTransport::poll`].
/// Replacing or clearing a deadline cancels the timer.
pub struct SessionTransport<C: SessionConnector> {
    config: SessionConfig,
    connector: C,
    link: Option<C::Link>,
    state: SessionState,
    descriptor: Option<SessionDescriptor>,
    instance: InstanceId,
    own_instances: Vec<InstanceId>,
    session_client_ids: Vec<ClientId>,
    event_counter: u64,
    backoff: Backoff,
    rng: StdRng,
    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
    open_failure: Option<LinkError>,
    published: Vec<RemotePlayEvent>,
    stats: SessionStats,
}

impl<C: SessionConnector> SessionTransport<C> {
    pub fn new(config: SessionConfig, connector: C) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let instance = InstanceId::from_entropy(rng.gen());
        let session_client_ids = vec![config.client_id.clone()];
        let backoff = Backoff::new(config.reconnect);
        Self {
            config,
            connector,
            link: None,
            state: SessionState::Disconnected,
            descriptor: None,
            instance,
            own_instances: Vec::new(),
            session_client_ids,
            event_counter: 0,
            backoff,
            rng,
            reconnect_at: None,
            heartbeat_at: None,
            open_failure: None,
            published: Vec::new(),
            stats: SessionStats::default(),
        }
    }

    /// Opens a link to `descriptor`, tearing down any current one first.
    ///
    /// Resets the known client list and counter and picks a fresh instance id.
    /// Completion is reported through [`SessionTransport::poll`].
    pub fn connect(&mut self, descriptor: SessionDescriptor) {
        self.reconnect_at = None;
        self.open_failure = None;
        self.teardown_link();

        self.session_client_ids = vec![self.config.client_id.clone()];
        self.event_counter = 0;
        self.instance = InstanceId::from_entropy(self.rng.gen());
        self.own_instances.push(self.instance.clone());

        let url = session_url(
            &self.config.base_url,
            &descriptor,
            &self.config.client_id,
            &self.instance,
        );
        self.descriptor = Some(descriptor);
        self.state = SessionState::Connecting;
        info!(
            session = %self.descriptor.as_ref().map_or("", |d| d.session_id.as_str()),
            instance = %self.instance,
            "opening session link"
        );

        match self.connector.open(&url) {
            Ok(link) => self.link = Some(link),
            Err(err) => {
                warn!("failed to open session link: {err}");
                self.stats.link_errors += 1;
                self.open_failure = Some(err);
            }
        }
    }

    /// Closes the link normally and cancels any pending reconnect.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.open_failure = None;
        self.teardown_link();
        self.state = SessionState::Disconnected;
    }

    /// Drains link events and fires due timers.
    ///
    /// Returns every event to publish locally, in arrival order: decoded
    /// inbound events plus the local client's own STATUS transitions.
    pub fn poll(&mut self, now: Instant) -> Vec<RemotePlayEvent> {
        if let Some(err) = self.open_failure.take() {
            self.handle_abnormal_close(now, &err.to_string());
        }

        while let Some(event) = self.link.as_mut().and_then(SessionLink::poll_event) {
            self.handle_link_event(event, now);
        }

        if self.reconnect_at.is_some_and(|due| now >= due) {
            self.reconnect_at = None;
            if let Some(descriptor) = self.descriptor.clone() {
                info!("reconnecting after backoff");
                self.connect(descriptor);
            }
        }

        if self.state == SessionState::Connected && self.heartbeat_at.is_some_and(|due| now >= due)
        {
            self.send_heartbeat();
            self.heartbeat_at = Some(now + self.config.heartbeat_interval);
        }

        std::mem::take(&mut self.published)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance
    }

    /// Instance ids of every link this transport has opened, oldest first.
    pub fn own_instances(&self) -> &[InstanceId] {
        &self.own_instances
    }

    /// `"<client>|<instance>"` of the current connection.
    pub fn client_key(&self) -> ClientKey {
        ClientKey::new(&self.config.client_id, &self.instance)
    }

    /// Client ids seen in this session, self first.
    pub fn session_client_ids(&self) -> &[ClientId] {
        &self.session_client_ids
    }

    /// Deadline of the pending reconnect, if one is armed.
    pub fn next_reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Attempt index the next reconnect delay will be drawn for.
    pub fn reconnect_attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Updates the player count advertised on the next connect.
    pub fn set_num_players(&mut self, num_players: u32) {
        self.config.num_players = num_players;
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.config.heartbeat_interval
    }

    fn handle_link_event(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Opened => self.handle_open(now),
            LinkEvent::Frame(frame) => self.handle_frame(&frame),
            LinkEvent::Error(message) => {
                warn!("session link error: {message}");
                self.stats.link_errors += 1;
            }
            LinkEvent::Closed { code, reason } => {
                self.link = None;
                self.heartbeat_at = None;
                if is_normal_closure(code) {
                    info!(code, "session closed normally");
                    self.state = SessionState::Disconnected;
                    self.publish_status(false);
                } else {
                    self.handle_abnormal_close(now, &format!("code {code} {reason}"));
                }
            }
        }
    }

    fn handle_open(&mut self, now: Instant) {
        if self.state != SessionState::Connecting {
            debug!(state = ?self.state, "ignoring open notification");
            return;
        }
        info!(client_key = %self.client_key(), "session connected");
        self.state = SessionState::Connected;
        self.backoff.reset();
        self.heartbeat_at = Some(now + self.config.heartbeat_interval);

        let status = EventBody::status(true, Some(self.config.num_players));
        self.send_event(status.clone());
        self.published.push(self.local_event(status));
    }

    fn handle_frame(&mut self, frame: &str) {
        self.stats.frames_received += 1;
        let event = match decode_frame(frame) {
            Ok(InboundFrame::Heartbeat) => {
                debug!("heartbeat frame");
                return;
            }
            Ok(InboundFrame::Event(event)) => event,
            Err(err) => {
                warn!("dropping malformed frame: {err}");
                self.stats.malformed_frames += 1;
                return;
            }
        };

        if let Some(id) = event.id {
            if id < self.event_counter {
                debug!(id, counter = self.event_counter, "stale sequence id");
            }
            self.event_counter = self.event_counter.max(id);
        }
        if !self.session_client_ids.contains(&event.client) {
            info!(client = %event.client, "new client joined session");
            self.session_client_ids.push(event.client.clone());
        }
        self.published.push(event);
    }

    fn handle_abnormal_close(&mut self, now: Instant, reason: &str) {
        warn!("session closed abnormally: {reason}");
        self.link = None;
        self.heartbeat_at = None;
        self.state = SessionState::Reconnecting;
        self.publish_status(false);

        if self.descriptor.is_some() {
            let delay = self.backoff.next_delay(&mut self.rng);
            info!(?delay, "scheduling reconnect");
            self.reconnect_at = Some(now + delay);
            self.stats.reconnects_scheduled += 1;
        }
    }

    fn send_heartbeat(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        match link.send_text(HEARTBEAT_FRAME) {
            Ok(()) => self.stats.heartbeats_sent += 1,
            Err(err) => {
                warn!("heartbeat send failed: {err}");
                self.stats.send_errors += 1;
            }
        }
    }

    fn teardown_link(&mut self) {
        self.heartbeat_at = None;
        if let Some(mut link) = self.link.take() {
            link.close(CLOSE_NORMAL);
            if self.state == SessionState::Connected {
                info!("closing session link");
                self.publish_status(false);
            }
        }
    }

    fn publish_status(&mut self, connected: bool) {
        let event = self.local_event(EventBody::status(connected, None));
        self.published.push(event);
    }

    fn local_event(&self, body: EventBody) -> RemotePlayEvent {
        RemotePlayEvent::new(self.config.client_id.clone(), self.instance.clone(), body)
    }
}

impl<C: SessionConnector> EventSink for SessionTransport<C> {
    fn client_id(&self) -> &ClientId {
        &self.config.client_id
    }

    fn is_own_instance(&self, instance: &InstanceId) -> bool {
        self.own_instances.contains(instance)
    }

    fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.link.is_some()
    }

    fn event_counter(&self) -> u64 {
        self.event_counter
    }

    fn send_event(&mut self, body: EventBody) -> Option<u64> {
        if !self.is_connected() {
            debug!(state = ?self.state, "dropping outbound event while not connected");
            self.stats.dropped_outbound += 1;
            return None;
        }
        let mut event = self.local_event(body);
        if event.event.is_sequenced() {
            event.id = Some(self.event_counter + 1);
        }
        let frame = encode_event(&event);
        let link = self.link.as_mut()?;
        if let Err(err) = link.send_text(&frame) {
            warn!("event send failed: {err}");
            self.stats.send_errors += 1;
            return None;
        }
        self.stats.frames_sent += 1;
        if let Some(id) = event.id {
            self.event_counter = id;
        }
        event.id
    }
}
