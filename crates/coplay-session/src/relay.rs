use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use coplay_codec::event::{ActionEvent, EventBody, RemotePlayEvent, StatusEvent};
use coplay_core::{ClientKey, InflightId};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::sink::EventSink;
use crate::store::Store;

/// Body of a relayable action: runs locally, dispatching through the given
/// [`LocalDispatch`], and returns the arguments to relay (or `None` to keep the
/// call local).
pub type ActionHandler<S, A> = dyn Fn(&Value, &mut LocalDispatch<'_, S, A>) -> Option<Value>;

/// Callback dispatched as a [`Dispatch::Thunk`].
pub type ThunkFn<S, A> = Box<dyn FnOnce(&mut LocalDispatch<'_, S, A>)>;

/// A named, relayable action ready to run.
pub struct DeferredCall<S, A> {
    pub name: String,
    pub args: Value,
    handler: Rc<ActionHandler<S, A>>,
}

impl<S, A> DeferredCall<S, A> {
    pub fn new(
        name: impl Into<String>,
        args: Value,
        handler: impl Fn(&Value, &mut LocalDispatch<'_, S, A>) -> Option<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            args,
            handler: Rc::new(handler),
        }
    }
}

/// Everything that can be dispatched through an [`ActionRelay`].
pub enum Dispatch<S, A> {
    /// Dispatch the inner value without relaying it.
    Local(Box<Dispatch<S, A>>),
    DeferredCall(DeferredCall<S, A>),
    Thunk(ThunkFn<S, A>),
    Plain(A),
}

impl<S, A> Dispatch<S, A> {
    pub fn local(self) -> Self {
        Self::Local(Box::new(self))
    }

    pub fn thunk(f: impl FnOnce(&mut LocalDispatch<'_, S, A>) + 'static) -> Self {
        Self::Thunk(Box::new(f))
    }
}

/// Dispatcher handed to handlers and thunks.
///
/// Everything dispatched through it stays local and carries the caller's
/// inflight id, if any.
pub struct LocalDispatch<'a, S, A> {
    relay: &'a mut ActionRelay<S, A>,
    sink: &'a mut dyn EventSink,
    inflight: Option<InflightId>,
}

impl<S: Clone + 'static, A: 'static> LocalDispatch<'_, S, A> {
    pub fn dispatch(&mut self, action: Dispatch<S, A>) {
        self.relay.route(action, true, self.inflight, &mut *self.sink);
    }

    /// Shorthand for dispatching a plain action.
    pub fn apply(&mut self, action: A) {
        self.dispatch(Dispatch::Plain(action));
    }

    /// Speculative state as of now.
    pub fn state(&self) -> &S {
        self.relay.store.state()
    }

    pub fn inflight(&self) -> Option<InflightId> {
        self.inflight
    }
}

/// Name to handler table shared by local dispatch and inbound reconstruction.
pub struct ActionRegistry<S, A> {
    handlers: HashMap<String, Rc<ActionHandler<S, A>>>,
}

impl<S, A> Default for ActionRegistry<S, A> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S, A> ActionRegistry<S, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Value, &mut LocalDispatch<'_, S, A>) -> Option<Value> + 'static,
    ) -> &mut Self {
        self.handlers.insert(name.into(), Rc::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Builds a dispatchable call for the handler registered under `name`.
    pub fn call(&self, name: &str, args: Value) -> Result<Dispatch<S, A>, RelayError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| RelayError::UnsupportedActionName(name.to_string()))?;
        Ok(Dispatch::DeferredCall(DeferredCall {
            name: name.to_string(),
            args,
            handler: Rc::clone(handler),
        }))
    }

    /// Rebuilds a peer's relayed action as a local-only call.
    pub fn reconstruct(&self, action: &ActionEvent) -> Result<Dispatch<S, A>, RelayError> {
        if !self.contains(&action.name) {
            return Err(RelayError::UnsupportedActionName(action.name.clone()));
        }
        let args = serde_json::from_str(&action.args).map_err(|source| RelayError::InvalidArgs {
            name: action.name.clone(),
            source,
        })?;
        Ok(self.call(&action.name, args)?.local())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Deferred calls whose result was sent to the session.
    pub relayed: usize,
    /// Own echoes matched against the ledger.
    pub echoes: usize,
    /// Local entries dropped because a peer took their sequence id.
    pub rejected: usize,
    /// Peer actions applied locally.
    pub remote_applied: usize,
    /// Peer actions dropped (unknown name or bad arguments).
    pub remote_dropped: usize,
}

/// Chokepoint for every dispatched action: applies it locally, relays it to
/// the session when needed, and folds peers' events back in.
pub struct ActionRelay<S, A> {
    store: Store<S, A>,
    registry: ActionRegistry<S, A>,
    peer_status: BTreeMap<ClientKey, StatusEvent>,
    stats: RelayStats,
}

impl<S: Clone + 'static, A: 'static> ActionRelay<S, A> {
    pub fn new(store: Store<S, A>, registry: ActionRegistry<S, A>) -> Self {
        Self {
            store,
            registry,
            peer_status: BTreeMap::new(),
            stats: RelayStats::default(),
        }
    }

    pub fn dispatch(&mut self, action: Dispatch<S, A>, sink: &mut dyn EventSink) {
        self.route(action, false, None, sink);
    }

    /// Dispatches the registered action `name` with `args`.
    pub fn call(
        &mut self,
        name: &str,
        args: Value,
        sink: &mut dyn EventSink,
    ) -> Result<(), RelayError> {
        let call = self.registry.call(name, args)?;
        self.dispatch(call, sink);
        Ok(())
    }

    /// Folds one event published by the session into local state.
    pub fn handle_event(&mut self, event: RemotePlayEvent, sink: &mut dyn EventSink) {
        let key = event.client_key();
        match event.event {
            EventBody::Status(status) => {
                debug!(client_key = %key, connected = status.connected, "status update");
                if status.connected {
                    self.peer_status.retain(|known, last| {
                        last.connected || known.client() != key.client() || *known == key
                    });
                }
                self.peer_status.insert(key, status);
            }
            EventBody::Action(action) => {
                if &event.client == sink.client_id() && sink.is_own_instance(&event.instance) {
                    self.handle_own_echo(&action, event.id);
                } else {
                    self.handle_peer_action(&key, &action, event.id, sink);
                }
            }
        }
    }

    pub fn state(&self) -> &S {
        self.store.state()
    }

    pub fn store(&self) -> &Store<S, A> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<S, A> {
        &mut self.store
    }

    pub fn registry(&self) -> &ActionRegistry<S, A> {
        &self.registry
    }

    /// Last STATUS seen per `client|instance`, own entries included.
    ///
    /// A connected STATUS drops disconnected instances of the same client.
    pub fn peer_status(&self) -> &BTreeMap<ClientKey, StatusEvent> {
        &self.peer_status
    }

    /// Keys of other instances currently reported connected.
    pub fn connected_peers<'a>(
        &'a self,
        own_key: &'a ClientKey,
    ) -> impl Iterator<Item = &'a ClientKey> + 'a {
        self.peer_status
            .iter()
            .filter(move |(key, status)| *key != own_key && status.connected)
            .map(|(key, _)| key)
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    fn route(
        &mut self,
        action: Dispatch<S, A>,
        local_only: bool,
        inflight: Option<InflightId>,
        sink: &mut dyn EventSink,
    ) {
        match action {
            Dispatch::Local(inner) => self.route(*inner, true, inflight, sink),
            Dispatch::DeferredCall(call) => self.run_deferred(call, local_only, inflight, sink),
            Dispatch::Thunk(thunk) => {
                let mut local = LocalDispatch {
                    relay: self,
                    sink,
                    inflight,
                };
                thunk(&mut local);
            }
            Dispatch::Plain(action) => self.store.apply(action, inflight),
        }
    }

    fn run_deferred(
        &mut self,
        call: DeferredCall<S, A>,
        local_only: bool,
        inflight: Option<InflightId>,
        sink: &mut dyn EventSink,
    ) {
        let assigned = if inflight.is_none() && !local_only && sink.is_connected() {
            Some(InflightId(sink.event_counter() + 1))
        } else {
            None
        };
        let inflight = inflight.or(assigned);

        let DeferredCall {
            name,
            args,
            handler,
        } = call;
        let relayed_args = {
            let mut local = LocalDispatch {
                relay: self,
                sink: &mut *sink,
                inflight,
            };
            handler(&args, &mut local)
        };

        let sent = match relayed_args {
            Some(value) if !local_only => self.send_action(&name, &value, sink),
            _ => None,
        };

        let Some(id) = assigned else {
            return;
        };
        match sent {
            Some(seq) if seq == id.0 => {}
            Some(seq) => {
                warn!(%id, seq, action = %name, "relayed action got an unexpected sequence id");
            }
            None => {
                let committed = self.store.commit(id);
                debug!(%id, committed, action = %name, "nothing relayed; committed locally");
            }
        }
    }

    fn send_action(&mut self, name: &str, args: &Value, sink: &mut dyn EventSink) -> Option<u64> {
        let args = match serde_json::to_string(args) {
            Ok(args) => args,
            Err(err) => {
                warn!(action = name, "failed to serialize action arguments: {err}");
                return None;
            }
        };
        let seq = sink.send_event(EventBody::action(name, args));
        if seq.is_some() {
            self.stats.relayed += 1;
        }
        seq
    }

    fn handle_own_echo(&mut self, action: &ActionEvent, id: Option<u64>) {
        let Some(seq) = id else {
            debug!(action = %action.name, "ignoring unsequenced echo");
            return;
        };
        self.stats.echoes += 1;
        let folded = self.store.commit(InflightId(seq));
        debug!(seq, folded, action = %action.name, "own action confirmed");
    }

    fn handle_peer_action(
        &mut self,
        key: &ClientKey,
        action: &ActionEvent,
        id: Option<u64>,
        sink: &mut dyn EventSink,
    ) {
        if let Some(seq) = id {
            let id = InflightId(seq);
            if self.store.ledger().has_uncommitted(id) {
                let rejected = self.store.reject(id);
                self.stats.rejected += rejected;
                info!(peer = %key, seq, rejected, "peer took sequence slot; local actions rejected");
            }
        }

        match self.registry.reconstruct(action) {
            Ok(call) => {
                self.stats.remote_applied += 1;
                self.route(call, true, None, sink);
            }
            Err(err) => {
                self.stats.remote_dropped += 1;
                warn!(peer = %key, "dropping peer action: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use coplay_codec::event::{EventBody, RemotePlayEvent};
    use coplay_core::{ClientId, ClientKey, InflightId, InstanceId};
    use serde_json::{json, Value};

    use super::{ActionRegistry, ActionRelay, Dispatch, LocalDispatch};
    use crate::error::RelayError;
    use crate::sink::{EventSink, OfflineSink};
    use crate::store::Store;

    struct FakeSink {
        client: ClientId,
        instances: Vec<InstanceId>,
        connected: bool,
        counter: u64,
        sent: Vec<EventBody>,
    }

    impl FakeSink {
        fn connected(client: &str) -> Self {
            Self {
                client: ClientId::new(client).expect("valid client"),
                instances: vec![InstanceId::new("i1").expect("valid instance")],
                connected: true,
                counter: 0,
                sent: Vec::new(),
            }
        }
    }

    impl EventSink for FakeSink {
        fn client_id(&self) -> &ClientId {
            &self.client
        }

        fn is_own_instance(&self, instance: &InstanceId) -> bool {
            self.instances.contains(instance)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn event_counter(&self) -> u64 {
            self.counter
        }

        fn send_event(&mut self, body: EventBody) -> Option<u64> {
            let id = if body.is_sequenced() {
                self.counter += 1;
                Some(self.counter)
            } else {
                None
            };
            self.sent.push(body);
            id
        }
    }

    fn adjust(args: &Value, local: &mut LocalDispatch<'_, i64, i64>) -> Option<Value> {
        let delta = args.as_i64()?;
        local.apply(delta);
        Some(json!(delta))
    }

    fn relay() -> ActionRelay<i64, i64> {
        let mut registry = ActionRegistry::new();
        registry.register("adjust", adjust);
        registry.register("preview", |args, local| {
            if let Some(delta) = args.as_i64() {
                local.apply(delta);
            }
            None
        });
        ActionRelay::new(Store::new(0, |state: &i64, delta: &i64| state + delta), registry)
    }

    fn peer_action(client: &str, id: u64, delta: i64) -> RemotePlayEvent {
        let mut event = RemotePlayEvent::new(
            ClientId::new(client).expect("valid client"),
            InstanceId::new("i1").expect("valid instance"),
            EventBody::action("adjust", delta.to_string()),
        );
        event.id = Some(id);
        event
    }

    #[test]
    fn connected_call_is_speculative_until_echoed() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");

        relay
            .call("adjust", json!(3), &mut sink)
            .expect("registered action");
        assert_eq!(*relay.state(), 3);
        assert_eq!(*relay.store().canonical(), 0);
        assert_eq!(sink.sent, vec![EventBody::action("adjust", "3")]);

        relay.handle_event(peer_action("tablet", 1, 3), &mut sink);
        assert_eq!(*relay.store().canonical(), 3);
        assert!(relay.store().ledger().is_empty());
        assert_eq!(*relay.state(), 3);
    }

    #[test]
    fn same_client_on_another_instance_is_a_peer() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        let mut other = peer_action("tablet", 1, 5);
        other.instance = InstanceId::new("other-instance").expect("valid instance");

        relay.handle_event(other, &mut sink);
        assert_eq!(*relay.state(), 5);
        assert_eq!(*relay.store().canonical(), 5);
        assert_eq!(relay.stats().remote_applied, 1);
        assert_eq!(relay.stats().echoes, 0);
    }

    #[test]
    fn other_instance_taking_our_slot_rejects_local_action() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay
            .call("adjust", json!(3), &mut sink)
            .expect("registered action");

        let mut other = peer_action("tablet", 1, 7);
        other.instance = InstanceId::new("other-instance").expect("valid instance");
        relay.handle_event(other, &mut sink);
        assert_eq!(*relay.state(), 7);
        assert_eq!(relay.store_mut().drain_rejections(), vec![InflightId(1)]);
    }

    #[test]
    fn echo_on_an_earlier_own_instance_still_commits() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay
            .call("adjust", json!(2), &mut sink)
            .expect("registered action");
        sink.instances.push(InstanceId::new("i2").expect("valid instance"));

        relay.handle_event(peer_action("tablet", 1, 2), &mut sink);
        assert_eq!(*relay.store().canonical(), 2);
        assert!(relay.store().ledger().is_empty());
        assert_eq!(relay.stats().echoes, 1);
    }

    #[test]
    fn peer_winning_slot_rejects_local_action() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay
            .call("adjust", json!(5), &mut sink)
            .expect("registered action");

        relay.handle_event(peer_action("phone", 1, 2), &mut sink);
        assert_eq!(*relay.state(), 2);
        assert_eq!(*relay.store().canonical(), 2);
        assert!(relay.store().ledger().is_empty());
        assert_eq!(
            relay.store_mut().drain_rejections(),
            vec![InflightId(1)]
        );
        assert_eq!(relay.stats().rejected, 1);
    }

    #[test]
    fn peer_actions_are_applied_without_relaying() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay.handle_event(peer_action("phone", 1, 4), &mut sink);
        assert_eq!(*relay.store().canonical(), 4);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn unknown_or_malformed_peer_actions_are_dropped() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        let mut unknown = peer_action("phone", 1, 1);
        unknown.event = EventBody::action("teleport", "{}");
        relay.handle_event(unknown, &mut sink);

        let mut malformed = peer_action("phone", 2, 1);
        malformed.event = EventBody::action("adjust", "{oops");
        relay.handle_event(malformed, &mut sink);

        assert_eq!(*relay.state(), 0);
        assert_eq!(relay.stats().remote_dropped, 2);
    }

    #[test]
    fn local_call_stays_off_the_wire() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        let call = relay
            .registry()
            .call("adjust", json!(2))
            .expect("registered action");
        relay.dispatch(call.local(), &mut sink);
        assert!(sink.sent.is_empty());
        assert_eq!(*relay.store().canonical(), 2);
    }

    #[test]
    fn unrelayed_call_commits_immediately() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay
            .call("preview", json!(6), &mut sink)
            .expect("registered action");
        assert!(sink.sent.is_empty());
        assert_eq!(*relay.store().canonical(), 6);
        assert!(relay.store().ledger().is_empty());
    }

    #[test]
    fn offline_calls_apply_directly() {
        let mut relay = relay();
        let mut sink = OfflineSink::new(ClientId::new("tablet").expect("valid client"));
        relay
            .call("adjust", json!(1), &mut sink)
            .expect("registered action");
        assert_eq!(*relay.store().canonical(), 1);
        assert!(relay.store().ledger().is_empty());
    }

    #[test]
    fn thunk_inside_handler_inherits_inflight_id() {
        let mut registry = ActionRegistry::<i64, i64>::new();
        registry.register("double", |_, local| {
            let current = *local.state();
            local.dispatch(Dispatch::thunk(move |inner| {
                assert_eq!(inner.inflight(), Some(InflightId(1)));
                inner.apply(current);
            }));
            Some(Value::Null)
        });
        let mut relay = ActionRelay::new(Store::new(5, |s: &i64, d: &i64| s + d), registry);
        let mut sink = FakeSink::connected("tablet");

        relay.call("double", Value::Null, &mut sink).expect("registered");
        assert_eq!(*relay.state(), 10);
        assert_eq!(relay.store().ledger().len(), 1);
    }

    #[test]
    fn top_level_thunk_and_plain_actions_are_untagged() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        relay.dispatch(Dispatch::Plain(2), &mut sink);
        relay.dispatch(Dispatch::thunk(|local| local.apply(3)), &mut sink);
        assert_eq!(*relay.store().canonical(), 5);
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn unknown_call_name_is_an_error() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        let err = relay
            .call("teleport", Value::Null, &mut sink)
            .expect_err("unregistered action");
        assert!(matches!(err, RelayError::UnsupportedActionName(name) if name == "teleport"));
    }

    #[test]
    fn status_events_track_peers_by_instance() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        let own = ClientKey::new(
            &ClientId::new("tablet").expect("valid client"),
            &InstanceId::new("me").expect("valid instance"),
        );
        for (client, instance, connected) in
            [("tablet", "me", true), ("phone", "a", true), ("phone", "b", false)]
        {
            relay.handle_event(
                RemotePlayEvent::new(
                    ClientId::new(client).expect("valid client"),
                    InstanceId::new(instance).expect("valid instance"),
                    EventBody::status(connected, Some(2)),
                ),
                &mut sink,
            );
        }
        assert_eq!(relay.peer_status().len(), 3);
        let peers: Vec<&str> = relay.connected_peers(&own).map(ClientKey::as_str).collect();
        assert_eq!(peers, vec!["phone|a"]);
    }

    #[test]
    fn reconnected_instance_drops_disconnected_siblings() {
        let mut relay = relay();
        let mut sink = FakeSink::connected("tablet");
        for (client, instance, connected) in [
            ("phone", "a", true),
            ("phone", "a", false),
            ("phone", "live", true),
            ("watch", "w", false),
            ("phone", "b", true),
        ] {
            relay.handle_event(
                RemotePlayEvent::new(
                    ClientId::new(client).expect("valid client"),
                    InstanceId::new(instance).expect("valid instance"),
                    EventBody::status(connected, None),
                ),
                &mut sink,
            );
        }
        let keys: Vec<&str> = relay.peer_status().keys().map(ClientKey::as_str).collect();
        assert_eq!(keys, vec!["phone|b", "phone|live", "watch|w"]);
    }
}
