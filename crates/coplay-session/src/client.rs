use std::time::Instant;

use coplay_core::SessionDescriptor;
use coplay_transport::link::SessionConnector;
use serde_json::Value;

use crate::error::RelayError;
use crate::relay::{ActionRelay, Dispatch};
use crate::transport::SessionTransport;

/// Session transport and action relay wired to each other.
pub struct RemotePlayClient<C: SessionConnector, S, A> {
    transport: SessionTransport<C>,
    relay: ActionRelay<S, A>,
}

impl<C: SessionConnector, S: Clone + 'static, A: 'static> RemotePlayClient<C, S, A> {
    pub fn new(transport: SessionTransport<C>, relay: ActionRelay<S, A>) -> Self {
        Self { transport, relay }
    }

    pub fn connect(&mut self, descriptor: SessionDescriptor) {
        self.transport.connect(descriptor);
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Polls the transport and folds everything it published into the relay.
    /// Returns how many events were handled.
    pub fn tick(&mut self, now: Instant) -> usize {
        let events = self.transport.poll(now);
        let handled = events.len();
        for event in events {
            self.relay.handle_event(event, &mut self.transport);
        }
        handled
    }

    pub fn dispatch(&mut self, action: Dispatch<S, A>) {
        self.relay.dispatch(action, &mut self.transport);
    }

    pub fn call(&mut self, name: &str, args: Value) -> Result<(), RelayError> {
        self.relay.call(name, args, &mut self.transport)
    }

    pub fn state(&self) -> &S {
        self.relay.state()
    }

    pub fn transport(&self) -> &SessionTransport<C> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut SessionTransport<C> {
        &mut self.transport
    }

    pub fn relay(&self) -> &ActionRelay<S, A> {
        &self.relay
    }

    pub fn relay_mut(&mut self) -> &mut ActionRelay<S, A> {
        &mut self.relay
    }
}
