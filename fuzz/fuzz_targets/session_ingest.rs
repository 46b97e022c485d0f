#![no_main]

use std::time::Instant;

use coplay_core::{ClientId, SessionDescriptor};
use coplay_session::{
    ActionRegistry, ActionRelay, RemotePlayClient, SessionConfig, SessionTransport, Store,
};
use coplay_transport::memory::InMemoryConnector;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(client_id) = ClientId::new("fuzz") else {
        return;
    };
    let Ok(descriptor) = SessionDescriptor::new("fuzz-room", "") else {
        return;
    };
    let mut config = SessionConfig::new("ws://fuzz/ws", client_id);
    config.rng_seed = Some(0);
    let connector = InMemoryConnector::default();
    let transport = SessionTransport::new(config, connector.clone());

    let mut registry = ActionRegistry::<i64, i64>::new();
    registry.register("adjust", |args, local| {
        let delta = args.as_i64()?;
        local.apply(delta);
        Some(args.clone())
    });
    let relay = ActionRelay::new(Store::new(0, |s: &i64, d: &i64| s.wrapping_add(*d)), registry);
    let mut client = RemotePlayClient::new(transport, relay);
    client.connect(descriptor);

    let Some(link) = connector.last_link() else {
        return;
    };
    link.accept();
    for frame in String::from_utf8_lossy(data).split('\n') {
        link.deliver(frame);
    }
    client.tick(Instant::now());
});
