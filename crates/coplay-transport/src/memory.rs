use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::link::{LinkError, LinkEvent, SessionConnector, SessionLink, CLOSE_ABNORMAL};

#[derive(Debug, Default)]
struct LinkShared {
    url: String,
    inbound: VecDeque<LinkEvent>,
    outbound: Vec<String>,
    closed_with: Option<u16>,
    refuse_sends: bool,
}

/// Test-side handle onto one in-memory link: plays the server's part.
#[derive(Debug, Clone)]
pub struct MemoryLinkHandle(Rc<RefCell<LinkShared>>);

impl MemoryLinkHandle {
    /// URL the client opened this link with.
    pub fn url(&self) -> String {
        self.0.borrow().url.clone()
    }

    /// Completes the handshake.
    pub fn accept(&self) {
        self.0.borrow_mut().inbound.push_back(LinkEvent::Opened);
    }

    /// Queues one server-to-client text frame.
    pub fn deliver(&self, frame: impl Into<String>) {
        self.0
            .borrow_mut()
            .inbound
            .push_back(LinkEvent::Frame(frame.into()));
    }

    /// Simulates a socket error followed by an abnormal close.
    pub fn fail(&self, message: impl Into<String>) {
        let mut shared = self.0.borrow_mut();
        shared.inbound.push_back(LinkEvent::Error(message.into()));
        shared.inbound.push_back(LinkEvent::Closed {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        });
    }

    /// Simulates the server closing the connection with `code`.
    pub fn close_from_server(&self, code: u16) {
        self.0.borrow_mut().inbound.push_back(LinkEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// While set, client sends fail with [`LinkError::QueueFull`].
    pub fn refuse_sends(&self, refuse: bool) {
        self.0.borrow_mut().refuse_sends = refuse;
    }

    /// Drains frames the client has sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.0.borrow_mut().outbound)
    }

    /// Close code the client closed this link with, if it did.
    pub fn closed_with(&self) -> Option<u16> {
        self.0.borrow().closed_with
    }
}

/// Client side of an in-memory link.
#[derive(Debug)]
pub struct MemoryLink {
    shared: Rc<RefCell<LinkShared>>,
}

impl SessionLink for MemoryLink {
    fn send_text(&mut self, frame: &str) -> Result<(), LinkError> {
        let mut shared = self.shared.borrow_mut();
        if shared.closed_with.is_some() {
            return Err(LinkError::Closed);
        }
        if shared.refuse_sends {
            return Err(LinkError::QueueFull);
        }
        shared.outbound.push(frame.to_string());
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.shared.borrow_mut().inbound.pop_front()
    }

    fn close(&mut self, code: u16) {
        let mut shared = self.shared.borrow_mut();
        if shared.closed_with.is_none() {
            shared.closed_with = Some(code);
        }
    }
}

/// Single-threaded connector for tests and simulations.
///
/// Clones share state, so a test can keep one clone and hand the other to the
/// session under test.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConnector {
    links: Rc<RefCell<Vec<MemoryLinkHandle>>>,
    refuse_remaining: Rc<Cell<u32>>,
}

impl InMemoryConnector {
    /// Every link opened so far, oldest first.
    pub fn links(&self) -> Vec<MemoryLinkHandle> {
        self.links.borrow().clone()
    }

    /// Most recently opened link.
    pub fn last_link(&self) -> Option<MemoryLinkHandle> {
        self.links.borrow().last().cloned()
    }

    /// Makes the next `count` open attempts fail synchronously.
    pub fn refuse_next(&self, count: u32) {
        self.refuse_remaining.set(count);
    }
}

impl SessionConnector for InMemoryConnector {
    type Link = MemoryLink;

    fn open(&mut self, url: &str) -> Result<Self::Link, LinkError> {
        let refuse = self.refuse_remaining.get();
        if refuse > 0 {
            self.refuse_remaining.set(refuse - 1);
            return Err(LinkError::Connect("refused by in-memory connector".to_string()));
        }
        let shared = Rc::new(RefCell::new(LinkShared {
            url: url.to_string(),
            ..LinkShared::default()
        }));
        self.links
            .borrow_mut()
            .push(MemoryLinkHandle(Rc::clone(&shared)));
        Ok(MemoryLink { shared })
    }
}
