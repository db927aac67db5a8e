//! A handler that reports every hook call over a channel.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use netframe::{AddressKey, Connection, Error, Handler, HandlerFactory, HandshakeError, Message};

use super::TIMEOUT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(AddressKey),
    Message(AddressKey, Message),
    Close(AddressKey),
    Rejected(AddressKey, HandshakeError),
}

/// Factory for recording handlers. Optional behaviors are switched on with
/// the builder methods.
#[derive(Clone)]
pub struct Recorder {
    events: Sender<Event>,
    echo: bool,
    fail_on: Option<&'static str>,
    close_on_reject: bool,
}

impl Recorder {
    pub fn new() -> (Self, Events) {
        let (tx, rx) = channel::unbounded();
        let recorder = Self {
            events: tx,
            echo: false,
            fail_on: None,
            close_on_reject: false,
        };
        (recorder, Events(rx))
    }

    /// Send every message straight back.
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Fail the connection when this text arrives.
    pub fn fail_on(mut self, text: &'static str) -> Self {
        self.fail_on = Some(text);
        self
    }

    /// Close the connection after a rejected handshake.
    pub fn close_on_reject(mut self) -> Self {
        self.close_on_reject = true;
        self
    }
}

impl HandlerFactory for Recorder {
    fn make_handler(&self, _address: &AddressKey) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

impl Handler for Recorder {
    fn on_open(&mut self, conn: &Connection) {
        let _ = self.events.send(Event::Open(conn.address()));
    }

    fn on_message(&mut self, conn: &Connection, message: Message) {
        let _ = self.events.send(Event::Message(conn.address(), message.clone()));
        if self.fail_on.is_some() && message.as_text() == self.fail_on {
            conn.fail(&Error::Io("scripted failure".into()));
            return;
        }
        if self.echo {
            let _ = conn.send(message);
        }
    }

    fn on_close(&mut self, conn: &Connection) {
        let _ = self.events.send(Event::Close(conn.address()));
    }

    fn on_handshake_rejected(&mut self, conn: &Connection, error: &HandshakeError) {
        let _ = self.events.send(Event::Rejected(conn.address(), error.clone()));
        if self.close_on_reject {
            conn.close();
        }
    }
}

/// Receiving end of a [`Recorder`].
pub struct Events(Receiver<Event>);

impl Events {
    pub fn next(&self) -> Event {
        self.0
            .recv_timeout(TIMEOUT)
            .expect("timed out waiting for a handler event")
    }

    pub fn expect_open(&self) -> AddressKey {
        match self.next() {
            Event::Open(addr) => addr,
            other => panic!("expected Open, got {other:?}"),
        }
    }

    pub fn expect_message(&self) -> (AddressKey, Message) {
        match self.next() {
            Event::Message(addr, message) => (addr, message),
            other => panic!("expected Message, got {other:?}"),
        }
    }

    pub fn expect_text(&self, text: &str) -> AddressKey {
        let (addr, message) = self.expect_message();
        assert_eq!(message, Message::text(text));
        addr
    }

    pub fn expect_close(&self) -> AddressKey {
        match self.next() {
            Event::Close(addr) => addr,
            other => panic!("expected Close, got {other:?}"),
        }
    }

    /// Assert nothing arrives for `period`.
    pub fn assert_quiet(&self, period: Duration) {
        if let Ok(event) = self.0.recv_timeout(period) {
            panic!("unexpected event {event:?}");
        }
    }
}
