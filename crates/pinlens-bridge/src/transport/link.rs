//! In-process message link modeling the page's cross-context transport.
//!
//! The two halves of a pair share a window id and a page origin; a delivery
//! carries both so the receiving side can reject anything that did not come
//! from its own window at its own origin. There is no shared memory between
//! the halves, only these queues.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::types::{BridgeError, BridgeResult};

static NEXT_WINDOW: AtomicU64 = AtomicU64::new(1);

/// A message in flight, tagged with transport-level provenance.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub origin: String,
    pub window: u64,
    pub payload: Value,
}

/// One half of a two-party link.
#[derive(Debug)]
pub struct LinkEndpoint {
    origin: String,
    window: u64,
    peer: mpsc::UnboundedSender<Delivery>,
    inbox: mpsc::UnboundedReceiver<Delivery>,
}

impl LinkEndpoint {
    /// Build a connected pair sharing one window id, delivering to `origin`
    /// only.
    pub fn pair(origin: &str) -> (LinkEndpoint, LinkEndpoint) {
        let window = NEXT_WINDOW.fetch_add(1, Ordering::Relaxed);
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = LinkEndpoint {
            origin: origin.to_string(),
            window,
            peer: tx_b,
            inbox: rx_a,
        };
        let b = LinkEndpoint {
            origin: origin.to_string(),
            window,
            peer: tx_a,
            inbox: rx_b,
        };
        (a, b)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Post a payload to the peer, stamped with this half's origin and
    /// window.
    pub fn post(&self, payload: Value) -> BridgeResult<()> {
        self.peer
            .send(Delivery {
                origin: self.origin.clone(),
                window: self.window,
                payload,
            })
            .map_err(|_| BridgeError::ChannelClosed)
    }

    /// Receive the next delivery; `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.inbox.recv().await
    }
}
