use super::{Transport, TransportError};
use std::sync::mpsc::{channel, Receiver, Sender};

/// One end of an in-process, bidirectional frame channel.
pub struct ChannelTransport {
    tx: Option<Sender<Vec<u8>>>,
    rx: Receiver<Vec<u8>>,
}

/// Create two connected endpoints.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = channel();
    let (b_tx, a_rx) = channel();
    (
        ChannelTransport {
            tx: Some(a_tx),
            rx: a_rx,
        },
        ChannelTransport {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Disconnected)?;
        tx.send(frame.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.rx.recv().map_err(|_| TransportError::Disconnected)
    }

    fn close(&mut self) {
        self.tx = None;
    }
}
