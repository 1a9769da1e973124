//! Length-prefixed framing over byte streams.
//!
//! Each frame is a 4-byte little-endian length followed by that many payload
//! bytes. End-of-stream before a length prefix is a clean disconnect.
use super::{Transport, TransportError, MAX_FRAME_BYTES};
use std::io::{BufReader, BufWriter, Read, Write};

pub struct StreamTransport<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: Option<BufWriter<W>>,
}

impl<R: Read, W: Write> StreamTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Some(BufWriter::new(writer)),
        }
    }
}

impl<R: Read, W: Write> Transport for StreamTransport<R, W> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        let writer = self.writer.as_mut().ok_or(TransportError::Disconnected)?;
        writer.write_all(&(frame.len() as u32).to_le_bytes())?;
        writer.write_all(frame)?;
        writer.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            match self.reader.read(&mut len_buf[filled..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge(len));
        }
        let mut frame = vec![0u8; len];
        self.reader.read_exact(&mut frame)?;
        Ok(frame)
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}
