//! In-memory transports and a predictable random source shared by the integration tests.

#![allow(dead_code)]

use std::{cell::RefCell, io, rc::Rc};

use monoio::{
    BufResult,
    buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut},
    io::{AsyncReadRent, AsyncWriteRent},
};
use monoio_wsclient::RandomSource;

/// Serves a fixed input in reads of at most `read_size` bytes and records every write.
#[derive(Debug)]
pub struct ScriptedStream {
    input: Vec<u8>,
    pos: usize,
    read_size: usize,
    fail_writes: bool,
    written: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedStream {
    pub fn new(input: impl Into<Vec<u8>>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = ScriptedStream {
            input: input.into(),
            pos: 0,
            read_size: usize::MAX,
            fail_writes: false,
            written: written.clone(),
        };
        (stream, written)
    }

    /// Limits every read to `read_size` bytes.
    pub fn read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size;
        self
    }

    /// Makes every write fail with `BrokenPipe`.
    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

impl AsyncReadRent for ScriptedStream {
    async fn read<T: IoBufMut>(&mut self, mut buf: T) -> BufResult<usize, T> {
        let rest = &self.input[self.pos..];
        let n = rest.len().min(buf.bytes_total()).min(self.read_size);
        // SAFETY: `write_ptr` is valid for `bytes_total` bytes and `n` does not exceed it.
        unsafe {
            std::ptr::copy_nonoverlapping(rest.as_ptr(), buf.write_ptr(), n);
            buf.set_init(n);
        }
        self.pos += n;
        (Ok(n), buf)
    }

    async fn readv<T: IoVecBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        (Err(io::ErrorKind::Unsupported.into()), buf)
    }
}

impl AsyncWriteRent for ScriptedStream {
    async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        if self.fail_writes {
            return (Err(io::ErrorKind::BrokenPipe.into()), buf);
        }
        // SAFETY: `read_ptr` is valid for `bytes_init` bytes.
        let data = unsafe { std::slice::from_raw_parts(buf.read_ptr(), buf.bytes_init()) };
        self.written.borrow_mut().extend_from_slice(data);
        (Ok(data.len()), buf)
    }

    async fn writev<T: IoVecBuf>(&mut self, buf_vec: T) -> BufResult<usize, T> {
        (Err(io::ErrorKind::Unsupported.into()), buf_vec)
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Yields 0, 1, 2, ... wrapping at 256.
#[derive(Debug, Default)]
pub struct Counter(u8);

impl RandomSource for Counter {
    fn next_byte(&mut self) -> u8 {
        let byte = self.0;
        self.0 = self.0.wrapping_add(1);
        byte
    }
}

/// An unmasked server frame.
pub fn server_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![first_byte];
    match payload.len() {
        n @ 0..=125 => frame.push(n as u8),
        n @ 126..=65535 => {
            frame.push(126);
            frame.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            frame.push(127);
            frame.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(payload);
    frame
}
