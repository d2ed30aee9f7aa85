//! Guest side of the debugger transport.
//!
//! A guest running natively (under a debugger) connects to the host, names
//! the app it stands in for, then serves entry calls: for each render entry
//! it issues opcode calls and ends the frame.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::codec::{Arg, Call, Reply, read_entry, read_reply, write_call, write_frame_end, write_hello};
use crate::error::Result;
use crate::opcode::{ArgType, Opcode};

/// First capacity tried for `Out` buffers.
const INITIAL_OUT: u64 = 256;

pub struct DebugClient<S: Read + Write = TcpStream> {
    stream: S,
}

impl DebugClient<TcpStream> {
    pub fn connect(addr: impl ToSocketAddrs, app: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::new(stream, app)
    }
}

impl<S: Read + Write> DebugClient<S> {
    pub fn new(mut stream: S, app: &str) -> Result<Self> {
        write_hello(&mut stream, app)?;
        Ok(Self { stream })
    }

    /// Block until the host asks for an entry point.
    pub fn wait_entry(&mut self) -> Result<u64> {
        read_entry(&mut self.stream)
    }

    /// Issue one call. An echo mismatch is logged and the reply kept.
    pub fn call(&mut self, op: Opcode, args: Vec<Arg>) -> Result<Reply> {
        let call = Call::new(op, args)?;
        write_call(&mut self.stream, &call)?;
        let (reply, echoed) = read_reply(&mut self.stream, op)?;
        if echoed != op.id() {
            tracing::warn!(sent = op.id(), echoed, "debugger reply check mismatch");
        }
        Ok(reply)
    }

    pub fn call_i64(&mut self, op: Opcode, args: Vec<Arg>) -> Result<i64> {
        Ok(self.call(op, args)?.ret.as_i64())
    }

    pub fn call_f64(&mut self, op: Opcode, args: Vec<Arg>) -> Result<f64> {
        Ok(self.call(op, args)?.ret.as_f64())
    }

    /// Call an opcode with one `Out` buffer, growing the buffer until the
    /// whole result fits. `args` omits the `Out` argument. `None` when the
    /// host reports failure.
    pub fn call_out(&mut self, op: Opcode, args: Vec<Arg>) -> Result<Option<Vec<u8>>> {
        let slot = op.info().args.iter().position(|a| *a == ArgType::Out);
        let mut cap = INITIAL_OUT;
        loop {
            let mut full = args.clone();
            if let Some(i) = slot {
                full.insert(i.min(full.len()), Arg::Out(cap));
            }
            let reply = self.call(op, full)?;
            let len = reply.ret.as_i64();
            if len < 0 {
                return Ok(None);
            }
            if len as u64 <= cap {
                return Ok(reply.outs.into_iter().next());
            }
            cap = len as u64;
        }
    }

    pub fn call_string(&mut self, op: Opcode, args: Vec<Arg>) -> Result<Option<String>> {
        Ok(self.call_out(op, args)?.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    pub fn end_frame(&mut self) -> Result<()> {
        write_frame_end(&mut self.stream)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
