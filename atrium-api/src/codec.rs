//! Little-endian frame codec of the debugger transport.
//!
//! ```text
//! connect   guest → host   name: u64 len + utf-8
//! entry     host → guest   u64 (1 = render, 2 = shutdown)
//! call      guest → host   opcode u64, then per argument:
//!                            I64/F64  8 bytes (f64 as bits)
//!                            Bytes    u64 len + data
//!                            Out      u64 capacity
//! reply     host → guest   per Out: u64 len + data, return 8 bytes,
//!                          opcode echoed as u64
//! frame end guest → host   u64 1000
//! ```

use std::io::{Read, Write};

use crate::error::{ProtocolError, Result};
use crate::opcode::{ArgType, FRAME_END, Opcode, OpcodeInfo, RetType};

/// Largest accepted byte payload.
pub const MAX_PAYLOAD: u64 = 64 << 20;

/// One argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    I64(i64),
    F64(f64),
    Bytes(Vec<u8>),
    /// Capacity of a destination buffer.
    Out(u64),
}

impl Arg {
    pub fn kind(&self) -> ArgType {
        match self {
            Arg::I64(_) => ArgType::I64,
            Arg::F64(_) => ArgType::F64,
            Arg::Bytes(_) => ArgType::Bytes,
            Arg::Out(_) => ArgType::Out,
        }
    }

    pub fn str(s: &str) -> Self {
        Arg::Bytes(s.as_bytes().to_vec())
    }
}

/// Return value of an opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetValue {
    I64(i64),
    F64(f64),
}

impl RetValue {
    pub fn to_bits(self) -> u64 {
        match self {
            RetValue::I64(v) => v as u64,
            RetValue::F64(v) => v.to_bits(),
        }
    }

    pub fn from_bits(ret: RetType, bits: u64) -> Self {
        match ret {
            RetType::I64 => RetValue::I64(bits as i64),
            RetType::F64 => RetValue::F64(f64::from_bits(bits)),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            RetValue::I64(v) => v,
            RetValue::F64(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            RetValue::I64(v) => v as f64,
            RetValue::F64(v) => v,
        }
    }
}

/// A decoded guest call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Opcode,
    pub args: Vec<Arg>,
}

impl Call {
    /// Build a call, checking the arguments against the table.
    pub fn new(op: Opcode, args: Vec<Arg>) -> Result<Self> {
        let info = op.info();
        if info.args.len() != args.len() {
            return Err(ProtocolError::ArgCount { opcode: info.id, expected: info.args.len(), got: args.len() });
        }
        if let Some(index) = info.args.iter().zip(&args).position(|(t, a)| *t != a.kind()) {
            return Err(ProtocolError::ArgType { opcode: info.id, index });
        }
        Ok(Self { op, args })
    }

    pub fn info(&self) -> &'static OpcodeInfo {
        self.op.info()
    }
}

/// What the host sends back for a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Contents of each `Out` buffer, already cut to capacity.
    pub outs: Vec<Vec<u8>>,
    pub ret: RetValue,
}

/// What a guest sends next.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Call(Call),
    FrameEnd,
}

pub fn write_u64(w: &mut impl Write, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> Result<()> {
    write_u64(w, data.len() as u64)?;
    w.write_all(data)?;
    Ok(())
}

pub fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>> {
    let len = read_u64(r)?;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut data = vec![0u8; len as usize];
    r.read_exact(&mut data)?;
    Ok(data)
}

/// Guest handshake: the app name the debugger stands in for.
pub fn write_hello(w: &mut impl Write, app: &str) -> Result<()> {
    write_bytes(w, app.as_bytes())?;
    w.flush()?;
    Ok(())
}

pub fn read_hello(r: &mut impl Read) -> Result<String> {
    Ok(String::from_utf8_lossy(&read_bytes(r)?).into_owned())
}

pub fn write_entry(w: &mut impl Write, entry: u64) -> Result<()> {
    write_u64(w, entry)?;
    w.flush()?;
    Ok(())
}

pub fn read_entry(r: &mut impl Read) -> Result<u64> {
    read_u64(r)
}

pub fn write_call(w: &mut impl Write, call: &Call) -> Result<()> {
    write_u64(w, call.op.id())?;
    for arg in &call.args {
        match arg {
            Arg::I64(v) => write_u64(w, *v as u64)?,
            Arg::F64(v) => write_u64(w, v.to_bits())?,
            Arg::Bytes(b) => write_bytes(w, b)?,
            Arg::Out(cap) => write_u64(w, *cap)?,
        }
    }
    w.flush()?;
    Ok(())
}

pub fn write_frame_end(w: &mut impl Write) -> Result<()> {
    write_u64(w, FRAME_END)?;
    w.flush()?;
    Ok(())
}

/// Read the next call (or the frame end). Arguments are decoded by the
/// table's signature for the opcode.
pub fn read_call(r: &mut impl Read) -> Result<Incoming> {
    let id = read_u64(r)?;
    if id == FRAME_END {
        return Ok(Incoming::FrameEnd);
    }
    let op = Opcode::try_from(id).map_err(ProtocolError::UnknownOpcode)?;
    let mut args = Vec::with_capacity(op.info().args.len());
    for kind in op.info().args {
        args.push(match kind {
            ArgType::I64 => Arg::I64(read_u64(r)? as i64),
            ArgType::F64 => Arg::F64(f64::from_bits(read_u64(r)?)),
            ArgType::Bytes => Arg::Bytes(read_bytes(r)?),
            ArgType::Out => {
                let cap = read_u64(r)?;
                if cap > MAX_PAYLOAD {
                    return Err(ProtocolError::TooLarge(cap));
                }
                Arg::Out(cap)
            }
        });
    }
    Ok(Incoming::Call(Call { op, args }))
}

pub fn write_reply(w: &mut impl Write, op: Opcode, reply: &Reply) -> Result<()> {
    for out in &reply.outs {
        write_bytes(w, out)?;
    }
    write_u64(w, reply.ret.to_bits())?;
    write_u64(w, op.id())?;
    w.flush()?;
    Ok(())
}

/// Read a reply to `op`. Returns the reply and the echoed opcode id.
pub fn read_reply(r: &mut impl Read, op: Opcode) -> Result<(Reply, u64)> {
    let info = op.info();
    let mut outs = Vec::with_capacity(info.out_count());
    for _ in 0..info.out_count() {
        outs.push(read_bytes(r)?);
    }
    let ret = RetValue::from_bits(info.ret, read_u64(r)?);
    let echoed = read_u64(r)?;
    Ok((Reply { outs, ret }, echoed))
}

/// Fill an `Out` buffer: at most `cap` bytes are sent, the full length is
/// returned.
pub fn fill_out(data: &[u8], cap: u64) -> (Vec<u8>, i64) {
    let n = data.len().min(cap as usize);
    (data[..n].to_vec(), data.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn call_wire_layout() {
        let call = Call::new(Opcode::DivStart, vec![
            Arg::I64(1),
            Arg::I64(0),
            Arg::I64(2),
            Arg::I64(1),
            Arg::str("row"),
        ])
        .unwrap();
        let mut buf = Vec::new();
        write_call(&mut buf, &call).unwrap();
        assert_eq!(&buf[..8], &22u64.to_le_bytes());
        assert_eq!(&buf[8..16], &1u64.to_le_bytes());
        assert_eq!(&buf[40..48], &3u64.to_le_bytes());
        assert_eq!(&buf[48..], b"row");
        assert_eq!(read_call(&mut Cursor::new(buf)).unwrap(), Incoming::Call(call));
    }

    #[test]
    fn frame_end_and_closed_stream() {
        let mut buf = Vec::new();
        write_frame_end(&mut buf).unwrap();
        let mut r = Cursor::new(buf);
        assert_eq!(read_call(&mut r).unwrap(), Incoming::FrameEnd);
        assert!(matches!(read_call(&mut r), Err(ProtocolError::Closed)));
    }

    #[test]
    fn unknown_opcode_rejected() {
        let buf = 12345u64.to_le_bytes().to_vec();
        assert!(matches!(read_call(&mut Cursor::new(buf)), Err(ProtocolError::UnknownOpcode(12345))));
    }

    #[test]
    fn reply_carries_outs_then_return_then_echo() {
        let (data, len) = fill_out(b"hello world", 5);
        assert_eq!((data.as_slice(), len), (&b"hello"[..], 11));
        let reply = Reply { outs: vec![data], ret: RetValue::I64(len) };
        let mut buf = Vec::new();
        write_reply(&mut buf, Opcode::EnvGet, &reply).unwrap();
        assert_eq!(buf.len(), 8 + 5 + 8 + 8);
        let (back, echoed) = read_reply(&mut Cursor::new(buf), Opcode::EnvGet).unwrap();
        assert_eq!(back, reply);
        assert_eq!(echoed, Opcode::EnvGet.id());
    }

    #[test]
    fn argument_types_checked() {
        assert!(matches!(
            Call::new(Opcode::Progress, vec![Arg::I64(1)]),
            Err(ProtocolError::ArgType { index: 0, .. })
        ));
        assert!(matches!(Call::new(Opcode::Progress, vec![]), Err(ProtocolError::ArgCount { .. })));
    }

    #[test]
    fn float_return_bits() {
        let v = RetValue::from_bits(RetType::F64, 0.25f64.to_bits());
        assert_eq!(v.as_f64(), 0.25);
        assert_eq!(RetValue::I64(-1).to_bits(), u64::MAX);
    }
}
