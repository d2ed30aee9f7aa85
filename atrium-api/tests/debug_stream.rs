//! Client and host halves of the debugger stream talking over a real socket.

use std::net::TcpListener;
use std::thread;

use atrium_api::{
    Arg, DebugClient, ENTRY_RENDER, ENTRY_SHUTDOWN, Incoming, Opcode, Reply, RetValue, fill_out, read_call, read_hello,
    write_entry, write_reply,
};

#[test]
fn render_frame_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let host = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let app = read_hello(&mut stream).unwrap();
        write_entry(&mut stream, ENTRY_RENDER).unwrap();
        let mut seen = Vec::new();
        loop {
            match read_call(&mut stream).unwrap() {
                Incoming::FrameEnd => break,
                Incoming::Call(call) => {
                    seen.push(call.op);
                    let reply = match call.op {
                        Opcode::EnvGet => {
                            let Arg::Out(cap) = call.args[1] else { panic!("out expected") };
                            let (data, len) = fill_out(b"a value longer than eight", cap);
                            Reply { outs: vec![data], ret: RetValue::I64(len) }
                        }
                        Opcode::PaintTextWidth => Reply { outs: vec![], ret: RetValue::F64(2.5) },
                        _ => Reply { outs: vec![], ret: RetValue::I64(7) },
                    };
                    write_reply(&mut stream, call.op, &reply).unwrap();
                }
            }
        }
        write_entry(&mut stream, ENTRY_SHUTDOWN).unwrap();
        (app, seen)
    });

    let mut client = DebugClient::connect(addr, "notes").unwrap();
    assert_eq!(client.wait_entry().unwrap(), ENTRY_RENDER);
    let hash = client
        .call_i64(Opcode::DivStart, vec![Arg::I64(0), Arg::I64(0), Arg::I64(1), Arg::I64(1), Arg::str("row")])
        .unwrap();
    assert_eq!(hash, 7);
    let value = client.call_string(Opcode::EnvGet, vec![Arg::str("key")]).unwrap();
    assert_eq!(value.as_deref(), Some("a value longer than eight"));
    let width = client
        .call_f64(Opcode::PaintTextWidth, vec![
            Arg::str("hi"),
            Arg::str("Inter"),
            Arg::F64(0.4),
            Arg::I64(400),
            Arg::I64(0),
            Arg::I64(0),
        ])
        .unwrap();
    assert_eq!(width, 2.5);
    client.end_frame().unwrap();
    assert_eq!(client.wait_entry().unwrap(), ENTRY_SHUTDOWN);

    let (app, seen) = host.join().unwrap();
    assert_eq!(app, "notes");
    assert_eq!(seen, vec![Opcode::DivStart, Opcode::EnvGet, Opcode::PaintTextWidth]);
}
