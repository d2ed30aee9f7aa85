//! Native guests driving the host over the debugger port.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use atrium::app::{AppState, AppStatus};
use atrium::dispatch::Services;
use atrium::download::{Fetcher, Transfer};
use atrium::jobs::JobRegistry;
use atrium::mic::{Recorder, SilentDevice};
use atrium::platform::HeadlessPlatform;
use atrium::runtime::{DebugRuntime, DebugServer, GuestRuntime};
use atrium::storage::{AppStorage, HostStore};
use atrium::{Host, HostConfig, HostError};
use atrium_api::{Arg, DebugClient, ENTRY_RENDER, ENTRY_SHUTDOWN, Opcode};
use trellis::{InputFrame, Rect, Ui};

struct NoNetwork;

#[async_trait]
impl Fetcher for NoNetwork {
    async fn open(&self, url: &str, _offset: u64) -> atrium::Result<Box<dyn Transfer>> {
        Err(HostError::Download(format!("offline: {url}")))
    }
}

fn services() -> Services {
    Services {
        host_store: Arc::new(Mutex::new(HostStore::open_in_memory().unwrap())),
        jobs: JobRegistry::new().unwrap(),
        recorder: Recorder::new(Arc::new(SilentDevice)),
        fetcher: Arc::new(NoNetwork),
    }
}

fn wait_pending(server: &DebugServer) -> (String, std::net::TcpStream) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(first) = server.take_pending().into_iter().next() {
            return first;
        }
        assert!(Instant::now() < deadline, "debugger never connected");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn storage_round_trip_over_the_wire() {
    let server = DebugServer::bind(0).unwrap();
    let addr = server.local_addr();

    let client = thread::spawn(move || {
        let mut c = DebugClient::connect(addr, "notes").unwrap();
        assert_eq!(c.wait_entry().unwrap(), ENTRY_RENDER);
        let changed = c
            .call_i64(Opcode::StorageWrite, vec![Arg::str("CREATE TABLE t(a, b); INSERT INTO t VALUES (42, 'x')")])
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(c.call_i64(Opcode::StorageCommit, vec![]).unwrap(), 0);
        let query = c.call_i64(Opcode::StorageRead, vec![Arg::str("SELECT a, b FROM t")]).unwrap();
        assert_eq!(c.call_i64(Opcode::StorageRowCount, vec![Arg::I64(query)]).unwrap(), 1);
        let row = c.call_string(Opcode::StorageRow, vec![Arg::I64(query), Arg::I64(0)]).unwrap();
        c.end_frame().unwrap();
        assert_eq!(c.wait_entry().unwrap(), ENTRY_SHUTDOWN);
        row
    });

    let (name, stream) = wait_pending(&server);
    assert_eq!(name, "notes");
    let dir = tempfile::tempdir().unwrap();
    let app = AppState::new("notes", dir.path(), Some(AppStorage::open_in_memory().unwrap()));
    let mut runtime = DebugRuntime::new(stream, app).unwrap();

    let mut ui = Ui::default();
    ui.begin_frame(Rect::new(0, 0, 200, 100), InputFrame::default(), Instant::now());
    runtime.render(&mut ui, &services()).unwrap();
    runtime.shutdown();

    assert_eq!(client.join().unwrap().as_deref(), Some(r#"[42,"x"]"#));
}

#[test]
fn silent_debugger_times_out() {
    let server = DebugServer::bind(0).unwrap();
    let addr = server.local_addr();
    let client = thread::spawn(move || {
        let mut c = DebugClient::connect(addr, "slow").unwrap();
        // Read the entry, never answer, and hang up once the host gives up.
        let _ = c.wait_entry();
        let _ = c.wait_entry();
    });

    let (_, stream) = wait_pending(&server);
    let dir = tempfile::tempdir().unwrap();
    let mut runtime = DebugRuntime::new(stream, AppState::new("slow", dir.path(), None)).unwrap();
    let mut ui = Ui::default();
    ui.begin_frame(Rect::new(0, 0, 200, 100), InputFrame::default(), Instant::now());

    assert!(runtime.render(&mut ui, &services()).is_err());
    runtime.shutdown();
    client.join().unwrap();
}

#[test]
fn debugger_takes_over_and_hands_back() {
    let data = tempfile::tempdir().unwrap();
    let mut config = HostConfig::with_data_dir(data.path());
    config.debug_port = Some(0);
    let mut host = Host::with_services(config, HeadlessPlatform::new(160, 120), services()).unwrap();
    let addr = host.debugger_addr().expect("listener bound");

    let client = thread::spawn(move || {
        let mut c = DebugClient::connect(addr, "main").unwrap();
        assert_eq!(c.wait_entry().unwrap(), ENTRY_RENDER);
        c.call_i64(Opcode::DebugLine, vec![Arg::str("attached")]).unwrap();
        c.end_frame().unwrap();
        // Hang up: the host falls back to the (missing) module.
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !host.app("main").is_some_and(|slot| slot.is_debugged()) {
        assert!(Instant::now() < deadline, "debugger never attached");
        host.step().unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    let rt = host.app_mut("main").and_then(|slot| slot.runtime_mut()).unwrap();
    assert!(rt.state().log.lines().any(|l| l == "attached"));
    client.join().unwrap();

    host.step().unwrap();
    let slot = host.app("main").unwrap();
    assert!(!slot.is_debugged());
    assert!(matches!(slot.status, AppStatus::Dead(_)));
}

#[test]
fn stalled_handshake_does_not_block_others() {
    let server = DebugServer::bind(0).unwrap();
    let addr = server.local_addr();
    // Connects but never sends its hello.
    let _stalled = std::net::TcpStream::connect(addr).unwrap();
    thread::sleep(Duration::from_millis(20));

    let client = thread::spawn(move || DebugClient::connect(addr, "second").map(drop));
    let (name, _stream) = wait_pending(&server);
    assert_eq!(name, "second");
    client.join().unwrap().unwrap();
}

#[test]
fn dropped_server_stops_listening() {
    let server = DebugServer::bind(0).unwrap();
    let addr = server.local_addr();
    drop(server);
    assert!(std::net::TcpStream::connect(addr).is_err());
}
