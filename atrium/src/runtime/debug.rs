//! Guests running under a debugger.
//!
//! A native build of an app connects over TCP, names the app it stands in
//! for and then serves entry calls. While connected it replaces the app's
//! WebAssembly module.

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atrium_api::{ENTRY_RENDER, ENTRY_SHUTDOWN, Incoming, read_call, read_hello, write_entry, write_reply};
use tokio::net::TcpListener;
use tokio::sync::watch;
use trellis::Ui;

use super::GuestRuntime;
use crate::app::AppState;
use crate::dispatch::{Services, Session, dispatch_guarded};
use crate::error::Result;

/// Longest wait for a debugger's next message within a frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

type Pending = Arc<Mutex<Vec<(String, TcpStream)>>>;

/// Accepts debugger connections on its own `tokio` runtime.
pub struct DebugServer {
    addr: SocketAddr,
    pending: Pending,
    cancel: watch::Sender<bool>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl DebugServer {
    /// Listen on `127.0.0.1:port` (0 picks a free port).
    pub fn bind(port: u16) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("atrium-debug")
            .enable_all()
            .build()?;
        let listener = runtime.block_on(TcpListener::bind(("127.0.0.1", port)))?;
        let addr = listener.local_addr()?;
        let pending: Pending = Arc::default();
        let (cancel, cancelled) = watch::channel(false);
        runtime.spawn(accept_loop(listener, pending.clone(), cancelled));
        tracing::info!(%addr, "debugger listener ready");
        Ok(Self { addr, pending, cancel, runtime: Some(runtime) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections that completed their handshake since the last call.
    pub fn take_pending(&self) -> Vec<(String, TcpStream)> {
        match self.pending.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Accept until cancelled. Each handshake runs on a blocking task so a
/// silent client never holds up the next one.
async fn accept_loop(listener: TcpListener, pending: Pending, mut cancelled: watch::Receiver<bool>) {
    loop {
        let stream = tokio::select! {
            _ = cancelled.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "debugger connecting");
                    stream
                }
                Err(e) => {
                    tracing::warn!("debugger accept failed: {e}");
                    continue;
                }
            },
        };
        let pending = pending.clone();
        tokio::task::spawn_blocking(move || match handshake(stream) {
            Ok((app, stream)) => {
                tracing::info!(app, "debugger connected");
                match pending.lock() {
                    Ok(mut guard) => guard.push((app, stream)),
                    Err(poisoned) => poisoned.into_inner().push((app, stream)),
                }
            }
            Err(e) => tracing::warn!("debugger handshake failed: {e}"),
        });
    }
    tracing::debug!("debugger listener closed");
}

/// Hand the socket over to blocking I/O and read the app name.
fn handshake(stream: tokio::net::TcpStream) -> Result<(String, TcpStream)> {
    let mut stream = stream.into_std()?;
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(FRAME_TIMEOUT))?;
    stream.set_nodelay(true)?;
    let app = read_hello(&mut stream)?;
    Ok((app, stream))
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        let _ = self.cancel.send(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(100));
        }
    }
}

/// An app driven by a connected debugger.
pub struct DebugRuntime {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    app: AppState,
}

impl DebugRuntime {
    pub fn new(stream: TcpStream, app: AppState) -> Result<Self> {
        stream.set_read_timeout(Some(FRAME_TIMEOUT))?;
        let writer = stream.try_clone()?;
        Ok(Self { reader: BufReader::new(stream), writer, app })
    }
}

impl GuestRuntime for DebugRuntime {
    fn kind(&self) -> &'static str {
        "debug"
    }

    fn state(&mut self) -> &mut AppState {
        &mut self.app
    }

    fn render(&mut self, ui: &mut Ui, services: &Services) -> Result<()> {
        self.app.begin_frame();
        write_entry(&mut self.writer, ENTRY_RENDER)?;
        let mut calls = 0usize;
        loop {
            match read_call(&mut self.reader)? {
                Incoming::FrameEnd => break,
                Incoming::Call(call) => {
                    let mut session = Session { ui: &mut *ui, app: &mut self.app, services };
                    let reply = dispatch_guarded(&mut session, &call)?;
                    write_reply(&mut self.writer, call.op, &reply)?;
                    calls += 1;
                }
            }
        }
        tracing::debug!(app = %self.app.name, calls, "debugger frame done");
        Ok(())
    }

    fn shutdown(&mut self) {
        let _ = write_entry(&mut self.writer, ENTRY_SHUTDOWN);
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}
