//! Whole frames through the host with WebAssembly guests in text format.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use atrium::app::{AppStatus, MISSING_MODULE_TEXT};
use atrium::dispatch::Services;
use atrium::download::{Fetcher, Transfer};
use atrium::jobs::JobRegistry;
use atrium::mic::{Recorder, SilentDevice};
use atrium::platform::{HeadlessPlatform, Platform};
use atrium::storage::HostStore;
use atrium::{Host, HostConfig, HostError};
use trellis::{InputFrame, Key, KeyEvent};

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

fn host(data: &Path) -> Host<HeadlessPlatform> {
    Host::with_services(HostConfig::with_data_dir(data), HeadlessPlatform::new(320, 200), services()).unwrap()
}

fn install(data: &Path, app: &str, wat: &str) {
    let dir = data.join("apps").join(app);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("main.wasm"), wat).unwrap();
}

fn log_lines(host: &mut Host<HeadlessPlatform>, app: &str) -> Vec<String> {
    let rt = host.app_mut(app).and_then(|slot| slot.runtime_mut()).expect("app running");
    rt.state().log.lines().map(str::to_string).collect()
}

/// Imports shared by the guests below. Memory holds "hello" at 16,
/// "panel" at 32 and "child" at 48.
const PRELUDE: &str = r#"
  (import "env" "_sa_div_start" (func $div_start (param i64 i64 i64 i64 i64) (result i64)))
  (import "env" "_sa_div_end" (func $div_end (result i64)))
  (import "env" "_sa_debug_line" (func $debug_line (param i64) (result i64)))
  (import "env" "_sa_session_end" (func $session_end (result i64)))
  (import "env" "_sa_render_app" (func $render_app (param i64) (result i64)))
  (memory (export "memory") 1)
  (data (i32.const 16) "hello")
  (data (i32.const 32) "panel")
  (data (i32.const 48) "child")
"#;

const HELLO: i64 = (16 << 32) | 5;
const PANEL: i64 = (32 << 32) | 5;
const CHILD: i64 = (48 << 32) | 5;

fn module(body: &str) -> String {
    format!("(module {PRELUDE} {body})")
}

fn greeter() -> String {
    module(&format!(
        r#"(func (export "_sa_render")
             (drop (call $div_start (i64.const 0) (i64.const 0) (i64.const 1) (i64.const 1) (i64.const {PANEL})))
             (drop (call $div_end))
             (drop (call $debug_line (i64.const {HELLO}))))"#
    ))
}

#[test]
fn guest_renders_and_logs() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &greeter());
    let mut host = host(data.path());

    assert!(host.step().unwrap().is_some());
    assert!(host.step().unwrap().is_some());

    assert!(matches!(host.app("main").unwrap().status, AppStatus::Running));
    assert_eq!(log_lines(&mut host, "main"), vec!["hello", "hello"]);
    assert_eq!(host.platform().presented(), 2);
}

#[test]
fn missing_module_paints_placeholder() {
    let data = tempfile::tempdir().unwrap();
    let mut host = host(data.path());

    host.step().unwrap();

    match &host.app("main").unwrap().status {
        AppStatus::Dead(reason) => assert_eq!(reason, MISSING_MODULE_TEXT),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(host.app_mut("main").unwrap().runtime_mut().is_none());
}

#[test]
fn session_end_stops_the_loop() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &module(r#"(func (export "_sa_render") (drop (call $session_end)))"#));
    let mut host = host(data.path());

    host.run().unwrap();

    assert_eq!(host.frames(), 1);
    assert!(data.path().join("layouts").join("Root.json").is_file());
    assert!(data.path().join("window.json").is_file());
}

#[test]
fn frame_limit_bounds_the_run() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &greeter());
    let shot = data.path().join("last.png");
    let mut config = HostConfig::with_data_dir(data.path());
    config.frames = Some(3);
    config.screenshot = Some(shot.clone());
    let mut host = Host::with_services(config, HeadlessPlatform::new(64, 48), services()).unwrap();

    host.run().unwrap();

    assert_eq!(host.frames(), 3);
    assert_eq!(host.platform().presented(), 3);
    assert!(shot.is_file());
}

#[test]
fn delegated_app_renders_inside_node() {
    let data = tempfile::tempdir().unwrap();
    install(
        data.path(),
        "main",
        &module(&format!(
            r#"(func (export "_sa_render")
                 (drop (call $div_start (i64.const 0) (i64.const 0) (i64.const 1) (i64.const 1) (i64.const {PANEL})))
                 (drop (call $render_app (i64.const {CHILD})))
                 (drop (call $div_end)))"#
        )),
    );
    install(data.path(), "child", &greeter());
    let mut host = host(data.path());

    host.step().unwrap();

    assert!(matches!(host.app("child").unwrap().status, AppStatus::Running));
    assert_eq!(log_lines(&mut host, "child"), vec!["hello"]);
}

#[test]
fn self_delegation_is_bounded() {
    let data = tempfile::tempdir().unwrap();
    let looping = module(&format!(
        r#"(data (i32.const 64) "main")
           (func (export "_sa_render")
             (drop (call $div_start (i64.const 0) (i64.const 0) (i64.const 1) (i64.const 1) (i64.const {PANEL})))
             (drop (call $render_app (i64.const {})))
             (drop (call $div_end)))"#,
        (64i64 << 32) | 4
    ));
    install(data.path(), "main", &looping);
    let mut host = host(data.path());

    assert!(host.step().unwrap().is_some());
    assert!(host.step().unwrap().is_some());
}

#[test]
fn trap_faults_and_changed_module_reloads() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &module(r#"(func (export "_sa_render") unreachable)"#));
    let mut host = host(data.path());

    host.step().unwrap();
    assert!(matches!(host.app("main").unwrap().status, AppStatus::Faulted { .. }));

    // Still faulted while the module is unchanged.
    host.step().unwrap();
    assert!(matches!(host.app("main").unwrap().status, AppStatus::Faulted { .. }));

    let module_path = data.path().join("apps").join("main").join("main.wasm");
    std::fs::write(&module_path, greeter()).unwrap();
    let later = SystemTime::now() + Duration::from_secs(5);
    std::fs::File::options().write(true).open(&module_path).unwrap().set_modified(later).unwrap();

    host.step().unwrap();
    assert!(matches!(host.app("main").unwrap().status, AppStatus::Running));
    assert_eq!(log_lines(&mut host, "main"), vec!["hello"]);
}

#[test]
fn handles_outside_guest_memory_fault() {
    let huge: i64 = (16 << 32) | 0xFFFF_FFFF;
    let past_end: i64 = (65_530 << 32) | 16;
    for handle in [huge, past_end] {
        let data = tempfile::tempdir().unwrap();
        let body = format!(r#"(func (export "_sa_render") (drop (call $debug_line (i64.const {handle}))))"#);
        install(data.path(), "main", &module(&body));
        let mut host = host(data.path());

        host.step().unwrap();
        match &host.app("main").unwrap().status {
            AppStatus::Faulted { error, .. } => assert!(error.contains("outside guest memory"), "{error}"),
            other => panic!("expected a fault, got {other:?}"),
        }
    }
}

#[test]
fn host_keys_toggle_fullscreen_and_zoom() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &greeter());
    let mut host = host(data.path());
    let base = host.ui().dpi();

    let mut input = InputFrame::default();
    input.keys.push(KeyEvent::new(Key::F(11)));
    input.keys.push(KeyEvent::ctrl(Key::Char('+')));
    host.platform_mut().push_input(input);

    assert_eq!(host.step().unwrap(), Some(true));
    assert!(host.platform().is_fullscreen());
    assert!(host.ui().dpi() > base);

    let mut input = InputFrame::default();
    input.keys.push(KeyEvent::ctrl(Key::Char('0')));
    host.platform_mut().push_input(input);
    host.step().unwrap();
    assert_eq!(host.ui().dpi(), base);
}

#[test]
fn closed_window_ends_run() {
    let data = tempfile::tempdir().unwrap();
    install(data.path(), "main", &greeter());
    let mut host = host(data.path());
    host.platform_mut().close();

    assert_eq!(host.step().unwrap(), None);
    host.run().unwrap();
    assert_eq!(host.frames(), 0);
}
