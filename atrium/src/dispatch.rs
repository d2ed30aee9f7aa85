//! Opcode dispatch.
//!
//! Both transports decode a guest call into an [`atrium_api::Call`] and hand
//! it here together with a [`Session`]: the shared `Ui`, the calling app's
//! state and the host services. The result is a [`Reply`] whose `Out`
//! buffers follow the table's rule: at most `capacity` bytes are returned
//! with the full length, or −1 on failure.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard};

use atrium_api::{Arg, Call, Opcode, Reply, RetValue, fill_out};
use serde_json::json;
use trellis::{
    Align, Color, CursorShape, DialogAnchor, DropZones, FontProps, GuestPaint, GuestText, MAX_GRID_CELLS, NodeHash, RectF,
    Ui, Vec2f, WidgetStyle,
};

use crate::app::AppState;
use crate::download::{Fetcher, download};
use crate::jobs::JobRegistry;
use crate::mic::Recorder;
use crate::storage::HostStore;

/// Host services shared by every app.
#[derive(Clone)]
pub struct Services {
    pub host_store: Arc<Mutex<HostStore>>,
    pub jobs: JobRegistry,
    pub recorder: Recorder,
    pub fetcher: Arc<dyn Fetcher>,
}

impl Services {
    pub fn host_store(&self) -> MutexGuard<'_, HostStore> {
        match self.host_store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// What a call may touch.
pub struct Session<'a> {
    pub ui: &'a mut Ui,
    pub app: &'a mut AppState,
    pub services: &'a Services,
}

/// Typed access to validated arguments.
struct Args<'a>(&'a [Arg]);

impl<'a> Args<'a> {
    fn i(&self, n: usize) -> i64 {
        match self.0.get(n) {
            Some(Arg::I64(v)) => *v,
            _ => 0,
        }
    }

    fn f(&self, n: usize) -> f64 {
        match self.0.get(n) {
            Some(Arg::F64(v)) => *v,
            _ => 0.0,
        }
    }

    fn f32(&self, n: usize) -> f32 {
        self.f(n) as f32
    }

    fn bytes(&self, n: usize) -> &'a [u8] {
        match self.0.get(n) {
            Some(Arg::Bytes(b)) => b,
            _ => &[],
        }
    }

    fn str(&self, n: usize) -> Cow<'a, str> {
        String::from_utf8_lossy(self.bytes(n))
    }

    fn cap(&self, n: usize) -> u64 {
        match self.0.get(n) {
            Some(Arg::Out(c)) => *c,
            _ => 0,
        }
    }

    fn flag(&self, n: usize) -> bool {
        self.i(n) != 0
    }

    fn color(&self, n: usize) -> Color {
        Color::from_packed(self.i(n))
    }

    fn rect(&self, n: usize) -> RectF {
        RectF::new(self.f32(n), self.f32(n + 1), self.f32(n + 2), self.f32(n + 3))
    }

    fn point(&self, n: usize) -> Vec2f {
        Vec2f::new(self.f32(n), self.f32(n + 1))
    }

    fn align(&self, n: usize) -> (Align, Align) {
        (Align::from_i64(self.i(n)), Align::from_i64(self.i(n + 1)))
    }

    /// `-1` (or any negative) means "none".
    fn index(&self, n: usize) -> Option<usize> {
        usize::try_from(self.i(n)).ok()
    }

    /// A grid cell position, `Err` when it lies past the largest grid.
    fn cell(&self, n: usize) -> Result<Option<usize>, ()> {
        match self.index(n) {
            Some(pos) if pos >= MAX_GRID_CELLS => Err(()),
            pos => Ok(pos),
        }
    }

    /// Grid coordinate, saturated into `i32`.
    fn coord(&self, n: usize) -> i32 {
        self.i(n).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

/// Collects `Out` buffers in argument order.
struct Outs(Vec<Vec<u8>>);

impl Outs {
    fn put(&mut self, cap: u64, data: Option<&[u8]>) -> i64 {
        match data {
            Some(d) => {
                let (buf, len) = fill_out(d, cap);
                self.0.push(buf);
                len
            }
            None => {
                self.0.push(Vec::new());
                -1
            }
        }
    }
}

fn status(ok: bool) -> i64 {
    if ok { 0 } else { -1 }
}

fn bool_ret(b: bool) -> i64 {
    i64::from(b)
}

/// Run one call.
pub fn dispatch(s: &mut Session<'_>, call: &Call) -> Reply {
    let a = Args(&call.args);
    let mut outs = Outs(Vec::new());
    let ret = match call.op {
        Opcode::PaintTextWidth => RetValue::F64(text_width(s, &a)),
        Opcode::EnvTime => RetValue::F64(chrono::Utc::now().timestamp_micros() as f64 / 1e6),
        Opcode::Slider => RetValue::F64(s.ui.slider(a.f(0), a.f(1), a.f(2), a.f(3))),
        Opcode::JobProgress => RetValue::F64(s.services.jobs.progress(&a.str(0))),
        op => RetValue::I64(dispatch_int(s, op, &a, &mut outs)),
    };
    Reply { outs: outs.0, ret }
}

/// Run one call, turning a panic inside the host into a guest fault.
pub fn dispatch_guarded(s: &mut Session<'_>, call: &Call) -> crate::error::Result<Reply> {
    guarded(call.op.info().name, || dispatch(s, call))
}

fn guarded<T>(name: &str, f: impl FnOnce() -> T) -> crate::error::Result<T> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|panic| {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|m| m.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(call = name, %msg, "host call panicked");
        crate::error::HostError::Fault(format!("{name} panicked: {msg}"))
    })
}

fn dispatch_int(s: &mut Session<'_>, op: Opcode, a: &Args<'_>, outs: &mut Outs) -> i64 {
    match op {
        // Storage
        Opcode::StorageCommit
        | Opcode::StorageRollback
        | Opcode::StorageWrite
        | Opcode::StorageRead
        | Opcode::StorageRowCount
        | Opcode::StorageRowLen
        | Opcode::StorageRow => storage(s.app, op, a, outs),

        // Environment
        Opcode::EnvGet => {
            let key = a.str(0);
            let value = match s.services.host_store().env_get(&s.app.name, &key) {
                Ok(v) => v,
                Err(e) => {
                    s.app.log(format!("env_get {key}: {e:#}"));
                    None
                }
            };
            outs.put(a.cap(1), value.as_deref())
        }
        Opcode::EnvSet => {
            let key = a.str(0);
            match s.services.host_store().env_set(&s.app.name, &key, a.bytes(1)) {
                Ok(()) => 0,
                Err(e) => {
                    s.app.log(format!("env_set {key}: {e:#}"));
                    -1
                }
            }
        }

        // App folder files
        Opcode::BlobSize => match s.app.resolve(&a.str(0)).and_then(|p| std::fs::metadata(p).ok()) {
            Some(m) if m.is_file() => m.len() as i64,
            _ => -1,
        },
        Opcode::BlobRead => {
            let data = s.app.resolve(&a.str(0)).and_then(|p| std::fs::read(p).ok());
            outs.put(a.cap(1), data.as_deref())
        }

        // Layout
        Opcode::DivCol | Opcode::DivRow => {
            let Ok(Some(pos)) = a.cell(0) else {
                return -1;
            };
            let resize = a.f32(3);
            let resize = (resize > 0.0).then_some(resize);
            if op == Opcode::DivCol {
                s.ui.div_col(pos, a.f32(1), a.f32(2), resize);
            } else {
                s.ui.div_row(pos, a.f32(1), a.f32(2), resize);
            }
            0
        }
        Opcode::DivFill => {
            let (Ok(col), Ok(row)) = (a.cell(0), a.cell(1)) else {
                return -1;
            };
            s.ui.div_fill(col, row);
            0
        }
        Opcode::DivStart => {
            // Out-of-range coordinates are clamped so div_start/div_end stay paired.
            let (x, y, w, h) = (a.coord(0), a.coord(1), a.coord(2), a.coord(3));
            s.ui.div_start(x, y, w, h, &a.str(4)).raw() as i64
        }
        Opcode::DivEnd => {
            s.ui.div_end();
            0
        }
        Opcode::DivInfo => {
            let json = serde_json::to_vec(&s.ui.div_info()).ok();
            outs.put(a.cap(0), json.as_deref())
        }
        Opcode::DivSet => bool_ret(s.ui.div_set(&a.str(0), a.f(1))),
        Opcode::DivCursor => {
            s.ui.div_cursor(CursorShape::from_name(&a.str(0)));
            0
        }
        Opcode::DivTooltip => {
            s.ui.div_tooltip(&a.str(0));
            0
        }
        Opcode::DivDescribe => {
            s.ui.div_describe(&a.str(0));
            0
        }
        Opcode::DivDrag => {
            s.ui.div_drag(&a.str(0), a.i(1));
            0
        }
        Opcode::DivDrop => {
            let bits = a.i(2);
            let zones = DropZones { h: bits & 1 != 0, v: bits & 2 != 0, inside: bits & 4 != 0 };
            match s.ui.div_drop(&a.str(0), a.i(1), zones) {
                Some(ev) => {
                    let body = json!({
                        "src_index": ev.src_index,
                        "dst_index": ev.dst_index,
                        "aim": ev.aim as i64,
                        "src_source": ev.src_source.raw(),
                        "dst_source": ev.dst_source.raw(),
                    });
                    outs.put(a.cap(3), Some(body.to_string().as_bytes()))
                }
                None => outs.put(a.cap(3), Some(&[])),
            }
        }

        // Dialogs
        Opcode::DialogOpen => {
            let anchor = match a.i(1) {
                1 => DialogAnchor::Node(NodeHash::NONE),
                2 => DialogAnchor::Point(s.ui.pointer()),
                _ => DialogAnchor::None,
            };
            s.ui.dialog_open(&a.str(0), anchor);
            0
        }
        Opcode::DialogClose => bool_ret(s.ui.dialog_close(&a.str(0))),
        Opcode::DialogStart => bool_ret(s.ui.dialog_start(&a.str(0))),
        Opcode::DialogEnd => {
            s.ui.dialog_end();
            0
        }
        Opcode::DialogIsOpen => bool_ret(s.ui.dialog_is_open(&a.str(0))),

        // Paint
        Opcode::PaintRect
        | Opcode::PaintLine
        | Opcode::PaintBezier
        | Opcode::PaintCircle
        | Opcode::PaintFile
        | Opcode::PaintBlob
        | Opcode::PaintText
        | Opcode::PaintCursor
        | Opcode::PaintTooltip
        | Opcode::PaintBrush => match paint_command(s.app, op, a) {
            Some(cmd) => {
                s.ui.paint(cmd);
                0
            }
            None => -1,
        },

        // Widgets
        Opcode::Button => bool_ret(s.ui.button(&a.str(0), a.flag(1))),
        Opcode::Progress => {
            s.ui.progress(a.f(0));
            0
        }
        Opcode::Text => {
            s.ui.text_widget(&a.str(0), Align::from_i64(a.i(1)), a.flag(2), a.flag(3));
            0
        }
        Opcode::Edit => {
            let flags = a.i(1);
            let committed = s.ui.edit(&a.str(0), flags & 1 != 0, flags & 2 != 0);
            outs.put(a.cap(2), committed.as_deref().map(str::as_bytes))
        }
        Opcode::Combo => s.ui.combo(&a.str(0), a.i(1)),
        Opcode::Checkbox => bool_ret(s.ui.checkbox(&a.str(0), a.flag(1))),

        // Styles
        Opcode::StyleRegister => match serde_json::from_slice::<WidgetStyle>(a.bytes(0)) {
            Ok(style) => s.ui.style_register(style) as i64,
            Err(e) => {
                s.app.log(format!("style_register: {e}"));
                -1
            }
        },
        Opcode::StyleUse => bool_ret(a.index(0).is_some_and(|id| s.ui.style_use(id))),

        // Host services
        Opcode::RenderApp => {
            s.ui.delegate(&a.str(0));
            0
        }
        Opcode::DebugLine => {
            s.app.log(a.str(0));
            0
        }
        Opcode::SessionEnd => {
            s.app.session_end = true;
            0
        }

        // Jobs
        Opcode::JobDownload => job_download(s, a),
        Opcode::JobIsRunning => bool_ret(s.services.jobs.is_running(&a.str(0))),
        Opcode::JobInfo => {
            let info = s.services.jobs.info(&a.str(0));
            outs.put(a.cap(1), info.as_deref().map(str::as_bytes))
        }
        Opcode::JobStop => status(s.services.jobs.stop(&a.str(0))),

        // Microphone
        Opcode::MicStart => status(s.services.recorder.start(&a.str(0))),
        Opcode::MicIsRecording => bool_ret(s.services.recorder.is_recording(&a.str(0))),
        Opcode::MicStop => status(s.services.recorder.stop(&a.str(0))),
        Opcode::MicRead => {
            let wav = s.services.recorder.read(&a.str(0));
            outs.put(a.cap(1), wav.as_deref())
        }

        // Input and clipboard
        Opcode::InputTouch => {
            let json = serde_json::to_vec(&s.ui.div_touch()).ok();
            outs.put(a.cap(0), json.as_deref())
        }
        Opcode::InputKey => bool_ret(s.ui.key_pressed(&a.str(0))),
        Opcode::InputText => {
            let text = s.ui.typed_text().as_bytes().to_vec();
            outs.put(a.cap(0), Some(&text))
        }
        Opcode::ClipboardGet => {
            let text = s.ui.clipboard_get().as_bytes().to_vec();
            outs.put(a.cap(0), Some(&text))
        }
        Opcode::ClipboardSet => {
            s.ui.clipboard_set(&a.str(0));
            0
        }

        // Float returns are handled by `dispatch`.
        Opcode::PaintTextWidth | Opcode::EnvTime | Opcode::Slider | Opcode::JobProgress => 0,
    }
}

fn storage(app: &mut AppState, op: Opcode, a: &Args<'_>, outs: &mut Outs) -> i64 {
    let Some(db) = app.storage.as_mut() else {
        if op == Opcode::StorageRow {
            return outs.put(a.cap(2), None);
        }
        return -1;
    };
    let query = a.i(0) as u64;
    let result = match op {
        Opcode::StorageCommit => db.commit().map(|()| 0),
        Opcode::StorageRollback => db.rollback().map(|()| 0),
        Opcode::StorageWrite => db.write(&a.str(0)).map(|n| n as i64),
        Opcode::StorageRead => db.read(&a.str(0)).map(|h| h as i64),
        Opcode::StorageRowCount => Ok(db.row_count(query).map(|n| n as i64).unwrap_or(-1)),
        Opcode::StorageRowLen => {
            Ok(a.index(1).and_then(|row| db.row_len(query, row)).map(|n| n as i64).unwrap_or(-1))
        }
        Opcode::StorageRow => {
            let row = a.index(1).and_then(|row| db.row(query, row));
            return outs.put(a.cap(2), row);
        }
        _ => Ok(-1),
    };
    match result {
        Ok(v) => v,
        Err(e) => {
            app.log(format!("{}: {e}", op.name()));
            -1
        }
    }
}

fn text_width(s: &mut Session<'_>, a: &Args<'_>) -> f64 {
    let cell = s.ui.cell();
    let props = FontProps::new(a.str(1), a.i(3).clamp(100, 900) as u16, a.flag(4), (a.f32(2) * cell).max(1.0));
    let px = s.ui.text_width(&a.str(0), &props, a.flag(5));
    (px / cell) as f64
}

/// Little-endian `f64` pairs.
fn brush_points(bytes: &[u8]) -> Vec<Vec2f> {
    bytes
        .chunks_exact(16)
        .map(|c| {
            let mut x = [0u8; 8];
            let mut y = [0u8; 8];
            x.copy_from_slice(&c[..8]);
            y.copy_from_slice(&c[8..]);
            Vec2f::new(f64::from_le_bytes(x) as f32, f64::from_le_bytes(y) as f32)
        })
        .collect()
}

fn paint_command(app: &AppState, op: Opcode, a: &Args<'_>) -> Option<GuestPaint> {
    Some(match op {
        Opcode::PaintRect => GuestPaint::Rect { rect: a.rect(0), color: a.color(4), radius: a.f32(5), border: a.f32(6) },
        Opcode::PaintLine => {
            GuestPaint::Line { a: a.point(0), b: a.point(2), thickness: a.f32(4), color: a.color(5) }
        }
        Opcode::PaintBezier => GuestPaint::Bezier {
            points: [a.point(0), a.point(2), a.point(4), a.point(6)],
            thickness: a.f32(8),
            dash: a.f32(9),
            offset: a.f32(10),
            color: a.color(11),
        },
        Opcode::PaintCircle => {
            GuestPaint::Circle { center: a.point(0), radius: a.f32(2), thickness: a.f32(3), color: a.color(4) }
        }
        Opcode::PaintFile => {
            let path = app.resolve(&a.str(4))?;
            let scale = a.f32(7);
            GuestPaint::File {
                rect: a.rect(0),
                path: path.to_string_lossy().into_owned(),
                align: a.align(5),
                scale: (scale, scale),
                translate: (a.f32(8), a.f32(9)),
            }
        }
        Opcode::PaintBlob => {
            let scale = a.f32(7);
            GuestPaint::Blob {
                rect: a.rect(0),
                bytes: Arc::new(a.bytes(4).to_vec()),
                align: a.align(5),
                scale: (scale, scale),
                translate: (a.f32(8), a.f32(9)),
            }
        }
        Opcode::PaintText => GuestPaint::Text {
            rect: a.rect(0),
            text: GuestText {
                text: a.str(4).into_owned(),
                font: a.str(5).into_owned(),
                height: a.f32(6),
                weight: a.i(7).clamp(100, 900) as u16,
                italic: a.flag(8),
                color: a.color(9),
                align: a.align(10),
                formatting: a.flag(12),
                wrap: a.flag(13),
            },
        },
        Opcode::PaintCursor => GuestPaint::Cursor { rect: a.rect(0), color: a.color(4) },
        Opcode::PaintTooltip => GuestPaint::Tooltip { rect: a.rect(0), text: a.str(4).into_owned() },
        Opcode::PaintBrush => {
            GuestPaint::Brush { points: brush_points(a.bytes(0)), thickness: a.f32(1), color: a.color(2) }
        }
        _ => return None,
    })
}

fn job_download(s: &mut Session<'_>, a: &Args<'_>) -> i64 {
    let uid = a.str(0).into_owned();
    let url = a.str(1).into_owned();
    let Some(target) = s.app.resolve(&a.str(2)) else {
        s.app.log(format!("job_download {uid}: path leaves the app folder"));
        return -1;
    };
    let fetcher = s.services.fetcher.clone();
    let started = s.services.jobs.spawn(&uid, move |job| async move { download(&*fetcher, &url, &target, &job).await });
    bool_ret(started)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::Transfer;
    use crate::error::Result;
    use crate::mic::SilentDevice;
    use async_trait::async_trait;
    use std::time::Instant;
    use trellis::{InputFrame, Rect, SoftwareRenderer};

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn open(&self, _url: &str, _offset: u64) -> Result<Box<dyn Transfer>> {
            Err(crate::error::HostError::Download("offline".into()))
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

    fn call(s: &mut Session<'_>, op: Opcode, args: Vec<Arg>) -> Reply {
        dispatch(s, &Call::new(op, args).unwrap())
    }

    #[test]
    fn out_buffers_report_full_length() {
        let services = services();
        let mut ui = Ui::default();
        let mut app = AppState::new("t", "/nonexistent", None);
        let mut s = Session { ui: &mut ui, app: &mut app, services: &services };

        assert_eq!(call(&mut s, Opcode::EnvSet, vec![Arg::str("k"), Arg::str("hello world")]).ret, RetValue::I64(0));
        let reply = call(&mut s, Opcode::EnvGet, vec![Arg::str("k"), Arg::Out(5)]);
        assert_eq!(reply.ret, RetValue::I64(11));
        assert_eq!(reply.outs, vec![b"hello".to_vec()]);

        let missing = call(&mut s, Opcode::EnvGet, vec![Arg::str("nope"), Arg::Out(5)]);
        assert_eq!(missing.ret, RetValue::I64(-1));
        assert_eq!(missing.outs.len(), 1);
    }

    #[test]
    fn storage_without_database_fails_softly() {
        let services = services();
        let mut ui = Ui::default();
        let mut app = AppState::new("t", "/nonexistent", None);
        let mut s = Session { ui: &mut ui, app: &mut app, services: &services };
        assert_eq!(call(&mut s, Opcode::StorageWrite, vec![Arg::str("x")]).ret, RetValue::I64(-1));
        let row = call(&mut s, Opcode::StorageRow, vec![Arg::I64(1), Arg::I64(0), Arg::Out(8)]);
        assert_eq!((row.ret, row.outs.len()), (RetValue::I64(-1), 1));
    }

    #[test]
    fn debug_lines_and_session_end_reach_the_app() {
        let services = services();
        let mut ui = Ui::default();
        let mut app = AppState::new("t", "/nonexistent", None);
        let mut s = Session { ui: &mut ui, app: &mut app, services: &services };
        call(&mut s, Opcode::DebugLine, vec![Arg::str("hello")]);
        call(&mut s, Opcode::SessionEnd, vec![]);
        assert!(app.session_end);
        assert_eq!(app.log.lines().collect::<Vec<_>>(), vec!["hello"]);
    }

    #[test]
    fn blob_paths_cannot_escape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), [1u8, 2, 3]).unwrap();
        let services = services();
        let mut ui = Ui::default();
        let mut app = AppState::new("t", dir.path(), None);
        let mut s = Session { ui: &mut ui, app: &mut app, services: &services };
        assert_eq!(call(&mut s, Opcode::BlobSize, vec![Arg::str("data.bin")]).ret, RetValue::I64(3));
        assert_eq!(call(&mut s, Opcode::BlobSize, vec![Arg::str("../data.bin")]).ret, RetValue::I64(-1));
        let read = call(&mut s, Opcode::BlobRead, vec![Arg::str("data.bin"), Arg::Out(16)]);
        assert_eq!(read.outs, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn oversized_grid_arguments_fail_softly() {
        let services = services();
        let mut ui = Ui::default();
        let mut app = AppState::new("t", "/nonexistent", None);
        let mut s = Session { ui: &mut ui, app: &mut app, services: &services };
        s.ui.begin_frame(Rect::new(0, 0, 800, 600), InputFrame::default(), Instant::now());

        let huge = vec![Arg::I64(i64::MAX), Arg::F64(1.0), Arg::F64(0.0), Arg::F64(0.0)];
        assert_eq!(call(&mut s, Opcode::DivCol, huge).ret, RetValue::I64(-1));
        let fill = vec![Arg::I64(MAX_GRID_CELLS as i64), Arg::I64(-1)];
        assert_eq!(call(&mut s, Opcode::DivFill, fill).ret, RetValue::I64(-1));
        for pos in 0..2 {
            let col = vec![Arg::I64(pos), Arg::F64(1e8), Arg::F64(0.0), Arg::F64(0.0)];
            assert_eq!(call(&mut s, Opcode::DivCol, col).ret, RetValue::I64(0));
        }
        let far = vec![Arg::I64(i64::from(i32::MAX)), Arg::I64(0), Arg::I64(5), Arg::I64(i64::MAX), Arg::str("far")];
        assert_ne!(call(&mut s, Opcode::DivStart, far).ret, RetValue::I64(0));
        call(&mut s, Opcode::DivEnd, vec![]);

        let mut tex = SoftwareRenderer::new(4, 4);
        s.ui.finish(&mut tex, Instant::now());
        let far = s.ui.tree().iter().find(|(_, n)| n.name == "far").map(|(_, n)| n.rect);
        assert!(far.is_some_and(|r| r.w >= 0 && r.h >= 0));
    }

    #[test]
    fn panics_become_faults() {
        let err = guarded("div_col", || -> i64 { panic!("bad cell") });
        match err {
            Err(crate::error::HostError::Fault(msg)) => assert_eq!(msg, "div_col panicked: bad cell"),
            other => panic!("expected a fault, got {other:?}"),
        }
        assert_eq!(guarded("env_time", || 7).ok(), Some(7));
    }

    #[test]
    fn paint_text_reads_both_alignments() {
        let app = AppState::new("t", "/nonexistent", None);
        let mut args = vec![Arg::F64(0.0), Arg::F64(0.0), Arg::F64(1.0), Arg::F64(1.0)];
        args.extend([Arg::str("hi"), Arg::str(""), Arg::F64(1.0)]);
        // weight, italic, color, align x, align y, formatting, wrap
        args.extend([700, 1, -1, 1, 2, 0, 1].map(Arg::I64));
        let Some(GuestPaint::Text { text, .. }) = paint_command(&app, Opcode::PaintText, &Args(&args)) else {
            panic!("expected a text command");
        };
        assert_eq!(text.align, (Align::Center, Align::End));
        assert!(text.italic && text.wrap && !text.formatting);
        assert_eq!(text.weight, 700);
    }

    #[test]
    fn brush_points_decode_pairs() {
        let mut bytes = Vec::new();
        for v in [0.25f64, 0.5, 1.0, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.push(9);
        assert_eq!(brush_points(&bytes), vec![Vec2f::new(0.25, 0.5), Vec2f::new(1.0, 0.0)]);
    }
}
