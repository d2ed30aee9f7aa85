//! The host: platform events → apps → `Ui` → present.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use trellis::{
    Align, Color, DirFontLoader, FixedFontLoader, FontLoader, GuestPaint, GuestText, ImageCrateDecoder, InputFrame, Key,
    NodeHash, Rect, RectF, Settings, SoftwareRenderer, Ui,
};

use crate::app::{AppSlot, AppState, AppStatus, MISSING_MODULE_TEXT};
use crate::config::{HostConfig, WindowGeometry};
use crate::dispatch::Services;
use crate::download::HttpFetcher;
use crate::error::HostError;
use crate::jobs::JobRegistry;
use crate::mic::{Recorder, SilentDevice};
use crate::package;
use crate::platform::Platform;
use crate::runtime::{DebugRuntime, DebugServer, GuestRuntime, WasmRuntime};
use crate::storage::HostStore;

/// Deepest chain of apps rendering apps.
pub const MAX_DELEGATION_DEPTH: usize = 4;

/// Sleep between frames when nothing needs a redraw.
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// DPI factor of one zoom step.
const ZOOM_STEP: f32 = 1.1;

pub struct Host<P: Platform> {
    config: HostConfig,
    platform: P,
    ui: Ui,
    renderer: SoftwareRenderer,
    engine: wasmtime::Engine,
    services: Services,
    apps: HashMap<String, AppSlot>,
    debugger: Option<DebugServer>,
    frames: u64,
    quit: bool,
}

impl<P: Platform> Host<P> {
    /// Create a host with the default services (HTTP downloads, silent
    /// microphone, `host.sqlite` under the data directory).
    pub fn new(config: HostConfig, platform: P) -> Result<Self> {
        let host_store = HostStore::open(&config.host_db())?;
        let services = Services {
            host_store: Arc::new(Mutex::new(host_store)),
            jobs: JobRegistry::new()?,
            recorder: Recorder::new(Arc::new(SilentDevice)),
            fetcher: Arc::new(HttpFetcher::new(config.timeout)?),
        };
        Self::with_services(config, platform, services)
    }

    pub fn with_services(config: HostConfig, platform: P, services: Services) -> Result<Self> {
        let fonts: Box<dyn FontLoader> = match &config.fonts {
            Some(dir) => Box::new(DirFontLoader::new(dir.clone())),
            None => Box::new(FixedFontLoader::new(8.0)),
        };
        let mut ui = Ui::new(fonts, Arc::new(ImageCrateDecoder));
        ui.set_dpi(platform.dpi());
        ui.load_settings(load_settings(&config, &services));

        let debugger = match config.debug_port {
            Some(port) => match DebugServer::bind(port) {
                Ok(server) => Some(server),
                Err(e) => {
                    tracing::warn!(port, "debugger listener disabled: {e}");
                    None
                }
            },
            None => None,
        };
        let (w, h) = platform.size();
        tracing::info!(data = ?config.data_dir, app = %config.app, "host ready");
        Ok(Self {
            config,
            platform,
            ui,
            renderer: SoftwareRenderer::new(w, h),
            engine: wasmtime::Engine::default(),
            services,
            apps: HashMap::new(),
            debugger,
            frames: 0,
            quit: false,
        })
    }

    pub fn ui(&self) -> &Ui {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut Ui {
        &mut self.ui
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn renderer(&self) -> &SoftwareRenderer {
        &self.renderer
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn app(&self, name: &str) -> Option<&AppSlot> {
        self.apps.get(name)
    }

    pub fn app_mut(&mut self, name: &str) -> Option<&mut AppSlot> {
        self.apps.get_mut(name)
    }

    pub fn debugger_addr(&self) -> Option<std::net::SocketAddr> {
        self.debugger.as_ref().map(DebugServer::local_addr)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run until the window closes, an app ends the session or the frame
    /// limit is reached.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.config.frames.is_some_and(|limit| self.frames >= limit) {
                break;
            }
            match self.step()? {
                None => break,
                Some(true) => {}
                Some(false) => {
                    if self.config.frames.is_none() {
                        std::thread::sleep(IDLE_SLEEP);
                    }
                }
            }
        }
        if let Some(path) = self.config.screenshot.clone() {
            self.renderer.save_png(&path).with_context(|| format!("Failed to save screenshot {:?}", path))?;
            tracing::info!(?path, "screenshot saved");
        }
        self.shutdown()
    }

    /// One frame. `None` once the host should stop, otherwise whether
    /// another frame is wanted right away.
    pub fn step(&mut self) -> Result<Option<bool>> {
        if self.quit {
            return Ok(None);
        }
        let Some(input) = self.platform.poll() else {
            return Ok(None);
        };
        let now = Instant::now();
        let active = !input.is_idle();
        let screenshot = self.host_keys(&input);

        self.accept_debuggers();
        self.reload_changed();

        let (w, h) = self.platform.size();
        self.renderer.resize(w, h);
        self.ui.set_clipboard_source(self.platform.clipboard());
        self.ui.begin_frame(Rect::new(0, 0, w as i32, h as i32), input, now);

        let root = self.config.app.clone();
        self.render_tree(&root);

        let out = self.ui.finish(&mut self.renderer, now);
        self.renderer.render(&out.items, &mut self.ui.text, now);
        self.platform.present(&self.renderer)?;
        self.platform.set_cursor(out.cursor);
        if let Some(text) = out.clipboard.as_deref().or(out.outline.as_deref()) {
            self.platform.set_clipboard(text);
        }
        if out.dpi_steps != 0 {
            let dpi = self.ui.dpi() * ZOOM_STEP.powi(out.dpi_steps);
            self.ui.set_dpi(dpi);
        }
        if screenshot {
            self.save_screenshot();
        }

        if self.apps.values_mut().filter_map(AppSlot::runtime_mut).any(|rt| rt.state().session_end) {
            tracing::info!("session end requested");
            self.quit = true;
        }
        self.frames += 1;
        Ok(Some(active || out.redraw))
    }

    /// Keys the host handles itself. Returns true when a screenshot was asked for.
    fn host_keys(&mut self, input: &InputFrame) -> bool {
        let mut screenshot = false;
        for ev in &input.keys {
            match ev.key {
                Key::F(2) => self.ui.stats.visible = !self.ui.stats.visible,
                Key::F(8) => screenshot = true,
                Key::F(11) => {
                    let on = !self.platform.is_fullscreen();
                    self.platform.set_fullscreen(on);
                }
                Key::Char('+') | Key::Char('=') if ev.mods.ctrl => self.ui.set_dpi(self.ui.dpi() * ZOOM_STEP),
                Key::Char('-') if ev.mods.ctrl => self.ui.set_dpi(self.ui.dpi() / ZOOM_STEP),
                Key::Char('0') if ev.mods.ctrl => self.ui.set_dpi(self.platform.dpi()),
                Key::Escape if ev.mods.ctrl && ev.mods.shift => self.ui.close_all_dialogs(),
                _ => {}
            }
        }
        screenshot
    }

    fn save_screenshot(&self) {
        let name = format!("screenshot_{}.png", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let path = self.config.data_dir.join(name);
        match self.renderer.save_png(&path) {
            Ok(()) => tracing::info!(?path, "screenshot saved"),
            Err(e) => tracing::warn!(?path, "screenshot failed: {e}"),
        }
    }

    fn storage_path(&self, app: &str) -> PathBuf {
        self.config.data_dir.join("storage").join(format!("{app}.sqlite"))
    }

    fn load_slot(&mut self, name: &str) {
        if self.apps.contains_key(name) {
            return;
        }
        let apps_dir = self.config.apps_dir();
        let dir = package::resolve(&apps_dir, name).unwrap_or_else(|e| {
            tracing::warn!(app = name, "package extraction failed: {e:#}");
            apps_dir.join(name)
        });
        let mut slot = AppSlot::new(name, dir);
        self.start_wasm(&mut slot);
        self.apps.insert(name.to_string(), slot);
    }

    fn start_wasm(&self, slot: &mut AppSlot) {
        let state = AppState::open(&slot.name, &slot.dir, &self.storage_path(&slot.name));
        match WasmRuntime::load(&self.engine, &slot.module_path(), state, self.services.clone()) {
            Ok(rt) => slot.set_runtime(Box::new(rt)),
            Err(e) => {
                tracing::warn!(app = %slot.name, "cannot load module: {e}");
                slot.status = AppStatus::Dead(MISSING_MODULE_TEXT.into());
            }
        }
    }

    fn accept_debuggers(&mut self) {
        let Some(server) = &self.debugger else {
            return;
        };
        for (name, stream) in server.take_pending() {
            self.load_slot(&name);
            let state = AppState::open(&name, &self.config.apps_dir().join(&name), &self.storage_path(&name));
            let runtime = match DebugRuntime::new(stream, state) {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!(app = name, "debugger setup failed: {e}");
                    continue;
                }
            };
            if let Some(slot) = self.apps.get_mut(&name) {
                slot.attach_debugger(Box::new(runtime));
            }
        }
    }

    fn reload_changed(&mut self) {
        let names: Vec<String> = self.apps.iter().filter(|(_, s)| s.wants_reload()).map(|(n, _)| n.clone()).collect();
        for name in names {
            if let Some(mut slot) = self.apps.remove(&name) {
                tracing::info!(app = name, "module changed, reloading");
                self.start_wasm(&mut slot);
                self.apps.insert(name, slot);
            }
        }
    }

    /// Render `root`, then every app delegated into a node, breadth first.
    fn render_tree(&mut self, root: &str) {
        let mut seen = HashSet::new();
        self.render_app(root);
        let mut queue = self.new_delegations(&mut seen, 1);
        while let Some((hash, app, depth)) = queue.pop_front() {
            if depth > MAX_DELEGATION_DEPTH {
                tracing::warn!(app, depth, "render delegation too deep, skipped");
                continue;
            }
            if !self.ui.enter(hash) {
                continue;
            }
            self.render_app(&app);
            self.ui.leave();
            queue.extend(self.new_delegations(&mut seen, depth + 1));
        }
    }

    fn new_delegations(&self, seen: &mut HashSet<NodeHash>, depth: usize) -> VecDeque<(NodeHash, String, usize)> {
        self.ui
            .delegations()
            .into_iter()
            .filter(|(hash, _)| seen.insert(*hash))
            .map(|(hash, app)| (hash, app, depth))
            .collect()
    }

    fn render_app(&mut self, name: &str) {
        self.load_slot(name);
        let Some(slot) = self.apps.get_mut(name) else {
            return;
        };
        let result = match slot.runtime_mut() {
            Some(rt) => Some(rt.render(&mut self.ui, &self.services)),
            None => None,
        };
        match result {
            Some(Ok(())) => {
                let lines = self.ui.take_debug_lines();
                if let Some(rt) = slot.runtime_mut() {
                    for line in lines {
                        rt.state().log(line);
                    }
                }
            }
            // A debugger stream is out of step after any error.
            Some(Err(e)) if slot.is_debugged() => {
                tracing::warn!(app = name, "debugger session ended: {e}");
                slot.detach_debugger();
            }
            Some(Err(HostError::Fault(e))) => slot.fault(e),
            Some(Err(e)) => slot.kill(e.to_string()),
            None => {
                let text = match &slot.status {
                    AppStatus::Faulted { error, .. } => format!("Error: {error}"),
                    AppStatus::Dead(reason) => reason.clone(),
                    AppStatus::Running => String::new(),
                };
                self.ui.paint(placeholder(text));
            }
        }
    }

    /// Persist settings and stop every app.
    pub fn shutdown(&mut self) -> Result<()> {
        self.services.jobs.stop_all();
        for slot in self.apps.values_mut() {
            slot.shutdown();
        }
        let settings = self.ui.snapshot_settings();
        settings.save(&self.config.layout_file())?;
        let json = settings.to_json()?;
        self.services.host_store().gui_save(&self.config.app, &json)?;
        let (width, height) = self.platform.size();
        WindowGeometry { width, height, ..WindowGeometry::load(&self.config.window_file()) }
            .save(&self.config.window_file())?;
        tracing::info!(frames = self.frames, "host stopped");
        Ok(())
    }
}

/// Layout settings: the app's GUI blob for this machine, else `Root.json`.
fn load_settings(config: &HostConfig, services: &Services) -> Settings {
    let blob = services.host_store().gui_load(&config.app).ok().flatten();
    if let Some(settings) = blob.and_then(|b| Settings::from_json(&b).ok()) {
        return settings;
    }
    Settings::load(&config.layout_file()).unwrap_or_else(|e| {
        tracing::warn!("ignoring layout settings: {e}");
        Settings::new()
    })
}

fn placeholder(text: String) -> GuestPaint {
    GuestPaint::Text {
        rect: RectF::new(0.0, 0.0, 1.0, 1.0),
        text: GuestText {
            text,
            font: "Inter".into(),
            height: 0.4,
            weight: 400,
            italic: false,
            color: Color::RED,
            align: (Align::Center, Align::Center),
            formatting: false,
            wrap: true,
        },
    }
}
