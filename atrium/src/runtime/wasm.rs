//! In-process WebAssembly guests.
//!
//! Every opcode is imported as `env._sa_<name>` with a signature derived
//! from the table: `F64` arguments stay floats, everything else is an
//! `i64`. `Bytes` and `Out` arguments are handles into the guest's exported
//! linear memory.

use std::path::Path;

use atrium_api::{
    Arg, ArgType, Call, MAX_PAYLOAD, OPCODES, OpcodeInfo, RetType, RetValue, WASM_INIT_EXPORT, WASM_MODULE,
    WASM_RENDER_EXPORT, unpack_handle,
};
use trellis::Ui;
use wasmtime::{Caller, Engine, Extern, FuncType, Instance, Linker, Memory, Module, Store, TypedFunc, Val, ValType};

use super::GuestRuntime;
use crate::app::AppState;
use crate::dispatch::{Services, Session, dispatch_guarded};
use crate::error::{HostError, Result};

/// Data of a guest's store. The `Ui` is lent for the duration of a render.
pub struct GuestCtx {
    app: AppState,
    services: Services,
    ui: Option<Ui>,
}

pub struct WasmRuntime {
    store: Store<GuestCtx>,
    render: TypedFunc<(), ()>,
    init: Option<TypedFunc<(), ()>>,
}

fn fault(e: impl std::fmt::Display) -> HostError {
    HostError::Fault(e.to_string())
}

fn val_type(kind: ArgType) -> ValType {
    match kind {
        ArgType::F64 => ValType::F64,
        ArgType::I64 | ArgType::Bytes | ArgType::Out => ValType::I64,
    }
}

/// Register one host function per opcode.
pub fn link_opcodes(engine: &Engine, linker: &mut Linker<GuestCtx>) -> Result<()> {
    for info in OPCODES {
        let params = info.args.iter().map(|a| val_type(*a));
        let result = match info.ret {
            RetType::I64 => ValType::I64,
            RetType::F64 => ValType::F64,
        };
        let ty = FuncType::new(engine, params, [result]);
        linker
            .func_new(WASM_MODULE, &info.wasm_name(), ty, move |mut caller, params, results| {
                host_call(&mut caller, info, params, results)
            })
            .map_err(fault)?;
    }
    Ok(())
}

fn guest_memory(caller: &mut Caller<'_, GuestCtx>) -> wasmtime::Result<Memory> {
    caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest exports no memory"))
}

/// A handle must name bytes inside the guest's memory, and no more than one payload.
fn check_range(
    caller: &Caller<'_, GuestCtx>,
    memory: &Memory,
    info: &OpcodeInfo,
    ptr: u32,
    len: u32,
) -> wasmtime::Result<()> {
    let end = u64::from(ptr) + u64::from(len);
    let size = memory.data_size(caller) as u64;
    if u64::from(len) > MAX_PAYLOAD || end > size {
        return Err(wasmtime::Error::msg(format!(
            "{}: handle {ptr}+{len} outside guest memory of {size} bytes",
            info.name
        )));
    }
    Ok(())
}

fn host_call(
    caller: &mut Caller<'_, GuestCtx>,
    info: &'static OpcodeInfo,
    params: &[Val],
    results: &mut [Val],
) -> wasmtime::Result<()> {
    let memory = guest_memory(caller)?;
    let mut args = Vec::with_capacity(params.len());
    let mut out_ptrs = Vec::new();
    for (kind, val) in info.args.iter().zip(params) {
        match kind {
            ArgType::I64 => args.push(Arg::I64(val.i64().unwrap_or(0))),
            ArgType::F64 => args.push(Arg::F64(val.f64().unwrap_or(0.0))),
            ArgType::Bytes => {
                let (ptr, len) = unpack_handle(val.i64().unwrap_or(0));
                check_range(caller, &memory, info, ptr, len)?;
                let mut buf = vec![0u8; len as usize];
                memory.read(&*caller, ptr as usize, &mut buf)?;
                args.push(Arg::Bytes(buf));
            }
            ArgType::Out => {
                let (ptr, cap) = unpack_handle(val.i64().unwrap_or(0));
                check_range(caller, &memory, info, ptr, cap)?;
                out_ptrs.push(ptr as usize);
                args.push(Arg::Out(cap as u64));
            }
        }
    }
    let call = Call { op: info.op, args };

    let reply = {
        let ctx = caller.data_mut();
        let Some(ui) = ctx.ui.as_mut() else {
            return Err(wasmtime::Error::msg(format!("{} called outside a frame", info.name)));
        };
        let mut session = Session { ui, app: &mut ctx.app, services: &ctx.services };
        dispatch_guarded(&mut session, &call)?
    };

    for (ptr, data) in out_ptrs.into_iter().zip(&reply.outs) {
        memory.write(&mut *caller, ptr, data)?;
    }
    if let Some(slot) = results.first_mut() {
        *slot = match reply.ret {
            RetValue::I64(v) => Val::I64(v),
            RetValue::F64(v) => Val::F64(v.to_bits()),
        };
    }
    Ok(())
}

impl WasmRuntime {
    /// Compile and instantiate `module`. `_sa_init` runs before the first
    /// render, when a `Ui` is available.
    pub fn load(engine: &Engine, module: &Path, app: AppState, services: Services) -> Result<Self> {
        let bytes = std::fs::read(module)?;
        Self::from_bytes(engine, &bytes, app, services)
    }

    /// Instantiate from module bytes (binary or text format).
    pub fn from_bytes(engine: &Engine, bytes: &[u8], app: AppState, services: Services) -> Result<Self> {
        let module = Module::new(engine, bytes).map_err(fault)?;
        let mut linker = Linker::new(engine);
        link_opcodes(engine, &mut linker)?;
        let mut store = Store::new(engine, GuestCtx { app, services, ui: None });
        let instance: Instance = linker.instantiate(&mut store, &module).map_err(fault)?;
        if instance.get_memory(&mut store, "memory").is_none() {
            return Err(fault("guest exports no memory"));
        }
        let render = instance.get_typed_func::<(), ()>(&mut store, WASM_RENDER_EXPORT).map_err(fault)?;
        let init = instance.get_typed_func::<(), ()>(&mut store, WASM_INIT_EXPORT).ok();
        tracing::info!(app = %store.data().app.name, "wasm module instantiated");
        Ok(Self { store, render, init })
    }
}

impl GuestRuntime for WasmRuntime {
    fn kind(&self) -> &'static str {
        "wasm"
    }

    fn state(&mut self) -> &mut AppState {
        &mut self.store.data_mut().app
    }

    fn render(&mut self, ui: &mut Ui, _services: &Services) -> Result<()> {
        self.store.data_mut().app.begin_frame();
        self.store.data_mut().ui = Some(std::mem::take(ui));
        let mut result = Ok(());
        if let Some(init) = self.init.take() {
            result = init.call(&mut self.store, ());
        }
        if result.is_ok() {
            result = self.render.call(&mut self.store, ());
        }
        if let Some(back) = self.store.data_mut().ui.take() {
            *ui = back;
        }
        result.map_err(|e| HostError::Fault(format!("{e:#}")))
    }

    fn shutdown(&mut self) {
        self.store.data_mut().ui = None;
    }
}
