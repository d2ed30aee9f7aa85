//! The opcode table.
//!
//! Each entry names an operation, its numeric id, its argument types and
//! its return type. The WebAssembly transport imports `_sa_<name>` with a
//! signature derived from the entry; the debugger transport decodes
//! arguments in the declared order.

/// Argument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    I64,
    F64,
    /// Byte string supplied by the guest.
    Bytes,
    /// Destination buffer the host fills (capacity supplied by the guest).
    Out,
}

/// Return kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetType {
    I64,
    F64,
}

/// Host → guest entry points on the debugger stream.
pub const ENTRY_RENDER: u64 = 1;
pub const ENTRY_SHUTDOWN: u64 = 2;

/// Guest → host marker ending a debugger frame.
pub const FRAME_END: u64 = 1000;

/// Prefix of imported host functions.
pub const WASM_IMPORT_PREFIX: &str = "_sa_";
pub const WASM_MODULE: &str = "env";
pub const WASM_RENDER_EXPORT: &str = "_sa_render";
pub const WASM_INIT_EXPORT: &str = "_sa_init";

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub op: Opcode,
    pub id: u64,
    pub name: &'static str,
    pub args: &'static [ArgType],
    pub ret: RetType,
}

impl OpcodeInfo {
    /// Number of `Out` buffers in the signature.
    pub fn out_count(&self) -> usize {
        self.args.iter().filter(|a| **a == ArgType::Out).count()
    }

    pub fn wasm_name(&self) -> String {
        format!("{WASM_IMPORT_PREFIX}{}", self.name)
    }
}

macro_rules! opcodes {
    (
        $(
            $variant:ident = $id:literal, $name:literal, ( $( $arg:ident ),* ) -> $ret:ident;
        )*
    ) => {
        #[repr(u64)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $variant = $id, )*
        }

        /// Every opcode, in declaration order.
        pub const OPCODES: &[OpcodeInfo] = &[
            $(
                OpcodeInfo {
                    op: Opcode::$variant,
                    id: $id,
                    name: $name,
                    args: &[ $( ArgType::$arg ),* ],
                    ret: RetType::$ret,
                },
            )*
        ];

        impl Opcode {
            pub const ALL: &'static [Self] = &[ $( Self::$variant ),* ];

            pub fn id(self) -> u64 {
                self as u64
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )*
                }
            }
        }

        impl TryFrom<u64> for Opcode {
            type Error = u64;

            fn try_from(value: u64) -> Result<Self, Self::Error> {
                match value {
                    $( $id => Ok(Self::$variant), )*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    // Storage (SQL per app)
    StorageCommit = 1, "storage_commit", () -> I64;
    StorageRollback = 2, "storage_rollback", () -> I64;
    StorageWrite = 3, "storage_write", (Bytes) -> I64;
    StorageRead = 4, "storage_read", (Bytes) -> I64;
    StorageRowCount = 5, "storage_row_count", (I64) -> I64;
    StorageRowLen = 6, "storage_row_len", (I64, I64) -> I64;
    StorageRow = 7, "storage_row", (I64, I64, Out) -> I64;

    // Environment
    EnvGet = 8, "env_get", (Bytes, Out) -> I64;
    EnvSet = 9, "env_set", (Bytes, Bytes) -> I64;
    EnvTime = 10, "env_time", () -> F64;

    // Files of the app folder
    BlobSize = 11, "blob_size", (Bytes) -> I64;
    BlobRead = 12, "blob_read", (Bytes, Out) -> I64;

    // Layout
    DivCol = 20, "div_col", (I64, F64, F64, F64) -> I64;
    DivRow = 21, "div_row", (I64, F64, F64, F64) -> I64;
    DivStart = 22, "div_start", (I64, I64, I64, I64, Bytes) -> I64;
    DivEnd = 23, "div_end", () -> I64;
    DivInfo = 24, "div_info", (Out) -> I64;
    DivSet = 25, "div_set", (Bytes, F64) -> I64;
    DivFill = 26, "div_fill", (I64, I64) -> I64;
    DivCursor = 31, "div_cursor", (Bytes) -> I64;
    DivTooltip = 32, "div_tooltip", (Bytes) -> I64;
    DivDescribe = 33, "div_describe", (Bytes) -> I64;
    DivDrag = 35, "div_drag", (Bytes, I64) -> I64;
    DivDrop = 36, "div_drop", (Bytes, I64, I64, Out) -> I64;

    // Dialogs
    DialogOpen = 27, "dialog_open", (Bytes, I64) -> I64;
    DialogClose = 28, "dialog_close", (Bytes) -> I64;
    DialogStart = 29, "dialog_start", (Bytes) -> I64;
    DialogEnd = 30, "dialog_end", () -> I64;
    DialogIsOpen = 34, "dialog_is_open", (Bytes) -> I64;

    // Paint (fractions of the node rect; sizes in cells; colors 0xRRGGBBAA)
    PaintRect = 40, "paint_rect", (F64, F64, F64, F64, I64, F64, F64) -> I64;
    PaintLine = 41, "paint_line", (F64, F64, F64, F64, F64, I64) -> I64;
    PaintBezier = 42, "paint_bezier", (F64, F64, F64, F64, F64, F64, F64, F64, F64, F64, F64, I64) -> I64;
    PaintCircle = 43, "paint_circle", (F64, F64, F64, F64, I64) -> I64;
    PaintFile = 44, "paint_file", (F64, F64, F64, F64, Bytes, I64, I64, F64, F64, F64) -> I64;
    PaintBlob = 45, "paint_blob", (F64, F64, F64, F64, Bytes, I64, I64, F64, F64, F64) -> I64;
    PaintText = 46, "paint_text", (F64, F64, F64, F64, Bytes, Bytes, F64, I64, I64, I64, I64, I64, I64, I64) -> I64;
    PaintTextWidth = 47, "paint_text_width", (Bytes, Bytes, F64, I64, I64, I64) -> F64;
    PaintCursor = 48, "paint_cursor", (F64, F64, F64, F64, I64) -> I64;
    PaintTooltip = 49, "paint_tooltip", (F64, F64, F64, F64, Bytes) -> I64;
    PaintBrush = 50, "paint_brush", (Bytes, F64, I64) -> I64;

    // Composite widgets
    Button = 60, "button", (Bytes, I64) -> I64;
    Slider = 61, "slider", (F64, F64, F64, F64) -> F64;
    Progress = 62, "progress", (F64) -> I64;
    Text = 63, "text", (Bytes, I64, I64, I64) -> I64;
    Edit = 64, "edit", (Bytes, I64, Out) -> I64;
    Combo = 65, "combo", (Bytes, I64) -> I64;
    Checkbox = 66, "checkbox", (Bytes, I64) -> I64;

    // Styles
    StyleRegister = 70, "style_register", (Bytes) -> I64;
    StyleUse = 71, "style_use", (I64) -> I64;

    // Host services
    RenderApp = 75, "render_app", (Bytes) -> I64;
    DebugLine = 80, "debug_line", (Bytes) -> I64;
    SessionEnd = 81, "session_end", () -> I64;

    // Jobs
    JobDownload = 85, "job_download", (Bytes, Bytes, Bytes) -> I64;
    JobIsRunning = 86, "job_is_running", (Bytes) -> I64;
    JobProgress = 87, "job_progress", (Bytes) -> F64;
    JobInfo = 88, "job_info", (Bytes, Out) -> I64;
    JobStop = 89, "job_stop", (Bytes) -> I64;

    // Microphone
    MicStart = 90, "mic_start", (Bytes) -> I64;
    MicIsRecording = 91, "mic_is_recording", (Bytes) -> I64;
    MicStop = 92, "mic_stop", (Bytes) -> I64;
    MicRead = 93, "mic_read", (Bytes, Out) -> I64;

    // Input and clipboard
    InputTouch = 95, "input_touch", (Out) -> I64;
    InputKey = 96, "input_key", (Bytes) -> I64;
    InputText = 97, "input_text", (Out) -> I64;
    ClipboardGet = 98, "clipboard_get", (Out) -> I64;
    ClipboardSet = 99, "clipboard_set", (Bytes) -> I64;
}

impl Opcode {
    pub fn info(self) -> &'static OpcodeInfo {
        // Declaration order matches ALL.
        let i = Self::ALL.iter().position(|o| *o == self).unwrap_or(0);
        &OPCODES[i]
    }
}

/// Look up an opcode by wire id.
pub fn lookup(id: u64) -> Option<&'static OpcodeInfo> {
    Opcode::try_from(id).ok().map(Opcode::info)
}

/// Look up an opcode by name (without the import prefix).
pub fn lookup_name(name: &str) -> Option<&'static OpcodeInfo> {
    OPCODES.iter().find(|o| o.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_and_names_unique() {
        let ids: HashSet<u64> = OPCODES.iter().map(|o| o.id).collect();
        let names: HashSet<&str> = OPCODES.iter().map(|o| o.name).collect();
        assert_eq!(ids.len(), OPCODES.len());
        assert_eq!(names.len(), OPCODES.len());
        assert!(!ids.contains(&FRAME_END));
    }

    #[test]
    fn table_matches_enum() {
        for info in OPCODES {
            assert_eq!(info.op.id(), info.id);
            assert_eq!(info.op.name(), info.name);
            assert_eq!(Opcode::try_from(info.id), Ok(info.op));
            assert_eq!(info.op.info(), info);
        }
        assert_eq!(Opcode::try_from(999), Err(999));
    }

    #[test]
    fn out_buffers_counted() {
        assert_eq!(Opcode::StorageRow.info().out_count(), 1);
        assert_eq!(Opcode::DivStart.info().out_count(), 0);
        assert_eq!(lookup_name("edit").map(|o| o.op), Some(Opcode::Edit));
        assert_eq!(Opcode::Button.info().wasm_name(), "_sa_button");
    }
}
