//! WebAssembly byte handles.
//!
//! `Bytes` and `Out` arguments cross the WebAssembly boundary as one i64:
//! the high 32 bits are a pointer into linear memory, the low 32 bits the
//! length (or capacity).

/// Pack a pointer and length into a handle.
pub fn pack_handle(ptr: u32, len: u32) -> i64 {
    (((ptr as u64) << 32) | len as u64) as i64
}

/// Split a handle into (pointer, length).
pub fn unpack_handle(handle: i64) -> (u32, u32) {
    let raw = handle as u64;
    ((raw >> 32) as u32, raw as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_bits_survive() {
        let h = pack_handle(0xFFFF_0000, 0x8000_0001);
        assert!(h < 0);
        assert_eq!(unpack_handle(h), (0xFFFF_0000, 0x8000_0001));
        assert_eq!(unpack_handle(pack_handle(16, 0)), (16, 0));
    }
}
