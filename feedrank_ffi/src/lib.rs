#![allow(clippy::missing_safety_doc)]

use std::ptr;

use serde_json::Value;

use feedrank_core::{encode_aggregate, encode_payload, merge_wire, score_with, PartitionKey, ScoringCfg};
use feedrank_job::{ItemDecoder, JsonItemDecoder};

/// FFI ABI version for feedrank_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const FEEDRANK_FFI_VERSION: u32 = 1;

pub const FR_OK: i32 = 0;
pub const FR_ERR_NULL: i32 = -1;
pub const FR_ERR_UTF8: i32 = -2;
pub const FR_ERR_JSON: i32 = -3;
pub const FR_ERR_INPUT_SHAPE: i32 = -4;
pub const FR_ERR_MALFORMED_VALUE: i32 = -5;
pub const FR_ERR_NOT_ARRAY: i32 = -6;

#[no_mangle]
pub extern "C" fn feedrank_ffi_version() -> u32 {
    FEEDRANK_FFI_VERSION
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FrStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl FrStr {
    unsafe fn as_str(&self) -> Result<&str, i32> {
        if self.ptr.is_null() {
            return Err(FR_ERR_NULL);
        }
        let bytes = std::slice::from_raw_parts(self.ptr, self.len);
        std::str::from_utf8(bytes).map_err(|_| FR_ERR_UTF8)
    }

    unsafe fn as_json(&self) -> Result<Value, i32> {
        let s = self.as_str()?;
        serde_json::from_str(s).map_err(|_| FR_ERR_JSON)
    }
}

/// Owned byte buffer (UTF-8 JSON). Free with `feedrank_bytes_free`.
#[repr(C)]
pub struct FrBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl FrBytes {
    fn empty() -> Self {
        FrBytes { ptr: ptr::null_mut(), len: 0 }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let mut boxed = buf.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        // Leaked to caller; freed by feedrank_bytes_free
        std::mem::forget(boxed);
        FrBytes { ptr, len }
    }
}

/// Call result: `rc == 0` means `bytes` holds the JSON output.
#[repr(C)]
pub struct FrResult {
    pub bytes: FrBytes,
    pub rc: i32,
}

impl FrResult {
    fn err(rc: i32) -> Self {
        FrResult { bytes: FrBytes::empty(), rc }
    }

    fn ok(v: &Value) -> Self {
        match serde_json::to_vec(v) {
            Ok(buf) => FrResult { bytes: FrBytes::from_vec(buf), rc: FR_OK },
            Err(_) => Self::err(FR_ERR_JSON),
        }
    }
}

fn into_result(r: Result<Value, i32>) -> FrResult {
    match r {
        Ok(v) => FrResult::ok(&v),
        Err(rc) => FrResult::err(rc),
    }
}

/// Map step for one stored record. Returns the raw payload wire value.
#[no_mangle]
pub unsafe extern "C" fn feedrank_score_json(record: FrStr, target_feature_id: i32) -> FrResult {
    into_result((|| {
        let rec = record.as_json()?;
        let item = JsonItemDecoder::default()
            .decode(&rec)
            .map_err(|_| FR_ERR_INPUT_SHAPE)?;
        let payload = score_with(&item, &ScoringCfg::for_target(target_feature_id));
        Ok(encode_payload(&payload))
    })())
}

/// Reduce step for one key. `values` is a JSON array of raw payload and/or
/// aggregate wire values. Returns the aggregate wire value.
#[no_mangle]
pub unsafe extern "C" fn feedrank_merge_json(key: FrStr, values: FrStr) -> FrResult {
    into_result((|| {
        let key = PartitionKey::new(key.as_str()?);
        let values = match values.as_json()? {
            Value::Array(list) => list,
            _ => return Err(FR_ERR_NOT_ARRAY),
        };
        let agg = merge_wire(&key, &values).map_err(|_| FR_ERR_MALFORMED_VALUE)?;
        Ok(encode_aggregate(&agg))
    })())
}

#[no_mangle]
pub unsafe extern "C" fn feedrank_bytes_free(b: FrBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}
