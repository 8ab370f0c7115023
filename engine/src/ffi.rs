//! FFI layer for non-Rust hosts.
//!
//! This module provides C-compatible functions over a [`Record`] handle.
//! All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `verlog_*` functions are allocated by Rust
//! - Caller must free them with `verlog_string_free`
//! - Record pointers must be freed with `verlog_record_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>"}` on failure
//!
//! # Write Options
//!
//! Mutating calls take an optional options object that opens the matching
//! session scopes for the duration of the call:
//!
//! ```text
//! {"responsible": "42", "fullSnapshot": true, "skipLogging": false}
//! ```

use crate::{EngineConfig, Query, Record, Session, SessionGuard, State, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(Serialize)]
#[serde(untagged)]
enum FfiResult<T: Serialize> {
    Ok { ok: T },
    Err { error: String },
}

impl<T: Serialize> FfiResult<T> {
    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

impl<T: Serialize, E: ToString> From<Result<T, E>> for FfiResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(ok) => FfiResult::Ok { ok },
            Err(e) => FfiResult::Err {
                error: e.to_string(),
            },
        }
    }
}

/// Session scopes requested by a mutating call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WriteOptions {
    responsible: Option<String>,
    full_snapshot: bool,
    skip_logging: bool,
}

impl WriteOptions {
    /// Run `f` with these options' scopes open on a fresh session.
    fn scoped<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        let session = Session::new();
        let _responsible: Option<SessionGuard<'_>> = self
            .responsible
            .clone()
            .map(|id| session.responsible(id, false));
        let _full = self.full_snapshot.then(|| session.full_snapshot());
        let _quiet = self.skip_logging.then(|| session.suppress_logging());
        f(&session)
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `verlog_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .unwrap_or_default()
            .into_raw(),
    }
}

fn respond<T: Serialize, E: ToString>(result: Result<T, E>) -> *mut c_char {
    to_c_string(FfiResult::from(result).to_json())
}

fn error_response(message: impl Into<String>) -> *mut c_char {
    respond::<(), String>(Err(message.into()))
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Parse a required JSON argument.
unsafe fn parse_arg<T: DeserializeOwned>(ptr: *const c_char, what: &str) -> Result<T, String> {
    let json = from_c_string(ptr).ok_or_else(|| format!("invalid {} JSON", what))?;
    serde_json::from_str(&json).map_err(|e| format!("parse error in {}: {}", what, e))
}

/// Parse an optional JSON argument; null means the type's default.
unsafe fn parse_optional<T: DeserializeOwned + Default>(
    ptr: *const c_char,
    what: &str,
) -> Result<T, String> {
    if ptr.is_null() {
        return Ok(T::default());
    }
    parse_arg(ptr, what)
}

// ============================================================================
// Record Lifecycle
// ============================================================================

/// Create an empty record with no history.
///
/// # Arguments
/// - `config_json`: JSON string of EngineConfig, or null for defaults
///
/// # Returns
/// Pointer to Record, or null on failure.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or null
/// - Caller must free the returned pointer with `verlog_record_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_new(config_json: *const c_char) -> *mut Record {
    match parse_optional::<EngineConfig>(config_json, "config") {
        Ok(config) => Box::into_raw(Box::new(Record::new(config))),
        Err(_) => ptr::null_mut(),
    }
}

/// Rebuild a record from its stored state and log data.
///
/// # Arguments
/// - `config_json`: JSON string of EngineConfig, or null for defaults
/// - `state_json`: JSON object of the current state
/// - `log_data_json`: stored log data, or null for a record without history
///
/// # Returns
/// Pointer to Record, or null if any argument is invalid or the log is corrupt.
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned pointer with `verlog_record_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_load(
    config_json: *const c_char,
    state_json: *const c_char,
    log_data_json: *const c_char,
) -> *mut Record {
    let config = match parse_optional::<EngineConfig>(config_json, "config") {
        Ok(c) => c,
        Err(_) => return ptr::null_mut(),
    };

    let state = match parse_arg::<State>(state_json, "state") {
        Ok(s) => s,
        Err(_) => return ptr::null_mut(),
    };

    let log_data = match parse_optional::<Option<serde_json::Value>>(log_data_json, "log data") {
        Ok(l) => l,
        Err(_) => return ptr::null_mut(),
    };

    match Record::load(state, log_data, config) {
        Ok(record) => Box::into_raw(Box::new(record)),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a record.
///
/// # Safety
/// - `record` must be a valid pointer from `verlog_record_new` or `verlog_record_load`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn verlog_record_free(record: *mut Record) {
    if !record.is_null() {
        drop(Box::from_raw(record));
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `verlog_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn verlog_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Replace the record's state.
///
/// # Arguments
/// - `state_json`: JSON object of the new state
/// - `options_json`: write options, or null
/// - `timestamp`: Timestamp in milliseconds
///
/// # Returns
/// JSON string: `{"ok": <new version | null>}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `state_json` and `options_json` must be valid null-terminated C strings or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_update(
    record: *mut Record,
    state_json: *const c_char,
    options_json: *const c_char,
    timestamp: Timestamp,
) -> *mut c_char {
    let record = match record.as_mut() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let state = match parse_arg::<State>(state_json, "state") {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };

    let options = match parse_optional::<WriteOptions>(options_json, "options") {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    respond(options.scoped(|session| record.update(state, timestamp, session)))
}

/// Undo the last version, following the record's `appendOnUndo` setting.
///
/// # Returns
/// JSON string: `{"ok": <restored state>}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `options_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_undo(
    record: *mut Record,
    options_json: *const c_char,
    timestamp: Timestamp,
) -> *mut c_char {
    let record = match record.as_mut() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let options = match parse_optional::<WriteOptions>(options_json, "options") {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    respond(options.scoped(|session| record.undo(timestamp, session)))
}

/// Drop all history, keeping the current state as version 1.
///
/// # Returns
/// JSON string: `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `options_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_reset(
    record: *mut Record,
    options_json: *const c_char,
    timestamp: Timestamp,
) -> *mut c_char {
    let record = match record.as_mut() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let options = match parse_optional::<WriteOptions>(options_json, "options") {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    options.scoped(|session| record.reset_log_data(timestamp, session));
    respond::<(), String>(Ok(()))
}

/// Append a full snapshot of the current state.
///
/// # Returns
/// JSON string: `{"ok": <new version>}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `options_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_snapshot(
    record: *mut Record,
    options_json: *const c_char,
    timestamp: Timestamp,
) -> *mut c_char {
    let record = match record.as_mut() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let options = match parse_optional::<WriteOptions>(options_json, "options") {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    respond(options.scoped(|session| record.create_logidze_snapshot(timestamp, session)))
}

// ============================================================================
// Reads
// ============================================================================

/// Rebuild the record at a version or point in time.
///
/// # Arguments
/// - `query_json`: `{"version": N}` or `{"time": MS}`
///
/// # Returns
/// JSON string: `{"ok": ReconstructedView}`, `{"ok": null}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `query_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_at(
    record: *const Record,
    query_json: *const c_char,
) -> *mut c_char {
    let record = match record.as_ref() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let query = match parse_arg::<Query>(query_json, "query") {
        Ok(q) => q,
        Err(e) => return error_response(e),
    };

    respond(record.at(query))
}

/// Field-level changes from a version or point in time to now.
///
/// # Returns
/// JSON string: `{"ok": Diff}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - `query_json` must be a valid null-terminated C string or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_diff_from(
    record: *const Record,
    query_json: *const c_char,
) -> *mut c_char {
    let record = match record.as_ref() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    let query = match parse_arg::<Query>(query_json, "query") {
        Ok(q) => q,
        Err(e) => return error_response(e),
    };

    respond(record.diff_from(query))
}

/// Stored form of a record, suitable for `verlog_record_load`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedRecord<'a> {
    state: &'a State,
    log_data: Option<crate::LogData>,
}

/// Export the record's state and log data.
///
/// # Returns
/// JSON string: `{"ok": {"state": {...}, "logData": {...} | null}}` or `{"error": "message"}`
///
/// # Safety
/// - `record` must be a valid record pointer or null
/// - Caller must free the returned string with `verlog_string_free`
#[no_mangle]
pub unsafe extern "C" fn verlog_record_export(record: *const Record) -> *mut c_char {
    let record = match record.as_ref() {
        Some(r) => r,
        None => return error_response("null record pointer"),
    };

    respond::<_, String>(Ok(ExportedRecord {
        state: record.state(),
        log_data: record.log_data(),
    }))
}

// ============================================================================
// Utility
// ============================================================================

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn verlog_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Get the log data format version.
#[no_mangle]
pub extern "C" fn verlog_format_version() -> u32 {
    crate::FORMAT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    unsafe fn take_json(ptr: *mut c_char) -> Value {
        let json = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        verlog_string_free(ptr);
        serde_json::from_str(&json).unwrap()
    }

    fn c(json: &str) -> CString {
        CString::new(json).unwrap()
    }

    #[test]
    fn ffi_record_lifecycle() {
        unsafe {
            let record = verlog_record_new(ptr::null());
            assert!(!record.is_null());
            verlog_record_free(record);

            let bad_config = c(r#"{"missingTime": "sometimes"}"#);
            assert!(verlog_record_new(bad_config.as_ptr()).is_null());
        }
    }

    #[test]
    fn ffi_update_and_read() {
        unsafe {
            let record = verlog_record_new(ptr::null());

            let first = c(r#"{"name": "a"}"#);
            let result = take_json(verlog_record_update(record, first.as_ptr(), ptr::null(), 1000));
            assert_eq!(result, json!({"ok": 1}));

            let second = c(r#"{"name": "b"}"#);
            let options = c(r#"{"responsible": "42"}"#);
            let result = take_json(verlog_record_update(
                record,
                second.as_ptr(),
                options.as_ptr(),
                2000,
            ));
            assert_eq!(result, json!({"ok": 2}));

            let query = c(r#"{"version": 1}"#);
            let view = take_json(verlog_record_at(record, query.as_ptr()));
            assert_eq!(view["ok"]["state"], json!({"name": "a"}));

            let time = c(r#"{"time": 2500}"#);
            let view = take_json(verlog_record_at(record, time.as_ptr()));
            assert_eq!(view["ok"]["version"], json!(2));
            assert_eq!(view["ok"]["responsible"], json!("42"));

            let changes = take_json(verlog_record_diff_from(record, query.as_ptr()));
            assert_eq!(changes, json!({"ok": {"name": ["a", "b"]}}));

            verlog_record_free(record);
        }
    }

    #[test]
    fn ffi_skip_logging() {
        unsafe {
            let record = verlog_record_new(ptr::null());
            let state = c(r#"{"name": "a"}"#);
            verlog_string_free(verlog_record_update(record, state.as_ptr(), ptr::null(), 1000));

            let quiet = c(r#"{"name": "q"}"#);
            let options = c(r#"{"skipLogging": true}"#);
            let result = take_json(verlog_record_update(
                record,
                quiet.as_ptr(),
                options.as_ptr(),
                2000,
            ));
            assert_eq!(result, json!({"ok": null}));

            let exported = take_json(verlog_record_export(record));
            assert_eq!(exported["ok"]["state"], json!({"name": "q"}));
            assert_eq!(exported["ok"]["logData"]["v"], json!(1));

            verlog_record_free(record);
        }
    }

    #[test]
    fn ffi_export_and_load() {
        unsafe {
            let record = verlog_record_new(ptr::null());
            for (ts, name) in [(1000, "a"), (2000, "b"), (3000, "c")] {
                let state = c(&format!(r#"{{"name": "{}"}}"#, name));
                verlog_string_free(verlog_record_update(record, state.as_ptr(), ptr::null(), ts));
            }

            let exported = take_json(verlog_record_export(record));
            let state = c(&exported["ok"]["state"].to_string());
            let log_data = c(&exported["ok"]["logData"].to_string());

            let loaded = verlog_record_load(ptr::null(), state.as_ptr(), log_data.as_ptr());
            assert!(!loaded.is_null());
            assert_eq!((*loaded).version(), Some(3));
            assert_eq!(*loaded, *record);

            verlog_record_free(loaded);
            verlog_record_free(record);
        }
    }

    #[test]
    fn ffi_undo_snapshot_reset() {
        unsafe {
            let record = verlog_record_new(ptr::null());
            for (ts, name) in [(1000, "a"), (2000, "b")] {
                let state = c(&format!(r#"{{"name": "{}"}}"#, name));
                verlog_string_free(verlog_record_update(record, state.as_ptr(), ptr::null(), ts));
            }

            let undone = take_json(verlog_record_undo(record, ptr::null(), 3000));
            assert_eq!(undone, json!({"ok": {"name": "a"}}));

            let snapshot = take_json(verlog_record_snapshot(record, ptr::null(), 4000));
            assert_eq!(snapshot, json!({"ok": 2}));

            let reset = take_json(verlog_record_reset(record, ptr::null(), 5000));
            assert_eq!(reset, json!({"ok": null}));
            assert_eq!((*record).version(), Some(1));

            let error = take_json(verlog_record_undo(record, ptr::null(), 6000));
            assert!(error["error"].as_str().unwrap().contains("earlier version"));

            verlog_record_free(record);
        }
    }

    #[test]
    fn ffi_load_rejects_invalid_input() {
        unsafe {
            let state = c(r#"{"name": "a"}"#);
            let corrupt = c(r#"{"v": 1, "h": []}"#);
            assert!(verlog_record_load(ptr::null(), state.as_ptr(), corrupt.as_ptr()).is_null());

            let not_object = c("[1, 2]");
            assert!(verlog_record_load(ptr::null(), not_object.as_ptr(), ptr::null()).is_null());

            let fresh = verlog_record_load(ptr::null(), state.as_ptr(), ptr::null());
            assert!(!fresh.is_null());
            assert_eq!((*fresh).version(), None);
            verlog_record_free(fresh);
        }
    }

    #[test]
    fn ffi_version() {
        unsafe {
            let version = verlog_version();
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
        assert_eq!(verlog_format_version(), crate::FORMAT_VERSION);
    }

    #[test]
    fn ffi_error_handling() {
        unsafe {
            let query = c(r#"{"version": 1}"#);
            let result = take_json(verlog_record_at(ptr::null(), query.as_ptr()));
            assert_eq!(result, json!({"error": "null record pointer"}));

            let record = verlog_record_new(ptr::null());

            let invalid = c("not valid json");
            let result = take_json(verlog_record_update(record, invalid.as_ptr(), ptr::null(), 1000));
            assert!(result["error"].as_str().unwrap().starts_with("parse error"));

            let state = c(r#"{"name": "a"}"#);
            verlog_string_free(verlog_record_update(record, state.as_ptr(), ptr::null(), 1000));
            let out_of_range = c(r#"{"version": 9}"#);
            let result = take_json(verlog_record_at(record, out_of_range.as_ptr()));
            assert!(result.get("error").is_some());

            verlog_record_free(record);
        }
    }
}
