//! FFI bindings for Simple Pedometer
//!
//! This module lets a native plugin shell host the pedometer. The host supplies the
//! motion service as a C callback; the handle owns a tokio runtime that drives the
//! concurrent sub-interval queries.
//!
//! Strings returned by these functions are allocated here and must be freed with
//! `pedometer_free_string`.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::bridge::{MethodCall, PedometerPlugin};
use crate::config::AggregatorConfig;
use crate::error::{PedometerError, SourceError};
use crate::pedometer::Pedometer;
use crate::source::StepCountSource;
use crate::types::TimeRange;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Host step source
// ============================================================================

/// Host step-count query.
///
/// Called with the opaque `user_data` given to `pedometer_new` and a half-open range in
/// epoch milliseconds. Writes the step count to `out_steps` and returns 0 on success;
/// any other return value is reported as a failed query.
pub type StepQueryCallback = unsafe extern "C" fn(
    user_data: *mut c_void,
    from_ms: f64,
    to_ms: f64,
    out_steps: *mut u64,
) -> i32;

#[derive(Clone, Copy)]
struct HostContext {
    callback: StepQueryCallback,
    user_data: *mut c_void,
}

// The host guarantees `user_data` may be used from any thread until `pedometer_free`.
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    fn query(self, from_ms: f64, to_ms: f64) -> Result<u64, SourceError> {
        let mut steps: u64 = 0;
        let status = unsafe { (self.callback)(self.user_data, from_ms, to_ms, &mut steps) };
        if status == 0 {
            Ok(steps)
        } else {
            Err(SourceError::Query(format!(
                "host callback returned status {status}"
            )))
        }
    }
}

/// Step source backed by a host callback, run on tokio's blocking pool
struct CallbackSource {
    context: HostContext,
}

fn millis(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 + f64::from(t.timestamp_subsec_nanos() % 1_000_000) / 1_000_000.0
}

#[async_trait]
impl StepCountSource for CallbackSource {
    async fn query_step_count(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, SourceError> {
        let context = self.context;
        let (from_ms, to_ms) = (millis(from), millis(to));

        tokio::task::spawn_blocking(move || context.query(from_ms, to_ms))
            .await
            .unwrap_or_else(|e| Err(SourceError::Query(format!("host callback panicked: {e}"))))
    }

    fn name(&self) -> &str {
        "host_callback"
    }
}

// ============================================================================
// Handle lifecycle
// ============================================================================

/// Opaque handle to a hosted pedometer
pub struct PedometerHandle {
    runtime: tokio::runtime::Runtime,
    plugin: PedometerPlugin,
}

fn build_handle(
    callback: StepQueryCallback,
    user_data: *mut c_void,
    window_secs: f64,
) -> Result<PedometerHandle, PedometerError> {
    let config = if window_secs > 0.0 {
        AggregatorConfig::with_window_secs(window_secs)
    } else {
        AggregatorConfig::default()
    };

    let source = Arc::new(CallbackSource {
        context: HostContext {
            callback,
            user_data,
        },
    });
    let pedometer = Pedometer::with_config(source, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pedometer-worker")
        .enable_all()
        .build()
        .map_err(|e| PedometerError::Runtime(e.to_string()))?;

    Ok(PedometerHandle {
        runtime,
        plugin: PedometerPlugin::new(pedometer),
    })
}

/// Create a pedometer over a host step-count callback.
///
/// `window_secs <= 0` selects the default sub-interval width.
///
/// # Safety
/// - `callback` must stay callable, and `user_data` valid from any thread, until
///   `pedometer_free` returns.
/// - Returns NULL on error; call `pedometer_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pedometer_new(
    callback: Option<StepQueryCallback>,
    user_data: *mut c_void,
    window_secs: f64,
) -> *mut PedometerHandle {
    clear_last_error();

    let callback = match callback {
        Some(cb) => cb,
        None => {
            set_last_error("Null step query callback");
            return ptr::null_mut();
        }
    };

    match build_handle(callback, user_data, window_secs) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a pedometer handle.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `pedometer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pedometer_free(handle: *mut PedometerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Steps taken between two epoch-millisecond instants.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `pedometer_new`.
/// - Must not be called from inside the step query callback.
/// - Returns 0 on error and sets the last error; a legitimate 0 leaves it NULL.
#[no_mangle]
pub unsafe extern "C" fn pedometer_get_steps(
    handle: *const PedometerHandle,
    start_ms: f64,
    end_ms: f64,
) -> u64 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null pedometer handle");
        return 0;
    }
    let handle = &*handle;

    let result = TimeRange::from_millis(start_ms, end_ms).and_then(|range| {
        handle
            .runtime
            .block_on(handle.plugin.pedometer().total_steps(&range))
    });

    match result {
        Ok(steps) => steps,
        Err(e) => {
            set_last_error(&e.to_string());
            0
        }
    }
}

/// Active walking duration in seconds between two epoch-millisecond instants.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `pedometer_new`.
/// - Must not be called from inside the step query callback.
/// - Returns 0 on error and sets the last error; a legitimate 0 leaves it NULL.
#[no_mangle]
pub unsafe extern "C" fn pedometer_get_walking_duration(
    handle: *const PedometerHandle,
    start_ms: f64,
    end_ms: f64,
) -> f64 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null pedometer handle");
        return 0.0;
    }
    let handle = &*handle;

    let result = TimeRange::from_millis(start_ms, end_ms).and_then(|range| {
        handle
            .runtime
            .block_on(handle.plugin.pedometer().walking_duration(&range))
    });

    match result {
        Ok(report) => report.total_seconds,
        Err(e) => {
            set_last_error(&e.to_string());
            0.0
        }
    }
}

/// Dispatch a method-channel call given as JSON `{"method": ..., "arguments": ...}`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `pedometer_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated JSON reply that must be freed with `pedometer_free_string`.
/// - Returns NULL if the call itself cannot be decoded; call `pedometer_last_error`.
#[no_mangle]
pub unsafe extern "C" fn pedometer_handle_method_call(
    handle: *const PedometerHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null pedometer handle");
        return ptr::null_mut();
    }
    let handle = &*handle;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let call: MethodCall = match serde_json::from_str(&json_str) {
        Ok(call) => call,
        Err(e) => {
            set_last_error(&PedometerError::from(e).to_string());
            return ptr::null_mut();
        }
    };

    let response = handle.runtime.block_on(handle.plugin.handle(&call));

    match serde_json::to_string(&response) {
        Ok(reply) => string_to_cstr(&reply),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by pedometer functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a pedometer function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pedometer_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next pedometer call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pedometer_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pedometer_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with the window length in seconds plus its start second, so consecutive
    /// windows rise. Ranges starting at or after `fail_from_ms` fail.
    struct Host {
        calls: AtomicUsize,
        fail_from_ms: f64,
    }

    unsafe extern "C" fn host_query(
        user_data: *mut c_void,
        from_ms: f64,
        to_ms: f64,
        out_steps: *mut u64,
    ) -> i32 {
        let host = &*(user_data as *const Host);
        host.calls.fetch_add(1, Ordering::SeqCst);
        if from_ms >= host.fail_from_ms {
            return -1;
        }
        *out_steps = ((to_ms - from_ms) / 1000.0) as u64 + (from_ms / 1000.0) as u64;
        0
    }

    fn host(fail_from_ms: f64) -> Box<Host> {
        Box::new(Host {
            calls: AtomicUsize::new(0),
            fail_from_ms,
        })
    }

    #[test]
    fn test_ffi_get_steps() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                0.0,
            );
            assert!(!handle.is_null());

            let steps = pedometer_get_steps(handle, 0.0, 60_000.0);
            assert_eq!(steps, 60);
            assert!(pedometer_last_error().is_null());
            assert_eq!(host.calls.load(Ordering::SeqCst), 1);

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_walking_duration() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                5.0,
            );

            // Counts are 5, 10, 15, 20: each window rises above the previous
            let seconds = pedometer_get_walking_duration(handle, 0.0, 20_000.0);
            assert!(pedometer_last_error().is_null());
            assert_eq!(host.calls.load(Ordering::SeqCst), 4);
            assert_eq!(seconds, 20.0);

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_walking_duration_is_stable_across_runs() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                5.0,
            );

            for _ in 0..10 {
                assert_eq!(pedometer_get_walking_duration(handle, 0.0, 100_000.0), 100.0);
            }
            assert_eq!(host.calls.load(Ordering::SeqCst), 200);

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_oversized_range_replies_zero() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                5.0,
            );

            let seconds = pedometer_get_walking_duration(handle, 0.0, 1_760_000_000_000.0);
            assert_eq!(seconds, 0.0);
            assert_eq!(host.calls.load(Ordering::SeqCst), 0);

            let error = CStr::from_ptr(pedometer_last_error()).to_str().unwrap();
            assert!(error.contains("sub-intervals"));

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_failure_sets_last_error() {
        let host = host(10_000.0);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                5.0,
            );

            let seconds = pedometer_get_walking_duration(handle, 0.0, 20_000.0);
            assert_eq!(seconds, 0.0);

            let error = pedometer_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("host callback returned status -1"));

            let steps = pedometer_get_steps(handle, 20_000.0, 30_000.0);
            assert_eq!(steps, 0);
            assert!(!pedometer_last_error().is_null());

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_range() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                0.0,
            );

            assert_eq!(pedometer_get_steps(handle, f64::NAN, 1_000.0), 0);
            assert!(!pedometer_last_error().is_null());
            assert_eq!(host.calls.load(Ordering::SeqCst), 0);

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_method_call() {
        let host = host(f64::MAX);
        unsafe {
            let handle = pedometer_new(
                Some(host_query),
                &*host as *const Host as *mut c_void,
                0.0,
            );

            let call =
                CString::new(r#"{"method": "getSteps", "arguments": {"startTime": 0, "endTime": 30000}}"#)
                    .unwrap();
            let reply = pedometer_handle_method_call(handle, call.as_ptr());
            assert!(!reply.is_null());

            let reply_json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(reply).to_str().unwrap()).unwrap();
            assert_eq!(reply_json["status"], "success");
            assert_eq!(reply_json["result"], 30);
            pedometer_free_string(reply);

            let bad = CString::new("not json").unwrap();
            let reply = pedometer_handle_method_call(handle, bad.as_ptr());
            assert!(reply.is_null());
            assert!(!pedometer_last_error().is_null());

            pedometer_free(handle);
        }
    }

    #[test]
    fn test_ffi_null_arguments() {
        unsafe {
            assert!(pedometer_new(None, ptr::null_mut(), 0.0).is_null());
            assert!(!pedometer_last_error().is_null());

            assert_eq!(pedometer_get_steps(ptr::null(), 0.0, 1.0), 0);
            assert!(pedometer_handle_method_call(ptr::null(), ptr::null()).is_null());
            pedometer_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = pedometer_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::PEDOMETER_VERSION);
        }
    }
}
