//! GDAL configuration and diagnostics.
//!
//! GDAL can be configured at runtime using environment variables or by using
//! functions in this module. Options set here override environment variables.
//!
//! ```no_run
//! use ogrio::ogr::config::*;
//!
//! set_config_option("OGR_GEOJSON_MAX_OBJ_SIZE", "0").unwrap();
//! assert_eq!(get_config_option("OGR_GEOJSON_MAX_OBJ_SIZE", "").unwrap(), "0");
//! clear_config_option("OGR_GEOJSON_MAX_OBJ_SIZE").unwrap();
//!
//! // send GDAL's own warnings and errors through the `log` facade
//! route_errors_to_log();
//! ```
//!
//! Refer to [GDAL `ConfigOptions`](https://gdal.org/user/configoptions.html) for
//! a full list of options.

use std::ffi::{c_char, c_void, CString};
use std::sync::{Mutex, PoisonError};

use gdal_sys::{CPLErr, CPLErrorNum, CPLGetErrorHandlerUserData};
use log::{debug, error, trace, warn};

use crate::errors::Result;
use crate::ogr::utils::_string;

/// Set a GDAL library configuration option.
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    let c_key = CString::new(key.as_bytes())?;
    let c_val = CString::new(value.as_bytes())?;
    unsafe {
        gdal_sys::CPLSetConfigOption(c_key.as_ptr(), c_val.as_ptr());
    };
    Ok(())
}

/// Get the value of a GDAL library configuration option, or `default` when
/// it is not set.
pub fn get_config_option(key: &str, default: &str) -> Result<String> {
    let c_key = CString::new(key.as_bytes())?;
    let c_default = CString::new(default.as_bytes())?;
    let rv = unsafe { gdal_sys::CPLGetConfigOption(c_key.as_ptr(), c_default.as_ptr()) };
    Ok(_string(rv))
}

/// Clear the value of a GDAL library configuration option.
pub fn clear_config_option(key: &str) -> Result<()> {
    let c_key = CString::new(key.as_bytes())?;
    unsafe {
        gdal_sys::CPLSetConfigOption(c_key.as_ptr(), ::std::ptr::null());
    };
    Ok(())
}

type ErrorCallbackType = dyn FnMut(CPLErr::Type, i32, &str) + 'static + Send;
// Double-`Box`ed: the outer box gives a stable address to hand to GDAL, the
// inner one turns the trait object into a thin pointer.
type PinnedErrorCallback = Box<Box<ErrorCallbackType>>;

static ERROR_CALLBACK: Mutex<Option<PinnedErrorCallback>> = Mutex::new(None);

/// Install `callback` as GDAL's process-wide error handler.
///
/// The function must be `Send` and `Sync` since GDAL may call it from any thread.
pub fn set_error_handler<F>(callback: F)
where
    F: FnMut(CPLErr::Type, i32, &str) + 'static + Send + Sync,
{
    unsafe extern "C" fn error_handler(
        error_type: CPLErr::Type,
        error_num: CPLErrorNum,
        error_msg_ptr: *const c_char,
    ) {
        let error_msg = _string(error_msg_ptr);

        // reconstruct callback from user data pointer
        let callback_raw = CPLGetErrorHandlerUserData();
        let callback: &mut Box<ErrorCallbackType> = &mut *(callback_raw as *mut Box<_>);

        callback(error_type, error_num, &error_msg);
    }

    let mut callback: PinnedErrorCallback = Box::new(Box::new(callback));
    let callback_ref: &mut Box<ErrorCallbackType> = callback.as_mut();

    // poisoning could only come from a panicking handler swap, the stored value is still valid
    let mut callback_lock = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    unsafe {
        gdal_sys::CPLSetErrorHandlerEx(Some(error_handler), callback_ref as *mut _ as *mut c_void);
    };

    // keep the callback alive for as long as GDAL holds its pointer
    callback_lock.replace(callback);
}

/// Restore GDAL's default error handler.
pub fn remove_error_handler() {
    let mut callback_lock = ERROR_CALLBACK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    unsafe {
        gdal_sys::CPLSetErrorHandler(None);
    };

    callback_lock.take();
}

/// Forward GDAL diagnostics to the [`log`] facade instead of stderr.
pub fn route_errors_to_log() {
    set_error_handler(|class, number, msg| match class {
        CPLErr::CE_Debug => debug!(target: "gdal", "{msg}"),
        CPLErr::CE_Warning => warn!(target: "gdal", "{msg} (error {number})"),
        CPLErr::CE_Failure | CPLErr::CE_Fatal => error!(target: "gdal", "{msg} (error {number})"),
        _ => trace!(target: "gdal", "{msg}"),
    });
}
