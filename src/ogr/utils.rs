use std::ffi::{c_char, CStr, CString};

use gdal_sys::CPLErr;

use crate::errors::{OgrioError, Result};
use crate::path::DatasetPath;

pub(crate) fn _string(raw_ptr: *const c_char) -> String {
    if raw_ptr.is_null() {
        return String::new();
    }
    let c_str = unsafe { CStr::from_ptr(raw_ptr) };
    c_str.to_string_lossy().into_owned()
}

/// The current CPL error message, leaving the error state untouched.
pub(crate) fn _last_cpl_msg() -> String {
    _string(unsafe { gdal_sys::CPLGetLastErrorMsg() })
}

pub(crate) fn _last_cpl_err(cpl_err_class: CPLErr::Type) -> OgrioError {
    let last_err_no = unsafe { gdal_sys::CPLGetLastErrorNo() };
    let last_err_msg = _last_cpl_msg();
    unsafe { gdal_sys::CPLErrorReset() };
    OgrioError::CplError {
        class: cpl_err_class,
        number: last_err_no,
        msg: last_err_msg,
    }
}

pub(crate) fn _last_null_pointer_err(method_name: &'static str) -> OgrioError {
    let last_err_msg = _last_cpl_msg();
    unsafe { gdal_sys::CPLErrorReset() };
    OgrioError::NullPointer {
        method_name,
        msg: last_err_msg,
    }
}

/// Take the pending CPL message, falling back to `default` when GDAL did not
/// leave one.
pub(crate) fn _take_cpl_msg(default: &str) -> String {
    let msg = _last_cpl_msg();
    unsafe { gdal_sys::CPLErrorReset() };
    if msg.is_empty() {
        default.to_string()
    } else {
        msg
    }
}

pub(crate) fn _path_to_c_string(path: &DatasetPath) -> Result<CString> {
    CString::new(path.as_str()).map_err(Into::into)
}
