//! GDAL Common Portability Library string lists.

use std::ffi::{c_char, CString};
use std::fmt::{Debug, Formatter};
use std::ptr;

use gdal_sys::{CSLCount, CSLDestroy, CSLSetNameValue};

use crate::errors::{OgrioError, Result};

/// Wraps a [`gdal_sys::CSLConstList`] (a.k.a. `char **papszStrList`), the
/// null-terminated array of `KEY=VALUE` strings GDAL takes creation options as.
pub struct CslStringList {
    list_ptr: *mut *mut c_char,
}

impl CslStringList {
    /// Creates an empty GDAL string list.
    pub fn new() -> Self {
        Self {
            list_ptr: ptr::null_mut(),
        }
    }

    /// Build a list from `(KEY, VALUE)` pairs.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut list = Self::new();
        for (name, value) in pairs {
            list.set_name_value(name, value)?;
        }
        Ok(list)
    }

    /// Assigns `value` to `name`, overwriting duplicate `name`s.
    ///
    /// Fails if `name` has non alphanumeric characters, or `value` has newline
    /// characters.
    pub fn set_name_value(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(OgrioError::BadArgument(format!(
                "Invalid characters in option name: '{name}'"
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(OgrioError::BadArgument(format!(
                "Invalid characters in option value: '{value}'"
            )));
        }
        let psz_name = CString::new(name)?;
        let psz_value = CString::new(value)?;

        unsafe {
            self.list_ptr = CSLSetNameValue(self.list_ptr, psz_name.as_ptr(), psz_value.as_ptr());
        }

        Ok(())
    }

    /// Determine the number of entries in the list.
    pub fn len(&self) -> usize {
        (unsafe { CSLCount(self.as_ptr()) }) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the raw pointer to the underlying data.
    pub fn as_ptr(&self) -> gdal_sys::CSLConstList {
        self.list_ptr
    }
}

impl Drop for CslStringList {
    fn drop(&mut self) {
        unsafe { CSLDestroy(self.list_ptr) }
    }
}

impl Default for CslStringList {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CslStringList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CslStringList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() -> Result<()> {
        let list = CslStringList::from_pairs(&[
            ("SPATIAL_INDEX".to_string(), "NO".to_string()),
            ("FID".to_string(), "fid".to_string()),
            ("SPATIAL_INDEX".to_string(), "YES".to_string()),
        ])?;
        assert_eq!(list.len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_options() {
        let mut list = CslStringList::new();
        assert!(list.set_name_value("BAD NAME", "x").is_err());
        assert!(list.set_name_value("NAME", "a\nb").is_err());
        assert!(list.is_empty());
    }
}
