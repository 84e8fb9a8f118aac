use std::ffi::{c_char, c_void, CString};
use std::ptr;

use gdal_sys::{OGRErr, OGRSpatialReferenceH, OSRAxisMappingStrategy};

use crate::errors::{OgrioError, Result};
use crate::ogr::utils::{_last_null_pointer_err, _string};

/// An owned OGR spatial reference.
#[derive(Debug)]
pub(crate) struct SpatialRef(OGRSpatialReferenceH);

impl Drop for SpatialRef {
    fn drop(&mut self) {
        unsafe { gdal_sys::OSRRelease(self.0) };
        self.0 = ptr::null_mut();
    }
}

impl SpatialRef {
    /// Parse anything `OSRSetFromUserInput` understands: `EPSG:4326`, WKT,
    /// PROJ strings...
    ///
    /// Axis order is the traditional GIS order (longitude first).
    pub fn from_definition(definition: &str) -> Result<SpatialRef> {
        let c_obj = unsafe { gdal_sys::OSRNewSpatialReference(ptr::null()) };
        if c_obj.is_null() {
            return Err(_last_null_pointer_err("OSRNewSpatialReference"));
        }
        let srs = SpatialRef(c_obj);
        let c_definition = CString::new(definition)?;
        let rv = unsafe { gdal_sys::OSRSetFromUserInput(srs.0, c_definition.as_ptr()) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "OSRSetFromUserInput",
            });
        }
        unsafe {
            gdal_sys::OSRSetAxisMappingStrategy(
                srs.0,
                OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER,
            )
        };
        Ok(srs)
    }

    /// Clone a spatial reference owned by GDAL, e.g. a layer's.
    ///
    /// # Safety
    /// `c_srs` must be a valid spatial reference handle or null.
    pub unsafe fn from_c_srs(c_srs: OGRSpatialReferenceH) -> Option<SpatialRef> {
        if c_srs.is_null() {
            return None;
        }
        let c_clone = gdal_sys::OSRClone(c_srs);
        (!c_clone.is_null()).then_some(SpatialRef(c_clone))
    }

    pub fn c_srs(&self) -> OGRSpatialReferenceH {
        self.0
    }

    fn authority(&self) -> Option<String> {
        let name = unsafe { gdal_sys::OSRGetAuthorityName(self.0, ptr::null()) };
        let code = unsafe { gdal_sys::OSRGetAuthorityCode(self.0, ptr::null()) };
        if name.is_null() || code.is_null() {
            return None;
        }
        Some(format!("{}:{}", _string(name), _string(code)))
    }

    pub fn to_wkt(&self) -> Result<String> {
        let mut c_wkt: *mut c_char = ptr::null_mut();
        let rv = unsafe { gdal_sys::OSRExportToWkt(self.0, &mut c_wkt) };
        let res = if rv != OGRErr::OGRERR_NONE {
            Err(OgrioError::OgrError {
                err: rv,
                method_name: "OSRExportToWkt",
            })
        } else {
            Ok(_string(c_wkt))
        };
        unsafe { gdal_sys::VSIFree(c_wkt as *mut c_void) };
        res
    }

    /// `AUTHORITY:CODE` when the reference can be identified, otherwise WKT.
    pub fn to_crs_string(&self) -> Result<String> {
        if let Some(authority) = self.authority() {
            return Ok(authority);
        }
        // best effort, fills in the authority when the definition matches a known EPSG code
        if unsafe { gdal_sys::OSRAutoIdentifyEPSG(self.0) } == OGRErr::OGRERR_NONE {
            if let Some(authority) = self.authority() {
                return Ok(authority);
            }
        }
        self.to_wkt()
    }
}
