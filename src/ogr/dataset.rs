use std::ffi::{c_int, c_uint, CString};
use std::ptr;
use std::sync::Once;

use bitflags::bitflags;
use gdal_sys::{GDALDataType, GDALDatasetH, GDALDriverH, OGRErr};
use log::debug;

use crate::engine::LayerSelector;
use crate::errors::{OgrioError, Result};
use crate::geometry::GeometryType;
use crate::ogr::cpl::CslStringList;
use crate::ogr::geometry::ogr_geometry_type;
use crate::ogr::layer::Layer;
use crate::ogr::srs::SpatialRef;
use crate::ogr::utils::{
    _last_cpl_err, _last_null_pointer_err, _path_to_c_string, _string, _take_cpl_msg,
};
use crate::path::DatasetPath;

static START: Once = Once::new();

pub(crate) fn _register_drivers() {
    START.call_once(|| unsafe {
        gdal_sys::GDALAllRegister();
    });
}

bitflags! {
    /// GDAL extended open flags, the `nOpenFlags` argument of
    /// [`GDALOpenEx`](https://gdal.org/api/raster_c_api.html#_CPPv410GDALOpenExPKcjPKcPKcPKc).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GdalOpenFlags: c_uint {
        /// Allow vector drivers to be used.
        const GDAL_OF_VECTOR = 0x04;
        /// Emit error message in case of failed open.
        const GDAL_OF_VERBOSE_ERROR = 0x40;
    }
}

impl Default for GdalOpenFlags {
    fn default() -> GdalOpenFlags {
        GdalOpenFlags::GDAL_OF_VECTOR | GdalOpenFlags::GDAL_OF_VERBOSE_ERROR
    }
}

/// A GDAL driver handle. Drivers are owned by GDAL's registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GdalDriver {
    c_driver: GDALDriverH,
}

impl GdalDriver {
    pub fn get_by_name(name: &str) -> Result<GdalDriver> {
        _register_drivers();
        let c_name = CString::new(name)?;
        let c_driver = unsafe { gdal_sys::GDALGetDriverByName(c_name.as_ptr()) };
        if c_driver.is_null() {
            return Err(OgrioError::DriverNotFound(name.to_string()));
        }
        Ok(GdalDriver { c_driver })
    }

    pub fn short_name(&self) -> String {
        _string(unsafe { gdal_sys::GDALGetDriverShortName(self.c_driver) })
    }

    /// Create an empty vector dataset.
    pub fn create_vector_only(
        &self,
        path: &DatasetPath,
        options: &CslStringList,
    ) -> Result<Dataset> {
        let c_filename = _path_to_c_string(path)?;
        let c_dataset = unsafe {
            gdal_sys::GDALCreate(
                self.c_driver,
                c_filename.as_ptr(),
                0,
                0,
                0,
                GDALDataType::GDT_Unknown,
                options.as_ptr(),
            )
        };
        if c_dataset.is_null() {
            return Err(_last_null_pointer_err("GDALCreate"));
        }
        Ok(Dataset { c_dataset })
    }

    /// Delete a dataset and all its side-car files.
    pub fn delete(&self, path: &DatasetPath) -> Result<()> {
        let c_filename = _path_to_c_string(path)?;
        let rv = unsafe { gdal_sys::GDALDeleteDataset(self.c_driver, c_filename.as_ptr()) };
        if rv != gdal_sys::CPLErr::CE_None {
            return Err(_last_cpl_err(rv));
        }
        Ok(())
    }
}

/// An open dataset, closed on drop.
#[derive(Debug)]
pub(crate) struct Dataset {
    c_dataset: GDALDatasetH,
}

impl Drop for Dataset {
    fn drop(&mut self) {
        unsafe {
            gdal_sys::GDALClose(self.c_dataset);
        }
    }
}

impl Dataset {
    /// Open a vector dataset.
    pub fn open(path: &DatasetPath, flags: GdalOpenFlags) -> Result<Dataset> {
        _register_drivers();
        let c_filename = _path_to_c_string(path)?;
        let c_dataset = unsafe {
            gdal_sys::GDALOpenEx(
                c_filename.as_ptr(),
                flags.bits(),
                ptr::null(),
                ptr::null(),
                ptr::null(),
            )
        };
        if c_dataset.is_null() {
            return Err(OgrioError::DatasetNotFound {
                path: path.to_string(),
                msg: _take_cpl_msg("No such file or directory"),
            });
        }
        debug!("Opened '{path}'");
        Ok(Dataset { c_dataset })
    }

    /// Close the dataset, reporting errors raised while flushing it.
    pub fn close(self) -> Result<()> {
        unsafe { gdal_sys::CPLErrorReset() };
        drop(self);
        let class = unsafe { gdal_sys::CPLGetLastErrorType() };
        if class == gdal_sys::CPLErr::CE_Failure || class == gdal_sys::CPLErr::CE_Fatal {
            return Err(_last_cpl_err(class));
        }
        Ok(())
    }

    pub fn layer_count(&self) -> usize {
        (unsafe { gdal_sys::GDALDatasetGetLayerCount(self.c_dataset) }).max(0) as usize
    }

    /// Borrow the layer at `idx`, in the dataset's native order.
    pub fn layer(&self, idx: usize) -> Option<Layer<'_>> {
        let idx = c_int::try_from(idx).ok()?;
        let c_layer = unsafe { gdal_sys::GDALDatasetGetLayer(self.c_dataset, idx) };
        unsafe { Layer::from_c_layer(self, c_layer) }
    }

    pub fn layer_by_name(&self, name: &str) -> Result<Option<Layer<'_>>> {
        let c_name = CString::new(name)?;
        let c_layer = unsafe { gdal_sys::GDALDatasetGetLayerByName(self.c_dataset, c_name.as_ptr()) };
        // a lookup miss is not worth reporting
        unsafe { gdal_sys::CPLErrorReset() };
        Ok(unsafe { Layer::from_c_layer(self, c_layer) })
    }

    pub fn select_layer(&self, path: &DatasetPath, selector: &LayerSelector) -> Result<Layer<'_>> {
        let layer = match selector {
            LayerSelector::Index(idx) => self.layer(*idx),
            LayerSelector::Name(name) => self.layer_by_name(name)?,
        };
        layer.ok_or_else(|| OgrioError::LayerNotFound {
            path: path.to_string(),
            layer: selector.clone(),
        })
    }

    pub fn layers(&self) -> impl Iterator<Item = Layer<'_>> + '_ {
        (0..self.layer_count()).filter_map(|idx| self.layer(idx))
    }

    pub fn create_layer(
        &self,
        name: &str,
        geometry_type: Option<GeometryType>,
        srs: Option<&SpatialRef>,
        options: &CslStringList,
    ) -> Result<Layer<'_>> {
        let c_name = CString::new(name)?;
        let c_srs = srs.map_or(ptr::null_mut(), SpatialRef::c_srs);
        let c_layer = unsafe {
            gdal_sys::GDALDatasetCreateLayer(
                self.c_dataset,
                c_name.as_ptr(),
                c_srs,
                ogr_geometry_type(geometry_type),
                options.as_ptr(),
            )
        };
        unsafe { Layer::from_c_layer(self, c_layer) }
            .ok_or_else(|| _last_null_pointer_err("GDALDatasetCreateLayer"))
    }

    /// Start a transaction when the driver supports efficient ones, `None`
    /// otherwise.
    pub fn start_transaction(&self) -> Result<Option<Transaction<'_>>> {
        let capability = c"Transactions";
        if unsafe { gdal_sys::GDALDatasetTestCapability(self.c_dataset, capability.as_ptr()) } == 0 {
            return Ok(None);
        }
        let rv = unsafe { gdal_sys::GDALDatasetStartTransaction(self.c_dataset, 0) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "GDALDatasetStartTransaction",
            });
        }
        Ok(Some(Transaction {
            dataset: self,
            rollback_on_drop: true,
        }))
    }
}

/// An in-flight transaction on a dataset.
///
/// If the transaction is not explicitly committed when it is dropped, it is
/// implicitly rolled back.
#[derive(Debug)]
pub(crate) struct Transaction<'a> {
    dataset: &'a Dataset,
    rollback_on_drop: bool,
}

impl Transaction<'_> {
    pub fn commit(mut self) -> Result<()> {
        let rv = unsafe { gdal_sys::GDALDatasetCommitTransaction(self.dataset.c_dataset) };
        self.rollback_on_drop = false;
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "GDALDatasetCommitTransaction",
            });
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.rollback_on_drop {
            // nothing to report to from a drop
            unsafe { gdal_sys::GDALDatasetRollbackTransaction(self.dataset.c_dataset) };
        }
    }
}
