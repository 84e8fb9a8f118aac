use std::ffi::CString;
use std::marker::PhantomData;

use gdal_sys::{OGRErr, OGRFieldSubType, OGRFieldType, OGRLayerH};

use crate::engine::{FieldDefn, FieldType, LayerInfo};
use crate::errors::{OgrioError, Result};
use crate::geometry::GeometryType;
use crate::ogr::dataset::Dataset;
use crate::ogr::feature::OwnedFeature;
use crate::ogr::geometry::layer_geometry_type;
use crate::ogr::srs::SpatialRef;
use crate::ogr::utils::{_last_null_pointer_err, _string, _take_cpl_msg};

/// A layer borrowed from an open [`Dataset`].
#[derive(Debug)]
pub(crate) struct Layer<'a> {
    c_layer: OGRLayerH,
    phantom: PhantomData<&'a Dataset>,
}

fn field_type(c_type: OGRFieldType::Type, c_subtype: OGRFieldSubType::Type) -> FieldType {
    match c_type {
        OGRFieldType::OFTInteger if c_subtype == OGRFieldSubType::OFSTBoolean => FieldType::Boolean,
        OGRFieldType::OFTInteger => FieldType::Integer,
        OGRFieldType::OFTInteger64 => FieldType::Integer64,
        OGRFieldType::OFTReal => FieldType::Real,
        OGRFieldType::OFTString => FieldType::String,
        OGRFieldType::OFTDate => FieldType::Date,
        OGRFieldType::OFTTime => FieldType::Time,
        OGRFieldType::OFTDateTime => FieldType::DateTime,
        other => FieldType::Other(_string(unsafe { gdal_sys::OGR_GetFieldTypeName(other) })),
    }
}

fn ogr_field_type(field_type: &FieldType) -> Result<OGRFieldType::Type> {
    let c_type = match field_type {
        FieldType::Integer | FieldType::Boolean => OGRFieldType::OFTInteger,
        FieldType::Integer64 => OGRFieldType::OFTInteger64,
        FieldType::Real => OGRFieldType::OFTReal,
        FieldType::String => OGRFieldType::OFTString,
        FieldType::Date => OGRFieldType::OFTDate,
        FieldType::Time => OGRFieldType::OFTTime,
        FieldType::DateTime => OGRFieldType::OFTDateTime,
        FieldType::Other(name) => {
            return Err(OgrioError::BadArgument(format!(
                "cannot create a field of type '{name}'"
            )))
        }
    };
    Ok(c_type)
}

impl<'a> Layer<'a> {
    /// # Safety
    /// `c_layer` must be null or a layer of `dataset`.
    pub(crate) unsafe fn from_c_layer(_dataset: &'a Dataset, c_layer: OGRLayerH) -> Option<Self> {
        (!c_layer.is_null()).then_some(Layer {
            c_layer,
            phantom: PhantomData,
        })
    }

    pub fn name(&self) -> String {
        _string(unsafe { gdal_sys::OGR_L_GetName(self.c_layer) })
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        layer_geometry_type(unsafe { gdal_sys::OGR_L_GetGeomType(self.c_layer) })
    }

    pub fn info(&self) -> LayerInfo {
        LayerInfo {
            name: self.name(),
            geometry_type: self.geometry_type(),
        }
    }

    /// The layer's attribute fields, in native order.
    pub fn fields(&self) -> Vec<FieldDefn> {
        let c_defn = unsafe { gdal_sys::OGR_L_GetLayerDefn(self.c_layer) };
        let count = unsafe { gdal_sys::OGR_FD_GetFieldCount(c_defn) };
        (0..count)
            .map(|idx| {
                let c_field = unsafe { gdal_sys::OGR_FD_GetFieldDefn(c_defn, idx) };
                let name = _string(unsafe { gdal_sys::OGR_Fld_GetNameRef(c_field) });
                let c_type = unsafe { gdal_sys::OGR_Fld_GetType(c_field) };
                let c_subtype = unsafe { gdal_sys::OGR_Fld_GetSubType(c_field) };
                FieldDefn::new(name, field_type(c_type, c_subtype))
            })
            .collect()
    }

    /// The layer's CRS as `AUTHORITY:CODE` or WKT.
    pub fn crs(&self) -> Result<Option<String>> {
        let srs = unsafe { SpatialRef::from_c_srs(gdal_sys::OGR_L_GetSpatialRef(self.c_layer)) };
        srs.map(|srs| srs.to_crs_string()).transpose()
    }

    /// Restrict the features returned by [`features`](Self::features).
    pub fn set_attribute_filter(&mut self, clause: &str) -> Result<()> {
        let c_clause = CString::new(clause)?;
        let rv = unsafe { gdal_sys::OGR_L_SetAttributeFilter(self.c_layer, c_clause.as_ptr()) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::InvalidFilter {
                filter: clause.to_string(),
                msg: _take_cpl_msg("the filter was rejected"),
            });
        }
        Ok(())
    }

    /// Iterate features from the start of the layer.
    pub fn features(&mut self) -> FeatureIterator<'_> {
        unsafe { gdal_sys::OGR_L_ResetReading(self.c_layer) };
        FeatureIterator {
            c_layer: self.c_layer,
            phantom: PhantomData,
        }
    }

    pub fn create_field(&mut self, field: &FieldDefn) -> Result<()> {
        let c_name = CString::new(field.name.as_str())?;
        let c_type = ogr_field_type(&field.field_type)?;
        let c_field = unsafe { gdal_sys::OGR_Fld_Create(c_name.as_ptr(), c_type) };
        if c_field.is_null() {
            return Err(_last_null_pointer_err("OGR_Fld_Create"));
        }
        if field.field_type == FieldType::Boolean {
            unsafe { gdal_sys::OGR_Fld_SetSubType(c_field, OGRFieldSubType::OFSTBoolean) };
        }
        let rv = unsafe { gdal_sys::OGR_L_CreateField(self.c_layer, c_field, 1) };
        unsafe { gdal_sys::OGR_Fld_Destroy(c_field) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "OGR_L_CreateField",
            });
        }
        Ok(())
    }

    /// A blank feature matching the layer's current definition.
    pub fn new_feature(&self) -> Result<OwnedFeature> {
        OwnedFeature::create(unsafe { gdal_sys::OGR_L_GetLayerDefn(self.c_layer) })
    }

    pub fn create_feature(&mut self, feature: &OwnedFeature) -> Result<()> {
        let rv = unsafe { gdal_sys::OGR_L_CreateFeature(self.c_layer, feature.c_feature()) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "OGR_L_CreateFeature",
            });
        }
        Ok(())
    }
}

/// Owned features of a layer, in the layer's order.
pub(crate) struct FeatureIterator<'a> {
    c_layer: OGRLayerH,
    phantom: PhantomData<&'a mut ()>,
}

impl Iterator for FeatureIterator<'_> {
    type Item = OwnedFeature;

    fn next(&mut self) -> Option<OwnedFeature> {
        unsafe { OwnedFeature::from_c_feature(gdal_sys::OGR_L_GetNextFeature(self.c_layer)) }
    }
}
