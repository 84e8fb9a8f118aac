use std::ffi::{c_int, CStr, CString};

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use gdal_sys::{OGRErr, OGRFeatureDefnH, OGRFeatureH};
use log::warn;

use crate::engine::{FieldDefn, FieldType, FieldValue};
use crate::errors::{OgrioError, Result};
use crate::geometry::Geometry;
use crate::ogr::geometry::{decode, OwnedGeometry};
use crate::ogr::utils::{_last_null_pointer_err, _take_cpl_msg};

/// `OGR_F_GetFieldAsDateTimeEx` time zone flags.
const TZ_UNKNOWN: c_int = 0;
const TZ_LOCALTIME: c_int = 1;
const TZ_UTC: c_int = 100;

/// A feature owned by the caller, destroyed on drop.
#[derive(Debug)]
pub(crate) struct OwnedFeature {
    c_feature: OGRFeatureH,
}

impl Drop for OwnedFeature {
    fn drop(&mut self) {
        unsafe { gdal_sys::OGR_F_Destroy(self.c_feature) };
    }
}

impl OwnedFeature {
    /// Take ownership of a feature returned by GDAL, `None` for null handles.
    ///
    /// # Safety
    /// `c_feature` must be null or a feature the caller is responsible for.
    pub unsafe fn from_c_feature(c_feature: OGRFeatureH) -> Option<OwnedFeature> {
        (!c_feature.is_null()).then_some(OwnedFeature { c_feature })
    }

    /// A blank feature for a layer definition.
    pub fn create(c_defn: OGRFeatureDefnH) -> Result<OwnedFeature> {
        let c_feature = unsafe { gdal_sys::OGR_F_Create(c_defn) };
        if c_feature.is_null() {
            return Err(_last_null_pointer_err("OGR_F_Create"));
        }
        Ok(OwnedFeature { c_feature })
    }

    pub fn c_feature(&self) -> OGRFeatureH {
        self.c_feature
    }

    /// Read field `idx` as a value of `field.field_type`.
    pub fn field(&self, idx: c_int, field: &FieldDefn) -> Result<FieldValue> {
        if unsafe { gdal_sys::OGR_F_IsFieldSetAndNotNull(self.c_feature, idx) } == 0 {
            return Ok(FieldValue::Null);
        }
        let value = match &field.field_type {
            FieldType::Integer | FieldType::Integer64 | FieldType::Boolean => FieldValue::Integer(
                unsafe { gdal_sys::OGR_F_GetFieldAsInteger64(self.c_feature, idx) },
            ),
            FieldType::Real => {
                FieldValue::Real(unsafe { gdal_sys::OGR_F_GetFieldAsDouble(self.c_feature, idx) })
            }
            FieldType::Date | FieldType::Time | FieldType::DateTime => {
                self.datetime(idx, field)?
            }
            FieldType::String | FieldType::Other(_) => FieldValue::String(self.string(idx, field)),
        };
        Ok(value)
    }

    fn string(&self, idx: c_int, field: &FieldDefn) -> String {
        let c_str = unsafe { gdal_sys::OGR_F_GetFieldAsString(self.c_feature, idx) };
        if c_str.is_null() {
            return String::new();
        }
        let c_str = unsafe { CStr::from_ptr(c_str) };
        match c_str.to_str() {
            Ok(text) => text.to_string(),
            Err(err) => {
                warn!(
                    "Field '{}' is not valid UTF-8 ({err}), invalid bytes are replaced",
                    field.name
                );
                c_str.to_string_lossy().into_owned()
            }
        }
    }

    fn datetime(&self, idx: c_int, field: &FieldDefn) -> Result<FieldValue> {
        let invalid = |msg: String| OgrioError::InvalidFieldValue {
            field: field.name.clone(),
            msg,
        };
        let (mut year, mut month, mut day, mut hour, mut minute, mut tzflag) = (0, 0, 0, 0, 0, 0);
        let mut second = 0f32;
        let rv = unsafe {
            gdal_sys::OGR_F_GetFieldAsDateTimeEx(
                self.c_feature,
                idx,
                &mut year,
                &mut month,
                &mut day,
                &mut hour,
                &mut minute,
                &mut second,
                &mut tzflag,
            )
        };
        if rv == 0 {
            return Err(invalid(_take_cpl_msg("not a date or time")));
        }

        // leap seconds are folded into the last millisecond of the minute
        let second = second.clamp(0.0, 59.999);
        let whole = second.trunc();
        let millis = (((second - whole) * 1000.0).round() as u32).min(999);
        let time = NaiveTime::from_hms_milli_opt(hour as u32, minute as u32, whole as u32, millis)
            .ok_or_else(|| invalid(format!("invalid time {hour:02}:{minute:02}:{second}")))?;
        if field.field_type == FieldType::Time {
            return Ok(FieldValue::Time(time));
        }
        let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
            .ok_or_else(|| invalid(format!("invalid date {year:04}-{month:02}-{day:02}")))?;
        if field.field_type == FieldType::Date {
            return Ok(FieldValue::Date(date));
        }

        let naive = NaiveDateTime::new(date, time);
        let value = match tzflag {
            TZ_UNKNOWN | TZ_LOCALTIME => FieldValue::DateTime(naive),
            // 100 is UTC, each step away from it is a quarter hour
            tz => {
                let zoned = FixedOffset::east_opt((tz - TZ_UTC) * 15 * 60)
                    .and_then(|offset| naive.and_local_timezone(offset).single())
                    .ok_or_else(|| invalid(format!("invalid time zone flag {tz}")))?;
                FieldValue::DateTimeTz(zoned)
            }
        };
        Ok(value)
    }

    /// The feature's geometry, `None` when it has none.
    pub fn geometry(&self, force_2d: bool) -> Result<Option<Geometry>> {
        let c_geom = unsafe { gdal_sys::OGR_F_GetGeometryRef(self.c_feature) };
        if c_geom.is_null() {
            return Ok(None);
        }
        if force_2d {
            unsafe { gdal_sys::OGR_G_FlattenTo2D(c_geom) };
        }
        unsafe { decode(c_geom) }
    }

    pub fn set_field(&mut self, idx: c_int, value: &FieldValue) -> Result<()> {
        match value {
            FieldValue::Null => unsafe { gdal_sys::OGR_F_SetFieldNull(self.c_feature, idx) },
            FieldValue::Integer(v) => unsafe {
                gdal_sys::OGR_F_SetFieldInteger64(self.c_feature, idx, *v)
            },
            FieldValue::Real(v) => unsafe { gdal_sys::OGR_F_SetFieldDouble(self.c_feature, idx, *v) },
            FieldValue::String(v) => {
                let c_str = CString::new(v.as_str())?;
                unsafe { gdal_sys::OGR_F_SetFieldString(self.c_feature, idx, c_str.as_ptr()) }
            }
            FieldValue::Date(d) => self.set_datetime(idx, Some(*d), None, TZ_UNKNOWN),
            FieldValue::Time(t) => self.set_datetime(idx, None, Some(*t), TZ_UNKNOWN),
            FieldValue::DateTime(dt) => {
                self.set_datetime(idx, Some(dt.date()), Some(dt.time()), TZ_UNKNOWN)
            }
            FieldValue::DateTimeTz(dt) => {
                let tzflag = TZ_UTC + dt.offset().local_minus_utc() / (15 * 60);
                let local = dt.naive_local();
                self.set_datetime(idx, Some(local.date()), Some(local.time()), tzflag)
            }
        }
        Ok(())
    }

    fn set_datetime(
        &mut self,
        idx: c_int,
        date: Option<NaiveDate>,
        time: Option<NaiveTime>,
        tzflag: c_int,
    ) {
        let (year, month, day) = date.map_or((0, 0, 0), |d| (d.year(), d.month(), d.day()));
        let (hour, minute, second) = time.map_or((0, 0, 0.0), |t| {
            (
                t.hour(),
                t.minute(),
                t.second() as f32 + t.nanosecond() as f32 / 1e9,
            )
        });
        unsafe {
            gdal_sys::OGR_F_SetFieldDateTimeEx(
                self.c_feature,
                idx,
                year,
                month as c_int,
                day as c_int,
                hour as c_int,
                minute as c_int,
                second,
                tzflag,
            )
        };
    }

    pub fn set_geometry(&mut self, geometry: &Geometry) -> Result<()> {
        let owned = OwnedGeometry::encode(geometry)?;
        let rv =
            unsafe { gdal_sys::OGR_F_SetGeometryDirectly(self.c_feature, owned.into_c_geometry()) };
        if rv != OGRErr::OGRERR_NONE {
            return Err(OgrioError::OgrError {
                err: rv,
                method_name: "OGR_F_SetGeometryDirectly",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coord;

    /// A feature definition with one field per `(name, type)`; release with
    /// `OGR_FD_Release`.
    fn defn(fields: &[(&CStr, gdal_sys::OGRFieldType::Type)]) -> OGRFeatureDefnH {
        let c_defn = unsafe { gdal_sys::OGR_FD_Create(c"test".as_ptr()) };
        unsafe { gdal_sys::OGR_FD_Reference(c_defn) };
        for (name, ty) in fields {
            let c_field = unsafe { gdal_sys::OGR_Fld_Create(name.as_ptr(), *ty) };
            unsafe {
                gdal_sys::OGR_FD_AddFieldDefn(c_defn, c_field);
                gdal_sys::OGR_Fld_Destroy(c_field);
            }
        }
        c_defn
    }

    fn set_raw_datetime(feature: &OwnedFeature, idx: c_int, ymd: (c_int, c_int, c_int), second: f32) {
        unsafe {
            gdal_sys::OGR_F_SetFieldDateTimeEx(
                feature.c_feature(),
                idx,
                ymd.0,
                ymd.1,
                ymd.2,
                23,
                59,
                second,
                TZ_UNKNOWN,
            )
        };
    }

    #[test]
    fn test_field_and_geometry_values() {
        let c_defn = defn(&[
            (c"i", gdal_sys::OGRFieldType::OFTInteger64),
            (c"s", gdal_sys::OGRFieldType::OFTString),
            (c"d", gdal_sys::OGRFieldType::OFTDateTime),
            (c"z", gdal_sys::OGRFieldType::OFTDateTime),
        ]);
        let when = NaiveDate::from_ymd_opt(2020, 2, 3)
            .unwrap()
            .and_hms_milli_opt(4, 5, 6, 700)
            .unwrap();
        let zoned = when
            .and_local_timezone(FixedOffset::east_opt(2 * 3600).unwrap())
            .unwrap();
        {
            let mut feature = OwnedFeature::create(c_defn).unwrap();
            feature.set_field(0, &FieldValue::Integer(1 << 40)).unwrap();
            feature.set_field(1, &FieldValue::Null).unwrap();
            feature.set_field(2, &FieldValue::DateTime(when)).unwrap();
            feature.set_field(3, &FieldValue::DateTimeTz(zoned)).unwrap();
            feature
                .set_geometry(&Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)))
                .unwrap();

            let field = |idx: c_int, field_type: FieldType| {
                feature.field(idx, &FieldDefn::new("f", field_type)).unwrap()
            };
            assert_eq!(field(0, FieldType::Integer64), FieldValue::Integer(1 << 40));
            assert_eq!(field(1, FieldType::String), FieldValue::Null);
            assert_eq!(field(2, FieldType::DateTime), FieldValue::DateTime(when));
            assert_eq!(field(3, FieldType::DateTime), FieldValue::DateTimeTz(zoned));
            assert_eq!(
                feature.geometry(false).unwrap(),
                Some(Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)))
            );
            assert_eq!(
                feature.geometry(true).unwrap(),
                Some(Geometry::Point(Coord::xy(1.0, 2.0)))
            );
        }
        unsafe { gdal_sys::OGR_FD_Release(c_defn) };
    }

    #[test]
    fn test_leap_second_and_invalid_dates() {
        let c_defn = defn(&[
            (c"leap", gdal_sys::OGRFieldType::OFTDateTime),
            (c"bad", gdal_sys::OGRFieldType::OFTDateTime),
        ]);
        {
            let feature = OwnedFeature::create(c_defn).unwrap();
            set_raw_datetime(&feature, 0, (2016, 12, 31), 60.0);
            set_raw_datetime(&feature, 1, (2016, 13, 31), 0.0);

            let leap = feature
                .field(0, &FieldDefn::new("leap", FieldType::DateTime))
                .unwrap();
            let expected = NaiveDate::from_ymd_opt(2016, 12, 31)
                .unwrap()
                .and_hms_milli_opt(23, 59, 59, 999)
                .unwrap();
            assert_eq!(leap, FieldValue::DateTime(expected));

            let err = feature
                .field(1, &FieldDefn::new("bad", FieldType::DateTime))
                .unwrap_err();
            match err {
                OgrioError::InvalidFieldValue { field, .. } => assert_eq!(field, "bad"),
                other => panic!("unexpected error {other:?}"),
            }
        }
        unsafe { gdal_sys::OGR_FD_Release(c_defn) };
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let c_defn = defn(&[(c"name", gdal_sys::OGRFieldType::OFTString)]);
        {
            let feature = OwnedFeature::create(c_defn).unwrap();
            // Latin-1 "café"
            let latin1 = CString::new(vec![b'c', b'a', b'f', 0xe9]).unwrap();
            unsafe { gdal_sys::OGR_F_SetFieldString(feature.c_feature(), 0, latin1.as_ptr()) };

            let value = feature
                .field(0, &FieldDefn::new("name", FieldType::String))
                .unwrap();
            assert_eq!(value, FieldValue::String("caf\u{FFFD}".to_string()));
        }
        unsafe { gdal_sys::OGR_FD_Release(c_defn) };
    }
}
