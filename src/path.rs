//! Dataset paths, including GDAL virtual file system prefixes.
//!
//! URIs such as `zip://data.zip!countries.shp` or `s3://bucket/roads.gpkg` are
//! rewritten into the `/vsi...` form the engine understands. See
//! <https://gdal.org/user/virtual_file_systems.html>.

use std::fmt::{self, Display, Formatter};
use std::path::Path;

const ARCHIVE_SCHEMES: &[(&str, &str)] = &[
    ("zip", "/vsizip/"),
    ("tar", "/vsitar/"),
    ("gzip", "/vsigzip/"),
];

const TRANSPORT_SCHEMES: &[(&str, &str)] = &[
    ("http", "/vsicurl/"),
    ("https", "/vsicurl/"),
    ("s3", "/vsis3/"),
    ("gs", "/vsigs/"),
    ("az", "/vsiaz/"),
];

/// A normalised dataset location.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetPath {
    path: String,
}

impl DatasetPath {
    pub fn new(input: impl AsRef<str>) -> Self {
        DatasetPath {
            path: to_vsi_path(input.as_ref()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether the path goes through a virtual file system.
    pub fn is_virtual(&self) -> bool {
        self.path.starts_with("/vsi")
    }

    /// The path on the local file system, `None` for virtual paths.
    pub fn local_path(&self) -> Option<&Path> {
        (!self.is_virtual()).then(|| Path::new(&self.path))
    }

    /// File name without extension, used as default layer name on write.
    pub fn file_stem(&self) -> Option<&str> {
        Path::new(&self.path).file_stem().and_then(|s| s.to_str())
    }

    /// Lower-cased extension of the last path component.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.path)
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
    }
}

impl Display for DatasetPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for DatasetPath {
    fn from(path: &str) -> Self {
        DatasetPath::new(path)
    }
}

impl From<String> for DatasetPath {
    fn from(path: String) -> Self {
        DatasetPath::new(path)
    }
}

impl From<&Path> for DatasetPath {
    fn from(path: &Path) -> Self {
        DatasetPath::new(path.to_string_lossy())
    }
}

impl From<&std::path::PathBuf> for DatasetPath {
    fn from(path: &std::path::PathBuf) -> Self {
        DatasetPath::from(path.as_path())
    }
}

fn lookup(table: &[(&str, &'static str)], scheme: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(scheme))
        .map(|(_, prefix)| *prefix)
}

fn to_vsi_path(input: &str) -> String {
    if input.starts_with("/vsi") {
        return input.to_string();
    }

    let Some((scheme, rest)) = input.split_once("://") else {
        if input.to_ascii_lowercase().ends_with(".zip") {
            return format!("/vsizip/{input}");
        }
        return input.to_string();
    };

    // `archive+transport://`, e.g. `zip+https://host/data.zip!inner.shp`
    let (archive, transport) = match scheme.split_once('+') {
        Some((archive, transport)) => (lookup(ARCHIVE_SCHEMES, archive), Some(transport)),
        None => match lookup(ARCHIVE_SCHEMES, scheme) {
            Some(archive) => (Some(archive), None),
            None => (None, Some(scheme)),
        },
    };

    let (outer, inner) = match rest.split_once('!') {
        Some((outer, inner)) => (outer, Some(inner.trim_start_matches('/'))),
        None => (rest, None),
    };

    let mut path = match transport {
        Some(t) if t.eq_ignore_ascii_case("file") => outer.to_string(),
        Some(t) => match lookup(TRANSPORT_SCHEMES, t) {
            Some(prefix) if prefix == "/vsicurl/" => format!("{prefix}{t}://{outer}"),
            Some(prefix) => format!("{prefix}{outer}"),
            // unknown scheme, let the engine decide what to do with it
            None => return input.to_string(),
        },
        None => outer.to_string(),
    };

    if let Some(archive) = archive {
        path = format!("{archive}{path}");
    }
    if let Some(inner) = inner {
        path = format!("{path}/{inner}");
    }
    path
}
