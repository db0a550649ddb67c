//! Registry of coordinate reference systems the pipeline accepts.
//!
//! Geometries under different SRIDs are not comparable without reprojection,
//! so every CRS code on a request must be registered here before the engine
//! sees it. The engine remains the authority on the projection math itself.

use std::collections::HashSet;

use crate::errors::{GovError, GovResult};

/// WGS 84, the default SRID for inbound GeoJSON.
pub const WGS84: i32 = 4326;

/// EPSG codes registered out of the box: WGS 84, NAD 83, web mercator, the
/// US national equal-area projections, British national grid, and two common
/// UTM zones.
const DEFAULT_KNOWN: [i32; 8] = [4326, 4269, 3857, 2163, 5070, 27700, 32610, 32633];

#[derive(Debug, Clone)]
pub struct CrsRegistry {
    known: HashSet<i32>,
}

impl Default for CrsRegistry {
    fn default() -> Self {
        Self {
            known: DEFAULT_KNOWN.into_iter().collect(),
        }
    }
}

impl CrsRegistry {
    pub fn with_codes<I: IntoIterator<Item = i32>>(codes: I) -> Self {
        Self {
            known: codes.into_iter().collect(),
        }
    }

    pub fn register(&mut self, code: i32) {
        self.known.insert(code);
    }

    pub fn is_known(&self, code: i32) -> bool {
        self.known.contains(&code)
    }

    pub fn ensure_known(&self, code: i32) -> GovResult<()> {
        if self.is_known(code) {
            Ok(())
        } else {
            Err(GovError::UnsupportedCrs(code))
        }
    }
}
