//! GB 3095-2012 concentration breakpoints.
//!
//! Each pollutant maps to seven contiguous segments. Concentration ranges
//! are in µg/m³ except CO (mg/m³). IAQI ranges are shared by all pollutants.

use crate::Pollutant;
use serde::Serialize;

/// One piecewise-linear segment of the IAQI curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakpointSegment {
    pub bp_lo: f64,
    pub bp_hi: f64,
    pub iaqi_lo: f64,
    pub iaqi_hi: f64,
}

impl BreakpointSegment {
    const fn new(bp_lo: f64, bp_hi: f64, iaqi_lo: f64, iaqi_hi: f64) -> Self {
        Self {
            bp_lo,
            bp_hi,
            iaqi_lo,
            iaqi_hi,
        }
    }

    /// Linear interpolation across this segment, without clamping.
    pub fn interpolate(&self, value: f64) -> f64 {
        (self.iaqi_hi - self.iaqi_lo) * (value - self.bp_lo) / (self.bp_hi - self.bp_lo)
            + self.iaqi_lo
    }
}

macro_rules! table {
    ($($lo:expr, $hi:expr);* $(;)?) => {{
        const IAQI: [(f64, f64); 7] = [
            (0.0, 50.0),
            (50.0, 100.0),
            (100.0, 150.0),
            (150.0, 200.0),
            (200.0, 300.0),
            (300.0, 400.0),
            (400.0, 500.0),
        ];
        let bps = [$(($lo as f64, $hi as f64)),*];
        let mut out = [BreakpointSegment::new(0.0, 0.0, 0.0, 0.0); 7];
        let mut i = 0;
        while i < 7 {
            out[i] = BreakpointSegment::new(bps[i].0, bps[i].1, IAQI[i].0, IAQI[i].1);
            i += 1;
        }
        out
    }};
}

const PM25: [BreakpointSegment; 7] =
    table!(0, 35; 35, 75; 75, 115; 115, 150; 150, 250; 250, 350; 350, 500);
const PM10: [BreakpointSegment; 7] =
    table!(0, 50; 50, 150; 150, 250; 250, 350; 350, 420; 420, 500; 500, 600);
const SO2: [BreakpointSegment; 7] =
    table!(0, 50; 50, 150; 150, 475; 475, 800; 800, 1600; 1600, 2100; 2100, 2620);
const NO2: [BreakpointSegment; 7] =
    table!(0, 40; 40, 80; 80, 180; 180, 280; 280, 565; 565, 750; 750, 940);
const CO: [BreakpointSegment; 7] = table!(0, 2; 2, 4; 4, 14; 14, 24; 24, 36; 36, 48; 48, 60);
const O3: [BreakpointSegment; 7] =
    table!(0, 100; 100, 160; 160, 215; 215, 265; 265, 800; 800, 1000; 1000, 1200);

/// Breakpoint table for a pollutant, lowest segment first.
pub fn breakpoints_for(pollutant: Pollutant) -> &'static [BreakpointSegment; 7] {
    match pollutant {
        Pollutant::Pm25 => &PM25,
        Pollutant::Pm10 => &PM10,
        Pollutant::So2 => &SO2,
        Pollutant::No2 => &NO2,
        Pollutant::Co => &CO,
        Pollutant::O3 => &O3,
    }
}

/// First segment whose upper bound is at or above `value`, else the last
/// segment. Values above the table extrapolate from the top segment.
pub(crate) fn locate(pollutant: Pollutant, value: f64) -> &'static BreakpointSegment {
    let table = breakpoints_for(pollutant);
    table
        .iter()
        .find(|seg| value <= seg.bp_hi)
        .unwrap_or(&table[table.len() - 1])
}
