use crate::types::Metric;
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

const DEATH_LIMITS: [f64; 7] = [1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0];
const POSITIVE_LIMITS: [f64; 7] = [50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0];
const TEST_LIMITS: [f64; 7] = [100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];

// 8-class ColorBrewer ramps, light to dark.
const GREYS: [&str; 8] = [
    "#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525",
];
const ORANGES: [&str; 8] = [
    "#fff5eb", "#fee6ce", "#fdd0a2", "#fdae6b", "#fd8d3c", "#f16913", "#d94801", "#8c2d04",
];
const PURPLES: [&str; 8] = [
    "#fcfbfd", "#efedf5", "#dadaeb", "#bcbddc", "#9e9ac8", "#807dba", "#6a51a3", "#4a1486",
];

/// Piecewise-constant color scale: seven thresholds split the value axis
/// into eight bands. A value equal to a threshold takes the upper band.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdScale {
    thresholds: &'static [f64; 7],
    colors: &'static [&'static str; 8],
}

impl ThresholdScale {
    pub fn color(&self, value: f64) -> &'static str {
        let idx = self.thresholds.partition_point(|t| *t <= value);
        self.colors[idx]
    }
}

pub fn choropleth_scale(metric: Metric) -> ThresholdScale {
    match metric {
        Metric::Death => ThresholdScale {
            thresholds: &DEATH_LIMITS,
            colors: &GREYS,
        },
        Metric::Positive => ThresholdScale {
            thresholds: &POSITIVE_LIMITS,
            colors: &ORANGES,
        },
        Metric::TotalTestResults => ThresholdScale {
            thresholds: &TEST_LIMITS,
            colors: &PURPLES,
        },
    }
}

/// Band color for a per-million value of the given metric.
pub fn choropleth_color(metric: Metric, per_million: f64) -> &'static str {
    choropleth_scale(metric).color(per_million)
}

/// Fill color for the bubble overlay of a metric.
pub fn bubble_color(metric: Metric) -> &'static str {
    match metric {
        Metric::TotalTestResults => "#696DC2",
        Metric::Positive => "#E5A968",
        Metric::Death => "#404856",
    }
}

/// Square-root radius scale mapping [0, max] onto [0, 50] pixels. Values
/// above the domain keep growing; the scale does not clamp.
#[derive(Debug, Clone, Copy)]
pub struct RadiusScale {
    max: f64,
}

impl RadiusScale {
    pub const MAX_RADIUS: f64 = 50.0;

    /// `None` when the domain is empty, so callers skip the bubble pass
    /// entirely on days with no counts.
    pub fn new(max: f64) -> Option<RadiusScale> {
        if max.is_finite() && max > 0.0 {
            Some(RadiusScale { max })
        } else {
            None
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn radius(&self, value: f64) -> f64 {
        if value <= 0.0 {
            return 0.0;
        }
        Self::MAX_RADIUS * (value / self.max).sqrt()
    }
}

/// Legend sample values at 10%, 50% and 100% of the domain, each rounded to
/// one significant digit and truncated to a whole count.
pub fn legend_values(max: f64) -> [i64; 3] {
    [0.1, 0.5, 1.0].map(|f| round_one_significant(max * f))
}

fn round_one_significant(value: f64) -> i64 {
    if !value.is_finite() || value == 0.0 {
        return 0;
    }
    let magnitude = 10f64.powf(value.abs().log10().floor());
    let rounded = (value / magnitude).round() * magnitude;
    rounded.trunc() as i64
}

/// Grouped count for display, e.g. 1234567 -> "1,234,567".
pub fn format_count(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let n = value.round() as i64;
    n.to_formatted_string(&Locale::en)
}

/// Render a YYYYMMDD key as "Mar. 05". Keys that do not parse are shown
/// verbatim.
pub fn format_day(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, "%Y%m%d") {
        Ok(date) => date.format("%b. %d").to_string(),
        Err(_) => raw.to_string(),
    }
}
