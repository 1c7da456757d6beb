use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One state/territory polygon with its population and per-day metrics.
#[derive(Debug, Clone)]
pub struct StateFeature {
    pub abbr: String,
    pub name: String,
    pub population: u64,
    pub geometry: MultiPolygon<f64>,
    /// Precomputed geographic centroid (lon, lat), when the source supplies one.
    pub centroid: Option<Point<f64>>,
    // Map<YYYYMMDD, metrics for that day>
    pub daily: HashMap<String, DailyMetrics>,
}

/// Cumulative counts reported for one state on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyMetrics {
    pub positive: u64,
    pub death: u64,
    pub total_test_results: u64,
}

impl DailyMetrics {
    pub fn get(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Positive => self.positive,
            Metric::Death => self.death,
            Metric::TotalTestResults => self.total_test_results,
        }
    }
}

/// The three reported metric fields, named as in the source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Positive,
    Death,
    TotalTestResults,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Positive, Metric::Death, Metric::TotalTestResults];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Positive => "positive",
            Metric::Death => "death",
            Metric::TotalTestResults => "totalTestResults",
        }
    }

    /// Row label used in the hover tooltip.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Positive => "Positive tests",
            Metric::Death => "Deaths",
            Metric::TotalTestResults => "Tests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapMode {
    Choropleth,
    Bubbles,
}

impl StateFeature {
    /// Cumulative value for the given day. Days the state never reported are 0.
    pub fn value_on(&self, date: &str, metric: Metric) -> f64 {
        self.daily.get(date).map_or(0.0, |m| m.get(metric) as f64)
    }

    /// Value per million residents. The divisor is population / 1e6; callers
    /// wanting a finite result must supply a nonzero population.
    pub fn value_per_million(&self, date: &str, metric: Metric) -> f64 {
        self.value_on(date, metric) / (self.population as f64 / 1_000_000.0)
    }
}
