//! Analytics records and results.

use serde::{Deserialize, Serialize};

/// One row of the time-series table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub series_id: String,
    pub year: i32,
    pub period: String,
    pub value: f64,
}

impl SeriesRecord {
    pub fn new(series_id: &str, year: i32, period: &str, value: f64) -> Self {
        Self {
            series_id: series_id.to_string(),
            year,
            period: period.to_string(),
            value,
        }
    }
}

/// One row of the aggregate dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub year: i32,
    pub population: f64,
}

/// Mean and sample standard deviation over a year range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentStats {
    pub mean: f64,
    /// None when fewer than two rows
    pub std_dev: Option<f64>,
    pub count: usize,
    pub min_year: i32,
    pub max_year: i32,
}

/// Year with the largest summed value for a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestYear {
    pub series_id: String,
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub series_id: String,
    pub year: i32,
    pub period: String,
    pub value: f64,
    pub population: f64,
}

/// All three analytics results for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub run_id: Option<uuid::Uuid>,
    pub population_stats: MomentStats,
    pub best_years: Vec<BestYear>,
    pub joined: Vec<JoinedRow>,
}
