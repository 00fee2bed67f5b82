//! Pure analytics over the mirrored datasets.
//!
//! Every function here is deterministic over its inputs so a redelivered
//! completion message can be processed again with the same result.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{BestYear, JoinedRow, MomentStats, PopulationRecord, SeriesRecord};

/// Parse the tab-separated time-series table.
///
/// Columns are located by header name; cells are whitespace-trimmed. Rows
/// whose year or value does not parse are skipped.
pub fn parse_series_table(text: &str, key: &str) -> Result<Vec<SeriesRecord>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| AppError::dataset(key, "empty table"))?
        .split('\t')
        .map(str::trim)
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| AppError::dataset(key, format!("missing column {name:?}")))
    };
    let (id_col, year_col, period_col, value_col) = (
        column("series_id")?,
        column("year")?,
        column("period")?,
        column("value")?,
    );

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for line in lines {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
        let cell = |i: usize| cells.get(i).copied().unwrap_or("");

        match (cell(year_col).parse::<i32>(), cell(value_col).parse::<f64>()) {
            (Ok(year), Ok(value)) if !cell(id_col).is_empty() => records.push(SeriesRecord {
                series_id: cell(id_col).to_string(),
                year,
                period: cell(period_col).to_string(),
                value,
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        log::debug!("{key}: skipped {skipped} unparsable rows");
    }
    Ok(records)
}

/// Parse the aggregate dataset: `{"data": [{"Year": .., "Population": ..}]}`.
///
/// `Year` and `Population` may be numbers or numeric strings.
pub fn parse_population(bytes: &[u8], key: &str) -> Result<Vec<PopulationRecord>> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::dataset(key, format!("invalid JSON: {e}")))?;
    let rows = document
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::dataset(key, "missing `data` array"))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let year = number(row.get("Year")?)? as i32;
            let population = number(row.get("Population")?)?;
            Some(PopulationRecord { year, population })
        })
        .collect())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Mean and sample standard deviation of population over `[from, to]`.
pub fn population_stats(records: &[PopulationRecord], from: i32, to: i32) -> Result<MomentStats> {
    let in_range: Vec<&PopulationRecord> = records
        .iter()
        .filter(|r| (from..=to).contains(&r.year))
        .collect();
    if in_range.is_empty() {
        return Err(AppError::dataset(
            "population",
            format!("no rows between {from} and {to}"),
        ));
    }

    let n = in_range.len() as f64;
    let mean = in_range.iter().map(|r| r.population).sum::<f64>() / n;
    let std_dev = (in_range.len() >= 2).then(|| {
        let sum_sq: f64 = in_range.iter().map(|r| (r.population - mean).powi(2)).sum();
        (sum_sq / (n - 1.0)).sqrt()
    });

    Ok(MomentStats {
        mean,
        std_dev,
        count: in_range.len(),
        min_year: in_range.iter().map(|r| r.year).min().unwrap_or(from),
        max_year: in_range.iter().map(|r| r.year).max().unwrap_or(to),
    })
}

/// For each series, the year whose summed value over `periods` is largest.
///
/// An empty `periods` accepts every period. Ties go to the earliest year.
/// Output is ordered by series id.
pub fn best_year_per_series(records: &[SeriesRecord], periods: &[String]) -> Vec<BestYear> {
    let mut sums: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for record in records {
        if !periods.is_empty() && !periods.iter().any(|p| *p == record.period) {
            continue;
        }
        *sums
            .entry(record.series_id.as_str())
            .or_default()
            .entry(record.year)
            .or_insert(0.0) += record.value;
    }

    sums.into_iter()
        .filter_map(|(series_id, years)| {
            let mut best: Option<(i32, f64)> = None;
            for (year, total) in years {
                if best.is_none_or(|(_, top)| total > top) {
                    best = Some((year, total));
                }
            }
            best.map(|(year, value)| BestYear {
                series_id: series_id.to_string(),
                year,
                value,
            })
        })
        .collect()
}

/// Inner join of one series/period against population by year.
pub fn join_series_population(
    records: &[SeriesRecord],
    population: &[PopulationRecord],
    series_id: &str,
    period: &str,
) -> Vec<JoinedRow> {
    let by_year: HashMap<i32, f64> = population.iter().map(|p| (p.year, p.population)).collect();

    let mut rows: Vec<JoinedRow> = records
        .iter()
        .filter(|r| r.series_id == series_id && r.period == period)
        .filter_map(|r| {
            by_year.get(&r.year).map(|&population| JoinedRow {
                series_id: r.series_id.clone(),
                year: r.year,
                period: r.period.clone(),
                value: r.value,
                population,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.year);
    rows
}
