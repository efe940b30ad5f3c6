use std::collections::BTreeMap;
use itertools::Itertools;
use log::*;

use crate::{round_to, AnalyzeError, Result, Series, StatName, YAxisRegistry};

/// Percentile drawn for the daily variation summaries.
pub const DAILY_PERCENTILE: f64 = 0.85;
/// Registry key for the network variation chart.
pub const NETWORK_SUMMARY: &str = "network_summary";

/// Linear interpolation between the order statistics around rank `(n-1)*p`.
/// NaN values are ignored; no values at all gives NaN.
pub fn quantile(
    values: impl IntoIterator<Item = f64>,
    percentile: f64,
) -> f64
{
    let sorted: Vec<f64> = values
        .into_iter()
        .filter(|value| !value.is_nan())
        .sorted_by(|a, b| a.total_cmp(b))
        .collect();
    if sorted.is_empty() { return f64::NAN };
    let rank = (sorted.len() - 1) as f64 * percentile.clamp(0., 1.);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
}

/// The `percentile` quantile of `column`, rounded to 2 digits.
pub fn calculate_percentile(
    percentile: f64,
    series: &Series,
    column: &str,
) -> Result<f64>
{
    if series.name() != column
    {
        return Err(AnalyzeError::ColumnNotFound { column: column.to_string() });
    }
    Ok(round_to(quantile(series.values(), percentile), 2))
}

/// Values grouped by calendar day (first 10 characters of the timestamp),
/// days in ascending order.
fn group_by_day(series: &Series) -> BTreeMap<&str, Vec<f64>>
{
    let mut days: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (timestamp, value) in series.points()
    {
        let day = timestamp.get(..10).unwrap_or(timestamp);
        days.entry(day).or_default().push(*value);
    }
    days
}

/// One point per day at midnight.
fn daily_series(
    name: &str,
    days: &BTreeMap<&str, Vec<f64>>,
    aggregate: impl Fn(&[f64]) -> f64,
) -> Series
{
    Series::new(name, days.iter().map(|(day, values)| (format!("{} 00:00:00", day), aggregate(values))).collect())
}

fn finite_min(values: &[f64]) -> f64
{
    values.iter().copied().filter(|value| !value.is_nan()).reduce(f64::min).unwrap_or(f64::NAN)
}

fn finite_max(values: &[f64]) -> f64
{
    values.iter().copied().filter(|value| !value.is_nan()).reduce(f64::max).unwrap_or(f64::NAN)
}

/// Daily minimum, maximum and 85th percentile of CPU utilization, as the
/// series `min`, `max` and `85percentile`.
pub fn generate_cpu_summary(series: &Series) -> BTreeMap<String, Series>
{
    if series.is_empty() { return BTreeMap::new() };
    let days = group_by_day(series);
    debug!("cpu summary over {} days", days.len());
    BTreeMap::from([
        ("min".to_string(), daily_series("min", &days, finite_min)),
        ("max".to_string(), daily_series("max", &days, finite_max)),
        ("85percentile".to_string(), daily_series("85percentile", &days, |values| quantile(values.iter().copied(), DAILY_PERCENTILE))),
    ])
}

/// Daily 85th percentile of every non empty network series, named
/// `<series>85pct`. The maximum of each series is recorded as the local
/// throughput scale of the network summary chart.
pub fn generate_network_summary(
    stat_series: &BTreeMap<String, Series>,
    registry: &mut YAxisRegistry,
) -> Result<BTreeMap<String, Series>>
{
    let mut summary = BTreeMap::new();
    for (series_name, series) in stat_series.iter().filter(|(_, series)| !series.is_empty())
    {
        let y_max = calculate_percentile(1., series, series_name)?;
        registry.set(y_max, NETWORK_SUMMARY, StatName::Throughput, false);
        let name = format!("{}85pct", series_name);
        let days = group_by_day(series);
        summary.insert(name.clone(), daily_series(&name, &days, |values| quantile(values.iter().copied(), DAILY_PERCENTILE)));
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMPS: [&str; 6] = [
        "2019-03-20 11:55:00", "2019-03-20 11:56:00", "2019-03-20 11:57:00",
        "2019-03-21 11:58:00", "2019-03-21 11:59:00", "2019-03-21 12:00:00",
    ];

    fn series(name: &str, values: &[f64]) -> Series {
        Series::new(name, TIMESTAMPS.iter().map(|timestamp| timestamp.to_string()).zip(values.iter().copied()).collect())
    }

    fn assert_close(left: f64, right: f64) {
        assert!((left - right).abs() < 1e-9, "{} != {}", left, right);
    }

    #[test]
    fn percentile_regression_fixture() {
        let read_throughput = Series::new("read_throughput", [0.52, 12.4, 3.75, 41.8, 18.3, 44.27, 9.6, 27.35, 36.0, 5.05, 22.7, 30.15]
            .iter()
            .enumerate()
            .map(|(minute, value)| (format!("2019-03-20 11:{:02}:00", minute), *value))
            .collect());
        assert_eq!(calculate_percentile(0.95, &read_throughput, "read_throughput").unwrap(), 42.91);
        assert_eq!(calculate_percentile(0.99, &read_throughput, "read_throughput").unwrap(), 44.0);
        assert_eq!(calculate_percentile(0.5, &read_throughput, "read_throughput").unwrap(), 20.5);
        assert_eq!(calculate_percentile(1., &read_throughput, "read_throughput").unwrap(), 44.27);
    }

    #[test]
    fn percentile_of_wrong_column_is_an_error() {
        let util = series("util", &[1., 2., 3., 4., 5., 6.]);
        assert!(matches!(calculate_percentile(0.5, &util, "read_throughput"), Err(AnalyzeError::ColumnNotFound { .. })));
    }

    #[test]
    fn percentile_skips_nan_and_handles_empty() {
        assert_eq!(quantile([1., f64::NAN, 3.], 0.5), 2.);
        assert!(quantile(Vec::new(), 0.5).is_nan());
        assert_eq!(quantile([7.], 0.99), 7.);
    }

    #[test]
    fn cpu_summary_per_day() {
        let util = series("util", &[25.81, 26.29, 24.89, 25.57, 34.68, 49.87]);
        let summary = generate_cpu_summary(&util);
        let timestamps: Vec<&str> = summary["min"].timestamps().collect();
        assert_eq!(timestamps, vec!["2019-03-20 00:00:00", "2019-03-21 00:00:00"]);
        assert_eq!(summary["min"].values().collect::<Vec<_>>(), vec![24.89, 25.57]);
        assert_eq!(summary["max"].values().collect::<Vec<_>>(), vec![26.29, 49.87]);
        let pct: Vec<f64> = summary["85percentile"].values().collect();
        assert_close(pct[0], 26.146);
        assert_close(pct[1], 45.313);
    }

    #[test]
    fn cpu_summary_percentile_between_min_and_max() {
        let util = series("util", &[90., 3., 47., 12., 12., 100.]);
        let summary = generate_cpu_summary(&util);
        for ((min, pct), max) in summary["min"].values().zip(summary["85percentile"].values()).zip(summary["max"].values()) {
            assert!(min <= pct && pct <= max);
        }
    }

    #[test]
    fn cpu_summary_of_nothing_is_empty() {
        assert!(generate_cpu_summary(&Series::empty("util")).is_empty());
    }

    #[test]
    fn network_summary_per_day() {
        let mut registry = YAxisRegistry::new();
        let stat_series = BTreeMap::from([
            ("inBytes".to_string(), series("inBytes", &[10., 20., 30., 60., 40., 20.])),
            ("outBytes".to_string(), series("outBytes", &[15., 25., 35., 65., 45., 25.])),
        ]);
        let summary = generate_network_summary(&stat_series, &mut registry).unwrap();
        let in_pct: Vec<f64> = summary["inBytes85pct"].values().collect();
        let out_pct: Vec<f64> = summary["outBytes85pct"].values().collect();
        assert_close(in_pct[0], 27.);
        assert_close(in_pct[1], 54.);
        assert_close(out_pct[0], 32.);
        assert_close(out_pct[1], 59.);
        assert_eq!(summary["outBytes85pct"].name(), "outBytes85pct");
        // always local, whatever the report sync mode
        assert_eq!(registry.get(NETWORK_SUMMARY, StatName::Throughput, false).unwrap(), 65.);
        assert_eq!(registry.get(NETWORK_SUMMARY, StatName::Throughput, true).unwrap(), 0.);
    }

    #[test]
    fn network_summary_without_data_is_empty() {
        let mut registry = YAxisRegistry::new();
        let stat_series = BTreeMap::from([
            ("inBytes".to_string(), Series::empty("inBytes")),
            ("outBytes".to_string(), Series::empty("outBytes")),
        ]);
        assert!(generate_network_summary(&stat_series, &mut registry).unwrap().is_empty());
        assert!(generate_network_summary(&BTreeMap::new(), &mut registry).unwrap().is_empty());
        assert!(registry.get(NETWORK_SUMMARY, StatName::Throughput, false).is_err());
    }
}
