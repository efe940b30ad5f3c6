//! From analytic tables to a directory of charts.
use std::{collections::{BTreeMap, BTreeSet}, path::{Path, PathBuf}, sync::mpsc::channel};
use itertools::Itertools;
use log::*;

use crate::{cachehit, datafiles, extract, plot, summary, Analytic, AnalyzeError, ReportConfig, Result, Series, StatName, YAxisRegistry};
use crate::datafiles::AnalyticSource;
use crate::plot::ChartRequest;

/// Without these the report is not worth generating.
pub const REQUIRED_ANALYTICS: [Analytic; 3] = [Analytic::Cpu, Analytic::Network, Analytic::Disk];
/// Percentile of a series used as its y-axis scale.
pub const SCALE_PERCENTILE: f64 = 0.99;
pub const CACHE_HIT_CHART: &str = "chr";

/// How the ceiling of a chart is found once every series has been seen.
#[derive(Debug, Clone)]
enum Ceiling {
    Scale { analytic: String, statistic: StatName, sync: bool },
    Fixed(f64),
}

#[derive(Debug, Clone)]
struct PendingChart {
    chart: String,
    stat: String,
    series: BTreeMap<String, Series>,
    ceiling: Ceiling,
    add_trend: bool,
}

/// Extract, summarize and scale every analytic of `source`, and return the
/// charts to draw. Ceilings are resolved after all analytics have recorded
/// their scales, so with `sync_y` every throughput and latency chart shares
/// the scale of the largest one.
pub fn build_charts(
    source: &dyn AnalyticSource,
    sync_y: bool,
) -> Result<Vec<ChartRequest>>
{
    let mut registry = YAxisRegistry::new();
    let mut pending = Vec::new();
    let mut io_series: BTreeMap<Analytic, BTreeMap<String, Series>> = BTreeMap::new();
    let mut with_data = BTreeSet::new();

    for analytic in Analytic::ALL
    {
        let Some(table) = source.load(analytic)? else {
            debug!("{}: no data file", analytic);
            continue;
        };
        let groups = extract::create_stat_groups(analytic, &table);
        if groups.is_empty()
        {
            info!("{}: no statistics found", analytic);
            continue;
        }
        with_data.insert(analytic);

        for group in groups
        {
            debug!("{}: processing {} ({} series)", analytic, group.stat, group.series.len());
            match analytic
            {
                Analytic::Cpu => {
                    let utilization = group.series.values().next().cloned().unwrap_or_default();
                    let cpu_summary = summary::generate_cpu_summary(&utilization);
                    if !cpu_summary.is_empty()
                    {
                        pending.push(PendingChart {
                            chart: "cpu_summary".to_string(),
                            stat: group.stat.name().to_string(),
                            series: cpu_summary,
                            ceiling: Ceiling::Scale { analytic: "cpu_summary".to_string(), statistic: group.stat, sync: false },
                            add_trend: false,
                        });
                    }
                },
                Analytic::Network => {
                    let network_summary = summary::generate_network_summary(&group.series, &mut registry)?;
                    if !network_summary.is_empty()
                    {
                        pending.push(PendingChart {
                            chart: summary::NETWORK_SUMMARY.to_string(),
                            stat: group.stat.name().to_string(),
                            series: network_summary,
                            ceiling: Ceiling::Scale { analytic: summary::NETWORK_SUMMARY.to_string(), statistic: group.stat, sync: false },
                            add_trend: false,
                        });
                    }
                },
                _ => {},
            }

            for (series_name, series) in &group.series
            {
                let y_max = summary::calculate_percentile(SCALE_PERCENTILE, series, series_name)?;
                debug!("{} {} {}: y max {}", analytic, group.stat, series_name, y_max);
                registry.set(y_max, analytic.name(), group.stat, sync_y);
                if analytic.is_io() && group.stat == StatName::Throughput
                {
                    io_series.entry(analytic).or_default().insert(series_name.clone(), series.clone());
                }
            }
            pending.push(PendingChart {
                chart: analytic.name().to_string(),
                stat: group.stat.name().to_string(),
                series: group.series,
                ceiling: Ceiling::Scale { analytic: analytic.name().to_string(), statistic: group.stat, sync: sync_y },
                add_trend: true,
            });
        }
    }

    let missing: Vec<Analytic> = REQUIRED_ANALYTICS.into_iter().filter(|analytic| !with_data.contains(analytic)).collect();
    if !missing.is_empty()
    {
        return Err(AnalyzeError::MissingAnalytics(missing.iter().join(", ")));
    }
    if !with_data.contains(&Analytic::Nfs) && !with_data.contains(&Analytic::Iscsi)
    {
        warn!("there is no nfs or iscsi data, the cache hit ratio can't be calculated");
    }

    let cache_hit = cachehit::generate_cache_hit_ratio(&io_series);
    if !cache_hit.is_empty()
    {
        pending.push(PendingChart {
            chart: CACHE_HIT_CHART.to_string(),
            stat: CACHE_HIT_CHART.to_string(),
            series: BTreeMap::from([(CACHE_HIT_CHART.to_string(), cache_hit)]),
            ceiling: Ceiling::Fixed(100.),
            add_trend: false,
        });
    }

    let mut charts = Vec::new();
    for chart in pending
    {
        let mut request = ChartRequest { chart: chart.chart, stat: chart.stat, series: chart.series, y_max: 0., add_trend: chart.add_trend };
        if request.is_empty()
        {
            info!("{}: all values are missing, chart skipped", request.file_name());
            continue;
        }
        request.y_max = match chart.ceiling
        {
            Ceiling::Scale { analytic, statistic, sync } => registry.get(&analytic, statistic, sync)?,
            Ceiling::Fixed(y_max) => y_max,
        };
        debug!("{}: y max {}", request.file_name(), request.y_max);
        charts.push(request);
    }
    Ok(charts)
}

/// Draw the charts on a pool of `parallel` threads. Every chart is attempted;
/// the first failure is returned after all have finished.
pub fn render_charts(
    charts: &[ChartRequest],
    out_directory: &Path,
    parallel: usize,
) -> Result<Vec<PathBuf>>
{
    let pool = rayon::ThreadPoolBuilder::new().num_threads(parallel).build()?;
    let (tx, rx) = channel();
    pool.scope(move |s| {
        for chart in charts
        {
            let tx = tx.clone();
            s.spawn(move |_| {
                let result = plot::render_chart(chart, out_directory);
                if tx.send((chart.file_name(), result)).is_err()
                {
                    error!("{}: chart result could not be reported", chart.file_name());
                }
            });
        }
    });

    let mut written = Vec::new();
    let mut first_error = None;
    for (name, result) in rx
    {
        match result
        {
            Ok(Some(path)) => written.push(path),
            Ok(None) => {},
            Err(error) => {
                error!("{}: {}", name, error);
                first_error.get_or_insert(error);
            },
        }
    }
    if let Some(error) = first_error { return Err(error) };
    written.sort();
    Ok(written)
}

/// Check the output directory, build all charts and draw them.
pub fn generate_report(
    source: &dyn AnalyticSource,
    config: &ReportConfig,
) -> Result<Vec<PathBuf>>
{
    datafiles::ensure_writable(&config.out_directory)?;
    let charts = build_charts(source, config.sync_y)?;
    info!("{} charts to draw", charts.len());
    render_charts(&charts, &config.out_directory, config.parallel)
}
