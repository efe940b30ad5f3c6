use std::{collections::BTreeMap, fmt::Debug, path::{Path, PathBuf}};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use plotters::prelude::*;
use plotters::chart::SeriesLabelPosition::UpperLeft;

use crate::{timeconv, AnalyzeError, Result, Series};

pub const CHART_SIZE: (u32, u32) = (1200, 750);
pub const CAPTION_STYLE_FONT: &str = "sans-serif";
pub const CAPTION_STYLE_FONT_SIZE: u32 = 24;
pub const MESH_STYLE_FONT: &str = "sans-serif";
pub const MESH_STYLE_FONT_SIZE: u32 = 15;
pub const LABELS_STYLE_FONT: &str = "sans-serif";
pub const LABELS_STYLE_FONT_SIZE: u32 = 15;
pub const LABEL_AREA_SIZE_LEFT: u32 = 80;
pub const LABEL_AREA_SIZE_BOTTOM: u32 = 60;
pub const LABEL_AREA_SIZE_RIGHT: u32 = 60;

pub const BLUE_COLOR: RGBColor = RGBColor(0x00, 0x66, 0xCC);
pub const RED_COLOR: RGBColor = RGBColor(0xC1, 0x4A, 0x4E);
pub const GREEN_COLOR: RGBColor = RGBColor(0x99, 0xCC, 0x00);
pub const BLACK_COLOR: RGBColor = RGBColor(0x00, 0x00, 0x00);
pub const DARK_GREEN_COLOR: RGBColor = RGBColor(0x33, 0x99, 0x66);

/// Headroom above the ceiling for charts that are not percentages.
const HEADROOM: f64 = 1.2;

/// One chart to draw: every series shares the time axis and the y ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    /// analytic name, `cpu_summary`, `network_summary` or `chr`
    pub chart: String,
    pub stat: String,
    pub series: BTreeMap<String, Series>,
    pub y_max: f64,
    pub add_trend: bool,
}

impl ChartRequest
{
    pub fn file_name(&self) -> String
    {
        format!("{}_{}.png", self.chart, self.stat)
    }

    /// True when no series has a single drawable point.
    pub fn is_empty(&self) -> bool
    {
        self.series.values().all(|series| series.values().all(f64::is_nan))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStyle {
    pub label: &'static str,
    pub color: RGBColor,
    pub trend_color: RGBColor,
    pub line: bool,
}

pub fn series_style(name: &str) -> SeriesStyle
{
    let (label, color, trend_color, line) = match name
    {
        "read_throughput" | "outBytes" => ("read throughput", BLUE_COLOR, BLACK_COLOR, false),
        "write_throughput" | "inBytes" => ("write throughput", RED_COLOR, DARK_GREEN_COLOR, false),
        "ops_read" => ("read ops", BLUE_COLOR, BLACK_COLOR, false),
        "ops_write" => ("write ops", RED_COLOR, DARK_GREEN_COLOR, false),
        "read_latency" => ("read latency", BLUE_COLOR, BLACK_COLOR, false),
        "write_latency" => ("write latency", RED_COLOR, DARK_GREEN_COLOR, false),
        "util" => ("Utilization", RED_COLOR, BLACK_COLOR, false),
        "min" => ("utilization_min", BLUE_COLOR, BLACK_COLOR, true),
        "max" => ("utilization_max", RED_COLOR, DARK_GREEN_COLOR, true),
        "85percentile" => ("utilization_85pct", GREEN_COLOR, BLACK_COLOR, true),
        "inBytes85pct" => ("85 pct write [MB/s]", RED_COLOR, DARK_GREEN_COLOR, true),
        "outBytes85pct" => ("85 pct read [MB/s]", BLUE_COLOR, BLACK_COLOR, true),
        "cachehit" => ("Cache Hit Ratio", BLUE_COLOR, BLACK_COLOR, false),
        _ => ("", BLACK_COLOR, BLACK_COLOR, false),
    };
    SeriesStyle { label, color, trend_color, line }
}

pub fn chart_title(
    chart: &str,
    stat: &str,
) -> String
{
    let title = match (chart, stat)
    {
        ("cpu", _) => "CPU utilization",
        ("cpu_summary", _) => "85% CPU Variation for 1 week",
        ("network_summary", _) => "85% Network Throughput Variation for 1 week",
        ("network", _) => "Total VM Network Throughput from the Engine to all Sources/Targets",
        ("chr", _) => "Cache Hit Ratio for Engine",
        ("nfs", "ops") => "NFS Server operations per second",
        ("nfs", "latency") => "Internal NFS Latency",
        ("nfs", "throughput") => "NFS Throughput from the Engine to the Targets",
        ("iscsi", "ops") => "iSCSI Server operations per second",
        ("iscsi", "latency") => "Internal iSCSI Latency",
        ("iscsi", "throughput") => "iSCSI Throughput from the Engine to the Targets",
        ("disk", "ops") => "Disk IOPS from the Engine to the Storage",
        ("disk", "latency") => "Internal Disk Latency",
        ("disk", "throughput") => "Disk Throughput from the Engine to the Storage",
        _ => return format!("{} {}", chart, stat),
    };
    title.to_string()
}

pub fn y_label(stat: &str) -> &'static str
{
    match stat
    {
        "throughput" => "Throughput [MB/s]",
        "latency" => "Latency [ms]",
        "ops" => "Operations per second",
        "utilization" => "Utilization",
        "chr" => "% Cache Hit",
        _ => "",
    }
}

/// Vertical range of a chart. Percentages are drawn up to the ceiling, other
/// charts get some headroom; a ceiling of zero (no activity) is drawn as 1.
pub fn y_range(
    chart: &str,
    y_max: f64,
) -> (f64, f64)
{
    let y_max = if y_max.is_finite() && y_max > 0. { y_max } else { 1. };
    match chart
    {
        "cpu" | "cpu_summary" | "chr" => (0., y_max),
        _ => (0., y_max * HEADROOM),
    }
}

/// Least squares fit `y = slope * x + intercept`, NaN points ignored.
/// `None` with fewer than two distinct x values.
pub fn linear_trend(points: &[(f64, f64)]) -> Option<(f64, f64)>
{
    let points: Vec<&(f64, f64)> = points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()).collect();
    if points.len() < 2 { return None };
    let count = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / count;
    let covariance: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let variance: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if variance == 0. { return None };
    let slope = covariance / variance;
    Some((slope, mean_y - slope * mean_x))
}

pub fn plot_error<E: Debug>(
    name: &str,
    error: E,
) -> AnalyzeError
{
    AnalyzeError::Plot { name: name.to_string(), reason: format!("{:?}", error) }
}

fn to_datetime(timestamp: &str) -> Result<DateTime<Utc>>
{
    Ok(Utc.from_utc_datetime(&timeconv::parse_timestamp(timestamp)?))
}

/// Drawable points of a series: parsed timestamps, NaN values left out.
fn chart_points(series: &Series) -> Result<Vec<(DateTime<Utc>, f64)>>
{
    series.points()
        .iter()
        .filter(|(_, value)| !value.is_nan())
        .map(|(timestamp, value)| Ok((to_datetime(timestamp)?, *value)))
        .collect()
}

/// Draw a chart into `out_directory`. Returns `None`, writing nothing, when
/// there is nothing to draw.
pub fn render_chart(
    request: &ChartRequest,
    out_directory: &Path,
) -> Result<Option<PathBuf>>
{
    let name = request.file_name();
    let mut points = BTreeMap::new();
    for (series_name, series) in &request.series
    {
        let series_points = chart_points(series)?;
        if !series_points.is_empty() { points.insert(series_name.as_str(), series_points); }
    }
    let Some(start_time) = points.values().flatten().map(|(timestamp, _)| *timestamp).min() else {
        info!("{}: no data, chart skipped", name);
        return Ok(None);
    };
    let mut end_time = points.values().flatten().map(|(timestamp, _)| *timestamp).max().unwrap_or(start_time);
    if end_time == start_time { end_time = start_time + Duration::minutes(1) };
    let (low_value, high_value) = y_range(&request.chart, request.y_max);

    let path = out_directory.join(&name);
    let root = BitMapBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|error| plot_error(&name, error))?;
    let mut contextarea = ChartBuilder::on(&root)
        .set_label_area_size(LabelAreaPosition::Left, LABEL_AREA_SIZE_LEFT)
        .set_label_area_size(LabelAreaPosition::Bottom, LABEL_AREA_SIZE_BOTTOM)
        .set_label_area_size(LabelAreaPosition::Right, LABEL_AREA_SIZE_RIGHT)
        .caption(chart_title(&request.chart, &request.stat), (CAPTION_STYLE_FONT, CAPTION_STYLE_FONT_SIZE))
        .build_cartesian_2d(start_time..end_time, low_value..high_value)
        .map_err(|error| plot_error(&name, error))?;
    contextarea.configure_mesh()
        .x_labels(6)
        .x_label_formatter(&|x| x.format("%Y-%m-%d %H:%M").to_string())
        .y_desc(y_label(&request.stat))
        .label_style((MESH_STYLE_FONT, MESH_STYLE_FONT_SIZE))
        .draw()
        .map_err(|error| plot_error(&name, error))?;

    for (palette_index, (series_name, series_points)) in points.iter().enumerate()
    {
        let style = series_style(series_name);
        let color = if style.label.is_empty() { Palette99::pick(palette_index).to_rgba() } else { style.color.to_rgba() };
        let label = if style.label.is_empty() { series_name.to_string() } else { style.label.to_string() };
        if style.line
        {
            contextarea.draw_series(LineSeries::new(series_points.iter().copied(), color.stroke_width(2)))
                .map_err(|error| plot_error(&name, error))?
                .label(label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
        else
        {
            contextarea.draw_series(series_points.iter().map(|point| Circle::new(*point, 2, color.filled())))
                .map_err(|error| plot_error(&name, error))?
                .label(label.as_str())
                .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
        }

        if !request.add_trend { continue };
        let seconds: Vec<(f64, f64)> = series_points
            .iter()
            .map(|(timestamp, value)| (timestamp.signed_duration_since(start_time).num_seconds() as f64, *value))
            .collect();
        let Some((slope, intercept)) = linear_trend(&seconds) else { continue };
        let first = series_points.iter().map(|(timestamp, _)| *timestamp).min().unwrap_or(start_time);
        let last = series_points.iter().map(|(timestamp, _)| *timestamp).max().unwrap_or(end_time);
        let at = |timestamp: DateTime<Utc>| (timestamp, intercept + slope * timestamp.signed_duration_since(start_time).num_seconds() as f64);
        let trend_color = style.trend_color;
        debug!("{} {}: trend slope {} per second", name, series_name, slope);
        contextarea.draw_series(LineSeries::new(vec![at(first), at(last)], trend_color.stroke_width(2)))
            .map_err(|error| plot_error(&name, error))?
            .label(format!("{} trend", label))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], trend_color.stroke_width(2)));
    }

    contextarea.configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .label_font((LABELS_STYLE_FONT, LABELS_STYLE_FONT_SIZE))
        .position(UpperLeft)
        .draw()
        .map_err(|error| plot_error(&name, error))?;
    root.present().map_err(|error| plot_error(&name, error))?;
    info!("chart written: {}", path.display());
    Ok(Some(path.clone()))
}
