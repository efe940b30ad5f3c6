//! Capacity overview of a farm of engines.
//!
//! Every engine contributes its aggregated daily 85th percentile cpu and
//! network usage; network throughput test results, when available, show the
//! bandwidth each engine could reach.
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};
use chrono::NaiveDate;
use log::*;
use plotters::prelude::*;
use plotters::chart::SeriesLabelPosition::UpperRight;

use crate::{round_to, AnalyzeError, Result};
use crate::datafiles::FarmFiles;
use crate::extract::BYTES_PER_MEGABYTE;
use crate::plot::{plot_error, CAPTION_STYLE_FONT, CAPTION_STYLE_FONT_SIZE, CHART_SIZE, LABELS_STYLE_FONT, LABELS_STYLE_FONT_SIZE, LABEL_AREA_SIZE_BOTTOM, LABEL_AREA_SIZE_LEFT, LABEL_AREA_SIZE_RIGHT, MESH_STYLE_FONT, MESH_STYLE_FONT_SIZE};
use crate::table::CsvData;

pub const FARM_CHART: &str = "farmanalyze.png";
const DATE_COLUMN: &str = "#time";
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Throughput tests report bits, usage is charted in bytes.
const BITS_PER_BYTE: f64 = 8.;
const THROUGHPUT_CEILING: f64 = 1001.;
const CPU_CEILING: f64 = 101.;

const RECEIVE_TEST_COLOR: RGBColor = RGBColor(0x87, 0xCE, 0xEB);
const TRANSMIT_TEST_COLOR: RGBColor = RGBColor(0xFF, 0xA5, 0x00);
const USAGE_COLOR: RGBColor = RGBColor(0xFF, 0x00, 0x00);
const CPU_COLOR: RGBColor = RGBColor(0x00, 0x00, 0xFF);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmEngineSummary {
    pub engine: String,
    /// highest daily 85th percentile cpu utilization
    pub cpu: f64,
    /// highest daily 85th percentile of network in + out, MB/s
    pub network: Option<f64>,
    pub max_transmit_test: Option<f64>,
    pub max_receive_test: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmSummary {
    pub engines: Vec<FarmEngineSummary>,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

impl FarmSummary
{
    fn add_dates(
        &mut self,
        csv: &CsvData,
    ) -> Result<()>
    {
        let dates = csv.text_column(DATE_COLUMN).ok_or_else(|| AnalyzeError::ColumnNotFound { column: DATE_COLUMN.to_string() })?;
        for date in dates
        {
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| AnalyzeError::Timestamp(date.clone()))?;
            self.min_date = Some(self.min_date.map_or(date, |min_date| min_date.min(date)));
            self.max_date = Some(self.max_date.map_or(date, |max_date| max_date.max(date)));
        }
        Ok(())
    }

    /// `Period ( <first day> - <last day> )`
    pub fn period(&self) -> String
    {
        let format = |date: Option<NaiveDate>| date.map(|date| date.format(DATE_FORMAT).to_string()).unwrap_or_default();
        format!("Period ( {} - {} )", format(self.min_date), format(self.max_date))
    }
}

fn column_max(values: impl IntoIterator<Item = f64>) -> f64
{
    values.into_iter().filter(|value| !value.is_nan()).reduce(f64::max).unwrap_or(f64::NAN)
}

fn read_csv(path: &Path) -> Result<CsvData>
{
    CsvData::parse(&fs::read_to_string(path)?)
}

/// Highest throughput per (engine, direction) of the network test results.
fn network_tests(path: &Path) -> Result<BTreeMap<(String, String), f64>>
{
    let csv = read_csv(path)?;
    let engines = csv.text_column("#engine").ok_or_else(|| AnalyzeError::ColumnNotFound { column: "#engine".to_string() })?;
    let directions = csv.text_column("direction").ok_or_else(|| AnalyzeError::ColumnNotFound { column: "direction".to_string() })?;
    let throughput = csv.numeric_column("throughput")?;
    let mut tests: BTreeMap<(String, String), f64> = BTreeMap::new();
    for ((engine, direction), throughput) in engines.into_iter().zip(directions).zip(throughput).filter(|(_, throughput)| !throughput.is_nan())
    {
        tests.entry((engine, direction))
            .and_modify(|max| *max = max.max(throughput))
            .or_insert(throughput);
    }
    Ok(tests)
}

/// One summary per engine with a cpu file, in engine name order.
pub fn generate_farm_summary(files: &FarmFiles) -> Result<FarmSummary>
{
    let tests = match &files.network_tests
    {
        Some(path) => network_tests(path)?,
        None => BTreeMap::new(),
    };
    let mut summary = FarmSummary::default();
    for (engine, cpu_file) in &files.cpu
    {
        let cpu_csv = read_csv(cpu_file)?;
        summary.add_dates(&cpu_csv)?;
        let cpu = round_to(column_max(cpu_csv.numeric_column("utilization_85pct")?), 0);

        let network = match files.network.get(engine)
        {
            Some(network_file) => {
                let network_csv = read_csv(network_file)?;
                summary.add_dates(&network_csv)?;
                let in_bytes = network_csv.numeric_column("inBytes_85pct")?;
                let out_bytes = network_csv.numeric_column("outBytes_85pct")?;
                let total = in_bytes.iter().zip(&out_bytes).map(|(in_bytes, out_bytes)| in_bytes + out_bytes);
                Some(round_to(column_max(total) / BYTES_PER_MEGABYTE, 0))
            },
            None => None,
        };
        let test = |direction: &str| tests.get(&(engine.clone(), direction.to_string())).map(|throughput| throughput / BITS_PER_BYTE);
        let engine_summary = FarmEngineSummary {
            engine: engine.clone(),
            cpu,
            network,
            max_transmit_test: test("TRANSMIT"),
            max_receive_test: test("RECEIVE"),
        };
        debug!("{:?}", engine_summary);
        summary.engines.push(engine_summary);
    }
    Ok(summary)
}

/// Bars for the tested and the used network throughput per engine, with the
/// cpu usage as a line on a secondary axis.
pub fn render_farm_chart(
    summary: &FarmSummary,
    out_directory: &Path,
) -> Result<Option<PathBuf>>
{
    if summary.engines.is_empty()
    {
        info!("no engines found, farm chart skipped");
        return Ok(None);
    }
    let path = out_directory.join(FARM_CHART);
    let engine_count = summary.engines.len() as i32;
    let names: Vec<&str> = summary.engines.iter().map(|engine| engine.engine.as_str()).collect();

    let root = BitMapBackend::new(&path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|error| plot_error(FARM_CHART, error))?;
    let mut contextarea = ChartBuilder::on(&root)
        .set_label_area_size(LabelAreaPosition::Left, LABEL_AREA_SIZE_LEFT)
        .set_label_area_size(LabelAreaPosition::Bottom, LABEL_AREA_SIZE_BOTTOM)
        .set_label_area_size(LabelAreaPosition::Right, LABEL_AREA_SIZE_RIGHT)
        .caption(summary.period(), (CAPTION_STYLE_FONT, CAPTION_STYLE_FONT_SIZE))
        .build_cartesian_2d((0..engine_count).into_segmented(), 0f64..THROUGHPUT_CEILING)
        .map_err(|error| plot_error(FARM_CHART, error))?
        .set_secondary_coord((0..engine_count).into_segmented(), 0f64..CPU_CEILING);
    contextarea.configure_mesh()
        .disable_x_mesh()
        .x_labels(names.len())
        .x_label_formatter(&|x| match x
        {
            SegmentValue::CenterOf(index) | SegmentValue::Exact(index) => names.get(*index as usize).map(|name| name.to_string()).unwrap_or_default(),
            SegmentValue::Last => String::new(),
        })
        .y_desc("Network Throughput (MBps)")
        .label_style((MESH_STYLE_FONT, MESH_STYLE_FONT_SIZE))
        .draw()
        .map_err(|error| plot_error(FARM_CHART, error))?;
    contextarea.configure_secondary_axes()
        .y_desc("CPU (85 %ile)")
        .label_style((MESH_STYLE_FONT, MESH_STYLE_FONT_SIZE))
        .draw()
        .map_err(|error| plot_error(FARM_CHART, error))?;

    let bars: [(&str, RGBColor, fn(&FarmEngineSummary) -> Option<f64>); 3] = [
        ("Max Network Receive Test", RECEIVE_TEST_COLOR, |engine| engine.max_receive_test),
        ("Max Network Transmit Test", TRANSMIT_TEST_COLOR, |engine| engine.max_transmit_test),
        ("Network Usage", USAGE_COLOR, |engine| engine.network),
    ];
    for (label, color, value) in bars
    {
        contextarea.draw_series(summary.engines
            .iter()
            .enumerate()
            .filter_map(|(index, engine)| value(engine).filter(|height| !height.is_nan()).map(|height| (index as i32, height.min(THROUGHPUT_CEILING))))
            .map(|(index, height)| {
                let mut bar = Rectangle::new([(SegmentValue::Exact(index), 0.), (SegmentValue::Exact(index + 1), height)], color.filled());
                bar.set_margin(0, 0, 30, 30);
                bar
            }))
            .map_err(|error| plot_error(FARM_CHART, error))?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x - 5, y - 5), (x + 5, y + 5)], color.filled()));
    }

    let cpu_points: Vec<(SegmentValue<i32>, f64)> = summary.engines
        .iter()
        .enumerate()
        .filter(|(_, engine)| !engine.cpu.is_nan())
        .map(|(index, engine)| (SegmentValue::CenterOf(index as i32), engine.cpu))
        .collect();
    contextarea.draw_secondary_series(LineSeries::new(cpu_points.clone(), CPU_COLOR.stroke_width(2)))
        .map_err(|error| plot_error(FARM_CHART, error))?
        .label("CPU (85 %ile)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], CPU_COLOR.stroke_width(2)));
    contextarea.draw_secondary_series(cpu_points.into_iter().map(|point| Circle::new(point, 4, CPU_COLOR.filled())))
        .map_err(|error| plot_error(FARM_CHART, error))?;

    contextarea.configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .label_font((LABELS_STYLE_FONT, LABELS_STYLE_FONT_SIZE))
        .position(UpperRight)
        .draw()
        .map_err(|error| plot_error(FARM_CHART, error))?;
    root.present().map_err(|error| plot_error(FARM_CHART, error))?;
    info!("farm chart written: {}", path.display());
    Ok(Some(path.clone()))
}
