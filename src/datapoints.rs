//! Conversion of saved analytics responses into sample tables.
//!
//! An engine answers an analytics data request with a set of datapoint
//! streams: one stream for cpu, one stream per network interface, one stream
//! per operation (read, write) for disk, nfs and iscsi. Timestamps are UTC.
use std::collections::{BTreeMap, BTreeSet};
use chrono::FixedOffset;
use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::{latency::{self, Histogram}, timeconv, Analytic, Result, SampleTable};
use crate::extract::BYTES_PER_MEGABYTE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatapointSet {
    #[serde(default)]
    pub datapoint_streams: Vec<DatapointStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatapointStream {
    /// read or write, for io streams
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub network_interface: Option<String>,
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Datapoint {
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Datapoint
{
    fn number(
        &self,
        name: &str,
    ) -> f64
    {
        self.fields.get(name).and_then(Value::as_f64).unwrap_or(f64::NAN)
    }

    fn histogram(
        &self,
        name: &str,
    ) -> Histogram
    {
        match self.fields.get(name)
        {
            Some(Value::Object(buckets)) => buckets
                .iter()
                .filter_map(|(bucket, count)| count.as_f64().map(|count| (bucket.clone(), count)))
                .collect(),
            _ => Histogram::new(),
        }
    }
}

/// A saved response is either the bare set, the set wrapped in the API
/// `result` envelope, or a list of sets (one per requested page).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SavedResponse {
    Wrapped { result: DatapointSet },
    Pages(Vec<DatapointSet>),
    Set(DatapointSet),
}

pub fn parse_datapoint_sets(content: &str) -> Result<Vec<DatapointSet>>
{
    let sets = match serde_json::from_str::<SavedResponse>(content)?
    {
        SavedResponse::Wrapped { result } => vec![result],
        SavedResponse::Pages(pages) => pages,
        SavedResponse::Set(set) => vec![set],
    };
    Ok(sets)
}

#[derive(Debug, Clone, PartialEq)]
struct Row {
    timestamp: String,
    fields: BTreeMap<String, f64>,
}

/// Join two row sets on the timestamp, keeping the order of `left`.
fn inner_join(
    left: Vec<Row>,
    right: &[Row],
    merge: impl Fn(&Row, &Row) -> Row,
) -> Vec<Row>
{
    let mut by_timestamp: BTreeMap<&str, Vec<&Row>> = BTreeMap::new();
    for row in right
    {
        by_timestamp.entry(row.timestamp.as_str()).or_default().push(row);
    }
    left.iter()
        .flat_map(|row| by_timestamp.get(row.timestamp.as_str()).into_iter().flatten().map(|other| merge(row, *other)).collect::<Vec<_>>())
        .collect()
}

/// CPU utilization in percent: busy over total time. A stream reporting no
/// time at all gives NaN, busy time with zero total gives 0.
fn process_cpu(streams: &[DatapointStream]) -> Vec<Row>
{
    // the engine sends a single cpu stream
    let Some(stream) = streams.last() else { return Vec::new() };
    stream.datapoints
        .iter()
        .map(|datapoint| {
            let user = datapoint.number("user");
            let kernel = datapoint.number("kernel");
            let idle = datapoint.number("idle");
            let mut util = (user + kernel) / (idle + user + kernel) * 100.;
            if util.is_infinite() { util = 0. };
            Row {
                timestamp: datapoint.timestamp.clone(),
                fields: BTreeMap::from([
                    ("user".to_string(), user),
                    ("kernel".to_string(), kernel),
                    ("idle".to_string(), idle),
                    ("util".to_string(), util),
                ]),
            }
        })
        .collect()
}

/// Bytes in and out summed over all network interfaces.
fn process_network(streams: &[DatapointStream]) -> Vec<Row>
{
    let to_rows = |stream: &DatapointStream| -> Vec<Row> {
        stream.datapoints
            .iter()
            .map(|datapoint| Row {
                timestamp: datapoint.timestamp.clone(),
                fields: BTreeMap::from([
                    ("inBytes".to_string(), datapoint.number("inBytes")),
                    ("outBytes".to_string(), datapoint.number("outBytes")),
                ]),
            })
            .collect()
    };
    let Some((first, others)) = streams.split_first() else { return Vec::new() };
    let mut rows = to_rows(first);
    for stream in others
    {
        debug!("adding network interface {}", stream.network_interface.as_deref().unwrap_or("unknown"));
        rows = inner_join(rows, &to_rows(stream), |total, interface| Row {
            timestamp: total.timestamp.clone(),
            fields: total.fields
                .iter()
                .map(|(name, value)| (name.clone(), value + interface.fields.get(name).copied().unwrap_or(f64::NAN)))
                .collect(),
        });
    }
    rows
}

/// Latency (decoded histogram, ms), throughput (MB/s) and operation count
/// per operation, one stream per operation joined on the timestamp.
fn process_io(streams: &[DatapointStream]) -> Vec<Row>
{
    let mut rows: Option<Vec<Row>> = None;
    let mut ops = BTreeSet::new();
    for stream in streams
    {
        let op = stream.op.clone().unwrap_or_default();
        let stream_rows: Vec<Row> = stream.datapoints
            .iter()
            .map(|datapoint| Row {
                timestamp: datapoint.timestamp.clone(),
                fields: BTreeMap::from([
                    (format!("{}_latency", op), latency::average_latency(&datapoint.histogram("latency")).unwrap_or(f64::NAN)),
                    (format!("{}_throughput", op), datapoint.number("throughput") / BYTES_PER_MEGABYTE),
                    (format!("ops_{}", op), datapoint.number("count")),
                ]),
            })
            .collect();
        rows = Some(match rows
        {
            None => stream_rows,
            Some(rows) => inner_join(rows, &stream_rows, |left, right| Row {
                timestamp: left.timestamp.clone(),
                fields: left.fields.iter().chain(right.fields.iter()).map(|(name, value)| (name.clone(), *value)).collect(),
            }),
        });
        ops.insert(op);
    }
    let Some(mut rows) = rows else { return Vec::new() };
    // an engine without reads (or writes) still charts a flat line for them
    for op in ["read", "write"].into_iter().filter(|op| !ops.contains(*op))
    {
        for row in rows.iter_mut()
        {
            row.fields.insert(format!("{}_latency", op), 0.);
            row.fields.insert(format!("{}_throughput", op), 0.);
            row.fields.insert(format!("ops_{}", op), 0.);
        }
    }
    rows
}

fn rows_to_table(rows: Vec<Row>) -> Result<SampleTable>
{
    let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.fields.keys()).collect();
    let mut table = SampleTable::new(rows.iter().map(|row| row.timestamp.clone()).collect());
    for column in columns
    {
        let values = rows.iter().map(|row| row.fields.get(column).copied().unwrap_or(f64::NAN)).collect();
        table = table.with_column(column, values)?;
    }
    Ok(table)
}

/// Turn the pages of one analytic into a single table with local
/// `#timestamp` values.
pub fn datapoints_to_table(
    analytic: Analytic,
    sets: &[DatapointSet],
    offset: FixedOffset,
) -> Result<SampleTable>
{
    let mut rows = Vec::new();
    for set in sets
    {
        let page = match analytic
        {
            Analytic::Cpu => process_cpu(&set.datapoint_streams),
            Analytic::Network => process_network(&set.datapoint_streams),
            Analytic::Disk | Analytic::Nfs | Analytic::Iscsi => process_io(&set.datapoint_streams),
        };
        rows.extend(page);
    }
    for row in rows.iter_mut()
    {
        row.timestamp = timeconv::convert_from_utc(&row.timestamp, offset)?;
    }
    if rows.is_empty()
    {
        info!("there is no data collected for {}", analytic);
    }
    rows_to_table(rows)
}
