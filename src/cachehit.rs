//! Cache hit ratio of an engine.
//!
//! Clients read through nfs and iscsi; whatever the engine cannot serve from
//! its cache is read from disk. Comparing client read throughput with disk
//! read throughput for the same minute gives the share of reads served from
//! cache:
//!
//! ```text
//! cachehit = 100 - disk * 100 / (nfs + iscsi)
//! ```
use std::collections::{BTreeMap, BTreeSet};
use log::*;

use crate::{Analytic, Series};

pub const CACHE_HIT: &str = "cachehit";
const READ_THROUGHPUT: &str = "read_throughput";

/// Read throughput of nfs and iscsi at the same timestamp.
struct ClientReads<'a> {
    timestamp: &'a str,
    nfs: f64,
    iscsi: f64,
}

fn zero_if_nan(value: f64) -> f64
{
    if value.is_nan() { 0. } else { value }
}

fn group_by_timestamp(series: &Series) -> BTreeMap<&str, Vec<f64>>
{
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (timestamp, value) in series.points()
    {
        grouped.entry(timestamp.as_str()).or_default().push(*value);
    }
    grouped
}

/// Full outer join on the timestamp, in timestamp order. A timestamp seen on
/// one side only reads as zero on the other side; repeated timestamps pair up
/// every row of one side with every row of the other.
fn outer_join<'a>(
    nfs: &'a Series,
    iscsi: &'a Series,
) -> Vec<ClientReads<'a>>
{
    let nfs = group_by_timestamp(nfs);
    let iscsi = group_by_timestamp(iscsi);
    let missing = [f64::NAN];
    let mut joined = Vec::new();
    for timestamp in nfs.keys().chain(iscsi.keys()).copied().collect::<BTreeSet<&str>>()
    {
        let nfs_values = nfs.get(timestamp).map(|values| values.as_slice()).unwrap_or(&missing);
        let iscsi_values = iscsi.get(timestamp).map(|values| values.as_slice()).unwrap_or(&missing);
        for nfs_value in nfs_values
        {
            for iscsi_value in iscsi_values
            {
                joined.push(ClientReads { timestamp, nfs: zero_if_nan(*nfs_value), iscsi: zero_if_nan(*iscsi_value) });
            }
        }
    }
    joined
}

/// Percentage of reads served from cache for every disk timestamp that also
/// has client reads. Empty when disk read throughput is not available.
/// A timestamp without any client reads gives NaN.
pub fn generate_cache_hit_ratio(io_series: &BTreeMap<Analytic, BTreeMap<String, Series>>) -> Series
{
    let read_throughput = |analytic: Analytic| io_series.get(&analytic).and_then(|series| series.get(READ_THROUGHPUT));
    let Some(disk) = read_throughput(Analytic::Disk) else {
        debug!("no disk read throughput, no cache hit ratio");
        return Series::empty(CACHE_HIT);
    };
    let placeholder = Series::empty(READ_THROUGHPUT);
    let nfs = read_throughput(Analytic::Nfs).unwrap_or(&placeholder);
    let iscsi = read_throughput(Analytic::Iscsi).unwrap_or(&placeholder);

    let mut client_reads: BTreeMap<&str, Vec<&ClientReads>> = BTreeMap::new();
    let joined = outer_join(nfs, iscsi);
    for row in &joined
    {
        client_reads.entry(row.timestamp).or_default().push(row);
    }

    let mut points = Vec::new();
    for (timestamp, disk_read) in disk.points()
    {
        let Some(rows) = client_reads.get(timestamp.as_str()) else { continue };
        for row in rows
        {
            let client_read = row.nfs + row.iscsi;
            let ratio = if client_read == 0.
            {
                f64::NAN
            }
            else
            {
                100. - (disk_read * 100.) / client_read
            };
            points.push((timestamp.clone(), ratio));
        }
    }
    debug!("cache hit ratio: {} of {} disk timestamps matched", points.len(), disk.len());
    Series::new(CACHE_HIT, points)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMPS: [&str; 6] = [
        "2019-03-20 11:55:00", "2019-03-20 11:56:00", "2019-03-20 11:57:00",
        "2019-03-20 11:58:00", "2019-03-20 11:59:00", "2019-03-20 12:00:00",
    ];

    fn read_throughput(timestamps: &[&str], values: &[f64]) -> BTreeMap<String, Series> {
        let series = Series::new(READ_THROUGHPUT, timestamps.iter().map(|timestamp| timestamp.to_string()).zip(values.iter().copied()).collect());
        BTreeMap::from([(READ_THROUGHPUT.to_string(), series)])
    }

    fn io(disk: BTreeMap<String, Series>, nfs: BTreeMap<String, Series>, iscsi: BTreeMap<String, Series>) -> BTreeMap<Analytic, BTreeMap<String, Series>> {
        BTreeMap::from([(Analytic::Disk, disk), (Analytic::Nfs, nfs), (Analytic::Iscsi, iscsi)])
    }

    #[test]
    fn disk_against_nfs() {
        let io_series = io(
            read_throughput(&TIMESTAMPS, &[10., 20., 0., 90., 30., 5.25]),
            read_throughput(&TIMESTAMPS, &[20., 80., 80., 90., 45., 10.]),
            BTreeMap::new(),
        );
        let ratio = generate_cache_hit_ratio(&io_series);
        assert_eq!(ratio.name(), CACHE_HIT);
        assert_eq!(ratio.timestamps().collect::<Vec<_>>(), TIMESTAMPS.to_vec());
        let expected = [50., 75., 100., 0., 33.333333333333336, 47.5];
        for (value, expected) in ratio.values().zip(expected) {
            assert!((value - expected).abs() < 1e-9, "{} != {}", value, expected);
        }
    }

    #[test]
    fn nfs_and_iscsi_are_added_and_gaps_count_as_zero() {
        let io_series = io(
            read_throughput(&TIMESTAMPS[..3], &[10., 10., 10.]),
            read_throughput(&TIMESTAMPS[..2], &[10., 20.]),
            read_throughput(&TIMESTAMPS[1..3], &[20., 40.]),
        );
        let ratio = generate_cache_hit_ratio(&io_series);
        assert_eq!(ratio.values().collect::<Vec<_>>(), vec![0., 75., 75.]);
    }

    #[test]
    fn disk_timestamps_without_client_reads_are_dropped() {
        let io_series = io(
            read_throughput(&TIMESTAMPS, &[10.; 6]),
            read_throughput(&TIMESTAMPS[2..4], &[20., 40.]),
            BTreeMap::new(),
        );
        let ratio = generate_cache_hit_ratio(&io_series);
        assert_eq!(ratio.timestamps().collect::<Vec<_>>(), vec![TIMESTAMPS[2], TIMESTAMPS[3]]);
        assert_eq!(ratio.values().collect::<Vec<_>>(), vec![50., 75.]);
    }

    #[test]
    fn zero_client_reads_give_nan() {
        let io_series = io(
            read_throughput(&TIMESTAMPS[..1], &[10.]),
            read_throughput(&TIMESTAMPS[..1], &[0.]),
            BTreeMap::new(),
        );
        let ratio = generate_cache_hit_ratio(&io_series);
        assert_eq!(ratio.len(), 1);
        assert!(ratio.values().all(f64::is_nan));
    }

    #[test]
    fn disk_only_is_empty() {
        let io_series = io(read_throughput(&TIMESTAMPS, &[10., 20., 0., 90., 30., 5.25]), BTreeMap::new(), BTreeMap::new());
        assert!(generate_cache_hit_ratio(&io_series).is_empty());
    }

    #[test]
    fn no_disk_is_empty() {
        let io_series = io(BTreeMap::new(), read_throughput(&TIMESTAMPS, &[10., 20., 0., 90., 30., 5.25]), BTreeMap::new());
        assert!(generate_cache_hit_ratio(&io_series).is_empty());
        assert!(generate_cache_hit_ratio(&io(BTreeMap::new(), BTreeMap::new(), BTreeMap::new())).is_empty());
        assert!(generate_cache_hit_ratio(&BTreeMap::new()).is_empty());
    }

    #[test]
    fn repeated_runs_give_identical_output() {
        let io_series = io(
            read_throughput(&TIMESTAMPS, &[10., 20., 0., 90., 30., 5.25]),
            read_throughput(&TIMESTAMPS, &[20., 80., 80., 90., 45., 10.]),
            read_throughput(&TIMESTAMPS[3..], &[1., 2., 3.]),
        );
        let first = generate_cache_hit_ratio(&io_series);
        let second = generate_cache_hit_ratio(&io_series);
        let bits = |series: &Series| series.points().iter().map(|(timestamp, value)| (timestamp.clone(), value.to_bits())).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }
}
