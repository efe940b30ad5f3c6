use std::collections::BTreeMap;
use log::*;

use crate::{Analytic, SampleTable, StatGroup, StatName, TIMESTAMP};

/// Bytes to megabytes for the network counters.
pub const BYTES_PER_MEGABYTE: f64 = 1024. * 1024.;

const IO_COLUMNS: &[&str] = &[TIMESTAMP, "read_throughput", "write_throughput", "ops_read", "ops_write", "read_latency", "write_latency"];

/// How the rows of one analytic are split into statistic groups.
struct ExtractionRule {
    analytics: &'static [Analytic],
    required: &'static [&'static str],
    /// columns converted from bytes to megabytes before projection
    to_megabytes: &'static [&'static str],
    groups: &'static [(StatName, &'static [&'static str])],
}

const RULES: &[ExtractionRule] = &[
    ExtractionRule {
        analytics: &[Analytic::Cpu],
        required: &[TIMESTAMP, "util"],
        to_megabytes: &[],
        groups: &[(StatName::Utilization, &["util"])],
    },
    ExtractionRule {
        analytics: &[Analytic::Network],
        required: &[TIMESTAMP, "inBytes", "outBytes"],
        to_megabytes: &["inBytes", "outBytes"],
        groups: &[(StatName::Throughput, &["inBytes", "outBytes"])],
    },
    ExtractionRule {
        analytics: &[Analytic::Disk, Analytic::Nfs, Analytic::Iscsi],
        required: IO_COLUMNS,
        to_megabytes: &[],
        groups: &[
            (StatName::Throughput, &["read_throughput", "write_throughput"]),
            (StatName::Ops, &["ops_read", "ops_write"]),
            (StatName::Latency, &["read_latency", "write_latency"]),
        ],
    },
];

fn rule_for(analytic: Analytic) -> Option<&'static ExtractionRule>
{
    RULES.iter().find(|rule| rule.analytics.contains(&analytic))
}

/// Columns a table must carry for `analytic` to produce any statistic group.
pub fn required_columns(analytic: Analytic) -> &'static [&'static str]
{
    rule_for(analytic).map(|rule| rule.required).unwrap_or(&[])
}

/// Split a table into the statistic groups (one chart each) of `analytic`.
///
/// A table that lacks any of the required columns yields no groups at all;
/// this is a normal outcome for an analytic without data. The caller's table
/// is never modified.
pub fn create_stat_groups(
    analytic: Analytic,
    table: &SampleTable,
) -> Vec<StatGroup>
{
    let Some(rule) = rule_for(analytic) else { return Vec::new() };
    let missing: Vec<&str> = rule.required.iter().copied().filter(|column| !table.has_column(column)).collect();
    if !missing.is_empty()
    {
        debug!("{}: skipping, missing columns {:?} (present: {:?})", analytic, missing, table.column_names().collect::<Vec<_>>());
        return Vec::new();
    }

    let table = if rule.to_megabytes.is_empty()
    {
        table.clone()
    }
    else
    {
        table.scaled(rule.to_megabytes, BYTES_PER_MEGABYTE)
    };

    rule.groups
        .iter()
        .map(|(stat, columns)| StatGroup {
            stat: *stat,
            series: columns
                .iter()
                .filter_map(|column| table.series(column).map(|series| (column.to_string(), series)))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps() -> Vec<String> {
        ["2019-03-20 11:55:00", "2019-03-20 11:56:00", "2019-03-20 11:57:00",
         "2019-03-20 11:58:00", "2019-03-20 11:59:00", "2019-03-20 12:00:00"]
            .iter().map(|timestamp| timestamp.to_string()).collect()
    }

    fn nfs_table() -> SampleTable {
        SampleTable::new(timestamps())
            .with_column("read_throughput", vec![20., 80., 80., 90., 45., 10.]).unwrap()
            .with_column("write_throughput", vec![2., 8., 8., 9., 4., 1.]).unwrap()
            .with_column("ops_read", vec![1000., 2000., 3000., 1000., 2000., 3000.]).unwrap()
            .with_column("ops_write", vec![100., 200., 300., 100., 200., 300.]).unwrap()
            .with_column("read_latency", vec![2., 3., 4., 4., 3., 2.]).unwrap()
            .with_column("write_latency", vec![1., 3., 6., 6., 3., 1.]).unwrap()
    }

    #[test]
    fn cpu_yields_utilization() {
        let table = SampleTable::new(timestamps())
            .with_column("util", vec![25.81, 26.29, 24.89, 25.57, 34.68, 49.87]).unwrap();
        let groups = create_stat_groups(Analytic::Cpu, &table);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].stat, StatName::Utilization);
        assert_eq!(groups[0].series["util"], table.series("util").unwrap());
    }

    #[test]
    fn io_yields_three_groups_in_order() {
        let table = nfs_table();
        let groups = create_stat_groups(Analytic::Nfs, &table);
        let stats: Vec<StatName> = groups.iter().map(|group| group.stat).collect();
        assert_eq!(stats, vec![StatName::Throughput, StatName::Ops, StatName::Latency]);
        for group in &groups {
            assert_eq!(group.series.len(), 2);
            for (name, series) in &group.series {
                assert_eq!(series, &table.series(name).unwrap());
            }
        }
        assert!(groups[1].series.contains_key("ops_write"));
    }

    #[test]
    fn io_missing_one_column_yields_nothing() {
        let table = SampleTable::new(timestamps())
            .with_column("read_throughput", vec![10., 20., 0., 90., 30., 5.25]).unwrap()
            .with_column("write_throughput", vec![1.; 6]).unwrap()
            .with_column("ops_read", vec![1.; 6]).unwrap()
            .with_column("ops_write", vec![1.; 6]).unwrap()
            .with_column("read_latency", vec![1.; 6]).unwrap();
        assert!(create_stat_groups(Analytic::Disk, &table).is_empty());
    }

    #[test]
    fn network_is_converted_to_megabytes_without_touching_input() {
        let table = SampleTable::new(timestamps()[..2].to_vec())
            .with_column("inBytes", vec![1048576., 3145728.]).unwrap()
            .with_column("outBytes", vec![524288., 0.]).unwrap();
        let groups = create_stat_groups(Analytic::Network, &table);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].stat, StatName::Throughput);
        let in_bytes: Vec<f64> = groups[0].series["inBytes"].values().collect();
        let out_bytes: Vec<f64> = groups[0].series["outBytes"].values().collect();
        assert_eq!(in_bytes, vec![1., 3.]);
        assert_eq!(out_bytes, vec![0.5, 0.]);
        assert_eq!(table.column("inBytes").unwrap(), &[1048576., 3145728.]);
    }

    #[test]
    fn network_needs_both_directions() {
        let table = SampleTable::new(timestamps())
            .with_column("inBytes", vec![1.; 6]).unwrap();
        assert!(create_stat_groups(Analytic::Network, &table).is_empty());
    }

    #[test]
    fn required_columns_per_analytic() {
        assert_eq!(required_columns(Analytic::Cpu), &[TIMESTAMP, "util"]);
        assert_eq!(required_columns(Analytic::Iscsi).len(), 7);
        assert_eq!(required_columns(Analytic::Disk), required_columns(Analytic::Nfs));
    }
}
