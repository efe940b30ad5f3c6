use std::{fs, path::Path};
use itertools::Itertools;

use dxanalyze::{report, timeconv, AnalyzeError};
use dxanalyze::datafiles::{AnalyticSource, FileSource};
use dxanalyze::Analytic;

const PREFIX: &str = "engine1";

fn minutes(count: usize) -> Vec<String> {
    (0..count).map(|minute| format!("2019-03-{} {:02}:{:02}:00", 20 + minute / 1440, minute % 1440 / 60, minute % 60)).collect()
}

fn write_csv(dir: &Path, analytic: &str, header: &str, row: impl Fn(usize) -> String) {
    let rows = minutes(2880).iter().enumerate().map(|(index, timestamp)| format!("{},{}", timestamp, row(index))).join("\n");
    fs::write(dir.join(format!("{}-analytics-{}-raw.csv", PREFIX, analytic)), format!("#timestamp,{}\n{}\n", header, rows)).unwrap();
}

fn write_engine(dir: &Path) {
    write_csv(dir, "cpu", "util", |index| format!("{}", (index % 100) as f64));
    write_csv(dir, "network", "inBytes,outBytes", |index| format!("{},{}", (index % 10) * 1048576, 1048576));
    let io_header = "read_throughput,write_throughput,ops_read,ops_write,read_latency,write_latency";
    write_csv(dir, "disk", io_header, |index| format!("{},2,{},5,1.5,{}", index % 4, index % 50, if index % 7 == 0 { String::new() } else { "3".to_string() }));
    write_csv(dir, "nfs", io_header, |_| "8,4,100,40,0.8,1.2".to_string());
}

#[test]
fn offline_report_from_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    write_engine(dir.path());
    // another engine in the same directory
    fs::write(dir.path().join("engine2-analytics-iscsi-raw.csv"), "#timestamp,read_throughput\n").unwrap();

    let source = FileSource::open(dir.path(), PREFIX, timeconv::parse_timezone("UTC").unwrap()).unwrap();
    assert_eq!(source.available_analytics(), vec![Analytic::Cpu, Analytic::Network, Analytic::Disk, Analytic::Nfs]);
    assert_eq!(source.load(Analytic::Cpu).unwrap().unwrap().len(), 2880);

    let charts = report::build_charts(&source, false).unwrap();
    let names: Vec<String> = charts.iter().map(|chart| chart.file_name()).sorted().collect();
    assert_eq!(names, vec![
        "chr_chr.png", "cpu_summary_utilization.png", "cpu_utilization.png",
        "disk_latency.png", "disk_ops.png", "disk_throughput.png",
        "network_summary_throughput.png", "network_throughput.png",
        "nfs_latency.png", "nfs_ops.png", "nfs_throughput.png",
    ]);

    let cpu_summary = charts.iter().find(|chart| chart.chart == "cpu_summary").unwrap();
    assert_eq!(cpu_summary.series["min"].len(), 2);
    assert_eq!(cpu_summary.series["max"].values().collect::<Vec<_>>(), vec![99., 99.]);

    // disk reads 0..3 MB/s against 8 MB/s of nfs reads
    let cache_hit = charts.iter().find(|chart| chart.chart == "chr").unwrap();
    assert_eq!(cache_hit.series["chr"].len(), 2880);
    assert!(cache_hit.series["chr"].values().all(|ratio| (62.5..=100.).contains(&ratio)));

    let network = charts.iter().find(|chart| chart.file_name() == "network_throughput.png").unwrap();
    assert_eq!(network.y_max, 9.);
}

#[test]
fn offline_report_needs_cpu_network_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_engine(dir.path());
    fs::remove_file(dir.path().join(format!("{}-analytics-disk-raw.csv", PREFIX))).unwrap();
    let source = FileSource::open(dir.path(), PREFIX, timeconv::parse_timezone("UTC").unwrap()).unwrap();
    match report::build_charts(&source, true) {
        Err(AnalyzeError::MissingAnalytics(missing)) => assert_eq!(missing, "disk"),
        other => panic!("unexpected {:?}", other.map(|charts| charts.len())),
    }
}

#[test]
fn offline_report_from_json_files() {
    let dir = tempfile::tempdir().unwrap();
    write_engine(dir.path());
    fs::remove_file(dir.path().join(format!("{}-analytics-nfs-raw.csv", PREFIX))).unwrap();
    fs::write(dir.path().join(format!("{}-analytics-iscsi-raw.json", PREFIX)), r#"{
        "result": {"datapointStreams": [
            {"op": "read", "datapoints": [
                {"timestamp": "2019-03-20T00:00:00.000Z", "latency": {"1000000": 2}, "throughput": 4194304, "count": 20},
                {"timestamp": "2019-03-20T00:01:00.000Z", "latency": {"1000000": 2}, "throughput": 4194304, "count": 20}
            ]},
            {"op": "write", "datapoints": [
                {"timestamp": "2019-03-20T00:00:00.000Z", "latency": {"10000000": 1}, "throughput": 1048576, "count": 2},
                {"timestamp": "2019-03-20T00:01:00.000Z", "latency": {}, "throughput": 1048576, "count": 2}
            ]}
        ]}
    }"#).unwrap();
    let source = FileSource::open(dir.path(), PREFIX, timeconv::parse_timezone("GMT+01:00").unwrap()).unwrap();
    let iscsi = source.load(Analytic::Iscsi).unwrap().unwrap();
    assert_eq!(iscsi.timestamps().unwrap()[0], "2019-03-20 01:00:00");
    assert_eq!(iscsi.column("read_latency").unwrap(), &[1.5, 1.5]);

    let charts = report::build_charts(&source, false).unwrap();
    let iscsi_latency = charts.iter().find(|chart| chart.file_name() == "iscsi_latency.png").unwrap();
    assert_eq!(iscsi_latency.y_max, 15.);
    // disk and iscsi share two timestamps
    let cache_hit = charts.iter().find(|chart| chart.chart == "chr").unwrap();
    assert_eq!(cache_hit.series["chr"].len(), 2);
}
