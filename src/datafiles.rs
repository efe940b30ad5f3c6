//! Pre-exported analytic files in a data directory.
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};
use chrono::FixedOffset;
use log::*;
use regex::Regex;

use crate::{datapoints, Analytic, AnalyzeError, Result, SampleTable};

/// Name of the network throughput test results in a farm directory.
pub const NETWORK_TESTS_FILE: &str = "all_nt.csv";
const WRITE_TEST_FILE: &str = "test.lck";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat
{
    Csv,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    pub analytic: Analytic,
    pub format: DataFormat,
    pub path: PathBuf,
}

fn file_names(datadir: &Path) -> Result<Vec<(String, PathBuf)>>
{
    let mut names = Vec::new();
    for entry in fs::read_dir(datadir)?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() { continue };
        let Ok(name) = entry.file_name().into_string() else { continue };
        names.push((name, entry.path()));
    }
    names.sort();
    Ok(names)
}

fn raw_file_regex(prefix: &str) -> Result<Regex>
{
    Ok(Regex::new(&format!(r"^{}-analytics-(cpu|nfs|network|disk|iscsi)-raw\.(csv|json)$", regex::escape(prefix)))?)
}

/// Raw analytic files for `prefix`. When an analytic was saved both as csv
/// and as json, the csv file is used.
pub fn find_data_files(
    datadir: &Path,
    prefix: &str,
) -> Result<BTreeMap<Analytic, DataFile>>
{
    let pattern = raw_file_regex(prefix)?;
    let mut files: BTreeMap<Analytic, DataFile> = BTreeMap::new();
    for (name, path) in file_names(datadir)?
    {
        let Some(captures) = pattern.captures(&name) else { continue };
        let analytic: Analytic = captures[1].parse()?;
        let format = if &captures[2] == "csv" { DataFormat::Csv } else { DataFormat::Json };
        debug!("found {} data for {}: {}", analytic, prefix, path.display());
        match files.get(&analytic)
        {
            Some(existing) if existing.format == DataFormat::Csv => continue,
            _ => { files.insert(analytic, DataFile { analytic, format, path }); },
        }
    }
    Ok(files)
}

/// Where the report pipeline gets its tables from.
pub trait AnalyticSource {
    /// The table of `analytic`, or `None` when there is no data for it.
    fn load(
        &self,
        analytic: Analytic,
    ) -> Result<Option<SampleTable>>;
}

/// Tables kept in memory, for instance after a conversion.
impl AnalyticSource for BTreeMap<Analytic, SampleTable>
{
    fn load(
        &self,
        analytic: Analytic,
    ) -> Result<Option<SampleTable>>
    {
        Ok(self.get(&analytic).cloned())
    }
}

/// Analytic tables read from the files of one engine.
#[derive(Debug, Clone)]
pub struct FileSource {
    files: BTreeMap<Analytic, DataFile>,
    /// local time of the engine, applied to the UTC timestamps of json files
    offset: FixedOffset,
}

impl FileSource
{
    pub fn open(
        datadir: &Path,
        prefix: &str,
        offset: FixedOffset,
    ) -> Result<FileSource>
    {
        let files = find_data_files(datadir, prefix)?;
        info!("{} analytic files found for {} in {}", files.len(), prefix, datadir.display());
        Ok(FileSource { files, offset })
    }

    pub fn available_analytics(&self) -> Vec<Analytic>
    {
        self.files.keys().copied().collect()
    }
}

impl AnalyticSource for FileSource
{
    fn load(
        &self,
        analytic: Analytic,
    ) -> Result<Option<SampleTable>>
    {
        let Some(file) = self.files.get(&analytic) else { return Ok(None) };
        let content = fs::read_to_string(&file.path)?;
        let table = match file.format
        {
            DataFormat::Csv => SampleTable::from_csv(&content)?,
            DataFormat::Json => {
                let sets = datapoints::parse_datapoint_sets(&content)?;
                datapoints::datapoints_to_table(analytic, &sets, self.offset)?
            },
        };
        debug!("{}: {} rows loaded from {}", analytic, table.len(), file.path.display());
        Ok(Some(table))
    }
}

/// Create and remove a scratch file to make sure charts can be written.
pub fn ensure_writable(directory: &Path) -> Result<()>
{
    let test_file = directory.join(WRITE_TEST_FILE);
    fs::write(&test_file, b"")
        .and_then(|_| fs::remove_file(&test_file))
        .map_err(|source| AnalyzeError::NotWritable { path: directory.to_path_buf(), source })
}

/// Aggregated files of every engine in a farm directory, keyed by engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FarmFiles {
    pub cpu: BTreeMap<String, PathBuf>,
    pub network: BTreeMap<String, PathBuf>,
    pub network_tests: Option<PathBuf>,
}

pub fn find_farm_files(datadir: &Path) -> Result<FarmFiles>
{
    let pattern = Regex::new(r"^(.+)-analytics-(cpu|network)-aggregated\.csv$")?;
    let mut farm = FarmFiles::default();
    for (name, path) in file_names(datadir)?
    {
        if name.eq_ignore_ascii_case(NETWORK_TESTS_FILE)
        {
            farm.network_tests = Some(path);
            continue;
        }
        let Some(captures) = pattern.captures(&name) else { continue };
        let engine = captures[1].to_string();
        debug!("farm file for engine {}: {}", engine, name);
        match &captures[2]
        {
            "cpu" => farm.cpu.insert(engine, path),
            _ => farm.network.insert(engine, path),
        };
    }
    Ok(farm)
}
