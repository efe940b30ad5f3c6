use std::{fmt, io, path::PathBuf, str::FromStr};

pub mod cachehit;
pub mod datafiles;
pub mod datapoints;
pub mod extract;
pub mod farm;
pub mod latency;
pub mod plot;
pub mod report;
pub mod summary;
pub mod table;
pub mod timeconv;
pub mod yaxis;

pub use table::{SampleTable, Series, StatGroup, TIMESTAMP};
pub use yaxis::YAxisRegistry;

/// Errors produced by the analytics engine and its collaborators
#[derive(thiserror::Error, Debug)]
pub enum AnalyzeError {
    /// A y-axis scale was read before it was ever written
    #[error("no y-axis scale registered for analytic {analytic}, statistic {statistic}")]
    ScaleNotFound { analytic: String, statistic: String },
    /// A series or table does not carry the requested column
    #[error("column {column} not found")]
    ColumnNotFound { column: String },
    #[error("column {column} has {found} values, expected {expected}")]
    ColumnLength { column: String, expected: usize, found: usize },
    #[error("unknown analytic: {0}")]
    UnknownAnalytic(String),
    #[error("csv line {line}: {reason}")]
    Csv { line: usize, reason: String },
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("invalid timezone: {0}, expected UTC or GMT+hh:mm")]
    Timezone(String),
    #[error("missing data for {0}")]
    MissingAnalytics(String),
    #[error("can't write into directory {path}: {source}")]
    NotWritable { path: PathBuf, source: io::Error },
    #[error("plot {name}: {reason}")]
    Plot { name: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// A monitored subsystem of an engine
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Analytic
{
    Cpu,
    Network,
    Disk,
    Nfs,
    Iscsi,
}

impl Analytic
{
    pub const ALL: [Analytic; 5] = [Analytic::Cpu, Analytic::Network, Analytic::Disk, Analytic::Nfs, Analytic::Iscsi];

    pub fn name(&self) -> &'static str
    {
        match self
        {
            Analytic::Cpu => "cpu",
            Analytic::Network => "network",
            Analytic::Disk => "disk",
            Analytic::Nfs => "nfs",
            Analytic::Iscsi => "iscsi",
        }
    }

    /// disk, nfs and iscsi share the same column layout
    pub fn is_io(&self) -> bool
    {
        matches!(self, Analytic::Disk | Analytic::Nfs | Analytic::Iscsi)
    }
}

impl fmt::Display for Analytic
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

impl FromStr for Analytic
{
    type Err = AnalyzeError;

    fn from_str(s: &str) -> Result<Self>
    {
        Analytic::ALL
            .into_iter()
            .find(|analytic| analytic.name() == s)
            .ok_or_else(|| AnalyzeError::UnknownAnalytic(s.to_string()))
    }
}

/// The dimension measured within an analytic; one chart per statistic
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatName
{
    Utilization,
    Throughput,
    Ops,
    Latency,
}

impl StatName
{
    pub fn name(&self) -> &'static str
    {
        match self
        {
            StatName::Utilization => "utilization",
            StatName::Throughput => "throughput",
            StatName::Ops => "ops",
            StatName::Latency => "latency",
        }
    }
}

impl fmt::Display for StatName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Settings for one report generation run
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub out_directory: PathBuf,
    /// synchronize throughput and latency scales across analytics
    pub sync_y: bool,
    /// number of threads rendering charts
    pub parallel: usize,
}

impl Default for ReportConfig
{
    fn default() -> Self
    {
        ReportConfig {
            out_directory: PathBuf::from("."),
            sync_y: false,
            parallel: 3,
        }
    }
}

/// Round half away from zero to `digits` decimals.
pub fn round_to(
    value: f64,
    digits: i32,
) -> f64
{
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}
