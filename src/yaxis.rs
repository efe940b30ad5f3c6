//! Y-axis ceilings shared between the charts of one report.
//!
//! Every series added to a chart records the scale it needs; the chart is
//! drawn with the largest scale recorded for it. Scales are kept per
//! `(analytic, statistic)`, or with `sync` per statistic across all
//! analytics, so that for instance disk, nfs and iscsi latency end up on the
//! same scale. Operation rates are never synchronized: nfs operations and disk
//! IOPS are not comparable.
use std::collections::HashMap;
use log::*;

use crate::{AnalyzeError, Result, StatName};

/// Ceiling of every percentage based chart.
pub const PERCENT_CEILING: f64 = 100.;

#[derive(Debug, Clone)]
pub struct YAxisRegistry {
    local: HashMap<(String, StatName), f64>,
    global: HashMap<StatName, f64>,
}

impl Default for YAxisRegistry
{
    fn default() -> Self
    {
        YAxisRegistry::new()
    }
}

impl YAxisRegistry
{
    pub fn new() -> Self
    {
        YAxisRegistry {
            local: HashMap::new(),
            global: HashMap::from([(StatName::Throughput, 0.), (StatName::Latency, 0.)]),
        }
    }

    fn is_percentage(analytic: &str) -> bool
    {
        analytic == "cpu" || analytic == "cpu_summary"
    }

    fn is_global(
        statistic: StatName,
        sync: bool,
    ) -> bool
    {
        sync && statistic != StatName::Ops
    }

    /// The ceiling for a chart. Reading a local scale that was never set is
    /// an error: it means a chart is drawn for series that were never seen.
    pub fn get(
        &self,
        analytic: &str,
        statistic: StatName,
        sync: bool,
    ) -> Result<f64>
    {
        if YAxisRegistry::is_percentage(analytic) { return Ok(PERCENT_CEILING) };
        let value = if YAxisRegistry::is_global(statistic, sync)
        {
            self.global.get(&statistic)
        }
        else
        {
            self.local.get(&(analytic.to_string(), statistic))
        };
        value.copied().ok_or_else(|| AnalyzeError::ScaleNotFound { analytic: analytic.to_string(), statistic: statistic.to_string() })
    }

    /// Record a scale; the stored value only ever goes up.
    pub fn set(
        &mut self,
        value: f64,
        analytic: &str,
        statistic: StatName,
        sync: bool,
    )
    {
        if YAxisRegistry::is_percentage(analytic) { return };
        if value.is_nan()
        {
            debug!("{} {}: ignoring NaN y-axis scale", analytic, statistic);
            return;
        }
        let stored = if YAxisRegistry::is_global(statistic, sync)
        {
            self.global.entry(statistic).or_insert(value)
        }
        else
        {
            self.local.entry((analytic.to_string(), statistic)).or_insert(value)
        };
        if *stored < value
        {
            *stored = value;
        }
        debug!("{} {} sync: {}: y-axis scale {}", analytic, statistic, sync, *stored);
    }
}
