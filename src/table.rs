use std::collections::BTreeMap;
use log::*;

use crate::{AnalyzeError, Result, StatName};

/// Name of the timestamp column in every exported analytic file.
pub const TIMESTAMP: &str = "#timestamp";

/// Rows of samples for one analytic: a timestamp plus named numeric fields.
///
/// Column presence is not guaranteed; a table read from a file without a
/// `#timestamp` column has no timestamps at all. Missing numbers are NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    timestamps: Option<Vec<String>>,
    columns: BTreeMap<String, Vec<f64>>,
    rows: usize,
}

impl SampleTable
{
    pub fn new(timestamps: Vec<String>) -> Self
    {
        SampleTable {
            rows: timestamps.len(),
            timestamps: Some(timestamps),
            columns: BTreeMap::new(),
        }
    }

    /// Add a numeric column, which must have one value per row.
    pub fn with_column(
        mut self,
        name: &str,
        values: Vec<f64>,
    ) -> Result<Self>
    {
        if values.len() != self.rows
        {
            return Err(AnalyzeError::ColumnLength { column: name.to_string(), expected: self.rows, found: values.len() });
        }
        self.columns.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn len(&self) -> usize
    {
        self.rows
    }

    pub fn is_empty(&self) -> bool
    {
        self.rows == 0
    }

    pub fn timestamps(&self) -> Option<&[String]>
    {
        self.timestamps.as_deref()
    }

    pub fn column(
        &self,
        name: &str,
    ) -> Option<&[f64]>
    {
        self.columns.get(name).map(|values| values.as_slice())
    }

    pub fn has_column(
        &self,
        name: &str,
    ) -> bool
    {
        if name == TIMESTAMP
        {
            self.timestamps.is_some()
        }
        else
        {
            self.columns.contains_key(name)
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str>
    {
        self.timestamps.iter().map(|_| TIMESTAMP).chain(self.columns.keys().map(|name| name.as_str()))
    }

    /// Project `#timestamp` and one value column into a [`Series`].
    pub fn series(
        &self,
        name: &str,
    ) -> Option<Series>
    {
        let timestamps = self.timestamps.as_ref()?;
        let values = self.columns.get(name)?;
        Some(Series::new(name, timestamps.iter().cloned().zip(values.iter().copied()).collect()))
    }

    /// Return a copy of the table with the given columns divided by `divisor`.
    /// Columns that are not present are left alone.
    pub fn scaled(
        &self,
        columns: &[&str],
        divisor: f64,
    ) -> SampleTable
    {
        let mut scaled = self.clone();
        for name in columns
        {
            if let Some(values) = scaled.columns.get_mut(*name)
            {
                values.iter_mut().for_each(|value| *value /= divisor);
            }
        }
        scaled
    }

    /// Parse a comma separated file with a header line. The `#timestamp`
    /// column is kept as text and empty fields become NaN. Columns holding
    /// anything else than numbers (host or interface names) are left out.
    pub fn from_csv(content: &str) -> Result<SampleTable>
    {
        let csv = CsvData::parse(content)?;
        let timestamps = csv.text_column(TIMESTAMP);
        let mut columns = BTreeMap::new();
        for header in csv.headers.iter().filter(|header| header.as_str() != TIMESTAMP)
        {
            match csv.numeric_column(header)
            {
                Ok(values) => { columns.insert(header.clone(), values); },
                Err(error) => debug!("csv column {} skipped: {}", header, error),
            }
        }
        debug!("csv table: {} rows, columns: {:?}", csv.rows.len(), columns.keys().collect::<Vec<_>>());
        Ok(SampleTable { timestamps, columns, rows: csv.rows.len() })
    }
}

/// Empty fields are missing values.
fn parse_number(field: &str) -> Option<f64>
{
    if field.is_empty()
    {
        Some(f64::NAN)
    }
    else
    {
        field.parse::<f64>().ok()
    }
}

/// Header plus text rows of a comma separated file.
#[derive(Debug, Clone, Default)]
pub struct CsvData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvData
{
    pub fn parse(content: &str) -> Result<CsvData>
    {
        let mut lines = content.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());
        let headers = match lines.next()
        {
            Some((_, line)) => split_fields(line),
            None => return Ok(CsvData::default()),
        };
        let rows = lines
            .map(|(line_number, line)| {
                let fields = split_fields(line);
                if fields.len() != headers.len()
                {
                    Err(AnalyzeError::Csv { line: line_number + 1, reason: format!("{} fields, expected {}", fields.len(), headers.len()) })
                }
                else
                {
                    Ok(fields)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CsvData { headers, rows })
    }

    pub fn column_index(
        &self,
        name: &str,
    ) -> Option<usize>
    {
        self.headers.iter().position(|header| header == name)
    }

    pub fn text_column(
        &self,
        name: &str,
    ) -> Option<Vec<String>>
    {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    pub fn numeric_column(
        &self,
        name: &str,
    ) -> Result<Vec<f64>>
    {
        let index = self.column_index(name).ok_or_else(|| AnalyzeError::ColumnNotFound { column: name.to_string() })?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_number, row)| parse_number(&row[index]).ok_or_else(|| AnalyzeError::Csv {
                line: row_number + 2,
                reason: format!("column {}: {} is not a number", name, row[index]),
            }))
            .collect()
    }
}

/// Fields of one line. A comma between double quotes belongs to the field,
/// and the quotes themselves are dropped.
fn split_fields(line: &str) -> Vec<String>
{
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    for character in line.chars()
    {
        match character
        {
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(character),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// A timestamp keyed sequence of values for one named field.
///
/// Points are stored as `(timestamp, value)` pairs, so timestamps and values
/// can never get out of step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    name: String,
    points: Vec<(String, f64)>,
}

impl Series
{
    pub fn new(
        name: &str,
        points: Vec<(String, f64)>,
    ) -> Self
    {
        Series { name: name.to_string(), points }
    }

    pub fn empty(name: &str) -> Self
    {
        Series::new(name, Vec::new())
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn points(&self) -> &[(String, f64)]
    {
        &self.points
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_
    {
        self.points.iter().map(|(_, value)| *value)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &str>
    {
        self.points.iter().map(|(timestamp, _)| timestamp.as_str())
    }

    pub fn len(&self) -> usize
    {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.points.is_empty()
    }
}

/// One chart's worth of series, all measuring the same statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct StatGroup {
    pub stat: StatName,
    pub series: BTreeMap<String, Series>,
}
