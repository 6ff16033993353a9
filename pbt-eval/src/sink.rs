//! Metric sinks for evaluation results
//!
//! Level 4 - Utilities

use std::collections::BTreeMap;
use std::io::Write;

use pbt_core::Result;

use crate::aggregate::EvalReport;

/// Destination for flat metric records
pub trait MetricsSink {
    fn log(&mut self, record: &BTreeMap<String, f64>) -> Result<()>;
}

/// Logs each record through `tracing`
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log(&mut self, record: &BTreeMap<String, f64>) -> Result<()> {
        let fields: Vec<String> = record
            .iter()
            .map(|(k, v)| format!("{}={:.4}", k, v))
            .collect();
        tracing::info!("Metrics: {}", fields.join(" "));
        Ok(())
    }
}

/// Writes one JSON object per record
pub struct JsonlSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MetricsSink for JsonlSink<W> {
    fn log(&mut self, record: &BTreeMap<String, f64>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub records: Vec<BTreeMap<String, f64>>,
}

impl MetricsSink for MemorySink {
    fn log(&mut self, record: &BTreeMap<String, f64>) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Forwards each record to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricsSink + Send>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn MetricsSink + Send>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricsSink for FanoutSink {
    fn log(&mut self, record: &BTreeMap<String, f64>) -> Result<()> {
        for sink in &mut self.sinks {
            sink.log(record)?;
        }
        Ok(())
    }
}

/// Log every line plot entry of a report as its own record
///
/// # Arguments
/// * `sink` - Destination
/// * `report` - Evaluation report
/// * `timesteps_total` - Timesteps over all policies (`timestep_agg`)
/// * `timesteps_main` - Timesteps of the main policy (`timestep`)
///
/// # Returns
/// Number of records written
pub fn log_eval_report<S: MetricsSink + ?Sized>(
    sink: &mut S,
    report: &EvalReport,
    timesteps_total: u64,
    timesteps_main: u64,
) -> Result<usize> {
    for (key, value) in &report.line_plot {
        let mut record = BTreeMap::new();
        record.insert(key.clone(), *value);
        record.insert("timestep_agg".to_string(), timesteps_total as f64);
        record.insert("timestep".to_string(), timesteps_main as f64);
        sink.log(&record)?;
    }
    Ok(report.line_plot.len())
}
