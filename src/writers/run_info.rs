
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data_types::labeling_metrics::LabelingMetrics;
use crate::util::json_io::save_json;

/// Resource usage for one task
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ResourceMetrics {
    /// Host the task ran on
    pub host_name: String,
    /// Start time in RFC 3339
    pub start_time: String,
    /// Wall time of the whole task
    pub elapsed_seconds: f64,
    /// Number of work intervals processed
    pub num_intervals: u64,
    /// Number of threads used
    pub threads: usize
}

impl ResourceMetrics {
    /// Captures the host name and the start time, the rest is filled in at the end of the run
    pub fn start(threads: usize) -> Self {
        let host_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            host_name,
            start_time: chrono::Local::now().to_rfc3339(),
            threads,
            ..Default::default()
        }
    }
}

/// Run summary written next to the examples output
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RunInfo<T> {
    /// Tool version
    pub version: String,
    /// The validated settings of the run
    pub settings: T,
    /// Resource usage
    pub resource_metrics: ResourceMetrics,
    /// Aggregated candidate and labeling counts
    pub labeling_metrics: LabelingMetrics
}

/// Path of the run summary for an examples file
pub fn run_info_path(examples_fn: &Path) -> PathBuf {
    let mut name = examples_fn.as_os_str().to_os_string();
    name.push(".run_info.json");
    PathBuf::from(name)
}

impl<T: Serialize> RunInfo<T> {
    /// Writes the summary as pretty JSON
    pub fn save(&self, examples_fn: &Path) -> anyhow::Result<PathBuf> {
        let out_fn = run_info_path(examples_fn);
        save_json(self, &out_fn)?;
        Ok(out_fn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use std::collections::BTreeMap;

    use crate::util::json_io::load_json;

    #[test]
    fn test_save_run_info() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let examples_fn = tmp_dir.path().join("examples-00000-of-00002.jsonl.gz");

        let settings: BTreeMap<String, String> = [("mode".to_string(), "training".to_string())].into_iter().collect();
        let mut resource_metrics = ResourceMetrics::start(4);
        resource_metrics.elapsed_seconds = 1.5;
        resource_metrics.num_intervals = 3;
        let labeling_metrics = LabelingMetrics {
            n_candidate_variant_sites: 10,
            n_feature_records: 12,
            ..Default::default()
        };
        let run_info = RunInfo {
            version: "0.0.0".to_string(),
            settings,
            resource_metrics,
            labeling_metrics
        };
        let out_fn = run_info.save(&examples_fn).unwrap();
        assert_eq!(out_fn, tmp_dir.path().join("examples-00000-of-00002.jsonl.gz.run_info.json"));

        let loaded: RunInfo<BTreeMap<String, String>> = load_json(&out_fn).unwrap();
        assert_eq!(loaded.settings["mode"], "training");
        assert_eq!(loaded.resource_metrics.num_intervals, 3);
        assert_eq!(loaded.resource_metrics.threads, 4);
        assert_approx_eq!(loaded.resource_metrics.elapsed_seconds, 1.5);
        assert_eq!(loaded.labeling_metrics, run_info.labeling_metrics);
    }
}
