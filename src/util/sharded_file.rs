
use std::path::PathBuf;

use crate::data_types::sample::SampleRole;

/// Minimum zero-padding width of shard indices in file names
const MIN_SHARD_DIGITS: usize = 5;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ShardedFileError {
    #[error("Sharded file name {spec:?} must have a shard count > 0")]
    ZeroShards { spec: String },
    #[error("Task {task_id} is outside of the {num_shards} shards of {spec:?}")]
    TaskOutOfRange { spec: String, task_id: usize, num_shards: usize }
}

/// A possibly sharded output name, e.g. `examples@10.jsonl.gz`.
/// Names without `@<count>` in the file name are used verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardedFileSpec {
    /// Original text
    spec: String,
    /// Everything before the `@`
    basename: String,
    /// The shard count, None if unsharded
    num_shards: Option<usize>,
    /// Everything after the shard count
    suffix: String
}

impl ShardedFileSpec {
    /// Parses a file name
    /// # Arguments
    /// * `spec` - a plain path, or one with `@<count>` in the final path component
    /// # Errors
    /// * if the shard count is 0
    pub fn parse(spec: &str) -> Result<Self, ShardedFileError> {
        // only the final component may carry the shard count
        let component_start = spec.rfind('/').map(|i| i + 1).unwrap_or(0);
        let sharded = spec[component_start..].rfind('@')
            .map(|i| component_start + i)
            .and_then(|at| {
                let digits: String = spec[at + 1..].chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<usize>().ok().map(|n| (at, digits.len(), n))
            });

        match sharded {
            Some((at, num_digits, num_shards)) => {
                if num_shards == 0 {
                    return Err(ShardedFileError::ZeroShards { spec: spec.to_string() });
                }
                Ok(Self {
                    spec: spec.to_string(),
                    basename: spec[..at].to_string(),
                    num_shards: Some(num_shards),
                    suffix: spec[at + 1 + num_digits..].to_string()
                })
            },
            None => Ok(Self {
                spec: spec.to_string(),
                basename: spec.to_string(),
                num_shards: None,
                suffix: String::new()
            })
        }
    }

    /// Returns the physical path for one task, `name-TTTTT-of-NNNNN<suffix>` when sharded
    /// # Errors
    /// * if `task_id` is not below the shard count
    pub fn resolve(&self, task_id: usize) -> Result<PathBuf, ShardedFileError> {
        match self.num_shards {
            Some(num_shards) => {
                if task_id >= num_shards {
                    return Err(ShardedFileError::TaskOutOfRange { spec: self.spec.clone(), task_id, num_shards });
                }
                let width = MIN_SHARD_DIGITS.max(num_shards.to_string().len());
                Ok(PathBuf::from(format!(
                    "{}-{task_id:0width$}-of-{num_shards:0width$}{}", self.basename, self.suffix
                )))
            },
            None => Ok(PathBuf::from(&self.spec))
        }
    }

    pub fn is_sharded(&self) -> bool {
        self.num_shards.is_some()
    }

    pub fn num_shards(&self) -> Option<usize> {
        self.num_shards
    }
}

/// Inserts `_<role>` into an output name in front of the first `.` or `@` of the file name.
/// This is applied before shard resolution, so `examples@4.jsonl.gz` becomes `examples_child@4.jsonl.gz`.
pub fn with_role_suffix(spec: &str, role: SampleRole) -> String {
    let component_start = spec.rfind('/').map(|i| i + 1).unwrap_or(0);
    match spec[component_start..].find(|c: char| c == '.' || c == '@') {
        Some(offset) => {
            let split = component_start + offset;
            format!("{}_{role}{}", &spec[..split], &spec[split..])
        },
        None => format!("{spec}_{role}")
    }
}

/// Resolves the physical output path of one task, optionally for a single role
/// # Arguments
/// * `spec` - the output name as given, possibly sharded
/// * `task_id` - the task index
/// * `role` - if set, the role name is inserted into the logical name before sharding
/// # Errors
/// * if the shard count is 0 or `task_id` is not below it
pub fn resolve_output(spec: &str, task_id: usize, role: Option<SampleRole>) -> Result<PathBuf, ShardedFileError> {
    let logical = match role {
        Some(r) => with_role_suffix(spec, r),
        None => spec.to_string()
    };
    ShardedFileSpec::parse(&logical)?.resolve(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bar@10", 1, "bar-00001-of-00010")]
    #[case("out/examples@3.jsonl.gz", 2, "out/examples-00002-of-00003.jsonl.gz")]
    #[case("big@123456.json", 42, "big-000042-of-123456.json")]
    #[case("plain.jsonl", 0, "plain.jsonl")]
    #[case("user@host/plain.jsonl", 7, "user@host/plain.jsonl")]
    fn test_resolve(#[case] spec: &str, #[case] task_id: usize, #[case] expected: &str) {
        let parsed = ShardedFileSpec::parse(spec).unwrap();
        assert_eq!(parsed.resolve(task_id).unwrap(), PathBuf::from(expected));
    }

    #[test]
    fn test_bad_shards() {
        assert_eq!(
            ShardedFileSpec::parse("bar@0"),
            Err(ShardedFileError::ZeroShards { spec: "bar@0".to_string() })
        );
        let parsed = ShardedFileSpec::parse("bar@2").unwrap();
        assert!(parsed.is_sharded());
        assert_eq!(parsed.num_shards(), Some(2));
        assert!(parsed.resolve(2).is_err());
    }

    #[rstest]
    #[case("out/examples.jsonl.gz", SampleRole::Child, "out/examples_child.jsonl.gz")]
    #[case("examples@4.jsonl.gz", SampleRole::Parent1, "examples_parent1@4.jsonl.gz")]
    #[case("examples.tfrecord@4.gz", SampleRole::Child, "examples_child.tfrecord@4.gz")]
    #[case("run.v2/gvcf", SampleRole::Parent2, "run.v2/gvcf_parent2")]
    fn test_role_suffix(#[case] spec: &str, #[case] role: SampleRole, #[case] expected: &str) {
        assert_eq!(with_role_suffix(spec, role), expected);
    }

    #[test]
    fn test_resolve_output() {
        // every shard of a role shares one logical name
        assert_eq!(
            resolve_output("examples@4.jsonl.gz", 1, Some(SampleRole::Child)).unwrap(),
            PathBuf::from("examples_child-00001-of-00004.jsonl.gz")
        );
        assert_eq!(
            resolve_output("out/candidates@2.jsonl", 0, Some(SampleRole::Parent2)).unwrap(),
            PathBuf::from("out/candidates_parent2-00000-of-00002.jsonl")
        );
        assert_eq!(
            resolve_output("examples@4.jsonl.gz", 3, None).unwrap(),
            PathBuf::from("examples-00003-of-00004.jsonl.gz")
        );
        assert_eq!(
            resolve_output("examples.jsonl", 0, Some(SampleRole::Child)).unwrap(),
            PathBuf::from("examples_child.jsonl")
        );
        assert!(resolve_output("examples@4.jsonl.gz", 4, Some(SampleRole::Child)).is_err());
    }
}
