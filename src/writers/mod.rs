/*!
# Writers module
Contains the logic for writing the output files of the make-examples command.
*/
/// Streams candidates, feature records, and gVCF records as JSON lines
pub mod json_lines;
/// Generates the region summary file; each line corresponds to a work interval
pub mod region_summary;
/// Generates the run summary with settings and metrics
pub mod run_info;
/// Generates the work interval listing of the regions command
pub mod work_intervals;
