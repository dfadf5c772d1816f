
/// Helper functions for read/writing JSON via serde, with gzip support
pub mod json_io;
/// Helper functions for generating the progress bars
pub mod progress_bar;
/// Naming rules for sharded and per-role output files
pub mod sharded_file;
/// Outputs written to a temporary name and moved into place once complete
pub mod staged_output;
