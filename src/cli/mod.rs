/*!
# CLI module
Command line interface functionality that is specific to trioshard.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The make-examples CLI subcommand
pub mod make_examples;
/// The regions CLI subcommand
pub mod regions;
