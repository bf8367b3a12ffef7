//! Terminal output helpers.

mod tables;

pub use tables::{format_optional, print_json, print_separator, spinner, truncate_string};
