//! Layout and path readers, and snapshot restore.

pub mod layout;
pub mod parser_utils;
pub mod layout_parser;
pub mod path_parser;
pub mod snapshot;
