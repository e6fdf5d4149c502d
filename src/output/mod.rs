//! Output module for reporting on the crawl database
//!
//! This module handles:
//! - Printing article, edge and run statistics
//! - Exporting the link graph as JSON for downstream tools

mod graph;
pub mod stats;

pub use graph::{export_graph, write_graph_json, GraphExport};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
