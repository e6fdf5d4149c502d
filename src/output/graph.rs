//! JSON export of the link graph

use crate::storage::{Graph, WorkQueue};
use crate::RippleError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Snapshot of the crawl handed to downstream tools
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport {
    pub exported_at: String,
    /// Articles whose outgoing edges are final
    pub ready: Vec<String>,
    pub edge_count: usize,
    /// Outgoing edges keyed by source identifier
    pub graph: Graph,
}

/// Collects the graph and ready set through the work queue
pub async fn export_graph(queue: &WorkQueue) -> Result<GraphExport, RippleError> {
    let graph = queue.snapshot_graph().await?;
    let ready = queue.ready_articles().await?;
    let edge_count = graph.values().map(Vec::len).sum();

    Ok(GraphExport {
        exported_at: chrono::Utc::now().to_rfc3339(),
        ready,
        edge_count,
        graph,
    })
}

/// Writes `export` as pretty-printed JSON to `path`
pub fn write_graph_json(export: &GraphExport, path: &Path) -> Result<(), RippleError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, export)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    tracing::info!(
        "Wrote {} edges from {} sources to {}",
        export.edge_count,
        export.graph.len(),
        path.display()
    );
    Ok(())
}
