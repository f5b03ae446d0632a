use std::io::{Read, Write};

mod model;
mod node;
mod store;

pub use model::{EventRecord, RunDocument, RunMeta};
pub use node::{probe_key, NodeIndicator};
pub use store::{ConnectionMode, RunContext, RunStore, StoreError, DEFAULT_STORE_FOLDER};

/// Serialize a run document to a writer
pub fn store_run_document<W: Write>(document: &RunDocument, writer: W) -> serde_json::Result<()> {
    serde_json::to_writer(writer, document)
}

/// Load a run document from a reader
pub fn load_run_document<R: Read>(reader: R) -> serde_json::Result<RunDocument> {
    let reader = std::io::BufReader::new(reader);
    serde_json::from_reader(reader)
}
