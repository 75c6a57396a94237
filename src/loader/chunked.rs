use crate::error::{Error, Result};
use crate::schema::{incoming_columns, storage_rows, InferenceConfig, SchemaSynthesizer};
use crate::sink::Sink;
use crate::types::{IfExists, LoadOutcome, Row};

/// Default number of rows per insert transaction
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Writes rows to one table in fixed-size chunks.
///
/// Before every chunk the table is created or widened to fit it. Each chunk
/// is one transaction; the first failure stops the load and every row not
/// yet committed counts as failed.
pub struct ChunkedLoader<'a, S: Sink + ?Sized> {
    sink: &'a S,
    synthesizer: SchemaSynthesizer,
}

impl<'a, S: Sink + ?Sized> ChunkedLoader<'a, S> {
    pub fn new(sink: &'a S, inference: InferenceConfig) -> Self {
        ChunkedLoader {
            sink,
            synthesizer: SchemaSynthesizer::new(inference),
        }
    }

    pub fn load(&self, rows: &[Row], table: &str, chunk_size: usize, if_exists: IfExists) -> LoadOutcome {
        let clock = LoadOutcome::begin(table);
        let chunk_size = chunk_size.max(1);

        tracing::info!(table, rows = rows.len(), chunk_size, %if_exists, "loading table");

        if let Err(e) = self.prepare(table, if_exists) {
            tracing::error!(table, error = %e, "load aborted before first chunk");
            return clock.finish(0, rows.len(), vec![e.to_string()]);
        }

        let mut inserted = 0;
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            match self.write_chunk(table, chunk) {
                Ok(count) => {
                    inserted += count;
                    tracing::debug!(table, chunk = index, rows = count, total = inserted, "chunk committed");
                }
                Err(e) => {
                    let failed = rows.len() - inserted;
                    tracing::error!(table, chunk = index, inserted, failed, error = %e, "chunk failed");
                    return clock.finish(inserted, failed, vec![e.to_string()]);
                }
            }
        }

        tracing::info!(table, rows = inserted, "table loaded");
        clock.finish(inserted, 0, Vec::new())
    }

    /// Apply the `if_exists` rule, once per load
    fn prepare(&self, table: &str, if_exists: IfExists) -> Result<()> {
        match if_exists {
            IfExists::Append => Ok(()),
            IfExists::Replace => {
                if self.sink.table_exists(table)? {
                    tracing::info!(table, "replacing existing table");
                    self.sink.drop_table(table).map_err(|e| e.into_schema(table))?;
                }
                Ok(())
            }
            IfExists::Fail => {
                if !self.sink.table_exists(table)? {
                    return Ok(());
                }
                let count = self.sink.row_count(table)?;
                if count > 0 {
                    return Err(Error::loader(
                        table,
                        format!("table already exists and holds {} rows", count),
                    ));
                }
                Ok(())
            }
        }
    }

    fn write_chunk(&self, table: &str, chunk: &[Row]) -> Result<usize> {
        let chunk = storage_rows(chunk);
        self.synthesizer.ensure(self.sink, table, &chunk)?;

        let columns = incoming_columns(&chunk);
        self.sink
            .bulk_insert(table, &columns, &chunk)
            .map_err(|e| e.into_loader(table))
    }
}
