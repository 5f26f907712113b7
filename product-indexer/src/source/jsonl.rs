//! JSON-lines record source.

use std::path::{Path, PathBuf};

use futures::future;
use futures::stream::{Stream, StreamExt};
use product_indexer_shared::{RawRecord, RecordSchema};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, instrument};

use crate::errors::SourceError;

/// Reads one record per line of a JSON-lines file.
///
/// Lines are read lazily as the returned stream is polled; the file is never
/// loaded as a whole.
#[derive(Debug, Clone)]
pub struct JsonlRecordSource {
    path: PathBuf,
    schema: RecordSchema,
}

impl JsonlRecordSource {
    pub fn new(path: impl Into<PathBuf>, schema: RecordSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    async fn open_file(&self) -> Result<File, SourceError> {
        File::open(&self.path)
            .await
            .map_err(|e| SourceError::io(format!("{}: {}", self.path.display(), e)))
    }

    /// Open the file and stream its records.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn open(
        &self,
    ) -> Result<impl Stream<Item = Result<RawRecord, SourceError>>, SourceError> {
        let file = self.open_file().await?;
        debug!("Opened record source");
        Ok(records(BufReader::new(file), self.schema.clone()))
    }

    /// Count the records of the file without parsing them.
    pub async fn count_records(&self) -> Result<u64, SourceError> {
        let mut lines = BufReader::new(self.open_file().await?).lines();
        let mut count = 0;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Stream the records of a JSON-lines reader.
///
/// A record's ordinal is the zero-based index of its line. Blank lines are skipped.
pub fn records<R>(
    reader: R,
    schema: RecordSchema,
) -> impl Stream<Item = Result<RawRecord, SourceError>>
where
    R: AsyncBufRead + Unpin,
{
    LinesStream::new(reader.lines())
        .enumerate()
        .filter_map(move |(index, line)| {
            let record = match line {
                Err(e) => Some(Err(SourceError::from(e))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(
                    RawRecord::from_json_line(&schema, index as u64, &line)
                        .map_err(SourceError::from),
                ),
            };
            future::ready(record)
        })
}
