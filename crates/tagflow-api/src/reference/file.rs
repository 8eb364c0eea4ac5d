// File-backed reference source, for sites that export the sheet locally.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ReferenceSource, ReferenceTable};
use crate::error::Error;

#[derive(Debug, Clone)]
pub struct FileReferenceSource {
    path: PathBuf,
}

impl FileReferenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReferenceSource for FileReferenceSource {
    async fn fetch_all(&self) -> Result<ReferenceTable, Error> {
        debug!(path = %self.path.display(), "reading reference file");
        let body = tokio::fs::read(&self.path).await?;
        ReferenceTable::from_json(&body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_records_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"Tag ID":"FF01","Description":"Pallet"}}]"#).unwrap();

        let source = FileReferenceSource::new(file.path());
        let table = source.fetch_all().await.unwrap();
        assert_eq!(table.rows.len(), 1);
        let description = table.column_index("description").unwrap();
        assert_eq!(table.rows[0][description], "Pallet");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let source = FileReferenceSource::new("/nonexistent/reference.json");
        assert!(matches!(source.fetch_all().await, Err(Error::Io(_))));
    }
}
