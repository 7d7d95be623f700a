use std::path::Path;

use async_trait::async_trait;
use courier_config::SourceConfig;
use futures::TryStreamExt;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Column, Connection, Executor, Row, Statement};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::csv::push_record;
use crate::{ExportError, ExportSession, ExportSource, ExportSummary};

/// Export source backed by sqlx's driver-agnostic `Any` connection.
///
/// Column values are rendered as text, integers, floats, booleans or
/// (lossily) blobs. Types the `Any` driver cannot carry, such as dates or
/// decimals on PostgreSQL, must be cast to text in the query.
#[derive(Debug, Clone)]
pub struct SqlExportSource {
  url: String,
}

impl SqlExportSource {
  /// Create a source from the configured connection parameters.
  pub fn new(config: &SourceConfig) -> Result<Self, ExportError> {
    Ok(Self::from_url(config.url()?))
  }

  /// Create a source from a ready-made connection URL.
  pub fn from_url(url: impl Into<String>) -> Self {
    sqlx::any::install_default_drivers();
    Self { url: url.into() }
  }
}

#[async_trait]
impl ExportSource for SqlExportSource {
  async fn connect(&self) -> Result<Box<dyn ExportSession>, ExportError> {
    let conn = AnyConnection::connect(&self.url)
      .await
      .map_err(ExportError::Connection)?;

    debug!(backend = conn.backend_name(), "data source connected");
    Ok(Box::new(SqlExportSession { conn: Some(conn) }))
  }
}

/// An open `Any` connection.
pub struct SqlExportSession {
  conn: Option<AnyConnection>,
}

#[async_trait]
impl ExportSession for SqlExportSession {
  async fn run_query_to_file(
    &mut self,
    query: &str,
    output_path: &Path,
  ) -> Result<ExportSummary, ExportError> {
    let conn = self.conn.as_mut().ok_or(ExportError::NotConnected)?;

    let statement = (&mut *conn)
      .prepare(query)
      .await
      .map_err(ExportError::Query)?;
    let header: Vec<String> = statement
      .columns()
      .iter()
      .map(|c| c.name().to_string())
      .collect();

    let write_err = |source| ExportError::Write {
      path: output_path.to_path_buf(),
      source,
    };

    if let Some(parent) = output_path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut writer = BufWriter::new(File::create(output_path).await.map_err(write_err)?);

    let mut line = String::new();
    push_record(&mut line, &header);
    writer.write_all(line.as_bytes()).await.map_err(write_err)?;

    let mut rows = sqlx::query(query).fetch(&mut *conn);
    let mut count = 0u64;
    while let Some(row) = rows.try_next().await.map_err(ExportError::Query)? {
      let values = (0..row.len())
        .map(|i| render_value(&row, i))
        .collect::<Result<Vec<_>, _>>()
        .map_err(ExportError::Query)?;

      line.clear();
      push_record(&mut line, &values);
      writer.write_all(line.as_bytes()).await.map_err(write_err)?;
      count += 1;
    }

    writer.flush().await.map_err(write_err)?;

    info!(
      path = %output_path.display(),
      columns = header.len(),
      rows = count,
      "export written"
    );

    Ok(ExportSummary {
      columns: header.len(),
      rows: count,
    })
  }

  async fn close(&mut self) {
    if let Some(conn) = self.conn.take()
      && let Err(e) = conn.close().await
    {
      warn!(error = %e, "error closing data source connection");
    }
  }
}

/// Render one column as text; NULL becomes an empty field.
fn render_value(row: &AnyRow, index: usize) -> Result<String, sqlx::Error> {
  if let Ok(value) = row.try_get::<Option<String>, _>(index) {
    return Ok(value.unwrap_or_default());
  }
  if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
    return Ok(value.map(|v| v.to_string()).unwrap_or_default());
  }
  if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
    return Ok(value.map(|v| v.to_string()).unwrap_or_default());
  }
  if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
    return Ok(value.map(|v| v.to_string()).unwrap_or_default());
  }

  let bytes = row.try_get::<Option<Vec<u8>>, _>(index)?;
  Ok(
    bytes
      .map(|b| String::from_utf8_lossy(&b).into_owned())
      .unwrap_or_default(),
  )
}
