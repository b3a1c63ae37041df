use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use quarry_core::driver::Cell;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn export_rows_to_csv(
    path: &Path,
    headers: &[String],
    rows: &[Vec<Cell>],
) -> Result<usize, ExportError> {
    let mut content = String::new();
    content.push_str(
        &headers
            .iter()
            .map(|header| csv_escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    content.push('\n');

    for row in rows {
        let values = (0..headers.len())
            .map(|column_index| match row.get(column_index) {
                None | Some(Cell::Null) => String::new(),
                Some(cell) => csv_escape(&cell.to_string()),
            })
            .collect::<Vec<_>>();
        content.push_str(&values.join(","));
        content.push('\n');
    }

    write_file(path, content)?;
    info!("exported {} row(s) to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// `<dir>/<connection>-<unix seconds>.csv`, with the connection name reduced
/// to filename-safe characters.
#[must_use]
pub fn csv_export_path(dir: &Path, connection_name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let safe_name = connection_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let safe_name = if safe_name.is_empty() {
        "results".to_string()
    } else {
        safe_name
    };
    dir.join(format!("{safe_name}-{stamp}.csv"))
}

fn write_file(path: &Path, content: String) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use quarry_core::driver::Cell;
    use tempfile::TempDir;

    use super::{csv_export_path, export_rows_to_csv};

    #[test]
    fn exports_rows_to_csv_with_header_and_escaping() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("result.csv");
        let headers = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![Cell::Int(1), Cell::Text("alpha".to_string())],
            vec![Cell::Int(2), Cell::Text("quote \"name\"".to_string())],
            vec![Cell::Int(3), Cell::Null],
        ];

        let written = export_rows_to_csv(&path, &headers, &rows).expect("csv export failed");
        assert_eq!(written, 3);
        let output = fs::read_to_string(path).expect("failed to read csv output");
        assert!(output.starts_with("id,name\n"));
        assert!(output.contains("2,\"quote \"\"name\"\"\""));
        assert!(output.ends_with("3,\n"));
    }

    #[test]
    fn export_path_uses_a_filename_safe_connection_name() {
        let path = csv_export_path(Path::new("/tmp"), "prod db/1");
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("export path has a file name");
        assert!(file_name.starts_with("prod_db_1-"));
        assert!(file_name.ends_with(".csv"));
    }
}
