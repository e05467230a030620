//! Append-only summary table (CSV) with durable per-row writes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use scene_common::{SceneError, SceneResult};
use spectral::{StatisticsRow, SUMMARY_HEADER};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Index of the `Item_ID` column.
const ITEM_ID_COLUMN: usize = 1;

/// Open summary table for one site within one run.
///
/// Rows are written and synced one at a time; a crash loses at most the row
/// being written. Reopening an existing table resumes it: the header is
/// validated, a torn final line is cut off, and rows for items already present
/// are not written again.
#[derive(Debug)]
pub struct SummaryTable {
    path: PathBuf,
    file: File,
    items: HashSet<String>,
    rows: usize,
}

impl SummaryTable {
    /// Create the table with its header, or resume an existing one.
    pub async fn open(path: &Path) -> SceneResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let existing = match fs::read(path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            Some(content) if !content.is_empty() => Self::resume(path, content).await,
            _ => Self::create(path).await,
        }
    }

    async fn create(path: &Path) -> SceneResult<Self> {
        let mut file = File::create(path).await?;
        file.write_all(header_line().as_bytes()).await?;
        file.sync_all().await?;

        debug!(path = %path.display(), "Created summary table");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            items: HashSet::new(),
            rows: 0,
        })
    }

    async fn resume(path: &Path, content: Vec<u8>) -> SceneResult<Self> {
        let text = String::from_utf8(content).map_err(|e| table_error(path, e.to_string()))?;
        let (records, complete_len) = parse_records(&text);

        let header = match records.first() {
            Some(header) => header,
            // Interrupted while writing the header
            None if header_line().starts_with(text.as_str()) => {
                warn!(path = %path.display(), "Recreating table with torn header");
                return Self::create(path).await;
            }
            None => return Err(table_error(path, "missing header row".to_string())),
        };
        if header.iter().map(String::as_str).ne(SUMMARY_HEADER.iter().copied()) {
            return Err(table_error(
                path,
                format!("unexpected header '{}'", header.join(",")),
            ));
        }

        let file = OpenOptions::new().write(true).open(path).await?;
        if complete_len < text.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = text.len() - complete_len,
                "Truncating torn final row"
            );
            file.set_len(complete_len as u64).await?;
            file.sync_all().await?;
        }
        drop(file);

        let items: HashSet<String> = records
            .iter()
            .skip(1)
            .filter_map(|record| record.get(ITEM_ID_COLUMN).cloned())
            .collect();
        let rows = records.len() - 1;

        let file = OpenOptions::new().append(true).open(path).await?;
        info!(path = %path.display(), rows = rows, "Resumed summary table");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            items,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains(item_id)
    }

    /// Append one row and sync it to disk.
    ///
    /// Returns `false` without writing if the item already has a row.
    pub async fn append_row(&mut self, row: &StatisticsRow) -> SceneResult<bool> {
        if self.items.contains(&row.item_id) {
            debug!(item_id = %row.item_id, "Row already present, not appending");
            return Ok(false);
        }

        self.file.write_all(format_row(row).as_bytes()).await?;
        self.file.sync_data().await?;

        self.items.insert(row.item_id.clone());
        self.rows += 1;
        Ok(true)
    }

    /// Finish writing; returns the table's location.
    pub async fn close(mut self) -> SceneResult<PathBuf> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        info!(path = %self.path.display(), rows = self.rows, "Closed summary table");
        Ok(self.path)
    }
}

fn table_error(path: &Path, message: String) -> SceneError {
    SceneError::Table {
        path: path.to_path_buf(),
        message,
    }
}

fn header_line() -> String {
    let mut line = SUMMARY_HEADER.join(",");
    line.push('\n');
    line
}

/// Render one row in header order.
pub fn format_row(row: &StatisticsRow) -> String {
    let mut fields = Vec::with_capacity(SUMMARY_HEADER.len());
    fields.push(quote_field(&row.site));
    fields.push(quote_field(&row.item_id));
    fields.extend(row.values().iter().map(|v| format_value(*v)));

    let mut line = fields.join(",");
    line.push('\n');
    line
}

/// Undefined statistics are written as `nan`, never left empty.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

/// Quote a field if it contains a delimiter, quote or line break.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse CSV text into records.
///
/// Returns the complete records and the byte length they occupy; anything
/// after the last line break outside quotes is an incomplete record and is
/// not returned.
pub fn parse_records(text: &str) -> (Vec<Vec<String>>, usize) {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut complete_len = 0;

    let mut chars = text.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if in_quotes {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                complete_len = index + 1;
            }
            _ => field.push(c),
        }
    }

    (records, complete_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::BandSummary;
    use test_utils::temp_test_dir;

    fn row(site: &str, item: &str, value: f64) -> StatisticsRow {
        let summary = BandSummary {
            mean: value,
            min: value,
            max: value,
            valid_cells: 4,
        };
        StatisticsRow {
            site: site.to_string(),
            item_id: item.to_string(),
            ndvi: BandSummary::undefined(),
            red: summary,
            blue: summary,
            green: summary,
            nir: summary,
        }
    }

    #[test]
    fn test_format_row() {
        assert_eq!(
            format_row(&row("Meadow1", "a.tif", 1.5)),
            "Meadow1,a.tif,nan,nan,nan,1.5,1.5,1.5,1.5,1.5,1.5,1.5,1.5,1.5,1.5,1.5,1.5\n"
        );
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("North, East"), "\"North, East\"");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_parse_records_quoted_and_torn() {
        let text = "a,b\n\"x,1\",\"y\"\"z\"\nlast,par";
        let (records, complete_len) = parse_records(text);
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x,1".to_string(), "y\"z".to_string()],
            ]
        );
        assert_eq!(&text[..complete_len], "a,b\n\"x,1\",\"y\"\"z\"\n");
    }

    #[tokio::test]
    async fn test_append_only_in_order() {
        let dir = temp_test_dir();
        let path = dir.path().join("run_S_summary.csv");

        let mut table = SummaryTable::open(&path).await.unwrap();
        assert!(table.append_row(&row("S", "a.tif", 1.0)).await.unwrap());
        assert!(table.append_row(&row("S", "b.tif", 2.0)).await.unwrap());
        assert_eq!(table.row_count(), 2);
        let location = table.close().await.unwrap();
        assert_eq!(location, path);

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER.join(","));
        assert!(lines[1].starts_with("S,a.tif,"));
        assert!(lines[2].starts_with("S,b.tif,"));
    }

    #[tokio::test]
    async fn test_header_only_table() {
        let dir = temp_test_dir();
        let path = dir.path().join("t.csv");
        SummaryTable::open(&path).await.unwrap().close().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, header_line());
    }

    #[tokio::test]
    async fn test_reopen_skips_existing_items_and_drops_torn_row() {
        let dir = temp_test_dir();
        let path = dir.path().join("t.csv");

        let mut table = SummaryTable::open(&path).await.unwrap();
        table.append_row(&row("S", "a.tif", 1.0)).await.unwrap();
        table.close().await.unwrap();

        // Simulate a crash halfway through the next row.
        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content.push_str("S,b.tif,0.1,0.");
        tokio::fs::write(&path, &content).await.unwrap();

        let mut table = SummaryTable::open(&path).await.unwrap();
        assert_eq!(table.row_count(), 1);
        assert!(table.contains("a.tif"));
        assert!(!table.append_row(&row("S", "a.tif", 9.0)).await.unwrap());
        assert!(table.append_row(&row("S", "b.tif", 2.0)).await.unwrap());
        table.close().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let (records, complete_len) = parse_records(&content);
        assert_eq!(complete_len, content.len());
        assert_eq!(records.len(), 3);
        assert_eq!(records[1][1], "a.tif");
        assert_eq!(records[1][5], "1");
        assert_eq!(records[2][1], "b.tif");
    }

    #[tokio::test]
    async fn test_reopen_recreates_torn_header() {
        let dir = temp_test_dir();
        let path = dir.path().join("t.csv");
        tokio::fs::write(&path, "Name,Item_ID,ndvi_me").await.unwrap();

        let mut table = SummaryTable::open(&path).await.unwrap();
        assert_eq!(table.row_count(), 0);
        assert!(table.append_row(&row("S", "a.tif", 1.0)).await.unwrap());
        table.close().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let (records, complete_len) = parse_records(&content);
        assert_eq!(complete_len, content.len());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].join(","), SUMMARY_HEADER.join(","));
        assert_eq!(records[1][1], "a.tif");
    }

    #[tokio::test]
    async fn test_reopen_rejects_unterminated_foreign_file() {
        let dir = temp_test_dir();
        let path = dir.path().join("t.csv");
        tokio::fs::write(&path, "something else").await.unwrap();

        assert!(matches!(
            SummaryTable::open(&path).await,
            Err(SceneError::Table { .. })
        ));
    }

    #[tokio::test]
    async fn test_reopen_rejects_foreign_file() {
        let dir = temp_test_dir();
        let path = dir.path().join("t.csv");
        tokio::fs::write(&path, "Name,order_url,output_url\n").await.unwrap();

        assert!(matches!(
            SummaryTable::open(&path).await,
            Err(SceneError::Table { .. })
        ));
    }
}
