use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::Result;

/// One record keyed by column name. Keys and values are trimmed.
pub type Row = BTreeMap<String, String>;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// A typed GTFS row. Columns without a dedicated field live in an extension bag and are written
/// back verbatim.
pub trait Record: Sized {
    /// Columns with a dedicated field, in the usual GTFS order
    const COLUMNS: &'static [&'static str];

    fn from_row(row: Row) -> Self;
    fn to_row(&self) -> Row;
}

/// The rows of one GTFS file, remembering the header order they were read with.
#[derive(Clone, Debug)]
pub struct Table<T> {
    pub columns: Vec<String>,
    pub rows: Vec<T>,
}

impl<T> Table<T> {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }
}

impl<T: Record> Table<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            columns: T::COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let (columns, rows) = read_rows(reader, None)?;
        Ok(Self {
            columns,
            rows: rows.into_iter().map(T::from_row).collect(),
        })
    }

    /// A missing file is an empty table, not an error. Use `Path::exists` first to tell the two
    /// apart.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} doesn't exist, treating it as empty", path.display());
            return Ok(Self::empty());
        }
        Self::from_reader(fs_err::File::open(path)?)
    }

    /// The header to write: the original columns, then any columns that only appear in the rows,
    /// like a known field set by an edit.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.columns.clone();
        let mut added: BTreeSet<String> = BTreeSet::new();
        for row in &self.rows {
            for key in row.to_row().into_keys() {
                if !columns.contains(&key) {
                    added.insert(key);
                }
            }
        }
        for known in T::COLUMNS {
            if added.remove(*known) {
                columns.push(known.to_string());
            }
        }
        columns.extend(added);
        columns
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let columns = self.output_columns();
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&columns)?;
        for row in &self.rows {
            let row = row.to_row();
            out.write_record(
                columns
                    .iter()
                    .map(|c| row.get(c).map(String::as_str).unwrap_or("")),
            )?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write(fs_err::File::create(path.as_ref())?)
    }

    /// Every row as it would be written. Blank cells are empty strings, not missing keys.
    pub fn to_rows(&self) -> Vec<Row> {
        let columns = self.output_columns();
        self.rows
            .iter()
            .map(|row| {
                let mut row = row.to_row();
                for c in &columns {
                    row.entry(c.clone()).or_default();
                }
                row
            })
            .collect()
    }
}

/// Parses CSV into rows keyed by header. A leading byte-order mark is dropped, every key and
/// value is trimmed, and invalid UTF-8 is replaced rather than rejected.
pub fn load_table<R: Read>(reader: R) -> Result<Vec<Row>> {
    Ok(read_rows(reader, None)?.1)
}

/// The header and at most the first `limit` rows, without reading the rest.
pub fn preview_table<R: Read>(reader: R, limit: usize) -> Result<(Vec<String>, Vec<Row>)> {
    read_rows(reader, Some(limit))
}

/// Like `load_table`, but a missing file gives no rows.
pub fn load_table_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Row>> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("{} doesn't exist, treating it as empty", path.display());
        return Ok(Vec::new());
    }
    load_table(fs_err::File::open(path)?)
}

fn read_rows<R: Read>(reader: R, limit: Option<usize>) -> Result<(Vec<String>, Vec<Row>)> {
    let mut reader = BufReader::new(reader);
    if reader.fill_buf()?.starts_with(BOM) {
        reader.consume(BOM.len());
    }

    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns: Vec<String> = csv.byte_headers()?.iter().map(decode).collect();

    let mut rows = Vec::new();
    for rec in csv.byte_records() {
        if limit.map_or(false, |limit| rows.len() >= limit) {
            break;
        }
        let rec = rec?;
        // Short rows just lack the trailing columns; extra cells have no name and are dropped
        let row: Row = columns
            .iter()
            .zip(rec.iter())
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.clone(), decode(value)))
            .collect();
        rows.push(row);
    }
    Ok((columns, rows))
}

// Records are read as bytes so one bad byte doesn't reject the whole file
fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Removes a column, treating blank cells as absent.
pub(crate) fn take(row: &mut Row, key: &str) -> Option<String> {
    row.remove(key).filter(|value| !value.is_empty())
}

/// Removes an identity column. Blank IDs are kept as empty strings.
pub(crate) fn take_id(row: &mut Row, key: &str) -> String {
    row.remove(key).unwrap_or_default()
}

pub(crate) fn put(row: &mut Row, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        row.insert(key.to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_whitespace() {
        let input = "\u{feff} route_id , route_short_name\n R1 ,  10 \nR2,\n";
        let rows = load_table(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["route_id"], "R1");
        assert_eq!(rows[0]["route_short_name"], "10");
        assert_eq!(rows[1]["route_id"], "R2");
        assert_eq!(rows[1]["route_short_name"], "");
    }

    #[test]
    fn ragged_rows() {
        let input = "a,b,c\n1,2\n4,5,6,7\n";
        let rows = load_table(input.as_bytes()).unwrap();
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("c"));
        assert_eq!(rows[1].len(), 3);
        assert_eq!(rows[1]["c"], "6");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let input = b"stop_id,stop_name\nS1,Caf\xe9\n";
        let rows = load_table(&input[..]).unwrap();
        assert_eq!(rows[0]["stop_id"], "S1");
        assert!(rows[0]["stop_name"].starts_with("Caf"));
    }

    #[test]
    fn quoted_cells_are_trimmed_too() {
        let input = "stop_id,stop_name\nS1,\"  Main St \"\n";
        let rows = load_table(input.as_bytes()).unwrap();
        assert_eq!(rows[0]["stop_name"], "Main St");
    }

    #[test]
    fn preview_stops_early() {
        let input = "\u{feff}trip_id,stop_id\nT1,A\nT1,B\nT1,C\n";
        let (columns, rows) = preview_table(input.as_bytes(), 2).unwrap();
        assert_eq!(columns, vec!["trip_id", "stop_id"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["stop_id"], "B");

        let (columns, rows) = preview_table("a,b\n".as_bytes(), 5).unwrap();
        assert_eq!(columns, vec!["a", "b"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn rows_keep_blank_cells() {
        let input = "route_id,route_short_name,network\nR1,1,city\nR2,,\n";
        let table: Table<crate::Route> = Table::from_reader(input.as_bytes()).unwrap();
        let rows = table.to_rows();
        assert_eq!(rows[0]["network"], "city");
        assert_eq!(rows[1]["route_short_name"], "");
        assert_eq!(rows[1]["network"], "");
        assert_eq!(rows[1].len(), 3);
    }

    #[test]
    fn empty_source() {
        assert!(load_table("".as_bytes()).unwrap().is_empty());
        assert!(load_table("a,b\n".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let path = std::env::temp_dir().join("gtfs-table-test-does-not-exist.txt");
        assert!(load_table_from_path(&path).unwrap().is_empty());
    }
}
