// Primitives for reading CSV voter rolls.

use csv::ErrorKind;

use crate::ingest::io_common::{Cell, RawRow, SourceRow, SourceRows};
use crate::ingest::*;

const BOM: char = '\u{feff}';

fn record_line(record: &csv::StringRecord, idx: usize) -> usize {
    record
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(idx + 1)
}

fn read_record(path: &str, idx: usize, line_r: Result<csv::StringRecord, csv::Error>) -> IngestResult<SourceRow> {
    let record = match line_r {
        Ok(record) => record,
        Err(e) => {
            if let ErrorKind::Io(_) = e.kind() {
                return Err(e).context(CsvOpenSnafu { path });
            }
            let lineno = e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 1);
            warn!("read_csv_roll: {}: line {} is unreadable: {}", path, lineno, e);
            return Ok(SourceRow::Unreadable(lineno));
        }
    };
    let lineno = record_line(&record, idx);
    let cells = record
        .iter()
        .map(|s| {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.to_string())
            }
        })
        .collect();
    debug!("read_csv_roll: lineno: {:?} row: {:?}", lineno, record);
    Ok(SourceRow::Data(RawRow { lineno, cells }))
}

/// Opens a CSV voter roll. The first line is the header, which is read
/// now. The data lines are read as the rows are pulled.
///
/// Lines that cannot be decoded come out as [`SourceRow::Unreadable`] and
/// do not stop the reading.
pub fn read_csv_roll(path: &str) -> IngestResult<SourceRows> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut records = rdr.into_records();
    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvOpenSnafu { path })?
            .iter()
            .map(|s| s.trim_start_matches(BOM).trim().to_string())
            .collect(),
        None => return EmptySourceSnafu { path }.fail(),
    };
    debug!("read_csv_roll: header: {:?}", header);
    info!("Reading voter rows from {:?}", path);

    let path = path.to_string();
    // The header was record 0.
    let rows = records
        .enumerate()
        .map(move |(idx, line_r)| read_record(&path, idx + 1, line_r));
    Ok(SourceRows::new(header, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, contents: &[u8]) -> String {
        let path = dir.path().join("roll.csv");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path.display().to_string()
    }

    fn read_all(path: &str) -> (Vec<String>, Vec<SourceRow>) {
        let mut source = read_csv_roll(path).unwrap();
        let rows = source.next_chunk(100).unwrap();
        (source.header, rows)
    }

    fn data(row: &SourceRow) -> &RawRow {
        match row {
            SourceRow::Data(r) => r,
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn rows_are_read_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, b"VID,Name,Region\nV1,Asha,Kutch\nV2,Ravi,Kutch\nV3,Mina,Kutch\n");
        let mut source = read_csv_roll(&path).unwrap();
        let first = source.next_chunk(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(data(&first[1]).lineno, 3);
        let second = source.next_chunk(2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(data(&second[0]).lineno, 4);
        assert!(source.next_chunk(2).unwrap().is_empty());
    }

    #[test]
    fn quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            b"\xef\xbb\xbfVID,Name,Address\nV1,\"Shah, Asha\",\"12 \"\"Hill\"\" Road\"\n",
        );
        let (header, rows) = read_all(&path);
        assert_eq!(header, vec!["VID", "Name", "Address"]);
        assert_eq!(rows.len(), 1);
        let row = data(&rows[0]);
        assert_eq!(row.lineno, 2);
        assert_eq!(
            row.cells,
            vec![
                Cell::Text("V1".to_string()),
                Cell::Text("Shah, Asha".to_string()),
                Cell::Text("12 \"Hill\" Road".to_string()),
            ]
        );
    }

    #[test]
    fn ragged_and_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, b"VID,Name,Region\nV1,Asha\n,,\nV2,Ravi,Kutch,extra\n");
        let (_, rows) = read_all(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(data(&rows[0]).cells.len(), 2);
        assert!(data(&rows[1]).is_blank());
        assert_eq!(data(&rows[2]).lineno, 4);
        assert_eq!(data(&rows[2]).cells.len(), 4);
    }

    #[test]
    fn unreadable_lines_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, b"VID,Name,Region\nV1,\xff\xfe,Kutch\nV2,Ravi,Kutch\n");
        let (_, rows) = read_all(&path);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], SourceRow::Unreadable(2));
        assert_eq!(data(&rows[1]).lineno, 3);
    }

    #[test]
    fn empty_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, b"");
        assert!(matches!(
            read_csv_roll(&path),
            Err(IngestError::EmptySource { .. })
        ));
    }
}
