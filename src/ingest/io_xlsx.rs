use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::ingest::io_common::{Cell, RawRow, SourceRow, SourceRows};
use crate::ingest::*;

/// Picks the worksheet to read.
///
/// The requested sheet if it exists, else the preferred sheet if it exists,
/// else the first sheet. Names compare case-insensitively.
pub fn choose_worksheet(names: &[String], requested: Option<&str>, preferred: &str) -> Option<String> {
    let find = |wanted: &str| {
        names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted.trim()))
            .cloned()
    };
    if let Some(r) = requested {
        if let Some(name) = find(r) {
            return Some(name);
        }
        warn!(
            "choose_worksheet: no worksheet {:?}, available: {:?}",
            r, names
        );
    }
    find(preferred).or_else(|| names.first().cloned())
}

fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Float(f) => Cell::Number(*f),
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::DateTime(f) => Cell::Date(*f),
        DataType::Bool(b) => Cell::Text(b.to_string()),
        DataType::Empty => Cell::Empty,
        x => {
            debug!("read_cell: unusable cell {:?}", x);
            Cell::Empty
        }
    }
}

/// Opens a voter roll in an Excel workbook. The header is the first row of
/// the worksheet.
///
/// The worksheet is loaded by calamine as a whole. Its rows are turned into
/// [`RawRow`]s as they are pulled.
pub fn read_xlsx_roll(path: &str, sheet: Option<&str>, preferred: &str) -> IngestResult<SourceRows> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let name = choose_worksheet(&names, sheet, preferred).context(EmptyExcelSnafu { path })?;
    info!("Reading worksheet {:?} of {:?}", name, path);
    let wrange = workbook
        .worksheet_range(&name)
        .context(MissingWorksheetSnafu { path, name: &name })?
        .context(OpeningExcelSnafu { path })?;
    ensure!(wrange.height() > 0, EmptySourceSnafu { path });

    // Line numbers as shown by Excel, which counts from 1.
    let first_line = wrange.start().map(|(row, _)| row as usize + 1).unwrap_or(1);
    let width = wrange.width();
    let header: Vec<String> = (0..width)
        .map(|col| {
            wrange
                .get((0, col))
                .and_then(|c| read_cell(c).as_text())
                .unwrap_or_default()
        })
        .collect();
    debug!("read_xlsx_roll: header: {:?}", header);
    info!("Worksheet {:?} has {} data rows", name, wrange.height() - 1);

    let rows = (1..wrange.height()).map(move |idx| {
        let cells: Vec<Cell> = (0..width)
            .map(|col| wrange.get((idx, col)).map(read_cell).unwrap_or(Cell::Empty))
            .collect();
        let lineno = first_line + idx;
        debug!("read_xlsx_roll: lineno: {:?} row: {:?}", lineno, cells);
        Ok(SourceRow::Data(RawRow { lineno, cells }))
    });
    Ok(SourceRows::new(header, rows))
}
