//! Case spreadsheet decoding.
//!
//! The SFB publishes the case list as an Excel workbook. Two title rows sit
//! above the header row; columns are located by header text, so column
//! order and leading blank columns do not matter.

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;
use tracing::debug;

use crate::types::{roc_to_gregorian, BondRecord, CbatError};

pub const COL_STOCK_ID: &str = "證券代號";
pub const COL_STOCK_NAME: &str = "公司名稱";
pub const COL_EFFECTIVE_DATE: &str = "生效日期";
pub const COL_CASE_CATEGORY: &str = "案件類別";

/// How far down to look for the header row.
const HEADER_SEARCH_ROWS: usize = 10;

static EMPTY_CELL: Data = Data::Empty;

struct Columns {
    stock_id: usize,
    stock_name: usize,
    effective_date: usize,
    case_category: usize,
}

impl Columns {
    fn locate(row: &[Data]) -> Option<Self> {
        let find = |name: &str| row.iter().position(|c| cell_string(c) == name);
        Some(Self {
            stock_id: find(COL_STOCK_ID)?,
            stock_name: find(COL_STOCK_NAME)?,
            effective_date: find(COL_EFFECTIVE_DATE)?,
            case_category: find(COL_CASE_CATEGORY)?,
        })
    }
}

/// Decode an xls/xlsx workbook held in memory and return the qualifying
/// bonds of its first sheet.
pub fn parse_workbook(bytes: Vec<u8>) -> Result<Vec<BondRecord>, CbatError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| CbatError::SpreadsheetParse(format!("unreadable workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CbatError::SpreadsheetParse("workbook has no sheets".to_string()))?
        .map_err(|e| CbatError::SpreadsheetParse(format!("unreadable sheet: {e}")))?;
    bonds_from_range(&range)
}

/// Extract qualifying bonds from a sheet, preserving row order.
pub fn bonds_from_range(range: &Range<Data>) -> Result<Vec<BondRecord>, CbatError> {
    let mut rows = range.rows().enumerate();

    let columns = rows
        .by_ref()
        .take(HEADER_SEARCH_ROWS)
        .find_map(|(_, row)| Columns::locate(row))
        .ok_or_else(|| {
            CbatError::SpreadsheetParse(format!(
                "header row with {COL_STOCK_ID}/{COL_STOCK_NAME}/{COL_EFFECTIVE_DATE}/{COL_CASE_CATEGORY} not found"
            ))
        })?;

    let mut bonds = Vec::new();
    for (index, row) in rows {
        let get = |col: usize| row.get(col).unwrap_or(&EMPTY_CELL);

        let category = cell_string(get(columns.case_category));
        if !BondRecord::is_qualifying_category(&category) {
            continue;
        }

        let effective_date = effective_date(get(columns.effective_date)).map_err(|msg| {
            CbatError::SpreadsheetParse(format!("row {}: {msg}", index + 1))
        })?;

        let bond = BondRecord::new(
            cell_string(get(columns.stock_id)),
            cell_string(get(columns.stock_name)),
            effective_date,
            category,
        )
        .map_err(|e| CbatError::SpreadsheetParse(format!("row {}: {e}", index + 1)))?;
        bonds.push(bond);
    }

    debug!(count = bonds.len(), "Qualifying bonds parsed");
    Ok(bonds)
}

/// Render a cell the way a human reads it; whole floats lose their `.0`.
fn cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// ROC `YYYMMDD` cell → Gregorian date; blank means not yet effective.
fn effective_date(cell: &Data) -> Result<Option<chrono::NaiveDate>, String> {
    let packed = match cell {
        Data::Empty => return Ok(None),
        Data::Float(f) if f.fract() == 0.0 => *f as i64,
        Data::Int(i) => *i,
        Data::String(s) if s.trim().is_empty() => return Ok(None),
        Data::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("effective date {s:?} is not a number"))?,
        other => return Err(format!("unexpected effective date cell {other:?}")),
    };
    roc_to_gregorian(packed)
        .map(Some)
        .ok_or_else(|| format!("effective date {packed} is not a valid ROC date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Sheet with two title rows, a header row and `data` rows of
    /// (id, name, date, category).
    fn sheet(data: &[(Data, &str, Data, &str)]) -> Range<Data> {
        let last_row = 2 + data.len() as u32;
        let mut range = Range::new((0, 0), (last_row, 4));
        range.set_value((0, 0), Data::String("發行人募集與發行有價證券案件".into()));
        range.set_value((1, 0), Data::String("113年01月".into()));
        let headers = ["編號", COL_STOCK_ID, COL_STOCK_NAME, COL_CASE_CATEGORY, COL_EFFECTIVE_DATE];
        for (col, h) in headers.iter().enumerate() {
            range.set_value((2, col as u32), Data::String(h.to_string()));
        }
        for (i, (id, name, date, category)) in data.iter().enumerate() {
            let r = 3 + i as u32;
            range.set_value((r, 0), Data::Int(i as i64 + 1));
            range.set_value((r, 1), id.clone());
            range.set_value((r, 2), Data::String(name.to_string()));
            range.set_value((r, 3), Data::String(category.to_string()));
            range.set_value((r, 4), date.clone());
        }
        range
    }

    #[test]
    fn test_filters_categories_and_keeps_order() {
        let range = sheet(&[
            (Data::Float(6533.0), "晶心科", Data::Float(1130105.0), "轉換公司債(無擔保)"),
            (Data::Float(2330.0), "台積電", Data::Empty, "現金增資"),
            (Data::String("3680".into()), "家登", Data::Empty, "轉換公司債(有擔保)"),
        ]);
        let bonds = bonds_from_range(&range).unwrap();

        assert_eq!(bonds.len(), 2);
        assert_eq!(bonds[0].stock_id, "6533");
        assert_eq!(bonds[0].stock_name, "晶心科");
        assert_eq!(bonds[0].effective_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(bonds[1].stock_id, "3680");
        assert_eq!(bonds[1].effective_date, None);
        assert_eq!(bonds[1].case_category, "轉換公司債(有擔保)");
    }

    #[test]
    fn test_string_and_int_dates() {
        let range = sheet(&[
            (Data::Int(1101), "台泥", Data::String("1121231".into()), "轉換公司債(無擔保)"),
            (Data::Int(1102), "亞泥", Data::Int(1130229), "轉換公司債(無擔保)"),
        ]);
        let bonds = bonds_from_range(&range).unwrap();
        assert_eq!(bonds[0].effective_date, NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(bonds[1].effective_date, NaiveDate::from_ymd_opt(2024, 2, 29));
    }

    #[test]
    fn test_invalid_date_is_error() {
        let range = sheet(&[(Data::Int(1101), "台泥", Data::Int(1131301), "轉換公司債(無擔保)")]);
        let err = bonds_from_range(&range).unwrap_err();
        assert!(matches!(err, CbatError::SpreadsheetParse(ref m) if m.contains("row 4")));
    }

    #[test]
    fn test_empty_stock_id_is_error() {
        let range = sheet(&[(Data::Empty, "無名", Data::Empty, "轉換公司債(有擔保)")]);
        assert!(bonds_from_range(&range).is_err());
    }

    #[test]
    fn test_non_qualifying_rows_are_not_validated() {
        let range = sheet(&[(Data::Empty, "無名", Data::String("n/a".into()), "現金增資")]);
        assert!(bonds_from_range(&range).unwrap().is_empty());
    }

    #[test]
    fn test_missing_header() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 1));
        range.set_value((0, 0), Data::String("證券代號".into()));
        range.set_value((0, 1), Data::String("公司名稱".into()));
        let err = bonds_from_range(&range).unwrap_err();
        assert!(err.to_string().contains("header row"));
    }

    #[test]
    fn test_garbage_bytes() {
        let err = parse_workbook(b"not a workbook".to_vec()).unwrap_err();
        assert!(matches!(err, CbatError::SpreadsheetParse(_)));
    }
}
