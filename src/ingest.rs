//! Загрузка CSV: типизация колонок, валидация схемы, учет отброшенных строк

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;

use crate::error::{Result, SeqlabError};
use crate::types::{IngestSummary, Quote, SalesRecord};

/// Тип значения колонки после коэрции
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Float,
    Text,
    Date,
}

/// Описание ожидаемой колонки
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub required: bool,
}

impl ColumnSpec {
    pub fn required(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
        }
    }
}

/// Ячейка таблицы
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Float(f64),
    Text(String),
    Timestamp(i64),
    Missing,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(v) => Some(*v),
            Cell::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Cell::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

/// Таблица с типизированными ячейками
#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub summary: IngestSummary,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SeqlabError::MissingColumn(name.to_string()))
    }

    pub fn column_f64(&self, idx: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r[idx].as_f64()).collect()
    }

    pub fn column_text(&self, idx: usize) -> Vec<Option<&str>> {
        self.rows.iter().map(|r| r[idx].as_text()).collect()
    }
}

/// Читает CSV в таблицу.
///
/// Строки с неверным числом колонок отбрасываются и подсчитываются.
/// Нечитаемые значения становятся `Cell::Missing` и попадают в
/// статистику пропусков по колонкам.
pub fn read_table<R: Read>(reader: R, specs: &[ColumnSpec]) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    // Валидация обязательных колонок
    let missing: Vec<&str> = specs
        .iter()
        .filter(|s| s.required && !headers.iter().any(|h| h == &s.name))
        .map(|s| s.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(SeqlabError::MissingColumn(missing.join(", ")));
    }

    // Тип каждой колонки: из спецификации, иначе текст
    let kinds: Vec<ColumnKind> = headers
        .iter()
        .map(|h| {
            specs
                .iter()
                .find(|s| &s.name == h)
                .map(|s| s.kind)
                .unwrap_or(ColumnKind::Text)
        })
        .collect();

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut dropped_rows = 0usize;
    let mut missing_by_column: HashMap<String, usize> = HashMap::new();

    for record in rdr.records() {
        let record = record?;
        if record.len() != headers.len() {
            dropped_rows += 1;
            continue;
        }

        let mut row = Vec::with_capacity(headers.len());
        for (i, raw) in record.iter().enumerate() {
            let cell = coerce(raw, kinds[i]);
            if cell.is_missing() {
                *missing_by_column.entry(headers[i].clone()).or_insert(0) += 1;
            }
            row.push(cell);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(SeqlabError::EmptyDataset);
    }
    if dropped_rows > 0 {
        tracing::warn!("Dropped {} malformed CSV rows", dropped_rows);
    }

    let summary = IngestSummary {
        rows: rows.len(),
        dropped_rows,
        missing_by_column,
    };

    Ok(Table {
        columns: headers,
        rows,
        summary,
    })
}

pub fn read_table_from_str(content: &str, specs: &[ColumnSpec]) -> Result<Table> {
    read_table(content.as_bytes(), specs)
}

pub fn read_table_from_path(path: &Path, specs: &[ColumnSpec]) -> Result<Table> {
    let file = std::fs::File::open(path)?;
    read_table(file, specs)
}

fn coerce(raw: &str, kind: ColumnKind) -> Cell {
    let value = raw.trim();
    if value.is_empty() {
        return Cell::Missing;
    }
    match kind {
        ColumnKind::Text => Cell::Text(value.to_string()),
        ColumnKind::Float => match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Float(v),
            _ => Cell::Missing,
        },
        ColumnKind::Date => match parse_date(value) {
            Some(ts) => Cell::Timestamp(ts),
            None => Cell::Missing,
        },
    }
}

/// Дата в секундах UNIX; поддерживаются форматы DD-MM-YYYY и YYYY-MM-DD
fn parse_date(value: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(value, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

pub fn quote_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::required("Symbol", ColumnKind::Text),
        ColumnSpec::required("Date", ColumnKind::Date),
        ColumnSpec::required("Open", ColumnKind::Float),
        ColumnSpec::required("High", ColumnKind::Float),
        ColumnSpec::required("Low", ColumnKind::Float),
        ColumnSpec::required("Close", ColumnKind::Float),
        ColumnSpec::required("Volume", ColumnKind::Float),
    ]
}

pub fn sales_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::required("Store", ColumnKind::Text),
        ColumnSpec::required("Date", ColumnKind::Date),
        ColumnSpec::required("Weekly_Sales", ColumnKind::Float),
        ColumnSpec::required("Holiday_Flag", ColumnKind::Float),
        ColumnSpec::required("Temperature", ColumnKind::Float),
        ColumnSpec::required("Fuel_Price", ColumnKind::Float),
        ColumnSpec::required("CPI", ColumnKind::Float),
        ColumnSpec::required("Unemployment", ColumnKind::Float),
    ]
}

/// Конвертация таблицы в котировки; неполные строки пропускаются
pub fn quotes_from_table(table: &Table) -> Result<Vec<Quote>> {
    let symbol = table.column_index("Symbol")?;
    let date = table.column_index("Date")?;
    let open = table.column_index("Open")?;
    let high = table.column_index("High")?;
    let low = table.column_index("Low")?;
    let close = table.column_index("Close")?;
    let volume = table.column_index("Volume")?;

    let mut quotes = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in &table.rows {
        let quote = (|| {
            Some(Quote {
                symbol: row[symbol].as_text()?.to_string(),
                timestamp: row[date].as_timestamp()?,
                open: row[open].as_f64()?,
                high: row[high].as_f64()?,
                low: row[low].as_f64()?,
                close: row[close].as_f64()?,
                volume: row[volume].as_f64()?,
            })
        })();
        match quote {
            Some(q) => quotes.push(q),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!("Skipped {} incomplete quote rows", skipped);
    }
    if quotes.is_empty() {
        return Err(SeqlabError::EmptyDataset);
    }
    Ok(quotes)
}

/// Конвертация таблицы в записи продаж; неполные строки пропускаются
pub fn sales_from_table(table: &Table) -> Result<Vec<SalesRecord>> {
    let store = table.column_index("Store")?;
    let date = table.column_index("Date")?;
    let sales = table.column_index("Weekly_Sales")?;
    let holiday = table.column_index("Holiday_Flag")?;
    let temperature = table.column_index("Temperature")?;
    let fuel = table.column_index("Fuel_Price")?;
    let cpi = table.column_index("CPI")?;
    let unemployment = table.column_index("Unemployment")?;

    let mut records = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in &table.rows {
        let record = (|| {
            Some(SalesRecord {
                store: row[store].as_text()?.to_string(),
                timestamp: row[date].as_timestamp()?,
                weekly_sales: row[sales].as_f64()?,
                holiday_flag: row[holiday].as_f64()?,
                temperature: row[temperature].as_f64()?,
                fuel_price: row[fuel].as_f64()?,
                cpi: row[cpi].as_f64()?,
                unemployment: row[unemployment].as_f64()?,
            })
        })();
        match record {
            Some(r) => records.push(r),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!("Skipped {} incomplete sales rows", skipped);
    }
    if records.is_empty() {
        return Err(SeqlabError::EmptyDataset);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_table_basic() {
        let csv = "Store,Date,Weekly_Sales\n1,05-02-2010,1643690.9\n1,12-02-2010,1641957.44\n";
        let specs = vec![
            ColumnSpec::required("Store", ColumnKind::Text),
            ColumnSpec::required("Date", ColumnKind::Date),
            ColumnSpec::required("Weekly_Sales", ColumnKind::Float),
        ];
        let table = read_table_from_str(csv, &specs).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.summary.dropped_rows, 0);
        assert_eq!(table.rows[0][2], Cell::Float(1643690.9));
        // Даты по возрастанию
        let t0 = table.rows[0][1].as_timestamp().unwrap();
        let t1 = table.rows[1][1].as_timestamp().unwrap();
        assert!(t0 < t1);
    }

    #[test]
    fn test_missing_required_column() {
        let csv = "Store,Date\n1,05-02-2010\n";
        let specs = vec![
            ColumnSpec::required("Store", ColumnKind::Text),
            ColumnSpec::required("Weekly_Sales", ColumnKind::Float),
        ];
        let err = read_table_from_str(csv, &specs).unwrap_err();
        match err {
            SeqlabError::MissingColumn(name) => assert!(name.contains("Weekly_Sales")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_rows_dropped_and_counted() {
        let csv = "A,B\n1,2\n3\n4,5,6\n7,8\n";
        let specs = vec![ColumnSpec::required("A", ColumnKind::Float)];
        let table = read_table_from_str(csv, &specs).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.summary.dropped_rows, 2);
    }

    #[test]
    fn test_unparseable_becomes_missing() {
        let csv = "Age,Name\n22,Alice\n,Bob\nabc,Carol\n";
        let specs = vec![ColumnSpec::required("Age", ColumnKind::Float)];
        let table = read_table_from_str(csv, &specs).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.rows[1][0].is_missing());
        assert!(table.rows[2][0].is_missing());
        assert_eq!(table.summary.missing_by_column.get("Age"), Some(&2));
    }

    #[test]
    fn test_both_date_formats() {
        assert_eq!(parse_date("05-02-2010"), parse_date("2010-02-05"));
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_quotes_from_table() {
        let csv = "Symbol,Date,Open,High,Low,Close,Volume\n\
                   AAPL,2020-01-02,74.06,75.15,73.8,75.09,135480400\n\
                   AAPL,2020-01-03,74.29,75.14,74.13,74.36,146322800\n\
                   MSFT,2020-01-02,158.78,160.73,158.33,160.62,22622100\n";
        let table = read_table_from_str(csv, &quote_columns()).unwrap();
        let quotes = quotes_from_table(&table).unwrap();
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].symbol, "AAPL");
        assert_eq!(quotes[2].symbol, "MSFT");
        assert!((quotes[0].close - 75.09).abs() < 1e-12);
    }

    #[test]
    fn test_sales_skips_incomplete_rows() {
        let csv = "Store,Date,Weekly_Sales,Holiday_Flag,Temperature,Fuel_Price,CPI,Unemployment\n\
                   1,05-02-2010,1643690.9,0,42.31,2.572,211.096,8.106\n\
                   1,12-02-2010,,0,38.51,2.548,211.242,8.106\n";
        let table = read_table_from_str(csv, &sales_columns()).unwrap();
        let records = sales_from_table(&table).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].store, "1");
    }
}
