pub mod csv_database;

pub use csv_database::{flatten_row, unflatten_row, CsvDatabase, RowCursor};
