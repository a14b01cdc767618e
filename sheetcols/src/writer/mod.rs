//! XLSX package writer

pub mod xlsx_writer;

pub use xlsx_writer::{write_workbook, write_workbook_to_bytes};
