pub mod aggregation;
pub mod assembler;
pub mod filters;
pub mod scratch;
pub mod store;
pub mod workbook;
