//! School Student Dashboard: summary metrics, class tables and fee/attendance
//! charts built from an uploaded CSV or `.xlsx` sheet of student records.

pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod server;
pub mod xlsx;

pub use dashboard::{render, DashboardView, RenderOptions};
pub use data::{load_table, FileFormat, StudentRecord, StudentTable};
pub use error::ParseError;
