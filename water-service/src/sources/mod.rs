pub mod daily_csv_file;
pub mod monthly_csv_file;
pub mod postgres_meters;

pub use daily_csv_file::DailyCsvFileSource;
pub use monthly_csv_file::MonthlyCsvFileSource;
pub use postgres_meters::PostgresMeterSource;
