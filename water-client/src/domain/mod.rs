pub mod analysis;
pub mod daily;
pub mod meter;
pub mod period_key;

pub use analysis::{
    BuildingAnalysis, LossStatus, PerformanceRating, PeriodAnalysis, RangeAnalysis,
    TypeCategories, TypeConsumption, ZoneAnalysis, ZoneDirectory,
};
pub use daily::{DailyMeterRow, DailyZoneReading};
pub use meter::{Level, Meter, DIRECT_CONNECTION_ZONE, MAIN_BULK_ZONE};
pub use period_key::PeriodKey;
