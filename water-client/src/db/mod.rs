pub mod water_meter_queries;
