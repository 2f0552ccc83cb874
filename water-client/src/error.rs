/// Structural failures of an analysis request.
///
/// Dirty utility data (zero bulk readings, negative loss, missing readings)
/// never produces one of these; it shows up in the analysis values instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("invalid period range {start}..{end}: {reason}")]
    InvalidRange {
        start: String,
        end: String,
        reason: String,
    },
    #[error("no period has any readings")]
    NoDataAvailable,
    #[error("meter registry is empty")]
    EmptyRegistry,
    #[error("no periods selected")]
    EmptyPeriodSet,
}

/// Errors raised while building a registry, catalog or reading from raw
/// fields.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("duplicate account number '{0}'")]
    DuplicateAccount(String),
    #[error("expected exactly one L1 main bulk meter, found {0}")]
    MainBulkCount(usize),
    #[error("invalid period key '{0}'")]
    InvalidPeriodKey(String),
    #[error("invalid meter level '{0}'")]
    InvalidLevel(String),
    #[error("period catalog must be strictly ascending at '{0}'")]
    UnsortedCatalog(String),
    #[error("day {day} is outside 1..={max}")]
    InvalidDay { day: u8, max: u8 },
}
