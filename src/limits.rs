/// Largest party a single availability query accepts.
pub const MAX_PARTY_SIZE: u32 = 100;

/// Default upper bound on the number of days a day-range query may cover.
pub const DEFAULT_MAX_QUERY_DAYS: u32 = 93;

/// Most tables a join-group combination may use.
pub const MAX_JOIN_TABLES: usize = 4;

/// Minutes in a day; service windows never end past this.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Upper bound on candidate slots generated for one day.
pub const MAX_SLOTS_PER_DAY: usize = MINUTES_PER_DAY as usize;

/// Longest identifier accepted in a query filter.
pub const MAX_FILTER_ID_LEN: usize = 64;
