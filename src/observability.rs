use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total availability queries. Labels: operation, status.
pub const QUERIES_TOTAL: &str = "seatplan_queries_total";

/// Histogram: query latency in seconds. Labels: operation.
pub const QUERY_DURATION_SECONDS: &str = "seatplan_query_duration_seconds";

// ── Computation metrics ─────────────────────────────────────────

/// Counter: candidate slots evaluated.
pub const SLOTS_EVALUATED_TOTAL: &str = "seatplan_slots_evaluated_total";

/// Counter: closures ignored because their recurrence rule did not parse.
pub const CLOSURE_RULE_ERRORS_TOTAL: &str = "seatplan_closure_rule_errors_total";

/// Counter: requests answered with "no availability" due to configuration. Labels: reason.
pub const DEGRADED_TOTAL: &str = "seatplan_degraded_total";

pub const OP_FIND_SLOTS: &str = "find_slots";
pub const OP_FIND_DAYS: &str = "find_available_days";
pub const OP_SUGGEST_TABLES: &str = "suggest_tables";

/// Map a query outcome to a short status label for metrics.
pub fn status_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::Validation { .. }) => "invalid",
        Err(EngineError::LimitExceeded(_)) => "limit",
        Err(EngineError::DataAccess(_) | EngineError::MalformedRow { .. }) => "data_error",
        Err(EngineError::Configuration(_)) => "config_error",
    }
}
