//! Canonical schema constants for structured logging
//!
//! Every component logs with the same field keys so that snapshot runs,
//! scheduler ticks and query executions can be correlated in one stream.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entity identifiers
pub const FIELD_DATASOURCE_ID: &str = "datasource_id";
pub const FIELD_DATASOURCE_NAME: &str = "datasource_name";
pub const FIELD_SNAPSHOT_ID: &str = "snapshot_id";
pub const FIELD_STORAGE_KEY: &str = "storage_key";

// Sizes
pub const FIELD_ROW_COUNT: &str = "row_count";
pub const FIELD_TABLE_COUNT: &str = "table_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_distinct() {
        assert_ne!(EVENT_START, EVENT_END);
        assert_ne!(EVENT_START, EVENT_END_ERROR);
        assert_ne!(EVENT_END, EVENT_END_ERROR);
    }

    #[test]
    fn test_entity_fields_are_distinct() {
        let fields = [
            FIELD_DATASOURCE_ID,
            FIELD_DATASOURCE_NAME,
            FIELD_SNAPSHOT_ID,
            FIELD_STORAGE_KEY,
        ];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
