/// License records partition by compact and provider identity; licenses in
/// different jurisdictions or of different types for the same provider live
/// under the same partition.
pub fn license_partition_key(compact: &str, ssn: &str) -> String {
    format!("COMPACT#{compact}#PROVIDER#{ssn}")
}

pub fn license_sort_key(jurisdiction: &str, license_type: &str) -> String {
    format!("JURISDICTION#{jurisdiction}#TYPE#{license_type}")
}

/// Data events partition by compact and event type so a compact's ingest
/// and validation-error streams can each be range-queried by time.
pub fn event_partition_key(compact: &str, event_type: &str) -> String {
    format!("COMPACT#{compact}#TYPE#{event_type}")
}

/// The sort key carries the event time for range queries and the event id
/// for uniqueness, so rewriting the same event overwrites the same item.
pub fn event_sort_key(event_time: &str, event_id: &str) -> String {
    format!("TIME#{event_time}#EVENT#{event_id}")
}
