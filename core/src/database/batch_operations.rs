/// The type of bulk operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperationType {
    Insert,
    Update,
}

impl BatchOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperationType::Insert => "insert",
            BatchOperationType::Update => "update",
        }
    }
}

/// Rows rendered into a single statement.
pub const BULK_CHUNK_SIZE: usize = 10_000;

/// Column used to find the rows to update when the caller names none.
pub const DEFAULT_REFERENCE_KEY: &str = "id";

/// Name of the CTE holding the incoming rows of an UPDATE.
pub const UPDATE_SOURCE_ALIAS: &str = "src";

/// Alias of the table being updated.
pub const UPDATE_TARGET_ALIAS: &str = "dst";

/// Types without a usable `<>` operator.
pub const NON_COMPARABLE_TYPES: &[&str] = &["json", "xml"];

/// Whether values of `db_type` can be compared with a plain `<>`.
///
/// Arrays are excluded as well: element-wise comparison of arrays holding non-comparable
/// elements fails at runtime.
pub fn is_type_comparable(db_type: &str) -> bool {
    let db_type = db_type.trim();

    if db_type.ends_with("[]") {
        return false;
    }

    !NON_COMPARABLE_TYPES.iter().any(|name| db_type.eq_ignore_ascii_case(name))
}

/// `[start, end)` bounds of consecutive chunks of at most `chunk_size` rows.
pub fn chunk_bounds(len: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let chunk_size = chunk_size.max(1);
    (0..len).step_by(chunk_size).map(|start| (start, (start + chunk_size).min(len))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_type_comparable() {
        assert!(is_type_comparable("int"));
        assert!(is_type_comparable("float"));
        assert!(is_type_comparable("timestamp without time zone"));
        assert!(is_type_comparable("jsonb"));
        assert!(!is_type_comparable("int[]"));
        assert!(!is_type_comparable("json"));
        assert!(!is_type_comparable("xml"));
    }

    #[test]
    fn test_chunk_bounds() {
        assert_eq!(chunk_bounds(0, 10), Vec::<(usize, usize)>::new());
        assert_eq!(chunk_bounds(3, 10), vec![(0, 3)]);
        assert_eq!(chunk_bounds(10, 10), vec![(0, 10)]);
        assert_eq!(
            chunk_bounds(BULK_CHUNK_SIZE + 1, BULK_CHUNK_SIZE),
            vec![(0, 10_000), (10_000, 10_001)]
        );
    }
}
