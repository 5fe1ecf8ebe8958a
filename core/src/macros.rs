/// Builds a [`Row`](crate::Row) from `column => value` pairs.
///
/// Columns are anything convertible into a [`ColumnRef`](crate::ColumnRef), values anything
/// convertible into a [`SqlValue`](crate::SqlValue).
///
/// ```
/// use pgbulk::row;
///
/// let row = row! { "v_int" => 321, "v_text" => "123" };
/// assert_eq!(row.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $(
            row.insert($column, $value);
        )+
        row
    }};
}
