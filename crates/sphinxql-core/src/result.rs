//! Materialized result sets.

use std::cell::{Cell, OnceCell};
use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::decode::FromCell;
use crate::error::{Error, Result, StateErrorKind};
use crate::row::Row;

/// Name -> ordinal mapping for the columns of one result set.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    name_to_index: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Build the index from the field descriptors of a result.
    ///
    /// When two columns share a name the later one wins.
    pub fn build(fields: &[String]) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::state(
                StateErrorKind::IndexUnavailable,
                "Cannot initialize result index from empty field list",
            ));
        }
        let name_to_index = fields
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self { name_to_index })
    }

    /// Ordinal of `name`.
    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.name_to_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::field_not_found(name, self.name_to_index.len()))
    }

    /// Number of distinct column names.
    pub fn len(&self) -> usize {
        self.name_to_index.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.name_to_index.is_empty()
    }
}

/// Key/value pairs read from a `SHOW META` result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaMap {
    values: BTreeMap<String, String>,
}

impl MetaMap {
    /// Read the first two columns of every row as key and value.
    ///
    /// Rows with an empty key are skipped; for repeated keys the first
    /// occurrence is kept.
    pub fn from_result(result: &ResultSet) -> Result<Self> {
        let mut values = BTreeMap::new();
        for mut row in result.rows() {
            let mut key = String::new();
            let mut value = String::new();
            row.read(&mut key)?.read(&mut value)?;
            if !key.is_empty() {
                values.entry(key).or_insert(value);
            }
        }
        Ok(Self { values })
    }

    /// Value of `variable`, or an empty string when unknown.
    pub fn get(&self, variable: &str) -> &str {
        self.values.get(variable).map_or("", String::as_str)
    }

    /// Check if `variable` is present.
    pub fn contains(&self, variable: &str) -> bool {
        self.values.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (variable, value) pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One statement's result set.
///
/// All rows are materialized by the transport when the result is stored;
/// iteration never touches the network. Rows handed out by
/// [`next_row`](ResultSet::next_row) borrow from the result and cannot
/// outlive it.
#[derive(Debug, Default)]
pub struct ResultSet {
    /// Field names in column order
    fields: Vec<String>,
    /// Cell text per row, `None` for NULL
    rows: Vec<Vec<Option<String>>>,
    /// Position of the next row handed out by `next_row`
    cursor: Cell<usize>,
    /// Built on the first name-based lookup
    index: OnceCell<ColumnIndex>,
    /// Merged `SHOW META` values
    meta: Option<MetaMap>,
}

impl ResultSet {
    /// Create a result from field names and row cells.
    pub fn new(fields: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            fields,
            rows,
            ..Self::default()
        }
    }

    /// Result of a statement that produced no result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of materialized rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Bind `row` to the next record.
    ///
    /// Returns `false` and unbinds `row` once the rows are exhausted; further
    /// calls keep returning `false`.
    pub fn next_row<'a>(&'a self, row: &mut Row<'a>) -> bool {
        let pos = self.cursor.get();
        if let Some(data) = self.rows.get(pos) {
            self.cursor.set(pos + 1);
            row.bind(self, data);
            true
        } else {
            row.unbind();
            false
        }
    }

    /// Restart `next_row` from the first record.
    pub fn rewind(&self) {
        self.cursor.set(0);
    }

    /// Iterate over all rows without moving the `next_row` cursor.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |data| Row::bound(self, data))
    }

    /// Ordinal of the column called `name`.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        if let Some(index) = self.index.get() {
            return index.lookup(name);
        }
        let built = ColumnIndex::build(&self.fields)?;
        self.index.get_or_init(|| built).lookup(name)
    }

    /// Merge a `SHOW META` result into this one.
    ///
    /// `None` leaves the result untouched.
    pub fn attach_meta(&mut self, meta: Option<ResultSet>) -> Result<()> {
        if let Some(meta) = meta {
            self.meta = Some(MetaMap::from_result(&meta)?);
        }
        Ok(())
    }

    /// Value of a `SHOW META` variable; empty when the variable is unknown.
    pub fn get_meta(&self, variable: &str) -> Result<&str> {
        self.meta
            .as_ref()
            .map(|meta| meta.get(variable))
            .ok_or(Error::MetaNotAttached)
    }

    /// Decoded `SHOW META` variable (`total_found`, `time`, ...).
    pub fn meta_value<T: FromCell + Default>(&self, variable: &str) -> Result<T> {
        let raw = self.get_meta(variable)?;
        Ok(T::from_cell(Some(raw), T::default()))
    }

    /// Merged meta values, if any.
    pub fn meta(&self) -> Option<&MetaMap> {
        self.meta.as_ref()
    }

    pub fn has_meta(&self) -> bool {
        self.meta.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn cells(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_string)).collect()
    }

    fn sample() -> ResultSet {
        ResultSet::new(
            vec!["id".to_string(), "int_data".to_string(), "string_data".to_string()],
            vec![
                cells(&[Some("1"), Some("219"), Some("Additional string attribute")]),
                cells(&[Some("2"), None, None]),
            ],
        )
    }

    fn meta_result(pairs: &[(&str, &str)]) -> ResultSet {
        ResultSet::new(
            vec!["Variable_name".to_string(), "Value".to_string()],
            pairs
                .iter()
                .map(|(k, v)| cells(&[Some(k), Some(v)]))
                .collect(),
        )
    }

    #[test]
    fn next_row_walks_and_stays_exhausted() {
        let result = sample();
        assert_eq!(result.row_count(), 2);
        let mut row = Row::new();
        assert!(result.next_row(&mut row));
        assert_eq!(row.get::<u32>("int_data").unwrap(), 219);
        assert!(result.next_row(&mut row));
        assert_eq!(row.get::<u32>("int_data").unwrap(), 0);
        assert!(!result.next_row(&mut row));
        assert_eq!(row.size(), 0);
        assert!(!result.next_row(&mut row));
        assert!(!result.next_row(&mut row));

        result.rewind();
        assert!(result.next_row(&mut row));
        assert_eq!(row.get::<String>("id").unwrap(), "1");
    }

    #[test]
    fn column_index_is_lazy_and_reports_missing() {
        let result = sample();
        assert!(result.index.get().is_none());
        assert_eq!(result.column_index("string_data").unwrap(), 2);
        assert!(result.index.get().is_some());
        let err = result.column_index("unknown_field").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldNotFound);
    }

    #[test]
    fn column_index_needs_fields() {
        let result = ResultSet::empty();
        let err = result.column_index("id").unwrap_err();
        assert_eq!(err.state_kind(), Some(StateErrorKind::IndexUnavailable));
    }

    #[test]
    fn duplicate_column_names_last_wins() {
        let index = ColumnIndex::build(&["a".to_string(), "a".to_string()]).unwrap();
        assert_eq!(index.lookup("a").unwrap(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn meta_attach_and_lookup() {
        let mut result = sample();
        assert_eq!(
            result.get_meta("time").unwrap_err().kind(),
            ErrorKind::MetaNotAttached
        );

        result.attach_meta(None).unwrap();
        assert!(!result.has_meta());

        result
            .attach_meta(Some(meta_result(&[
                ("total", "2"),
                ("total_found", "2"),
                ("time", "0.000"),
                ("total", "99"),
                ("", "ignored"),
            ])))
            .unwrap();
        assert_eq!(result.get_meta("total").unwrap(), "2");
        assert_eq!(result.get_meta("time").unwrap(), "0.000");
        assert_eq!(result.get_meta("unknown meta field").unwrap(), "");
        assert_eq!(result.meta_value::<u64>("total_found").unwrap(), 2);
        assert_eq!(result.meta().map(MetaMap::len), Some(3));
    }

    #[test]
    fn narrow_meta_rows_fail() {
        let mut result = sample();
        let narrow = ResultSet::new(vec!["k".to_string()], vec![cells(&[Some("time")])]);
        let err = result.attach_meta(Some(narrow)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn rows_iterator_leaves_cursor_alone() {
        let result = sample();
        let ids: Vec<u32> = result.rows().map(|row| row.get("id").unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        let mut row = Row::new();
        assert!(result.next_row(&mut row));
        assert_eq!(row.get::<u32>("id").unwrap(), 1);
    }
}
