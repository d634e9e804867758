//! Borrowed view over one record of a [`ResultSet`].

use std::fmt;
use std::ops::Index;

use crate::decode::FromCell;
use crate::error::{Error, Result, StateErrorKind};
use crate::result::ResultSet;

/// A row of a SphinxQL result.
///
/// Does not own any data: the cells belong to the [`ResultSet`] that last
/// bound the row, and the borrow checker keeps the row from outliving it.
/// One `Row` can be refilled any number of times by `next_row` calls, from
/// the same or from different results.
#[derive(Default)]
pub struct Row<'a> {
    /// Result the row was fetched from (to access the column index)
    origin: Option<&'a ResultSet>,
    /// Cells of the bound record
    data: &'a [Option<String>],
    /// Next column read by `read` / `next_field`
    field_iter: usize,
}

impl<'a> Row<'a> {
    /// Create an unbound row.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bound(origin: &'a ResultSet, data: &'a [Option<String>]) -> Self {
        Self {
            origin: Some(origin),
            data,
            field_iter: 0,
        }
    }

    pub(crate) fn bind(&mut self, origin: &'a ResultSet, data: &'a [Option<String>]) {
        self.origin = Some(origin);
        self.data = data;
        self.field_iter = 0;
    }

    pub(crate) fn unbind(&mut self) {
        self.origin = None;
        self.data = &[];
        self.field_iter = 0;
    }

    /// Number of columns. Zero if not bound.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if the row currently views a record.
    pub fn is_bound(&self) -> bool {
        self.origin.is_some()
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        if index >= self.data.len() {
            return Err(Error::out_of_range(index, self.data.len()));
        }
        Ok(())
    }

    /// Raw cell at `index`; `None` for NULL.
    pub fn at(&self, index: usize) -> Result<Option<&'a str>> {
        self.check_bounds(index)?;
        Ok(self.data[index].as_deref())
    }

    /// Value of column `field`, decoded as `T` with `T::default()` for NULL
    /// or malformed cells.
    pub fn get<T: FromCell + Default>(&self, field: &str) -> Result<T> {
        self.get_or(field, T::default())
    }

    /// Value of column `field`, falling back to `default`.
    pub fn get_or<T: FromCell>(&self, field: &str, default: T) -> Result<T> {
        let origin = self
            .origin
            .ok_or_else(|| Error::state(StateErrorKind::RowUnbound, "Row is not initialized"))?;
        let index = origin.column_index(field)?;
        Ok(T::from_cell(self.at(index)?, default))
    }

    /// Decode the current column into `value` and move to the next column.
    ///
    /// `value` keeps its current content when the cell is NULL or malformed.
    pub fn read<T: FromCell + Default>(&mut self, value: &mut T) -> Result<&mut Self> {
        let cell = self.at(self.field_iter)?;
        let current = std::mem::take(value);
        *value = T::from_cell(cell, current);
        self.field_iter += 1;
        Ok(self)
    }

    /// Decode the current column as `T` and move to the next column.
    pub fn next_field<T: FromCell + Default>(&mut self) -> Result<T> {
        let mut value = T::default();
        self.read(&mut value)?;
        Ok(value)
    }

    /// Iterate over raw cells.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a str>> + 'a {
        self.data.iter().map(Option::as_deref)
    }
}

/// Raw cell access; panics when `index >= size()`. Use [`Row::at`] for a
/// checked lookup.
impl Index<usize> for Row<'_> {
    type Output = Option<String>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("bound", &self.is_bound())
            .field("data", &self.data)
            .field("field_iter", &self.field_iter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn result() -> ResultSet {
        ResultSet::new(
            vec![
                "int_data".to_string(),
                "float_data".to_string(),
                "string_data".to_string(),
                "json_data".to_string(),
                "multi_data".to_string(),
            ],
            vec![
                vec![
                    Some("219".to_string()),
                    Some("2".to_string()),
                    Some("Additional string attribute".to_string()),
                    Some(r#"[["1607798880006",true,1]]"#.to_string()),
                    Some("1607798880006,7313020011448".to_string()),
                ],
                vec![None, None, None, None, None],
            ],
        )
    }

    #[test]
    fn unbound_row() {
        let row = Row::new();
        assert_eq!(row.size(), 0);
        assert!(!row.is_bound());
        let err = row.get::<u32>("int_data").unwrap_err();
        assert_eq!(err.state_kind(), Some(StateErrorKind::RowUnbound));
        assert_eq!(row.at(0).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn named_and_positional_access() {
        let res = result();
        let mut row = Row::new();
        assert!(res.next_row(&mut row));

        assert_eq!(row.get::<u32>("int_data").unwrap(), 219);
        assert!((row.get::<f32>("float_data").unwrap() - 2.0).abs() < f32::EPSILON);
        assert_eq!(
            row.get::<String>("string_data").unwrap(),
            "Additional string attribute"
        );
        assert_eq!(
            row.get::<String>("multi_data").unwrap(),
            "1607798880006,7313020011448"
        );
        assert_eq!(
            row.get::<u32>("unknown_field").unwrap_err().kind(),
            ErrorKind::FieldNotFound
        );

        assert_eq!(row.at(row.size() - 1).unwrap(), Some("1607798880006,7313020011448"));
        assert_eq!(row.at(row.size()).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(row[0].as_deref(), Some("219"));
    }

    #[test]
    fn null_cells_use_defaults() {
        let res = result();
        let mut row = Row::new();
        res.next_row(&mut row);
        assert!(res.next_row(&mut row));
        assert_eq!(row.get::<u32>("int_data").unwrap(), 0);
        assert_eq!(row.get::<String>("json_data").unwrap(), "");
        assert_eq!(row.get_or("int_data", 77_u32).unwrap(), 77);
        assert_eq!(row.at(0).unwrap(), None);
    }

    #[test]
    fn streaming_extraction() {
        let res = result();
        let mut row = Row::new();
        assert!(res.next_row(&mut row));

        let mut int_data = 0_u32;
        let mut float_data = 0.0_f32;
        let (mut string_data, mut json_data, mut multi_data) =
            (String::new(), String::new(), String::new());
        row.read(&mut int_data)
            .unwrap()
            .read(&mut float_data)
            .unwrap()
            .read(&mut string_data)
            .unwrap()
            .read(&mut json_data)
            .unwrap()
            .read(&mut multi_data)
            .unwrap();
        assert_eq!(int_data, 219);
        assert!((float_data - 2.0).abs() < f32::EPSILON);
        assert_eq!(string_data, "Additional string attribute");
        assert_eq!(multi_data, "1607798880006,7313020011448");

        let mut extra = 5_u32;
        assert_eq!(row.read(&mut extra).unwrap_err().kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(extra, 5);
    }

    #[test]
    fn streaming_keeps_value_on_null() {
        let res = result();
        let mut row = Row::new();
        res.next_row(&mut row);
        res.next_row(&mut row);

        let mut int_data = 13_u32;
        row.read(&mut int_data).unwrap();
        assert_eq!(int_data, 13);
        assert_eq!(row.next_field::<f64>().unwrap(), 0.0);
    }

    #[test]
    fn refetch_resets_the_field_cursor() {
        let res = result();
        let mut row = Row::new();
        res.next_row(&mut row);
        let _ = row.next_field::<u32>().unwrap();
        res.rewind();
        res.next_row(&mut row);
        assert_eq!(row.next_field::<u32>().unwrap(), 219);
    }

    #[test]
    fn row_moves_between_results() {
        let first = result();
        let second = ResultSet::new(vec!["b".to_string()], vec![vec![Some("x".to_string())]]);
        let mut row = Row::new();
        assert!(first.next_row(&mut row));
        assert_eq!(row.size(), 5);
        assert!(second.next_row(&mut row));
        assert_eq!(row.size(), 1);
        assert_eq!(row.get::<String>("b").unwrap(), "x");
        assert_eq!(row.iter().collect::<Vec<_>>(), vec![Some("x")]);
    }
}
