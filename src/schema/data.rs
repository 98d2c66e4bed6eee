//! Row data for insert, update and delete-data expressions

use crate::database::Value;

/// An ordered list of `(column, value)` pairs
///
/// Callers build it explicitly, either with [`RowData::with`] or the
/// [`row!`](crate::row) macro. Order is preserved in the rendered SQL.
///
/// ```
/// use tidemark::row;
/// use tidemark::schema::RowData;
///
/// let a = row! { "id" => 1, "alias" => "home" };
/// let b = RowData::new().with("id", 1).with("alias", "home");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowData {
    pairs: Vec<(String, Value)>,
}

impl RowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.pairs.push((column.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(c, _)| c.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.pairs.iter().map(|(_, v)| v)
    }
}

impl<C: Into<String>, V: Into<Value>> FromIterator<(C, V)> for RowData {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        }
    }
}

/// Build a [`RowData`] from `column => value` pairs
#[macro_export]
macro_rules! row {
    () => {
        $crate::schema::RowData::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::schema::RowData::new()$(.with($column, $value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_preserved() {
        let row = crate::row! { "b" => 2, "a" => "x", "c" => Option::<i32>::None };
        let columns: Vec<_> = row.columns().collect();
        assert_eq!(columns, vec!["b", "a", "c"]);
        assert_eq!(row.values().nth(2), Some(&Value::Null));
    }

    #[test]
    fn test_from_iterator() {
        let row: RowData = vec![("id", 1), ("sortOrder", 4)].into_iter().collect();
        assert_eq!(row.len(), 2);
        assert!(!row.is_empty());
        assert!(crate::row! {}.is_empty());
    }
}
