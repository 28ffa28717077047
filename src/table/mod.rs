// src/table/mod.rs

pub mod csv;
pub mod infer;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDateTime;
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

pub use self::csv::{read_csv, read_csv_from, to_csv_bytes, write_csv};
pub use infer::ColumnKind;

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the cell; ints widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Hashable key used for duplicate detection. Floats compare by bit pattern.
    fn key(&self) -> CellKey {
        match self {
            Value::Null => CellKey::Null,
            Value::Bool(b) => CellKey::Bool(*b),
            Value::Int(i) => CellKey::Int(*i),
            Value::Float(f) => CellKey::Float(f.to_bits()),
            Value::Text(s) => CellKey::Text(s.clone()),
            Value::Timestamp(t) => CellKey::Timestamp(*t),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Timestamp(NaiveDateTime),
}

/// In-memory dataset: named columns and rows of cells, one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut t = Self::new(columns);
        for row in rows {
            t.push_row(row)?;
        }
        Ok(t)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "row has {} cells but table has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("column `{}` not found", name))
    }

    /// Iterate the cells of one column.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |r| &r[idx]))
    }

    pub fn value(&self, row: usize, name: &str) -> Result<&Value> {
        let idx = self.column_index(name)?;
        self.rows
            .get(row)
            .map(|r| &r[idx])
            .ok_or_else(|| anyhow!("row {} out of range", row))
    }

    /// Observed kind of a column, unified over its non-null cells.
    pub fn column_kind(&self, name: &str) -> Result<ColumnKind> {
        Ok(ColumnKind::unify(self.column(name)?))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        let idx = self.column_index(from)?;
        self.columns[idx] = to.to_string();
        Ok(())
    }

    /// Drop every named column; a missing column is an error.
    pub fn drop_columns(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column_index(name)?;
        }
        self.drop_columns_if_present(names);
        Ok(())
    }

    /// Drop the named columns that exist, ignore the rest.
    pub fn drop_columns_if_present(&mut self, names: &[&str]) {
        let drop: HashSet<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| names.contains(&c.as_str()))
            .map(|(i, _)| i)
            .collect();
        if drop.is_empty() {
            return;
        }
        let keep = |i: &usize| !drop.contains(i);
        self.columns = self
            .columns
            .drain(..)
            .enumerate()
            .filter(|(i, _)| keep(i))
            .map(|(_, c)| c)
            .collect();
        for row in &mut self.rows {
            *row = row
                .drain(..)
                .enumerate()
                .filter(|(i, _)| keep(i))
                .map(|(_, v)| v)
                .collect();
        }
    }

    /// Keep only rows for which `pred` returns true.
    pub fn retain_rows<F>(&mut self, mut pred: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|r| pred(r));
    }

    /// Drop rows holding a null in any of `subset` (every column when `None`).
    pub fn drop_nulls(&mut self, subset: Option<&[&str]>) -> Result<()> {
        let idxs = self.subset_indices(subset)?;
        self.rows.retain(|r| idxs.iter().all(|&i| !r[i].is_null()));
        Ok(())
    }

    /// Drop rows whose `subset` cells repeat an earlier row, keeping the first.
    pub fn drop_duplicates(&mut self, subset: Option<&[&str]>) -> Result<()> {
        let idxs = self.subset_indices(subset)?;
        let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(self.rows.len());
        self.rows
            .retain(|r| seen.insert(idxs.iter().map(|&i| r[i].key()).collect()));
        Ok(())
    }

    /// Like [`Table::drop_duplicates`] with every column except `exclude`.
    pub fn drop_duplicates_except(&mut self, exclude: &[&str]) -> Result<()> {
        let subset: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !exclude.contains(&c.as_str()))
            .cloned()
            .collect();
        let subset: Vec<&str> = subset.iter().map(String::as_str).collect();
        self.drop_duplicates(Some(&subset))
    }

    /// Replace nulls in `name` with `value`.
    pub fn fill_nulls(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self.column_index(name)?;
        for row in &mut self.rows {
            if row[idx].is_null() {
                row[idx] = value.clone();
            }
        }
        Ok(())
    }

    /// Rewrite every cell of `name` through `f`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&Value) -> Value,
    {
        let idx = self.column_index(name)?;
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        Ok(())
    }

    /// Append a derived column computed from each row.
    pub fn add_column<F>(&mut self, name: &str, mut f: F) -> Result<()>
    where
        F: FnMut(&[Value], &HashMap<&str, usize>) -> Result<Value>,
    {
        if self.has_column(name) {
            bail!("column `{}` already exists", name);
        }
        let lookup = self.lookup();
        let mut derived = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            derived.push(f(row, &lookup)?);
        }
        drop(lookup);
        self.columns.push(name.to_string());
        for (row, v) in self.rows.iter_mut().zip(derived) {
            row.push(v);
        }
        Ok(())
    }

    /// Insert a column at `pos` holding the given cells.
    pub fn insert_column(&mut self, pos: usize, name: &str, cells: Vec<Value>) -> Result<()> {
        if self.has_column(name) {
            bail!("column `{}` already exists", name);
        }
        if cells.len() != self.rows.len() {
            bail!(
                "column `{}` has {} cells for {} rows",
                name,
                cells.len(),
                self.rows.len()
            );
        }
        let pos = pos.min(self.columns.len());
        self.columns.insert(pos, name.to_string());
        for (row, v) in self.rows.iter_mut().zip(cells) {
            row.insert(pos, v);
        }
        Ok(())
    }

    /// Column name → index, borrowed from this table.
    pub fn lookup(&self) -> HashMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Value>> {
        &mut self.rows
    }

    fn subset_indices(&self, subset: Option<&[&str]>) -> Result<Vec<usize>> {
        match subset {
            None => Ok((0..self.columns.len()).collect()),
            Some(names) => names.iter().map(|n| self.column_index(n)).collect(),
        }
    }
}

/// Fetch a cell from a row through a lookup built by [`Table::lookup`].
pub fn cell<'a>(row: &'a [Value], lookup: &HashMap<&str, usize>, name: &str) -> Result<&'a Value> {
    lookup
        .get(name)
        .map(|&i| &row[i])
        .ok_or_else(|| anyhow!("column `{}` not found", name))
}
