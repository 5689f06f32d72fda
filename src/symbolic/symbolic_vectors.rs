use crate::symbolic::symbolic_engine::{Expr, substitute_all};

use std::collections::HashMap;
use std::ops::{Add, Index, IndexMut, Mul, Sub};

#[derive(Clone, Debug, PartialEq, Default)]
/// Symbolic vector
pub struct ExprVector {
    pub data: Vec<Expr>,
}

impl ExprVector {
    /// Create new symbolic vector
    pub fn new(data: Vec<Expr>) -> Self {
        Self { data }
    }

    /// Create zero vector of given size
    pub fn zeros(size: usize) -> Self {
        Self {
            data: vec![Expr::Const(0.0); size],
        }
    }
    /// crate indexed variable vector: name0, name1, ...
    pub fn indexed_vars_vector(size: usize, var_name: &str) -> Self {
        Self {
            data: (0..size).map(|i| Expr::IndexedVar(i, var_name)).collect(),
        }
    }
    /// Create from variable names
    pub fn from_variables(vars: &[&str]) -> Self {
        Self {
            data: vars.iter().map(|&v| Expr::Var(v.to_string())).collect(),
        }
    }
    /// Get length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.data.iter()
    }
    /// Element access
    pub fn get(&self, index: usize) -> Option<&Expr> {
        self.data.get(index)
    }

    pub fn push(&mut self, expr: Expr) {
        self.data.push(expr);
    }

    /// Names of the entries when every entry is a pure symbol.
    pub fn var_names(&self) -> Option<Vec<String>> {
        self.data
            .iter()
            .map(|e| e.var_name().map(|s| s.to_string()))
            .collect()
    }

    /// Dot product (symbolic)
    pub fn dot(&self, other: &ExprVector) -> Expr {
        assert_eq!(self.len(), other.len(), "Vector dimensions must match");
        self.data
            .iter()
            .zip(other.data.iter())
            .fold(Expr::Const(0.0), |acc, (a, b)| acc + a * b)
    }

    /// Euclidean norm
    pub fn norm2(&self) -> Expr {
        self.dot(self).sqrt()
    }

    /// Scalar multiplication
    pub fn scale(&self, scalar: &Expr) -> ExprVector {
        ExprVector::new(self.data.iter().map(|e| scalar * e).collect())
    }

    /// Concatenation of several vectors, in order.
    pub fn concat(parts: &[ExprVector]) -> ExprVector {
        ExprVector::new(parts.iter().flat_map(|v| v.data.iter().cloned()).collect())
    }

    /// Copy of entries `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> ExprVector {
        ExprVector::new(self.data[start..end].to_vec())
    }

    /// Substitute several variables at once, sharing the rebuilt nodes.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> ExprVector {
        let roots: Vec<&Expr> = self.data.iter().collect();
        ExprVector::new(substitute_all(&roots, map))
    }
}

impl Index<usize> for ExprVector {
    type Output = Expr;
    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<usize> for ExprVector {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl FromIterator<Expr> for ExprVector {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        ExprVector::new(iter.into_iter().collect())
    }
}

impl Add for &ExprVector {
    type Output = ExprVector;
    fn add(self, rhs: &ExprVector) -> ExprVector {
        assert_eq!(self.len(), rhs.len(), "Vector dimensions must match");
        self.iter().zip(rhs.iter()).map(|(a, b)| a + b).collect()
    }
}

impl Add for ExprVector {
    type Output = ExprVector;
    fn add(self, rhs: ExprVector) -> ExprVector {
        &self + &rhs
    }
}

impl Sub for &ExprVector {
    type Output = ExprVector;
    fn sub(self, rhs: &ExprVector) -> ExprVector {
        assert_eq!(self.len(), rhs.len(), "Vector dimensions must match");
        self.iter().zip(rhs.iter()).map(|(a, b)| a - b).collect()
    }
}

impl Sub for ExprVector {
    type Output = ExprVector;
    fn sub(self, rhs: ExprVector) -> ExprVector {
        &self - &rhs
    }
}

impl Mul<&Expr> for &ExprVector {
    type Output = ExprVector;
    fn mul(self, rhs: &Expr) -> ExprVector {
        self.iter().map(|a| a * rhs).collect()
    }
}

impl Mul<f64> for &ExprVector {
    type Output = ExprVector;
    fn mul(self, rhs: f64) -> ExprVector {
        self.iter().map(|a| a * rhs).collect()
    }
}

/// Symbolic matrix stored column-major, the layout `nalgebra` uses.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprMatrix {
    pub data: Vec<Expr>,
    pub nrows: usize,
    pub ncols: usize,
}

impl ExprMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![Expr::Const(0.0); nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Matrix of symbols `name_i_j`
    pub fn indexed_vars_matrix(nrows: usize, ncols: usize, var_name: &str) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(Expr::IndexedVar2D(i, j, var_name));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Single-column matrix
    pub fn from_vector(v: &ExprVector) -> Self {
        Self {
            data: v.data.clone(),
            nrows: v.len(),
            ncols: 1,
        }
    }

    /// Builds a matrix from equally sized columns. An empty list gives a 0 x 0 matrix.
    pub fn from_columns(columns: Vec<ExprVector>) -> Self {
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        Self::from_columns_with_rows(nrows, columns)
    }

    pub(crate) fn from_columns_with_rows(nrows: usize, columns: Vec<ExprVector>) -> Self {
        let ncols = columns.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for column in columns {
            assert_eq!(column.len(), nrows, "Columns must have equal length");
            data.extend(column.data);
        }
        Self { data, nrows, ncols }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column(&self, j: usize) -> ExprVector {
        ExprVector::new(self.data[j * self.nrows..(j + 1) * self.nrows].to_vec())
    }

    pub fn set_column(&mut self, j: usize, column: &ExprVector) {
        assert_eq!(column.len(), self.nrows, "Column length must match");
        self.data[j * self.nrows..(j + 1) * self.nrows].clone_from_slice(&column.data);
    }

    pub fn columns(&self) -> Vec<ExprVector> {
        (0..self.ncols).map(|j| self.column(j)).collect()
    }

    /// Column-major vectorization
    pub fn flatten(&self) -> ExprVector {
        ExprVector::new(self.data.clone())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.data.iter()
    }
}

impl Index<(usize, usize)> for ExprMatrix {
    type Output = Expr;
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.data[j * self.nrows + i]
    }
}

impl IndexMut<(usize, usize)> for ExprMatrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        &mut self.data[j * self.nrows + i]
    }
}
