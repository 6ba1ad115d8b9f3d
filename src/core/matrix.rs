//! # Matrix Expansion Module / 矩阵展开模块
//!
//! Expands the declared axes into the Cartesian product of their values.
//! The expansion is lazy and restartable: calling [`expand`] again yields the
//! same cells in the same order. The first declared axis varies slowest.
//!
//! 将声明的轴展开为其取值的笛卡尔积。展开是惰性且可重复的：
//! 再次调用 [`expand`] 会以相同顺序得到相同的单元。第一个声明的轴变化最慢。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;

use crate::core::config::{Axis, BuildMatrix, ConfigError};

/// One axis value carried by a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub axis: String,
    pub value: String,
}

/// One point of the build matrix. Immutable once generated.
/// 构建矩阵中的一个点，生成后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Position in expansion order, starting at 0.
    pub index: usize,
    /// One coordinate per axis, in declaration order.
    pub coordinates: Vec<Coordinate>,
    /// Environment variables exported by the coordinates.
    pub env: Vec<(String, String)>,
    /// Directories prepended to `PATH`, outermost axis first.
    pub path_entries: Vec<String>,
}

impl Cell {
    /// The axis values identifying this cell, in axis order.
    pub fn values(&self) -> Vec<&str> {
        self.coordinates.iter().map(|c| c.value.as_str()).collect()
    }

    pub fn value_of(&self, axis: &str) -> Option<&str> {
        self.coordinates
            .iter()
            .find(|c| c.axis == axis)
            .map(|c| c.value.as_str())
    }

    /// A human-readable identity such as `python=3.7, env=DJANGO_VERSION=2.0.*`.
    pub fn label(&self) -> String {
        if self.coordinates.is_empty() {
            return "default".to_string();
        }
        self.coordinates
            .iter()
            .map(|c| format!("{}={}", c.axis, c.value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A filesystem-safe name for this cell.
    pub fn slug(&self) -> String {
        let values: String = self
            .values()
            .join("_")
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("cell{:03}_{}", self.index, values)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A lazy iterator over the cells of a matrix.
///
/// Cell `i` is decoded from `i` as a mixed-radix number whose least
/// significant digit is the last axis.
#[derive(Debug, Clone)]
pub struct CellIter<'a> {
    axes: &'a [Axis],
    /// `bindings[axis][value]` holds the variables that value exports.
    bindings: Vec<Vec<Vec<(String, String)>>>,
    next: usize,
    total: usize,
}

/// Expands `axes` into their Cartesian product.
///
/// The product of zero axes is a single cell without coordinates; an axis
/// without values yields no cells.
///
/// 将 `axes` 展开为笛卡尔积。零个轴的积是一个没有坐标的单元；没有取值的轴不产生任何单元。
pub fn expand(axes: &[Axis]) -> Result<CellIter<'_>, ConfigError> {
    let total = checked_cell_count(axes).ok_or(ConfigError::MatrixTooLarge)?;
    let bindings = axes
        .iter()
        .map(|axis| {
            axis.values
                .iter()
                .map(|value| axis.bindings(value))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CellIter {
        axes,
        bindings,
        next: 0,
        total,
    })
}

/// The number of cells `axes` expand into: the product of their cardinalities.
/// Saturates at `usize::MAX`; see [`checked_cell_count`].
pub fn cell_count(axes: &[Axis]) -> usize {
    checked_cell_count(axes).unwrap_or(usize::MAX)
}

/// Like [`cell_count`], but `None` when the product overflows `usize`.
pub fn checked_cell_count(axes: &[Axis]) -> Option<usize> {
    axes.iter()
        .try_fold(1usize, |total, axis| total.checked_mul(axis.values.len()))
}

impl CellIter<'_> {
    fn cell_at(&self, index: usize) -> Cell {
        let mut digits = vec![0; self.axes.len()];
        let mut rest = index;
        for (slot, axis) in digits.iter_mut().zip(self.axes).rev() {
            *slot = rest % axis.values.len();
            rest /= axis.values.len();
        }

        let mut cell = Cell {
            index,
            coordinates: Vec::with_capacity(self.axes.len()),
            env: Vec::new(),
            path_entries: Vec::new(),
        };
        for (axis_idx, (axis, &digit)) in self.axes.iter().zip(&digits).enumerate() {
            let value = &axis.values[digit];
            cell.coordinates.push(Coordinate {
                axis: axis.name.clone(),
                value: value.clone(),
            });
            cell.env.extend(self.bindings[axis_idx][digit].iter().cloned());
            if let Some(entry) = axis.path_entry(value) {
                cell.path_entries.push(entry);
            }
        }
        cell
    }
}

impl Iterator for CellIter<'_> {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.next >= self.total {
            return None;
        }
        let cell = self.cell_at(self.next);
        self.next += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Cell> {
        self.next = self.next.saturating_add(n).min(self.total);
        self.next()
    }
}

impl ExactSizeIterator for CellIter<'_> {}

impl FusedIterator for CellIter<'_> {}

impl BuildMatrix {
    /// Expands this configuration's axes. See [`expand`].
    pub fn expand(&self) -> Result<CellIter<'_>, ConfigError> {
        expand(&self.axes)
    }

    pub fn cell_count(&self) -> usize {
        cell_count(&self.axes)
    }
}
