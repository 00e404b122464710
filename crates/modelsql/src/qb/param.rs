//! Ordinal parameter collection for `$n` placeholders.

use crate::value::SqlValue;

/// Collects bound values and hands out 1-based `$n` placeholders.
///
/// Placeholders are assigned strictly in call order, so nested builders that
/// share one `ParamsBuilder` produce a single consistent numbering.
#[derive(Clone, Debug, Default)]
pub struct ParamsBuilder {
    values: Vec<SqlValue>,
}

impl ParamsBuilder {
    /// Create an empty parameter list.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Bind a value and return its placeholder (`"$1"`, `"$2"`, ...).
    pub fn add(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    /// Current number of bound values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no values are bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the bound values in placeholder order.
    pub fn as_slice(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the builder, returning the values in placeholder order.
    pub fn build(self) -> Vec<SqlValue> {
        self.values
    }
}
