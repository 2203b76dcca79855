//! Equality filters keyed by column name.

use std::collections::BTreeMap;
use std::str::FromStr;

use sea_orm::{ColumnTrait, Condition, EntityTrait, Value};

use common::{AppError, AppResult};

/// Set of `column = value` conditions AND'd together.
///
/// Column names are resolved against the entity when the filter is applied,
/// so a typo surfaces as a validation error instead of reaching SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column = value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(column.into(), value.into());
        self
    }

    /// Require `column = value` when a value is present; `None` is skipped
    pub fn eq_opt<V: Into<Value>>(self, column: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Merge another filter into this one; keys in `other` win
    pub fn merge(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Build the sea-orm condition for entity `E`
    pub fn condition<E>(&self) -> AppResult<Condition>
    where
        E: EntityTrait,
        E::Column: FromStr,
    {
        let mut condition = Condition::all();
        for (name, value) in &self.conditions {
            let column = resolve_column::<E>(name)?;
            condition = condition.add(column.eq(value.clone()));
        }
        Ok(condition)
    }
}

/// Look up a column of `E` by its database name
pub fn resolve_column<E>(name: &str) -> AppResult<E::Column>
where
    E: EntityTrait,
    E::Column: FromStr,
{
    E::Column::from_str(name)
        .map_err(|_| AppError::validation(format!("unknown column: {}", name)))
}
