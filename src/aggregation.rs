//! Count, sum and average aggregations
//!
//! Single aggregates go through the `EntityStore` methods `count`, `avg`,
//! `int_sum` and `float_sum`, one round trip each. [`Aggregation`] batches
//! several aggregates into one query; its results are keyed by alias:
//!
//! | aggregate      | alias          | type    |
//! |----------------|----------------|---------|
//! | count          | `count`        | integer |
//! | average of F   | `avg_F`        | double  |
//! | integer sum F  | `isum_F`       | integer |
//! | float sum F    | `fsum_F`       | double  |

use crate::error::{Result, StoreError};
use crate::property::{find, PropertyList, Value};
use crate::query::Query;
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COUNT_ALIAS: &str = "count";
pub const AVG_PREFIX: &str = "avg_";
pub const INT_SUM_PREFIX: &str = "isum_";
pub const FLOAT_SUM_PREFIX: &str = "fsum_";

/// Scalar returned for one aggregate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AggregateValue {
    Integer(i64),
    Double(f64),
    /// Average over zero values
    Null,
}

impl AggregateValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            AggregateValue::Integer(i) => *i,
            AggregateValue::Double(d) => *d as i64,
            AggregateValue::Null => 0,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            AggregateValue::Integer(i) => *i as f64,
            AggregateValue::Double(d) => *d,
            AggregateValue::Null => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum(String),
    Avg(String),
}

/// One named aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub alias: String,
    pub kind: AggregateKind,
}

/// Aggregates evaluated over the results of one query
#[derive(Debug, Clone)]
pub struct AggregationQuery {
    pub query: Query,
    pub aggregates: Vec<Aggregate>,
}

impl AggregationQuery {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            aggregates: Vec::new(),
        }
    }

    pub fn with(mut self, alias: impl Into<String>, kind: AggregateKind) -> Self {
        self.aggregates.push(Aggregate {
            alias: alias.into(),
            kind,
        });
        self
    }
}

/// Evaluate aggregates over a set of property lists
pub(crate) fn aggregate_entities<'a, I>(aggregates: &[Aggregate], entities: I) -> HashMap<String, AggregateValue>
where
    I: IntoIterator<Item = &'a PropertyList>,
{
    let entities: Vec<&PropertyList> = entities.into_iter().collect();
    aggregates
        .iter()
        .map(|agg| {
            let value = match &agg.kind {
                AggregateKind::Count => AggregateValue::Integer(entities.len() as i64),
                AggregateKind::Sum(field) => sum(numeric_values(&entities, field)),
                AggregateKind::Avg(field) => {
                    let values: Vec<&Value> = numeric_values(&entities, field).collect();
                    if values.is_empty() {
                        AggregateValue::Null
                    } else {
                        let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                        AggregateValue::Double(total / values.len() as f64)
                    }
                }
            };
            (agg.alias.clone(), value)
        })
        .collect()
}

fn numeric_values<'a>(entities: &'a [&'a PropertyList], field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    entities
        .iter()
        .filter_map(move |props| find(props, field))
        .filter(|v| matches!(v, Value::Int(_) | Value::Float(_)))
}

/// Integer sum while every value is an integer and the sum fits, double otherwise
fn sum<'a>(values: impl Iterator<Item = &'a Value>) -> AggregateValue {
    let mut acc = AggregateValue::Integer(0);
    for value in values {
        acc = match (acc, value) {
            (AggregateValue::Integer(a), Value::Int(b)) => match a.checked_add(*b) {
                Some(s) => AggregateValue::Integer(s),
                None => AggregateValue::Double(a as f64 + *b as f64),
            },
            (acc, v) => AggregateValue::Double(acc.as_f64() + v.as_f64().unwrap_or(0.0)),
        };
    }
    acc
}

/// Results of an [`Aggregation`], demultiplexed by alias prefix
#[derive(Debug, Clone, Default)]
pub struct AggregationResults {
    values: HashMap<String, AggregateValue>,
}

impl AggregationResults {
    pub fn new(values: HashMap<String, AggregateValue>) -> Self {
        Self { values }
    }

    fn lookup(&self, alias: &str) -> Result<&AggregateValue> {
        self.values
            .get(alias)
            .ok_or_else(|| StoreError::AggregationMissing(alias.to_string()))
    }

    /// Raw value for an alias
    pub fn get(&self, alias: &str) -> Option<&AggregateValue> {
        self.values.get(alias)
    }

    pub fn count(&self) -> Result<i64> {
        Ok(self.lookup(COUNT_ALIAS)?.as_i64())
    }

    pub fn avg(&self, field: &str) -> Result<f64> {
        Ok(self.lookup(&format!("{}{}", AVG_PREFIX, field))?.as_f64())
    }

    pub fn int_sum(&self, field: &str) -> Result<i64> {
        Ok(self.lookup(&format!("{}{}", INT_SUM_PREFIX, field))?.as_i64())
    }

    pub fn float_sum(&self, field: &str) -> Result<f64> {
        Ok(self.lookup(&format!("{}{}", FLOAT_SUM_PREFIX, field))?.as_f64())
    }

    /// Integer-typed results (`count` and `isum_*`)
    pub fn integers(&self) -> HashMap<&str, i64> {
        self.values
            .iter()
            .filter(|(alias, _)| alias.as_str() == COUNT_ALIAS || alias.starts_with(INT_SUM_PREFIX))
            .map(|(alias, v)| (alias.as_str(), v.as_i64()))
            .collect()
    }

    /// Double-typed results (`avg_*` and `fsum_*`)
    pub fn doubles(&self) -> HashMap<&str, f64> {
        self.values
            .iter()
            .filter(|(alias, _)| alias.starts_with(AVG_PREFIX) || alias.starts_with(FLOAT_SUM_PREFIX))
            .map(|(alias, v)| (alias.as_str(), v.as_f64()))
            .collect()
    }
}

/// Builder batching several aggregates into one round trip
#[derive(Debug, Clone)]
pub struct Aggregation {
    inner: AggregationQuery,
}

impl Aggregation {
    pub fn new(query: Query) -> Self {
        Self {
            inner: AggregationQuery::new(query),
        }
    }

    pub fn with_count(mut self) -> Self {
        self.inner = self.inner.with(COUNT_ALIAS, AggregateKind::Count);
        self
    }

    pub fn with_avg(mut self, field: &str) -> Self {
        self.inner = self
            .inner
            .with(format!("{}{}", AVG_PREFIX, field), AggregateKind::Avg(field.to_string()));
        self
    }

    pub fn with_int_sum(mut self, field: &str) -> Self {
        self.inner = self
            .inner
            .with(format!("{}{}", INT_SUM_PREFIX, field), AggregateKind::Sum(field.to_string()));
        self
    }

    pub fn with_float_sum(mut self, field: &str) -> Self {
        self.inner = self
            .inner
            .with(format!("{}{}", FLOAT_SUM_PREFIX, field), AggregateKind::Sum(field.to_string()));
        self
    }

    pub fn into_query(self) -> AggregationQuery {
        self.inner
    }

    /// Run every aggregate in one query
    pub async fn run(self, store: &EntityStore) -> Result<AggregationResults> {
        let values = store.run_aggregation(self.inner).await?;
        Ok(AggregationResults::new(values))
    }
}
