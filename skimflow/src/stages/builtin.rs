//! Generic stages shipped in the built-in `libSkimCore.so` library.
//!
//! None of these encode detector physics; they move, sort and test named
//! collections so that a process can be assembled and skimmed without any
//! external library.

use super::Stage;
use crate::core::{EventRecord, Verdict};
use crate::errors::StageFailure;
use crate::params::{ParameterBag, ParameterError};
use crate::registry::Library;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

/// Identifier of the built-in library.
pub const CORE_LIBRARY: &str = "libSkimCore.so";

/// Builds the built-in library.
#[must_use]
pub fn core_library() -> Library {
    Library::new(CORE_LIBRARY)
        .with_stage("core::Tag", || Box::new(TagStage::default()))
        .with_stage("core::CopyCollection", || {
            Box::new(CopyCollectionStage::default())
        })
        .with_stage("core::SortCollection", || {
            Box::new(SortCollectionStage::default())
        })
        .with_stage("core::ThresholdVote", || Box::new(ThresholdVoteStage::default()))
        .with_stage("core::RequireCollection", || {
            Box::new(RequireCollectionStage::default())
        })
}

/// Appends a fixed label to a list collection.
#[derive(Debug, Clone, Default)]
pub struct TagStage {
    collection: String,
    label: String,
}

#[async_trait]
impl Stage for TagStage {
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError> {
        self.label = params.text("label")?.to_string();
        self.collection = params.text_or("collection", "trace")?;
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        event.append(&self.collection, Value::String(self.label.clone()));
        Ok(Verdict::Proceed)
    }
}

/// Copies one collection to another name.
#[derive(Debug, Clone, Default)]
pub struct CopyCollectionStage {
    input: String,
    output: String,
}

#[async_trait]
impl Stage for CopyCollectionStage {
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError> {
        self.input = params.text("input_collection")?.to_string();
        self.output = params.text("output_collection")?.to_string();
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let value = event
            .get(&self.input)
            .cloned()
            .ok_or_else(|| missing_collection(&self.input))?;
        event.put(self.output.clone(), value);
        Ok(Verdict::Proceed)
    }
}

/// Sorts an array collection into a new collection.
///
/// Without `sort_key` the array must hold numbers. With `sort_key` it must
/// hold objects whose `sort_key` field is numeric. The sort is stable.
#[derive(Debug, Clone, Default)]
pub struct SortCollectionStage {
    input: String,
    output: String,
    sort_key: Option<String>,
}

#[async_trait]
impl Stage for SortCollectionStage {
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError> {
        self.input = params.text("input_collection")?.to_string();
        self.output = params.text("output_collection")?.to_string();
        self.sort_key = params.optional_text("sort_key")?;
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let items = match event.get(&self.input) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => {
                return Err(StageFailure::new(format!(
                    "collection '{}' is not an array",
                    self.input
                )))
            }
            None => return Err(missing_collection(&self.input)),
        };

        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let key = numeric(&item, self.sort_key.as_deref(), &self.input)?;
            keyed.push((key, item));
        }
        keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let sorted = keyed.into_iter().map(|(_, item)| item).collect();
        event.put(self.output.clone(), Value::Array(sorted));
        Ok(Verdict::Proceed)
    }
}

/// Votes to keep the event when the sum of a numeric collection reaches a
/// threshold.
///
/// A missing collection sums to zero.
#[derive(Debug, Clone, Default)]
pub struct ThresholdVoteStage {
    collection: String,
    threshold: f64,
    field: Option<String>,
}

#[async_trait]
impl Stage for ThresholdVoteStage {
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError> {
        self.collection = params.text("collection")?.to_string();
        self.threshold = params.number("threshold")?;
        self.field = params.optional_text("field")?;
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let sum = match event.get(&self.collection) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Array(items)) => {
                let mut sum = 0.0;
                for item in items {
                    sum += numeric(item, self.field.as_deref(), &self.collection)?;
                }
                sum
            }
            Some(other) => numeric(other, self.field.as_deref(), &self.collection)?,
        };
        Ok(Verdict::Vote(sum >= self.threshold))
    }
}

/// Votes to keep the event when a collection exists and is non-empty.
#[derive(Debug, Clone, Default)]
pub struct RequireCollectionStage {
    collection: String,
}

#[async_trait]
impl Stage for RequireCollectionStage {
    fn configure(&mut self, params: &ParameterBag) -> Result<(), ParameterError> {
        self.collection = params.text("collection")?.to_string();
        Ok(())
    }

    async fn execute(&self, event: &mut EventRecord) -> Result<Verdict, StageFailure> {
        let present = match event.get(&self.collection) {
            None | Some(Value::Null) => false,
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        };
        Ok(Verdict::Vote(present))
    }
}

fn missing_collection(name: &str) -> StageFailure {
    StageFailure::new(format!("collection '{name}' not found"))
}

fn numeric(item: &Value, field: Option<&str>, collection: &str) -> Result<f64, StageFailure> {
    let value = match field {
        Some(field) => item.get(field).ok_or_else(|| {
            StageFailure::new(format!(
                "element of '{collection}' has no field '{field}'"
            ))
        })?,
        None => item,
    };
    value.as_f64().ok_or_else(|| {
        StageFailure::new(format!("non-numeric element in '{collection}': {value}"))
    })
}
