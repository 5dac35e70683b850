//! JSON-Schema validation of model output.
//!
//! The stage contracts live as data in `schema/*.json` and are compiled once
//! per [`Schemas`] instance.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

const ANALYSIS_SCHEMA: &str = include_str!("../schema/analysis.json");
const FIXES_SCHEMA: &str = include_str!("../schema/fixes.json");
const PATCHES_SCHEMA: &str = include_str!("../schema/patches.json");

/// Which stage contract a document is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Analysis,
    Fixes,
    Patches,
}

impl SchemaKind {
    fn source(self) -> &'static str {
        match self {
            SchemaKind::Analysis => ANALYSIS_SCHEMA,
            SchemaKind::Fixes => FIXES_SCHEMA,
            SchemaKind::Patches => PATCHES_SCHEMA,
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Analysis => write!(f, "analysis"),
            SchemaKind::Fixes => write!(f, "fixes"),
            SchemaKind::Patches => write!(f, "patches"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Embedded {kind} schema is unusable: {message}")]
    InvalidSchema { kind: SchemaKind, message: String },

    #[error("Output does not match the {kind} schema: {errors}")]
    Mismatch { kind: SchemaKind, errors: String },

    #[error("Output matched the {kind} schema but could not be decoded: {source}")]
    Decode {
        kind: SchemaKind,
        #[source]
        source: serde_json::Error,
    },
}

/// A compiled stage schema.
pub struct SchemaValidator {
    kind: SchemaKind,
    document: Value,
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    pub fn new(kind: SchemaKind) -> Result<Self, SchemaError> {
        let document: Value =
            serde_json::from_str(kind.source()).map_err(|e| SchemaError::InvalidSchema {
                kind,
                message: e.to_string(),
            })?;
        let compiled =
            jsonschema::validator_for(&document).map_err(|e| SchemaError::InvalidSchema {
                kind,
                message: e.to_string(),
            })?;
        Ok(Self {
            kind,
            document,
            compiled,
        })
    }

    /// The raw schema document, as handed to the model.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Checks `instance` and reports every violation in one message.
    pub fn validate(&self, instance: &Value) -> Result<(), SchemaError> {
        let errors: Vec<String> = self
            .compiled
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Mismatch {
                kind: self.kind,
                errors: errors.join("; "),
            })
        }
    }

    /// Decodes an already validated document into its typed form.
    pub fn decode<T: DeserializeOwned>(&self, instance: Value) -> Result<T, SchemaError> {
        serde_json::from_value(instance).map_err(|source| SchemaError::Decode {
            kind: self.kind,
            source,
        })
    }
}

/// All stage schemas, compiled.
pub struct Schemas {
    analysis: SchemaValidator,
    fixes: SchemaValidator,
    patches: SchemaValidator,
}

impl Schemas {
    pub fn load() -> Result<Self, SchemaError> {
        Ok(Self {
            analysis: SchemaValidator::new(SchemaKind::Analysis)?,
            fixes: SchemaValidator::new(SchemaKind::Fixes)?,
            patches: SchemaValidator::new(SchemaKind::Patches)?,
        })
    }

    pub fn get(&self, kind: SchemaKind) -> &SchemaValidator {
        match kind {
            SchemaKind::Analysis => &self.analysis,
            SchemaKind::Fixes => &self.fixes,
            SchemaKind::Patches => &self.patches,
        }
    }
}
