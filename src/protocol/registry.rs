//! Runtime type registry mapping wire type names to payload types.
//!
//! # Responsibilities
//! - Hold the one-to-one association between wire names and Rust types
//! - Decode a raw `message` into the type registered under a wire name
//! - Answer "which wire name does this Rust type travel under"
//!
//! The registry is built once by the owning application and is immutable
//! afterwards; the client shares it behind an `Arc`.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;

/// A value that can travel inside an envelope.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A decoded payload with its concrete type erased.
pub type AnyPayload = Arc<dyn Any + Send + Sync>;

type DecodeFn = fn(&RawValue) -> Result<AnyPayload, serde_json::Error>;

fn decode_as<T: Payload>(message: &RawValue) -> Result<AnyPayload, serde_json::Error> {
    let value: T = serde_json::from_str(message.get())?;
    Ok(Arc::new(value))
}

/// Errors raised while building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The same wire name was given to two types.
    #[error("wire type name '{0}' is registered more than once")]
    DuplicateName(String),

    /// The same Rust type was given two wire names.
    #[error("payload type {rust_type} is already registered as '{existing}'")]
    DuplicateType {
        rust_type: &'static str,
        existing: String,
    },

    /// A wire name was empty.
    #[error("wire type name for {0} is empty")]
    EmptyName(&'static str),
}

#[derive(Clone, Copy)]
struct Shape {
    type_id: TypeId,
    rust_type: &'static str,
    decode: DecodeFn,
}

/// Collects registrations before validating them as a whole.
#[derive(Default)]
pub struct TypeRegistryBuilder {
    entries: Vec<(String, Shape)>,
}

impl TypeRegistryBuilder {
    /// Register `T` under the wire name `name`.
    pub fn register<T: Payload>(mut self, name: impl Into<String>) -> Self {
        self.entries.push((
            name.into(),
            Shape {
                type_id: TypeId::of::<T>(),
                rust_type: type_name::<T>(),
                decode: decode_as::<T>,
            },
        ));
        self
    }

    /// Validate the registrations and freeze them.
    pub fn build(self) -> Result<TypeRegistry, RegistryError> {
        let mut by_name = HashMap::with_capacity(self.entries.len());
        let mut by_type = HashMap::with_capacity(self.entries.len());

        for (name, shape) in self.entries {
            if name.is_empty() {
                return Err(RegistryError::EmptyName(shape.rust_type));
            }
            if by_name.contains_key(&name) {
                return Err(RegistryError::DuplicateName(name));
            }
            if let Some(existing) = by_type.get(&shape.type_id) {
                return Err(RegistryError::DuplicateType {
                    rust_type: shape.rust_type,
                    existing: String::clone(existing),
                });
            }
            by_type.insert(shape.type_id, name.clone());
            by_name.insert(name, shape);
        }

        Ok(TypeRegistry { by_name, by_type })
    }
}

/// Bidirectional wire-name ↔ payload-type mapping.
pub struct TypeRegistry {
    by_name: HashMap<String, Shape>,
    by_type: HashMap<TypeId, String>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Wire name registered for `T`, if any.
    pub fn type_name_of<T: 'static>(&self) -> Option<&str> {
        self.by_type.get(&TypeId::of::<T>()).map(String::as_str)
    }

    /// Whether `name` is a recognized wire type.
    pub fn is_recognized(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Rust type registered under `name`, for diagnostics.
    pub fn rust_type_of(&self, name: &str) -> Option<&'static str> {
        self.by_name.get(name).map(|shape| shape.rust_type)
    }

    /// All recognized wire names, in no particular order.
    pub fn recognized_types(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Decode `message` as the type registered under `name`.
    ///
    /// Returns `None` when `name` is not recognized.
    pub fn decode_message(
        &self,
        name: &str,
        message: &RawValue,
    ) -> Option<Result<AnyPayload, serde_json::Error>> {
        self.by_name.get(name).map(|shape| (shape.decode)(message))
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.recognized_types().collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
