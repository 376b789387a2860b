//! Protocol schema: domains, commands, events and enums.
//!
//! The schema is data, not code. It is produced either programmatically
//! with [`SchemaBuilder`] or from a `protocol.json` document with
//! [`Schema::from_json`], and it drives the [`Agent`](crate::agent::Agent)
//! parameter checks and the [`DomainDispatcher`](crate::agent::DomainDispatcher)
//! registration adapter.
//!
//! # Example
//!
//! ```ignore
//! let schema = Schema::builder()
//!     .command("Network.enable", [])
//!     .command("Network.replayXHR", [ParamSchema::required("requestId", ParamType::String)])
//!     .event("Network.requestWillBeSent", ["requestId", "request"])
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

use super::message::split_method;

// ============================================================================
// ParamType
// ============================================================================

/// JSON type of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// JSON string.
    String,
    /// JSON number with no fractional part; `1.0` counts.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
    /// Anything, including `$ref` types the core does not resolve.
    Any,
}

impl ParamType {
    /// Maps a `protocol.json` type name; unknown names become [`ParamType::Any`].
    #[must_use]
    pub fn from_schema_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            _ => Self::Any,
        }
    }

    /// Returns the `protocol.json` type name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Any => "any",
        }
    }

    /// Returns `true` if `value` has this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// Names the JSON type of a value for error messages.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// ParamSchema
// ============================================================================

/// One declared command parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSchema {
    /// Parameter name as it appears in `params`.
    pub name: String,
    /// Expected JSON type.
    pub ty: ParamType,
    /// Whether the parameter may be omitted.
    pub optional: bool,
}

impl ParamSchema {
    /// Declares a required parameter.
    #[inline]
    #[must_use]
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    /// Declares an optional parameter.
    #[inline]
    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: true,
        }
    }
}

// ============================================================================
// CommandSchema
// ============================================================================

/// A command declared by a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSchema {
    /// Command name without the domain prefix.
    pub name: String,
    /// Declared parameters in schema order.
    pub parameters: Vec<ParamSchema>,
    /// Names of the result fields.
    pub returns: Vec<String>,
}

impl CommandSchema {
    /// Checks `params` against the declared signature.
    ///
    /// `method` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParams`] when params is neither an object nor
    /// null, a required parameter is missing, or a value has the wrong type.
    /// Undeclared parameters are sent through unchecked.
    pub fn validate(&self, method: &str, params: &Value) -> Result<()> {
        let empty = serde_json::Map::new();
        let object = match params {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(Error::invalid_params(
                    method,
                    format!("params must be an object, got {}", json_type_name(other)),
                ));
            }
        };

        for param in &self.parameters {
            match object.get(&param.name) {
                None if param.optional => {}
                None => {
                    return Err(Error::invalid_params(
                        method,
                        format!("missing required parameter '{}'", param.name),
                    ));
                }
                Some(value) if !param.ty.matches(value) => {
                    return Err(Error::invalid_params(
                        method,
                        format!(
                            "parameter '{}' must be {} but is {}",
                            param.name,
                            param.ty.as_str(),
                            json_type_name(value)
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

// ============================================================================
// EventSchema
// ============================================================================

/// An event declared by a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    /// Event name without the domain prefix.
    pub name: String,
    /// Names of the payload fields.
    pub parameters: Vec<String>,
}

// ============================================================================
// DomainSchema
// ============================================================================

/// Commands and events of one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSchema {
    name: String,
    commands: FxHashMap<String, CommandSchema>,
    /// Kept in declaration order.
    events: Vec<EventSchema>,
}

impl DomainSchema {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the domain name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a command by name.
    #[inline]
    #[must_use]
    pub fn command(&self, name: &str) -> Option<&CommandSchema> {
        self.commands.get(name)
    }

    /// Iterates over the declared commands (unordered).
    pub fn commands(&self) -> impl Iterator<Item = &CommandSchema> {
        self.commands.values()
    }

    /// Looks up an event by name.
    #[inline]
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventSchema> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Returns the declared events in declaration order.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[EventSchema] {
        &self.events
    }

    fn insert_command(&mut self, command: CommandSchema) {
        self.commands.insert(command.name.clone(), command);
    }

    fn insert_event(&mut self, event: EventSchema) {
        match self.events.iter_mut().find(|e| e.name == event.name) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }
}

// ============================================================================
// Schema
// ============================================================================

/// The full protocol schema.
///
/// Cheap to share: domains are reference counted.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    domains: FxHashMap<String, Arc<DomainSchema>>,
    enums: FxHashMap<String, Vec<String>>,
}

impl Schema {
    /// Creates a schema builder.
    #[inline]
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Parses a `protocol.json` document.
    ///
    /// Only the fields the client needs are read; descriptions and
    /// experimental flags are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document does not have the expected
    /// layout.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawProtocol = serde_json::from_str(text)?;
        let mut schema = Self::default();

        for raw_domain in raw.domains {
            let mut domain = DomainSchema::new(&raw_domain.domain);

            for command in raw_domain.commands {
                domain.insert_command(CommandSchema {
                    name: command.name,
                    parameters: command.parameters.into_iter().map(RawParam::into_param).collect(),
                    returns: command.returns.into_iter().map(|p| p.name).collect(),
                });
            }

            for event in raw_domain.events {
                domain.insert_event(EventSchema {
                    name: event.name,
                    parameters: event.parameters.into_iter().map(|p| p.name).collect(),
                });
            }

            for ty in raw_domain.types {
                if let Some(values) = ty.values {
                    schema
                        .enums
                        .insert(format!("{}.{}", raw_domain.domain, ty.id), values);
                }
            }

            schema.domains.insert(raw_domain.domain, Arc::new(domain));
        }

        Ok(schema)
    }

    /// Merges `other` into `self`.
    ///
    /// Commands and events declared by both replace the existing entries.
    pub fn merge(&mut self, other: Schema) {
        for (name, incoming) in other.domains {
            match self.domains.get_mut(&name) {
                Some(existing) => {
                    let existing = Arc::make_mut(existing);
                    let incoming = Arc::unwrap_or_clone(incoming);
                    for (_, command) in incoming.commands {
                        existing.insert_command(command);
                    }
                    for event in incoming.events {
                        existing.insert_event(event);
                    }
                }
                None => {
                    self.domains.insert(name, incoming);
                }
            }
        }
        self.enums.extend(other.enums);
    }

    /// Looks up a domain.
    #[inline]
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&Arc<DomainSchema>> {
        self.domains.get(name)
    }

    /// Returns `true` if the domain exists.
    #[inline]
    #[must_use]
    pub fn has_domain(&self, name: &str) -> bool {
        self.domains.contains_key(name)
    }

    /// Iterates over domain names (unordered).
    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Returns the values of an enum type, e.g. `Network.ResourceType`.
    #[inline]
    #[must_use]
    pub fn enum_values(&self, qualified: &str) -> Option<&[String]> {
        self.enums.get(qualified).map(Vec::as_slice)
    }

    /// Returns the number of domains.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Returns `true` if no domain is declared.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

// ============================================================================
// SchemaBuilder
// ============================================================================

/// Programmatic schema construction.
///
/// Names are fully qualified (`Domain.name`); malformed names are reported
/// by [`SchemaBuilder::build`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
    errors: Vec<String>,
}

impl SchemaBuilder {
    fn domain_mut(&mut self, domain: &str) -> &mut DomainSchema {
        let entry = self
            .schema
            .domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(DomainSchema::new(domain)));
        Arc::make_mut(entry)
    }

    /// Declares a domain with no commands or events yet.
    #[must_use]
    pub fn domain(mut self, domain: &str) -> Self {
        self.domain_mut(domain);
        self
    }

    /// Declares a command.
    #[must_use]
    pub fn command(
        mut self,
        method: &str,
        parameters: impl IntoIterator<Item = ParamSchema>,
    ) -> Self {
        match split_method(method) {
            Some((domain, name)) => {
                let command = CommandSchema {
                    name: name.to_string(),
                    parameters: parameters.into_iter().collect(),
                    returns: Vec::new(),
                };
                self.domain_mut(domain).insert_command(command);
            }
            None => self.errors.push(format!("invalid command name '{method}'")),
        }
        self
    }

    /// Declares an event with its payload field names.
    #[must_use]
    pub fn event<S: Into<String>>(
        mut self,
        method: &str,
        parameters: impl IntoIterator<Item = S>,
    ) -> Self {
        match split_method(method) {
            Some((domain, name)) => {
                let event = EventSchema {
                    name: name.to_string(),
                    parameters: parameters.into_iter().map(Into::into).collect(),
                };
                self.domain_mut(domain).insert_event(event);
            }
            None => self.errors.push(format!("invalid event name '{method}'")),
        }
        self
    }

    /// Declares an enum type.
    #[must_use]
    pub fn enumeration<S: Into<String>>(
        mut self,
        qualified: &str,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        if split_method(qualified).is_none() {
            self.errors.push(format!("invalid enum name '{qualified}'"));
            return self;
        }
        self.schema.enums.insert(
            qualified.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Finishes the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every malformed name.
    pub fn build(self) -> Result<Schema> {
        if self.errors.is_empty() {
            Ok(self.schema)
        } else {
            Err(Error::config(self.errors.join("; ")))
        }
    }
}

// ============================================================================
// protocol.json layout
// ============================================================================

#[derive(Deserialize)]
struct RawProtocol {
    domains: Vec<RawDomain>,
}

#[derive(Deserialize)]
struct RawDomain {
    domain: String,
    #[serde(default)]
    commands: Vec<RawCommand>,
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    types: Vec<RawType>,
}

#[derive(Deserialize)]
struct RawCommand {
    name: String,
    #[serde(default)]
    parameters: Vec<RawParam>,
    #[serde(default)]
    returns: Vec<RawParam>,
}

#[derive(Deserialize)]
struct RawEvent {
    name: String,
    #[serde(default)]
    parameters: Vec<RawParam>,
}

#[derive(Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type", default)]
    ty: Option<String>,
    #[serde(default)]
    optional: bool,
}

impl RawParam {
    fn into_param(self) -> ParamSchema {
        ParamSchema {
            ty: self
                .ty
                .as_deref()
                .map_or(ParamType::Any, ParamType::from_schema_name),
            name: self.name,
            optional: self.optional,
        }
    }
}

#[derive(Deserialize)]
struct RawType {
    id: String,
    #[serde(rename = "enum", default)]
    values: Option<Vec<String>>,
}

// ============================================================================
// Tests
// ============================================================================
