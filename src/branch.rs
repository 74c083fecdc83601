//! Tagged unions: a chooser picks one of several Structs from the context.

use crate::context::{active, Context};
use crate::error::TranscodeError;
use crate::options::{Deliver, PackOptions, ParseOptions, Source};
use crate::structure::{Packed, Parsed, Struct, StructRef};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Key into a branch's choice table. Integer and text keys never match each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Discriminant {
    Int(i64),
    Text(String),
}

impl From<i64> for Discriminant {
    fn from(v: i64) -> Self {
        Discriminant::Int(v)
    }
}

impl From<i32> for Discriminant {
    fn from(v: i32) -> Self {
        Discriminant::Int(v as i64)
    }
}

impl From<&str> for Discriminant {
    fn from(v: &str) -> Self {
        Discriminant::Text(v.to_string())
    }
}

impl From<String> for Discriminant {
    fn from(v: String) -> Self {
        Discriminant::Text(v)
    }
}

impl TryFrom<Value> for Discriminant {
    type Error = TranscodeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(v) => Ok(Discriminant::Int(v)),
            Value::Uint(v) => i64::try_from(v)
                .map(Discriminant::Int)
                .map_err(|_| TranscodeError::ValueOutOfRange {
                    value: v.to_string(),
                    bits: 63,
                }),
            Value::Text(s) => Ok(Discriminant::Text(s)),
            other => Err(TranscodeError::TypeMismatch {
                expected: "int or text",
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl fmt::Display for Discriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discriminant::Int(v) => write!(f, "{}", v),
            Discriminant::Text(s) => write!(f, "{:?}", s),
        }
    }
}

pub type Chooser =
    Arc<dyn Fn(Option<&Context<'_>>) -> Result<Discriminant, TranscodeError> + Send + Sync>;

pub struct Branch {
    chooser: Chooser,
    choices: HashMap<Discriminant, StructRef>,
    default: Option<StructRef>,
}

impl Branch {
    pub fn new<F, D, I>(chooser: F, choices: I) -> Self
    where
        F: Fn(Option<&Context<'_>>) -> Result<Discriminant, TranscodeError> + Send + Sync + 'static,
        D: Into<Discriminant>,
        I: IntoIterator<Item = (D, StructRef)>,
    {
        Branch {
            chooser: Arc::new(chooser),
            choices: choices.into_iter().map(|(d, s)| (d.into(), s)).collect(),
            default: None,
        }
    }

    /// Chooses on the nearest field called `name`, looked up from the active context.
    pub fn on_field<D, I>(name: &str, choices: I) -> Self
    where
        D: Into<Discriminant>,
        I: IntoIterator<Item = (D, StructRef)>,
    {
        let name = name.to_string();
        Branch::new(
            move |context| {
                let ctx = active(context, "a field-driven branch")?;
                let value = ctx.lookup(&name).ok_or_else(|| TranscodeError::MissingField {
                    field: name.clone(),
                    available: ctx.keys(),
                })?;
                Discriminant::try_from(value)
            },
            choices,
        )
    }

    /// Used when the discriminant has no entry in the table.
    pub fn default_choice(mut self, choice: StructRef) -> Self {
        self.default = Some(choice);
        self
    }

    fn choose(&self, context: Option<&Context<'_>>) -> Result<&StructRef, TranscodeError> {
        let discriminant = (self.chooser)(context)?;
        match self.choices.get(&discriminant).or(self.default.as_ref()) {
            Some(choice) => Ok(choice),
            None => {
                let mut keys: Vec<&Discriminant> = self.choices.keys().collect();
                keys.sort();
                Err(TranscodeError::UnknownDiscriminant {
                    discriminant: discriminant.to_string(),
                    available: keys.into_iter().map(|k| k.to_string()).collect(),
                })
            }
        }
    }
}

impl Struct for Branch {
    fn pack(&self, source: Source<'_>, options: PackOptions<'_, '_>) -> Result<Packed, TranscodeError> {
        self.choose(options.context)?.pack(source, options)
    }

    fn parse(
        &self,
        data: &[u8],
        options: ParseOptions<'_>,
        deliver: Option<Deliver<'_>>,
    ) -> Result<Parsed, TranscodeError> {
        self.choose(options.context)?.parse(data, options, deliver)
    }
}
