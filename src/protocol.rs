//! Request grammar for PiKV
//!
//! A request payload is `VERB\nKEY` or `VERB\nKEY\nVALUE`. Fields are split
//! with nom; anything after a third newline is ignored.

use crate::error::{PikvError, Result};
use nom::{
    bytes::complete::take_till,
    character::complete::char,
    combinator::opt,
    sequence::{preceded, tuple},
    IResult,
};
use std::fmt;

/// Maximum key length, in characters
pub const MAX_KEY_LEN: usize = 1024;

/// Maximum value length, in characters
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

/// Operations understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Insert,
    Update,
    Delete,
    Get,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::Insert, Verb::Update, Verb::Delete, Verb::Get];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Insert => "INSERT",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
            Verb::Get => "GET",
        }
    }

    /// Exact, uppercase match as sent on the wire
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.as_str() == s)
    }

    /// Case-insensitive match, used for command-line tokens
    pub fn from_token(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str().eq_ignore_ascii_case(s))
    }

    /// INSERT and UPDATE carry a value, DELETE and GET must not
    pub fn takes_value(self) -> bool {
        matches!(self, Verb::Insert | Verb::Update)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request parsed from one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub key: String,
    pub value: Option<String>,
}

impl Command {
    pub fn new(verb: Verb, key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            verb,
            key: key.into(),
            value,
        }
    }

    pub fn insert(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Verb::Insert, key, Some(value.into()))
    }

    pub fn update(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(Verb::Update, key, Some(value.into()))
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::new(Verb::Delete, key, None)
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self::new(Verb::Get, key, None)
    }

    /// The value, or the empty string when none was sent
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Render the request payload. An empty value is left out.
    pub fn to_payload(&self) -> String {
        match self.value.as_deref() {
            Some(value) if !value.is_empty() => {
                format!("{}\n{}\n{}", self.verb, self.key, value)
            }
            _ => format!("{}\n{}", self.verb, self.key),
        }
    }

    /// Check the key and value against the field bounds
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(PikvError::InvalidField(format!(
                "{} requires a key",
                self.verb
            )));
        }
        validate_fields(&self.key, self.value.as_deref())
    }
}

/// Check a key and an optional value against the field bounds
pub fn validate_fields(key: &str, value: Option<&str>) -> Result<()> {
    check_field("key", key, MAX_KEY_LEN)?;
    if let Some(value) = value {
        check_field("value", value, MAX_VALUE_LEN)?;
    }
    Ok(())
}

fn check_field(name: &str, field: &str, limit: usize) -> Result<()> {
    if field.contains(|c: char| c == '\n' || c == '\0') {
        return Err(PikvError::InvalidField(format!(
            "{} must not contain newline or NUL characters",
            name
        )));
    }
    let len = field.chars().count();
    if len > limit {
        return Err(PikvError::InvalidField(format!(
            "{} is {} characters long, limit is {}",
            name, len, limit
        )));
    }
    Ok(())
}

/// Raw fields of a request, before the verb is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFields<'a> {
    pub verb: &'a str,
    pub key: Option<&'a str>,
    pub value: Option<&'a str>,
}

/// Split a payload into verb, key and value. Every payload splits; a
/// payload without newlines is all verb.
pub fn split_fields(payload: &str) -> RequestFields<'_> {
    match request_fields(payload) {
        Ok((_, (verb, key, value))) => RequestFields { verb, key, value },
        // take_till and opt accept any complete input
        Err(_) => RequestFields {
            verb: payload,
            key: None,
            value: None,
        },
    }
}

impl<'a> RequestFields<'a> {
    /// Build the command for an already resolved verb. A missing key
    /// becomes the empty string and is caught by [`Command::validate`].
    pub fn into_command(self, verb: Verb) -> Command {
        Command {
            verb,
            key: self.key.unwrap_or_default().to_string(),
            value: self.value.map(str::to_string),
        }
    }
}

/// Parse a payload into a [`Command`].
///
/// Only an unrecognized verb fails here; field bounds are checked separately
/// by [`Command::validate`] so the caller still knows which verb was meant.
pub fn parse_command(payload: &str) -> Result<Command> {
    let fields = split_fields(payload);
    let verb = Verb::from_wire(fields.verb)
        .ok_or_else(|| PikvError::UnknownVerb(fields.verb.to_string()))?;
    Ok(fields.into_command(verb))
}

fn field(input: &str) -> IResult<&str, &str> {
    take_till(|c: char| c == '\n')(input)
}

fn request_fields(input: &str) -> IResult<&str, (&str, Option<&str>, Option<&str>)> {
    tuple((
        field,
        opt(preceded(char('\n'), field)),
        opt(preceded(char('\n'), field)),
    ))(input)
}
