//! Stage configuration.
//!
//! Options are name/value/description triples. Values are stored as text
//! and converted on lookup through `FromStr`, so every stage declares and
//! parses its own keys.

use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// One configuration entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOption {
    name: String,
    value: String,
    description: String,
}

impl StageOption {
    pub fn new(
        name: impl Into<String>,
        value: impl ToString,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
            description: description.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// An ordered set of options, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    options: Vec<StageOption>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// No options at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add or replace an option.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl ToString,
        description: impl Into<String>,
    ) {
        self.add_option(StageOption::new(name, value, description));
    }

    /// Builder form of [`add`](Self::add) without a description.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.add(name, value, "");
        self
    }

    pub fn add_option(&mut self, option: StageOption) {
        match self.options.iter_mut().find(|o| o.name == option.name) {
            Some(existing) => *existing = option,
            None => self.options.push(option),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.option(name).is_some()
    }

    pub fn option(&self, name: &str) -> Option<&StageOption> {
        self.options.iter().find(|o| o.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Typed value of a required option.
    pub fn value<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let option = self
            .option(name)
            .ok_or_else(|| PipelineError::MissingOption(name.to_string()))?;
        option
            .value
            .trim()
            .parse()
            .map_err(|e: T::Err| PipelineError::InvalidOption {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Typed value of an optional option, `default` when absent.
    pub fn value_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if self.has(name) {
            self.value(name)
        } else {
            Ok(default)
        }
    }

    /// Entries of `defaults` that are not set here are added.
    pub fn merged_with(&self, defaults: &Options) -> Options {
        let mut merged = self.clone();
        for option in &defaults.options {
            if !merged.has(&option.name) {
                merged.options.push(option.clone());
            }
        }
        merged
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for option in &self.options {
            write!(f, "{}={}", option.name, option.value)?;
            if !option.description.is_empty() {
                write!(f, " ({})", option.description)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
