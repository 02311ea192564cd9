//! Settings that are either a fixed number or the value of another port.
//!
//! Expression forms:
//!
//! ```text
//! 10.5              fixed value
//! Dimmer            value of port Dimmer
//! Dimmer(100)       value of Dimmer multiplied by 100
//! Dimmer/0          value of Dimmer, or 0 while Dimmer has an error
//! Dimmer(100)/0     both
//! ```
//!
//! The port is looked up on first use, so expressions can refer to ports
//! registered later.

use std::sync::OnceLock;

use openhat_core::{Error, Result};
use tracing::{debug, trace};

use crate::handle::PortHandle;
use crate::runtime::Runtime;

#[derive(Debug)]
enum Source {
    Fixed(f64),
    Port {
        id: String,
        scale: Option<f64>,
        error_default: Option<f64>,
        resolved: OnceLock<PortHandle>,
    },
}

#[derive(Debug)]
pub struct ValueResolver {
    origin: String,
    parameter: String,
    source: Source,
}

impl ValueResolver {
    /// A resolver that always yields `value`.
    pub fn fixed(origin: impl Into<String>, parameter: impl Into<String>, value: f64) -> Self {
        Self {
            origin: origin.into(),
            parameter: parameter.into(),
            source: Source::Fixed(value),
        }
    }

    /// Parse an expression.
    ///
    /// # Errors
    /// Fails if scale or default are not numeric, or if an error default is
    /// given where none is allowed.
    pub fn parse(
        origin: &str,
        parameter: &str,
        expression: &str,
        allow_error_default: bool,
    ) -> Result<Self> {
        debug!(
            "{}: Parsing value expression of parameter '{}': {}",
            origin, parameter, expression
        );
        let expression = expression.trim();
        let source = match expression.parse::<f64>() {
            Ok(value) => Source::Fixed(value),
            Err(_) => parse_port_expression(origin, parameter, expression, allow_error_default)?,
        };
        Ok(Self {
            origin: origin.to_string(),
            parameter: parameter.to_string(),
            source,
        })
    }

    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self.source, Source::Fixed(_))
    }

    /// Check a fixed value against a range. Port expressions are assumed
    /// valid.
    #[must_use]
    pub fn validate(&self, min: f64, max: f64) -> bool {
        match self.source {
            Source::Fixed(value) => (min..=max).contains(&value),
            Source::Port { .. } => true,
        }
    }

    /// Current value.
    ///
    /// # Errors
    /// Fails if the port does not exist, or if its value is unavailable and
    /// no error default was given.
    pub fn value(&self, rt: &Runtime) -> Result<f64> {
        match &self.source {
            Source::Fixed(value) => Ok(*value),
            Source::Port {
                id,
                scale,
                error_default,
                resolved,
            } => {
                let port = match resolved.get() {
                    Some(port) => port,
                    None => {
                        let found = rt.find_port(id).ok_or_else(|| {
                            Error::PortNotFound(format!(
                                "{}: Parameter {}: {}",
                                self.origin, self.parameter, id
                            ))
                        })?;
                        resolved.get_or_init(|| found)
                    }
                };
                match port.numeric_value() {
                    Ok(value) => Ok(value * scale.unwrap_or(1.0)),
                    Err(err) => {
                        trace!(
                            "{}: Unable to get the value of the port {}: {}",
                            self.origin, id, err
                        );
                        error_default.ok_or_else(|| {
                            Error::port_failure(
                                &self.origin,
                                format!("Unable to get the value of the port {id}: {err}"),
                            )
                        })
                    }
                }
            }
        }
    }
}

fn parse_port_expression(
    origin: &str,
    parameter: &str,
    expression: &str,
    allow_error_default: bool,
) -> Result<Source> {
    let (head, default_text) = match expression.rsplit_once('/') {
        Some((head, default)) => {
            if !allow_error_default {
                return Err(Error::Config(format!(
                    "{origin}: Parameter {parameter}: Specifying an error default value is not allowed: {expression}"
                )));
            }
            (head, Some(default))
        }
        None => (expression, None),
    };
    let (id, scale_text) = match head.split_once('(') {
        Some((id, rest)) if rest.ends_with(')') => (id, Some(&rest[..rest.len() - 1])),
        _ => (head, None),
    };
    let number = |text: &str, what: &str| -> Result<f64> {
        text.trim().parse().map_err(|_| {
            Error::Config(format!(
                "{origin}: Parameter {parameter}: Invalid {what} value specified; must be numeric: {text}"
            ))
        })
    };
    let scale = scale_text.map(|t| number(t, "scale")).transpose()?;
    let error_default = default_text.map(|t| number(t, "error default")).transpose()?;
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::Config(format!(
            "{origin}: Parameter {parameter}: Port ID missing: {expression}"
        )));
    }
    Ok(Source::Port {
        id: id.to_string(),
        scale,
        error_default,
        resolved: OnceLock::new(),
    })
}
