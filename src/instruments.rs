// SPDX-License-Identifier: MIT
//! Metric instruments created once at startup and shared by every request.
use opentelemetry::metrics::{Counter, Meter};

use crate::error::TelemetryError;

pub const HELLO_REQUESTS: &str = "hello.requests";

const MAX_NAME_LEN: usize = 255;
const MAX_UNIT_LEN: usize = 63;

/// Instruments recorded by the `/hello` handler.
#[derive(Clone, Debug)]
pub struct HelloInstruments {
    /// Incremented once per request, tagged with `endpoint`.
    pub requests: Counter<u64>,
}

impl HelloInstruments {
    pub fn new(meter: &Meter) -> Result<Self, TelemetryError> {
        Ok(Self {
            requests: counter(meter, HELLO_REQUESTS, "Number of hello requests", "1")?,
        })
    }
}

/// Create a monotonic `u64` counter after checking the name and unit.
///
/// The SDK silently hands back a no-op instrument for bad names; validating up front turns
/// that into a startup error instead of a counter that never reports.
///
/// # Errors
/// [`TelemetryError::InstrumentCreation`] if `name` or `unit` break the OpenTelemetry rules.
pub fn counter(
    meter: &Meter,
    name: &'static str,
    description: &'static str,
    unit: &'static str,
) -> Result<Counter<u64>, TelemetryError> {
    validate_name(name)?;
    validate_unit(name, unit)?;
    Ok(meter
        .u64_counter(name)
        .with_description(description)
        .with_unit(unit)
        .build())
}

fn validate_name(name: &str) -> Result<(), TelemetryError> {
    let reject = |reason| {
        Err(TelemetryError::InstrumentCreation {
            name: name.to_string(),
            reason,
        })
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return reject("name is empty"),
        Some(first) if !first.is_ascii_alphabetic() => {
            return reject("name must start with an ASCII letter")
        }
        Some(_) => {}
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name is longer than 255 characters");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')) {
        return reject("name may only contain ASCII alphanumerics and `_ . - /`");
    }
    Ok(())
}

fn validate_unit(name: &str, unit: &str) -> Result<(), TelemetryError> {
    if unit.len() > MAX_UNIT_LEN || !unit.is_ascii() {
        return Err(TelemetryError::InstrumentCreation {
            name: name.to_string(),
            reason: "unit must be ASCII and at most 63 characters",
        });
    }
    Ok(())
}
