//! pfctl invocation.
//!
//! Shells out to `pfctl -vvsI -i <if>` rather than talking to /dev/pf
//! directly; the verbose interface listing is only available through the
//! tool, and its output is what the parser is written against.

use std::process::Command;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::counters::snapshot::CounterSnapshot;

pub struct Pfctl {
    interface: String,
}

impl Pfctl {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Run pfctl and return its raw stdout. Non-zero exit is an error
    /// carrying pfctl's stderr; the caller decides whether to skip the
    /// sample or give up.
    pub fn read_raw(&self) -> Result<String> {
        let output = Command::new("pfctl")
            .args(["-vvsI", "-i", &self.interface])
            .output()
            .context("Failed to execute pfctl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pfctl exited with {} for {}: {}",
                output.status,
                self.interface,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// One full sample: run pfctl, parse, aggregate.
    pub fn sample(&self) -> Result<CounterSnapshot> {
        let raw = self.read_raw()?;
        debug!("Read {} bytes of pfctl output for {}", raw.len(), self.interface);
        Ok(CounterSnapshot::parse(&raw))
    }
}
