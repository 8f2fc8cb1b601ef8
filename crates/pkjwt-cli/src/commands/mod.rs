pub mod check;
pub mod inspect;

use std::io::Read;

use anyhow::{Context, Result, bail};

/// Returns the assertion argument, or reads it from stdin.
pub fn read_assertion(arg: Option<&str>) -> Result<String> {
    let raw = match arg {
        Some(value) => value.to_string(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read assertion from stdin")?;
            buf
        }
    };

    let assertion = raw.trim();
    if assertion.is_empty() {
        bail!("No assertion given");
    }
    Ok(assertion.to_string())
}
