use anyhow::{Context, Result};
use pkjwt_auth::SignedAssertion;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::output;

/// Prints the header and claims of an assertion. The signature is never printed.
pub fn inspect(compact: &str) -> Result<()> {
    let assertion = SignedAssertion::parse(compact).context("Failed to parse assertion")?;

    output::print_json("Header", &serde_json::to_value(assertion.header())?);
    output::print_json("Claims", &serde_json::to_value(assertion.claims())?);

    let claims = assertion.claims();
    for (name, value) in [("exp", claims.exp), ("nbf", claims.nbf), ("iat", claims.iat)] {
        if let Some(timestamp) = value {
            output::print_field(name, describe_timestamp(timestamp));
        }
    }
    output::print_field(
        "Signature",
        format!("{} bytes", assertion.signature().len()),
    );
    Ok(())
}

fn describe_timestamp(timestamp: i64) -> String {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .map(|formatted| format!("{timestamp} ({formatted})"))
        .unwrap_or_else(|| format!("{timestamp} (out of range)"))
}
