use std::sync::Arc;

use anyhow::{Context, Result, bail};
use pkjwt_auth::prelude::*;
use time::OffsetDateTime;

use crate::cli::CheckArgs;
use crate::output;

/// Result of running an assertion through the authenticator.
pub struct Verdict {
    pub client_id: String,
    pub rejection: Option<RejectionReason>,
}

pub async fn check(args: &CheckArgs, assertion: &str) -> Result<()> {
    let verdict = evaluate(args, assertion).await?;

    match verdict.rejection {
        None => {
            output::print_success(&format!("Client '{}' authenticated", verdict.client_id));
            Ok(())
        }
        Some(reason) => bail!(
            "Assertion for client '{}' rejected: {} [{}]",
            verdict.client_id,
            reason,
            reason.code()
        ),
    }
}

/// Loads the configuration and key registry and validates `assertion`.
///
/// Request-level problems (wrong assertion type, unparsable assertion,
/// unexpected client ID) are errors; validation failures are reported in
/// the returned [`Verdict`].
pub async fn evaluate(args: &CheckArgs, assertion: &str) -> Result<Verdict> {
    let config = PrivateKeyJwtConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let keys = JwksKeyRegistry::from_file(&args.jwks)
        .with_context(|| format!("Failed to load key registry {}", args.jwks.display()))?;
    let authenticator = PrivateKeyJwtAuthenticator::from_config(&config, Arc::new(keys), None)
        .context("Invalid authenticator configuration")?;

    let request = ClientAssertionRequest {
        client_id: args.client_id.clone(),
        client_assertion_type: Some(args.assertion_type.clone()),
        client_assertion: Some(assertion.to_string()),
    };
    if !authenticator.can_authenticate(&request) {
        bail!(
            "Not a JWT-bearer client assertion (client_assertion_type = {})",
            args.assertion_type
        );
    }

    let mut ctx = AuthnContext::new();
    let client_id = authenticator.get_client_id(&request, &mut ctx)?;
    if let Some(expected) = &args.client_id
        && *expected != client_id
    {
        bail!("Assertion names client '{client_id}', expected '{expected}'");
    }

    let now = match args.at {
        Some(timestamp) => OffsetDateTime::from_unix_timestamp(timestamp)
            .with_context(|| format!("Invalid timestamp {timestamp}"))?,
        None => OffsetDateTime::now_utc(),
    };
    let parsed = ctx
        .assertion()
        .context("Assertion was not retained after parsing")?;
    tracing::debug!(
        client_id = %client_id,
        alg = %parsed.header().alg,
        at = now.unix_timestamp(),
        "Validating assertion"
    );

    let rejection = authenticator.validator().validate(parsed, now).await.err();
    Ok(Verdict {
        client_id,
        rejection,
    })
}
