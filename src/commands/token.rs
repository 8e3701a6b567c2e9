use anyhow::{bail, Result};

use ticketdesk::auth::CredentialIssuer;

/// Mint a signed bearer token and print it as an `Authorization` header value.
pub fn issue(
    secret: &[u8],
    subject: Option<&str>,
    permissions: &[String],
    ttl_minutes: i64,
) -> Result<()> {
    let token = mint(secret, subject, permissions, ttl_minutes)?;
    println!("Bearer {}", token);
    Ok(())
}

fn mint(
    secret: &[u8],
    subject: Option<&str>,
    permissions: &[String],
    ttl_minutes: i64,
) -> Result<String> {
    if ttl_minutes <= 0 {
        bail!("Token lifetime must be positive, got {} minutes", ttl_minutes);
    }
    let token = CredentialIssuer::new(secret).issue(
        subject,
        permissions,
        chrono::Duration::minutes(ttl_minutes),
    )?;
    Ok(token)
}
