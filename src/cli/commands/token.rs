use clap::Args;
use serde_json::json;

use crate::auth::{generate_jwt, Claims, Role};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "Numeric user id")]
    pub user_id: i64,
    #[arg(long, help = "Username")]
    pub username: String,
    #[arg(long, help = "Role: student, faculty, admin, college_admin or super_admin")]
    pub role: String,
    #[arg(long, help = "Tenant (college) id")]
    pub tenant: String,
    #[arg(long, help = "Lifetime in hours (defaults to SECURITY_DEV_TOKEN_EXPIRY_HOURS)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET is not set");
    }

    let role: Role = args.role.parse()?;
    let hours = args.hours.unwrap_or(config.security.dev_token_expiry_hours);
    let claims = Claims::new(args.user_id, args.username, role, args.tenant, hours);
    let token = generate_jwt(&claims, &config.security.jwt_secret)?;

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            "Token issued",
            Some(json!({ "token": token, "expires_in_hours": hours })),
        ),
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
    }
}
