use serde_json::json;

use crate::cli::utils::{mask_url, output_success};
use crate::cli::OutputFormat;
use crate::config::config;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();

    let mut effective = serde_json::to_value(config)?;
    effective["database"]["url"] = json!(mask_url(&config.database.url));
    effective["database"]["cluster_url"] = json!(config.database.cluster_url.as_deref().map(mask_url));
    effective["security"]["jwt_secret"] = json!(if config.security.jwt_secret.is_empty() {
        "<unset>"
    } else {
        "****"
    });

    match output_format {
        OutputFormat::Json => output_success(&output_format, "Effective configuration", Some(json!({ "config": effective }))),
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(&effective)?);
            Ok(())
        }
    }
}
