//! Local migration config validation

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use agent_lib::config::MigrationConfig;

use crate::output::{print_json, print_success, print_warning, OutputFormat};

/// Load and validate a migration config the way the agent does at startup
pub fn check_config(path: &Path, format: OutputFormat) -> Result<()> {
    let config = MigrationConfig::load(path)?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            print_success(&format!("{} is valid", path.display()));
            println!("Provider:       {}", config.cloud_provider.cyan());
            println!("Instance Type:  {}", config.instance_type);
            println!("Region:         {}", config.region);
            println!("Source Device:  {}", config.source_device);
            println!("Work Dir:       {}", config.work_dir.display());
            println!("Image Name:     {}", config.image_name);
            println!("Instance Name:  {}", config.instance_name);

            match config.cloud_provider.as_str() {
                "gcp" => {
                    let missing =
                        |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);
                    if missing(&config.gcp_bucket) || missing(&config.gcp_project) {
                        print_warning("gcp_bucket and gcp_project are required to migrate to gcp");
                    } else {
                        println!("Zone:           {}", config.gcp_zone());
                    }
                }
                "aws" | "azure" => {
                    print_warning(&format!(
                        "{} migration is not implemented; attempts will fail",
                        config.cloud_provider
                    ));
                }
                other => {
                    print_warning(&format!("unknown provider '{}'; attempts will fail", other));
                }
            }
        }
    }

    Ok(())
}
