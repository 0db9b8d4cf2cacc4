//! Zentinel SOAP gateway tooling.
//!
//! Run with: `zentinel-soap-gateway schema --dump introspection.json`
//! or `zentinel-soap-gateway check --config service.yaml`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_gateway::apidoc;
use zentinel_soap_gateway::config::Endpoint;
use zentinel_soap_gateway::headers::build_headers;
use zentinel_soap_gateway::transport::{IntrospectionDump, StaticTransport};
use zentinel_soap_gateway::{GatewayConfig, Schema};

/// Offline tooling for the SOAP gateway core.
///
/// Builds catalogs from captured introspection output and validates service
/// configuration without contacting the remote service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build catalogs from an introspection dump (JSON `{functions, types}`)
    Schema {
        /// Path to the dump file
        #[arg(long)]
        dump: PathBuf,

        /// Print the fully expanded schema of one type
        #[arg(long)]
        expand: Option<String>,

        /// Print API documentation fragments instead of the catalogs
        #[arg(long)]
        doc: bool,

        /// Service name used in operation ids
        #[arg(long, default_value = "soap")]
        service: String,
    },

    /// Validate a service configuration file (YAML)
    Check {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let output = match args.command {
        Command::Schema {
            dump,
            expand,
            doc,
            service,
        } => schema(dump, expand, doc, &service)?,
        Command::Check { config } => check(config)?,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to render output")?
    );
    Ok(())
}

fn schema(dump: PathBuf, expand: Option<String>, doc: bool, service: &str) -> Result<Value> {
    info!("Dump file: {}", dump.display());
    let dump = IntrospectionDump::from_file(&dump).context("Failed to read introspection dump")?;
    let schema = Schema::build(&StaticTransport::new(dump)).context("Failed to build schema")?;

    if let Some(name) = expand {
        return match schema.types.expand(&name) {
            Some(expanded) => Ok(expanded),
            None => bail!("Type '{}' is not declared by this service", name),
        };
    }
    if doc {
        return Ok(apidoc::document(service, &schema));
    }

    let functions: Vec<Value> = schema.functions.iter().map(|f| f.summary()).collect();
    Ok(json!({
        "functions": functions,
        "types": schema.types.schemas(),
    }))
}

fn check(path: PathBuf) -> Result<Value> {
    info!("Config file: {}", path.display());
    let config = GatewayConfig::from_file(&path).context("Failed to load config file")?;

    let endpoint = match config.endpoint().context("Invalid endpoint")? {
        Endpoint::Wsdl(wsdl) => json!({ "wsdl": wsdl }),
        Endpoint::Direct { location, uri } => json!({ "location": location, "uri": uri }),
    };
    let options = config.client_options().context("Invalid client options")?;
    let headers: Vec<Value> = build_headers(&config.headers, config.wsse_username_token.as_deref())
        .iter()
        .map(|header| {
            json!({
                "namespace": header.namespace(),
                "name": header.name(),
                "mustUnderstand": header.must_understand(),
            })
        })
        .collect();

    info!(
        headers = headers.len(),
        ntlm = config.ntlm_credentials().is_some(),
        cache_enabled = config.cache_enabled,
        "Configuration valid"
    );

    Ok(json!({
        "endpoint": endpoint,
        "options": options.values,
        "streamContext": options.stream_context,
        "headers": headers,
        "ntlm": config.ntlm_credentials().is_some(),
        "cache": { "enabled": config.cache_enabled, "ttl": config.cache_ttl },
    }))
}
