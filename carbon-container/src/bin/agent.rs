//! Carbon test agent.
//!
//! Reference remote runtime for the test container. Launched through a
//! distribution's entry point with JVM-style `-Dkey=value` arguments, it
//! dials the registry named in its launch properties and serves control
//! requests until told to stop.

use anyhow::{Context, Result};
use carbon_container::launcher::CARBON_HOME_PROPERTY;
use carbon_container::reference_agent::ReferenceAgent;
use carbon_shared::Endpoint;
use carbon_shared::agent::serve;
use clap::{ArgAction, Parser};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "carbon-agent", version, about = "Reference runtime driven by the Carbon test container")]
struct AgentArgs {
    /// Launch property, `-Dkey=value`. Repeatable; later values win.
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property, action = ArgAction::Append)]
    properties: Vec<(String, String)>,

    /// Remaining runtime flags. Accepted and logged, otherwise ignored.
    #[arg(skip)]
    flags: Vec<String>,
}

impl AgentArgs {
    /// Parse a JVM-style command line.
    ///
    /// Only `-D` properties (and help/version) belong to the agent; every
    /// other flag is meant for the runtime and is set aside before clap sees it.
    fn parse_jvm<I>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = String>,
    {
        let mut ours = Vec::new();
        let mut runtime = Vec::new();
        for (i, arg) in argv.into_iter().enumerate() {
            let is_ours = i == 0
                || arg.starts_with("-D")
                || matches!(arg.as_str(), "-h" | "--help" | "-V" | "--version");
            if is_ours {
                ours.push(arg);
            } else {
                runtime.push(arg);
            }
        }

        let mut args = Self::try_parse_from(ours)?;
        args.flags = runtime;
        Ok(args)
    }
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty property key in '{}'", raw)),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Ok((raw.to_string(), String::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carbon_agent=info,carbon_container=info,carbon_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = AgentArgs::parse_jvm(std::env::args()).unwrap_or_else(|e| e.exit());
    let properties: HashMap<String, String> = args.properties.into_iter().collect();

    let endpoint =
        Endpoint::from_properties(&properties).context("registry endpoint not configured")?;
    let home = properties.get(CARBON_HOME_PROPERTY).map(PathBuf::from);

    tracing::info!(
        endpoint = %endpoint.address(),
        name = %endpoint.name,
        home = ?home,
        properties = properties.len(),
        flags = ?args.flags,
        "Carbon agent starting"
    );

    let agent = ReferenceAgent::new(home, properties).context("invalid agent configuration")?;
    serve(&endpoint, &agent)
        .await
        .context("control channel failed")?;

    tracing::info!("Carbon agent stopped");
    Ok(())
}
