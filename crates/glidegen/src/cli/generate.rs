//! `glidegen generate`: fetch tables and write their declarations.

use crate::cli::error::HelpfulError;
use anyhow::{Context, Result};
use clap::Args;
use glidegen::loader::LoadOptions;
use glidegen::{generate, GenerateRequest, GlidegenConfig, OutputError};
use glidegen_remote::{
    ClientConfig, ClientCredentials, Credentials, FixtureSource, RemoteSchemaSource, TableApiClient,
};
use glidegen_render::{RenderMode, RenderOptions};
use glidegen_schema::{CancellationToken, Name};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Tables to generate declarations for; superclasses are included
    #[arg(required = true)]
    pub tables: Vec<String>,

    /// Declaration flavor: global or scoped
    #[arg(short, long)]
    pub mode: Option<RenderMode>,

    /// Declaration file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite the output file if it exists
    #[arg(short, long)]
    pub force: bool,

    /// Fetch tables again even when they are cached
    #[arg(long)]
    pub refresh: bool,

    /// Read schema records from a JSON fixture instead of an instance
    #[arg(long, value_name = "FIXTURE")]
    pub offline: Option<PathBuf>,

    /// Instance base URL
    #[arg(long, value_name = "URL")]
    pub instance: Option<String>,

    #[arg(short, long)]
    pub user: Option<String>,

    #[arg(long, env = "GLIDEGEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// OAuth client id; switches to bearer token authentication
    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long, env = "GLIDEGEN_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Cache store path
    #[arg(long)]
    pub db: Option<PathBuf>,
}

/// Execute the generate command
pub fn run(args: GenerateArgs, config: GlidegenConfig) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(args, config))
}

async fn run_async(args: GenerateArgs, config: GlidegenConfig) -> Result<()> {
    let tables = args
        .tables
        .iter()
        .map(|table| Name::parse(table).with_context(|| format!("Invalid table name '{}'", table)))
        .collect::<Result<Vec<_>>>()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let source = build_source(&args, &config, &cancel)?;
    let request = GenerateRequest {
        tables,
        output: args.output.clone().unwrap_or_else(|| config.output.clone()),
        force: args.force,
        database: match &args.db {
            Some(path) => path.clone(),
            None => config.database_path()?,
        },
        load: LoadOptions {
            refresh: args.refresh,
            max_concurrent_fetches: config.max_concurrent_fetches,
        },
        render: RenderOptions {
            mode: args.mode.unwrap_or(config.mode),
            comparison: config.comparison(),
        },
    };

    let output_path = request.output.clone();
    let report = generate(request, source, &cancel).await.map_err(|err| {
        let conflict = err
            .downcast_ref::<OutputError>()
            .filter(|e| e.is_destination_conflict())
            .map(|e| e.to_string());
        match conflict {
            Some(reason) => HelpfulError::output_conflict(&output_path, &reason).into(),
            None => err,
        }
    })?;

    info!(
        tables = report.rendered.len(),
        saved = report.saved,
        "Generation complete"
    );
    println!(
        "Wrote {} table(s) to {}",
        report.rendered.len(),
        report.output.display()
    );
    for problem in &report.problems {
        println!("  skipped: {}", problem);
    }
    Ok(())
}

fn build_source(
    args: &GenerateArgs,
    config: &GlidegenConfig,
    cancel: &CancellationToken,
) -> Result<Arc<dyn RemoteSchemaSource>> {
    if let Some(fixture) = &args.offline {
        let source = FixtureSource::from_file(fixture)
            .with_context(|| format!("Failed to load fixture {}", fixture.display()))?
            .with_cancellation(cancel.clone());
        return Ok(Arc::new(source));
    }

    let instance_url = args
        .instance
        .clone()
        .or_else(|| config.instance_url.clone())
        .ok_or_else(HelpfulError::no_instance)?;
    let user_name = args
        .user
        .clone()
        .or_else(|| config.user_name.clone())
        .ok_or_else(|| HelpfulError::missing_credentials("user name (--user)"))?;
    let password = args
        .password
        .clone()
        .ok_or_else(|| HelpfulError::missing_credentials("password (GLIDEGEN_PASSWORD)"))?;

    let client = match args.client_id.clone().or_else(|| config.client_id.clone()) {
        Some(client_id) => {
            let client_secret = args.client_secret.clone().ok_or_else(|| {
                HelpfulError::missing_credentials("client secret (GLIDEGEN_CLIENT_SECRET)")
            })?;
            Some(ClientCredentials {
                client_id,
                client_secret,
            })
        }
        None => None,
    };

    let client = TableApiClient::new(
        ClientConfig {
            instance_url,
            credentials: Credentials {
                user_name,
                password,
            },
            client,
            timeout: Duration::from_secs(config.request_timeout_seconds),
        },
        cancel.clone(),
    )?;
    Ok(Arc::new(client))
}
