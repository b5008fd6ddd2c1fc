use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;

use cilens_sync::config::{FileConfig, ProviderKind};
use cilens_sync::models::{PipelineFilter, WebhookEnvelope};
use cilens_sync::providers::normalize::normalize_status;
use cilens_sync::{CiProvider, ProviderRegistry};

use crate::output::{print_health, print_pipelines, print_providers, Spinner};

#[derive(Parser)]
#[command(name = "cilens-sync")]
#[command(author, version, about = "Normalize CI/CD pipeline data across providers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cilens-sync.toml or the user config dir)
    #[arg(short, long, global = true, env = "CILENS_SYNC_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered provider types
    Providers {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Connect every configured provider and report its health
    Health {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Fetch recent pipelines of a repository
    Pipelines {
        #[arg(short = 'P', long)]
        provider: ProviderKind,

        /// `owner/repo` on GitHub, project id or path on GitLab, job path on Jenkins
        #[arg(short, long)]
        repo: String,

        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Only pipelines updated after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Status filter, e.g. `failed` or `success` (repeatable)
        #[arg(short, long)]
        status: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Fetch a single pipeline, or one run of it
    Pipeline {
        #[arg(short = 'P', long)]
        provider: ProviderKind,

        #[arg(long)]
        id: String,

        #[arg(long)]
        run: Option<String>,
    },

    /// Fetch log lines of a pipeline run
    Logs {
        #[arg(short = 'P', long)]
        provider: ProviderKind,

        #[arg(long)]
        pipeline: String,

        #[arg(long)]
        run: String,

        #[arg(long)]
        job: Option<String>,

        #[arg(long)]
        step: Option<String>,
    },

    /// Verify and map a captured webhook delivery
    Webhook {
        #[arg(short = 'P', long)]
        provider: ProviderKind,

        /// Event name as sent in the provider's event header
        #[arg(short, long)]
        event: String,

        /// File holding the raw request body
        #[arg(long)]
        payload: PathBuf,

        /// Signature header value
        #[arg(long)]
        signature: Option<String>,
    },
}

impl Cli {
    pub async fn execute(&self, registry: &ProviderRegistry) -> Result<()> {
        let file_config = FileConfig::load(self.config.as_deref())?;

        match &self.command {
            Commands::Providers { json } => {
                let descriptors = registry.registered_providers();
                if *json || self.output.is_some() {
                    self.emit(&descriptors)
                } else {
                    print_providers(&descriptors);
                    Ok(())
                }
            }
            Commands::Health { json } => self.execute_health(registry, &file_config, *json).await,
            Commands::Pipelines {
                provider,
                repo,
                branch,
                limit,
                since,
                status,
                json,
            } => {
                let filter = PipelineFilter {
                    branch: branch.clone(),
                    limit: Some(*limit),
                    since: *since,
                    status: status.iter().map(|s| normalize_status(s)).collect(),
                };
                let provider = build_provider(registry, &file_config, *provider)?;
                self.execute_pipelines(provider.as_ref(), repo, &filter, *json)
                    .await
            }
            Commands::Pipeline { provider, id, run } => {
                let provider = build_provider(registry, &file_config, *provider)?;
                let spinner = Spinner::start(format!("Fetching pipeline {id}"));
                let result = match run {
                    Some(run) => provider.fetch_pipeline_run(id, run).await,
                    None => provider.fetch_pipeline(id).await,
                };
                let pipeline = finish_spinner(spinner, result, "Fetched pipeline")?;
                self.emit(&pipeline)
            }
            Commands::Logs {
                provider,
                pipeline,
                run,
                job,
                step,
            } => {
                let provider = build_provider(registry, &file_config, *provider)?;
                let spinner = Spinner::start("Fetching logs");
                let result = provider
                    .fetch_logs(pipeline, run, job.as_deref(), step.as_deref())
                    .await;
                let lines = finish_spinner(spinner, result, "Fetched logs")?;
                info!("Fetched {} log lines", lines.len());
                self.emit(&lines)
            }
            Commands::Webhook {
                provider,
                event,
                payload,
                signature,
            } => {
                let provider = build_provider(registry, &file_config, *provider)?;
                self.execute_webhook(provider.as_ref(), event, payload, signature.as_deref())
            }
        }
    }

    async fn execute_health(
        &self,
        registry: &ProviderRegistry,
        file_config: &FileConfig,
        json: bool,
    ) -> Result<()> {
        for kind in ProviderKind::ALL {
            match try_build_provider(registry, file_config, kind) {
                Ok(Some(_)) => info!("Configured {kind} provider"),
                Ok(None) => info!("Skipping {kind}: no credentials configured"),
                Err(err) => warn!("Skipping {kind}: {err}"),
            }
        }

        let spinner = Spinner::start("Checking provider connections");
        let report = registry.health_check().await;
        spinner.finish(format!("Checked {} instances", report.len()));

        if json || self.output.is_some() {
            self.emit(&report)
        } else {
            print_health(&report);
            Ok(())
        }
    }

    async fn execute_pipelines(
        &self,
        provider: &dyn CiProvider,
        repository: &str,
        filter: &PipelineFilter,
        json: bool,
    ) -> Result<()> {
        info!(
            "Fetching up to {} {} pipelines for {repository}",
            filter.limit(),
            provider.provider_type()
        );

        let spinner = Spinner::start(format!("Fetching pipelines for {repository}"));
        let result = provider.fetch_pipelines(repository, filter).await;
        let pipelines = finish_spinner(spinner, result, "Fetched pipelines")?;

        if json || self.output.is_some() {
            self.emit(&pipelines)
        } else {
            print_pipelines(repository, &pipelines);
            Ok(())
        }
    }

    fn execute_webhook(
        &self,
        provider: &dyn CiProvider,
        event: &str,
        payload_path: &Path,
        signature: Option<&str>,
    ) -> Result<()> {
        let raw = std::fs::read(payload_path)
            .with_context(|| format!("Failed to read payload file: {}", payload_path.display()))?;

        if let Some(signature) = signature {
            if !provider.verify_webhook_signature(&raw, signature) {
                bail!("Webhook signature does not match the configured secret");
            }
            info!("Webhook signature verified");
        }

        let envelope = WebhookEnvelope::from_raw(
            provider.provider_type(),
            event,
            &raw,
            signature.map(str::to_string),
        );
        let record = provider.process_webhook(&envelope);
        if record.is_none() {
            warn!(
                "Event '{event}' is not mapped by the {} provider (supported: {})",
                provider.provider_type(),
                provider.supported_events().join(", ")
            );
        }

        self.emit(&record)
    }

    /// Writes `value` as JSON to `--output`, or stdout.
    fn emit<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)
                .with_context(|| format!("Failed to write output: {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

/// Builds and caches the provider under its type name. The config file section
/// wins over environment variables.
fn try_build_provider(
    registry: &ProviderRegistry,
    file_config: &FileConfig,
    kind: ProviderKind,
) -> Result<Option<Arc<dyn CiProvider>>> {
    let instance_id = kind.as_str();

    if let Some(config) = file_config.provider_config(kind) {
        let provider = registry.create_provider(kind.as_str(), config, Some(instance_id))?;
        return Ok(Some(provider));
    }

    Ok(registry.create_provider_from_env(kind.as_str(), Some(instance_id))?)
}

fn build_provider(
    registry: &ProviderRegistry,
    file_config: &FileConfig,
    kind: ProviderKind,
) -> Result<Arc<dyn CiProvider>> {
    try_build_provider(registry, file_config, kind)
        .with_context(|| format!("Failed to configure the {kind} provider"))?
        .with_context(|| format!("No credentials for {kind}: add a [{kind}] section to the config file or set its environment variables"))
}

fn finish_spinner<T>(
    spinner: Spinner,
    result: cilens_sync::Result<T>,
    done: &str,
) -> Result<T> {
    match result {
        Ok(value) => {
            spinner.finish(done);
            Ok(value)
        }
        Err(err) => {
            spinner.fail(&err);
            Err(err.into())
        }
    }
}
