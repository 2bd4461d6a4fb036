use std::path::PathBuf;

use log::{debug, info};

use crate::config::Config;
use crate::error::Error;
use crate::export::RecordExporter;
use crate::gmail_api::{
    ConsentFlow, CredentialManager, CredentialStore, GmailClientBuilder, MailSource,
    TokenRefresher,
};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub listed: usize,
    pub written: usize,
    pub skipped: usize,
    pub output: PathBuf,
}

/// Authenticates, then lists, fetches and exports in one pass.
pub async fn run<S, R, F>(
    config: &Config,
    credentials: &CredentialManager<S, R, F>,
    http: reqwest::Client,
) -> Result<RunSummary, Error>
where
    S: CredentialStore,
    R: TokenRefresher,
    F: ConsentFlow,
{
    info!("Authenticating");
    let credential = credentials.obtain().await?;

    let client = GmailClientBuilder::new(http, config).authenticate(&credential);
    export_messages(&client, config).await
}

/// Everything after authentication: list, fetch each message in order, write the file.
pub async fn export_messages<M>(source: &M, config: &Config) -> Result<RunSummary, Error>
where
    M: MailSource + ?Sized,
{
    info!(
        "Listing up to {} messages{}",
        config.max_results,
        config
            .filter
            .as_deref()
            .map(|q| format!(" matching {:?}", q))
            .unwrap_or_default()
    );
    let summaries = source
        .list_messages(config.max_results, config.filter.as_deref())
        .await;
    if summaries.is_empty() {
        info!("No messages found");
    }

    let mut batch = Vec::with_capacity(summaries.len());
    for summary in summaries {
        debug!("Fetching message {}", summary.id);
        let detail = source.fetch_detail(&summary.id).await;
        batch.push((summary, detail));
    }
    let fetched = batch.iter().filter(|(_, detail)| detail.is_some()).count();

    let exporter = RecordExporter::new(&config.output_path, config.missing_header.as_str());
    info!(
        "Exporting {} messages to {}",
        fetched,
        exporter.path().display()
    );
    let written = exporter.export(&batch)?;

    Ok(RunSummary {
        listed: batch.len(),
        written,
        skipped: batch.len() - written,
        output: config.output_path.clone(),
    })
}
