//! Sync command implementation.
//!
//! Runs one sync session against an HTTP endpoint: reconcile every known
//! bucket, then push whatever the remote is missing.

use kvsync_engine::{
    HttpClient, HttpGateway, HttpMethod, HttpRequest, HttpResponse, SyncConfig, SyncedStore,
};
use kvsync_storage::FileStore;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Blocking [`HttpClient`] backed by `ureq`.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    /// Creates a client with its own connection pool.
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let method = match request.method {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
        };
        let mut call = self
            .agent
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match &request.body {
            Some(body) => call.send_bytes(body),
            None => call.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => return Err(transport.to_string()),
        };

        let status = response.status();
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body))
    }
}

/// Runs the sync command.
pub fn run(
    path: &Path,
    endpoint: &str,
    token: Option<String>,
    buckets: &[String],
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = SyncConfig::new(endpoint);
    for bucket in buckets {
        config = config.with_bucket(super::bucket_arg(Some(bucket)));
    }

    if token.is_none() {
        println!("No token given; running local-only");
    }

    let store = FileStore::open_with_create_dirs(path)?;
    let gateway = HttpGateway::new(&config, UreqClient::new(), move || token.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        info!(url = %config.sync_url(), "starting sync session");
        let synced = SyncedStore::open(config, store, gateway)?;
        synced.wait_reconciled().await;

        let report = if force {
            synced.force_push().await?
        } else {
            synced.clone().shutdown().await?
        };
        let stats = synced.stats();

        println!("Sync complete");
        println!("  Buckets reconciled: {}", stats.buckets_reconciled);
        println!("  Buckets failed:     {}", stats.buckets_failed);
        println!("  Entries adopted:    {}", stats.entries_adopted);
        println!("  Pushed:             {}", report.pushed.len());
        println!("  Skipped (no login): {}", report.skipped.len());
        for (bucket, error) in &report.failed {
            println!("  Failed {bucket}: {error}");
        }
        if let Some(error) = stats.last_error {
            println!("  Last error:         {error}");
        }

        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
