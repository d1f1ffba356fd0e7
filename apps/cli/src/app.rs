//! Command handlers. Each prints its result as JSON on stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use blossom_client::{BlobServer, Client, Slot, Timeouts, exists, fan_out};
use blossom_media::{AvailabilityChecker, MediaUrlResolver, ProxySize};
use blossom_protocol::{
    BlobDescriptor, ServerEndpoint, ServerRole, Signer, is_sha256_hex, mime_for_extension,
};
use blossom_transfer::FileSource;
use blossom_upload::{
    FallbackPolicy, MirrorCoordinator, ServerMirrorResult, UploadBlob, UploadEvent,
    UploadOrchestrator,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::signer::CommandSigner;
use crate::{Command, ServerArgs};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Runs one command. `Ok(false)` means "ran fine, answer is no".
pub async fn run(command: Command, config: Config) -> anyhow::Result<bool> {
    match command {
        Command::Upload {
            file,
            mime,
            strict,
            no_mirror,
            servers,
        } => upload(&config, &file, mime, strict, no_mirror, &servers).await,
        Command::Mirror {
            descriptor,
            servers,
        } => mirror(&config, &descriptor, &servers).await,
        Command::Resolve {
            urls,
            sha256,
            author,
            width,
            height,
        } => {
            let resolver = MediaUrlResolver::new(
                config.servers_with(ServerRole::Mirror),
                config.servers_with(ServerRole::Proxy),
            )
            .with_size(ProxySize { width, height });
            let list = resolver.resolve(&urls, sha256.as_deref(), author.as_deref());
            print_json(&list)?;
            Ok(true)
        }
        Command::Check {
            sha256,
            ext,
            servers,
        } => check(&config, &sha256, ext.as_deref(), &servers).await,
        Command::Exists { sha256, servers } => exists_anywhere(&config, &sha256, &servers).await,
    }
}

async fn upload(
    config: &Config,
    file: &Path,
    mime: Option<String>,
    strict: bool,
    no_mirror: bool,
    args: &ServerArgs,
) -> anyhow::Result<bool> {
    let targets = select_servers(config, args, &[ServerRole::Upload])?;
    let signer = signer_from(config)?;

    let source = FileSource::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    let mime = mime
        .or_else(|| {
            file.extension()
                .and_then(|e| e.to_str())
                .and_then(mime_for_extension)
                .map(str::to_string)
        })
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let blob = UploadBlob::new(Arc::new(source), mime);

    let mut orchestrator_config = config.orchestrator();
    if strict {
        orchestrator_config.fallback = FallbackPolicy::Strict;
    }
    let mut orchestrator = UploadOrchestrator::new(Arc::clone(&signer), orchestrator_config);
    cancel_on_ctrl_c(orchestrator.cancel_token());
    if let Some(events) = orchestrator.take_events() {
        tokio::spawn(log_events(events));
    }

    info!(
        file = %file.display(),
        bytes = blob.len(),
        servers = targets.len(),
        "uploading"
    );
    let results = orchestrator
        .upload_to_servers(&blob, &clients(&targets, config.timeouts())?)
        .await?;

    let uploads: Vec<Value> = results
        .iter()
        .map(|r| match &r.outcome {
            Ok(descriptor) => json!({
                "server": r.server.base_url(),
                "method": r.method,
                "descriptor": descriptor,
            }),
            Err(e) => json!({
                "server": r.server.base_url(),
                "method": r.method,
                "error": e.to_string(),
            }),
        })
        .collect();

    let uploaded = results.iter().find_map(|r| r.descriptor()).cloned();
    let mut mirrors = Vec::new();
    if let Some(descriptor) = &uploaded
        && !no_mirror
    {
        let mirror_targets: Vec<ServerEndpoint> = config
            .servers_with(ServerRole::Mirror)
            .into_iter()
            .filter(|m| !targets.iter().any(|t| t.base_url() == m.base_url()))
            .collect();
        if !mirror_targets.is_empty() {
            let coordinator = MirrorCoordinator::new(signer);
            cancel_on_ctrl_c(coordinator.cancel_token());
            let results = coordinator
                .mirror_all(descriptor, &clients(&mirror_targets, config.timeouts())?)
                .await;
            mirrors = results.iter().map(mirror_json).collect();
        }
    }

    print_json(&json!({ "uploads": uploads, "mirrors": mirrors }))?;
    anyhow::ensure!(uploaded.is_some(), "upload failed on every server");
    Ok(true)
}

async fn mirror(config: &Config, path: &Path, args: &ServerArgs) -> anyhow::Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let descriptor: BlobDescriptor = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a blob descriptor", path.display()))?;

    let targets = select_servers(config, args, &[ServerRole::Mirror])?;
    let coordinator = MirrorCoordinator::new(signer_from(config)?);
    cancel_on_ctrl_c(coordinator.cancel_token());

    let results = coordinator
        .mirror_all(&descriptor, &clients(&targets, config.timeouts())?)
        .await;
    let report: Vec<Value> = results.iter().map(mirror_json).collect();
    print_json(&report)?;

    anyhow::ensure!(
        results.iter().any(|r| r.outcome.is_ok()),
        "mirror failed on every server"
    );
    Ok(true)
}

async fn check(
    config: &Config,
    sha256: &str,
    ext: Option<&str>,
    args: &ServerArgs,
) -> anyhow::Result<bool> {
    anyhow::ensure!(is_sha256_hex(sha256), "{sha256:?} is not a sha256 hex digest");
    let targets = select_servers(config, args, &[ServerRole::Upload, ServerRole::Mirror])?;

    let checker = AvailabilityChecker::new(config.availability());
    cancel_on_ctrl_c(checker.cancel_token());
    let results = checker
        .check(&clients(&targets, config.timeouts())?, sha256, ext)
        .await;

    let ordered: Vec<_> = targets
        .iter()
        .filter_map(|t| results.get(t.base_url()))
        .collect();
    print_json(&ordered)?;
    Ok(true)
}

async fn exists_anywhere(
    config: &Config,
    sha256: &str,
    args: &ServerArgs,
) -> anyhow::Result<bool> {
    anyhow::ensure!(is_sha256_hex(sha256), "{sha256:?} is not a sha256 hex digest");
    let targets = select_servers(config, args, &[ServerRole::Upload, ServerRole::Mirror])?;
    let servers = clients(&targets, config.timeouts())?;

    let hash: Arc<str> = Arc::from(sha256.to_ascii_lowercase());
    let slots = fan_out(&servers, &CancellationToken::new(), |server| {
        let hash = Arc::clone(&hash);
        async move { exists(server.as_ref(), &hash).await }
    })
    .await;

    let mut report = serde_json::Map::new();
    let mut found = false;
    for (target, slot) in targets.iter().zip(slots) {
        let present = matches!(slot, Slot::Done(true));
        found |= present;
        report.insert(target.base_url().to_string(), Value::Bool(present));
    }
    print_json(&report)?;
    Ok(found)
}

/// `--server` flags win over the config file.
fn select_servers(
    config: &Config,
    args: &ServerArgs,
    roles: &[ServerRole],
) -> anyhow::Result<Vec<ServerEndpoint>> {
    let servers: Vec<ServerEndpoint> = if args.servers.is_empty() {
        config
            .servers
            .iter()
            .filter(|s| roles.contains(&s.role()))
            .cloned()
            .collect()
    } else {
        args.servers
            .iter()
            .map(|url| ServerEndpoint::parse(url, roles[0]))
            .collect::<Result<_, _>>()?
    };

    let mut unique: Vec<ServerEndpoint> = Vec::with_capacity(servers.len());
    for server in servers {
        if !unique.iter().any(|u| u.base_url() == server.base_url()) {
            unique.push(server);
        }
    }
    anyhow::ensure!(
        !unique.is_empty(),
        "no {} servers: pass --server or add [[servers]] to the config file",
        roles[0]
    );
    Ok(unique)
}

fn clients(
    endpoints: &[ServerEndpoint],
    timeouts: Timeouts,
) -> anyhow::Result<Vec<Arc<dyn BlobServer>>> {
    endpoints
        .iter()
        .map(|e| -> anyhow::Result<Arc<dyn BlobServer>> {
            let client = Client::new(e.clone())?.with_timeouts(timeouts);
            Ok(Arc::new(client))
        })
        .collect()
}

fn signer_from(config: &Config) -> anyhow::Result<Arc<dyn Signer>> {
    let signer = CommandSigner::from_command(&config.signer_command)
        .context("signer_command is not set in the config file")?;
    Ok(Arc::new(signer))
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("SIGINT received, cancelling");
            token.cancel();
        }
    });
}

async fn log_events(mut events: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::StateChanged { server, state } => {
                debug!(server = %server, %state, "session state");
            }
            UploadEvent::Progress { server, progress } => {
                info!(
                    server = %server,
                    percent = progress.percentage(),
                    bytes = progress.bytes_transferred,
                    bytes_per_second = progress.bytes_per_second,
                    eta_secs = progress.eta.map(|d| d.as_secs()),
                    "progress"
                );
            }
            UploadEvent::FallingBack { server, reason } => {
                warn!(server = %server, reason = %reason, "falling back to single-shot upload");
            }
            UploadEvent::Completed {
                server,
                method,
                descriptor,
            } => {
                info!(server = %server, %method, url = %descriptor.url, "stored");
            }
            UploadEvent::Failed { server, error } => {
                warn!(server = %server, error = %error, "upload failed");
            }
        }
    }
}

fn mirror_json(result: &ServerMirrorResult) -> Value {
    match &result.outcome {
        Ok(descriptor) => json!({
            "server": result.server.base_url(),
            "existing": result.existing,
            "descriptor": descriptor,
        }),
        Err(e) => json!({
            "server": result.server.base_url(),
            "error": e.to_string(),
        }),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
