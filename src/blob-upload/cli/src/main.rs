// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Upload a file as a block blob, using upload URIs from a token backend.

mod args;

use anyhow::Context;
use args::Args;
use azure_blob_upload::authorization::HttpTokenProvider;
use azure_blob_upload::client::Uploader;
use azure_blob_upload::retry_policy::{Recommended, RetryPolicyExt};
use azure_blob_upload::session::Progress;
use azure_blob_upload::source::FileSource;
use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const DESCRIPTION: &str = concat!(
    "This program uploads a file as a block blob.",
    " Each request is authorized with a short-lived upload URI obtained from",
    " the token backend, and a fresh URI is requested before every retry."
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    args.validate()?;
    enable_tracing()?;
    tracing::info!("Configuration: {args:?}");

    let object_name = args.object_name()?;
    let source = FileSource::open(&args.file)
        .await
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let provider = HttpTokenProvider::new(&args.token_endpoint)?;

    let builder = Uploader::builder().with_block_size(args.block_size);
    let builder = match args.max_commit_duration {
        Some(d) => builder.with_commit_retry_policy(Recommended.with_time_limit(d)),
        None => builder,
    };
    let uploader = builder.build()?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, stopping the upload");
            trigger.cancel();
        }
    });

    let request = uploader
        .upload_blob(provider, object_name, source)
        .with_content_type(&args.content_type)
        .with_cancellation(cancel);
    let reporter = tokio::spawn(report(request.progress()));
    let result = request.send().await;
    let _ = reporter.await;

    let outcome = result?;
    println!(
        "uploaded {} bytes in {} blocks to {}",
        outcome.size(),
        outcome.block_count(),
        outcome.url()
    );
    Ok(())
}

async fn report(mut progress: watch::Receiver<Progress>) {
    loop {
        let snapshot = progress.borrow_and_update().clone();
        eprintln!(
            "{:>6.1}% {}/{} bytes {:?}",
            snapshot.percent_uploaded(),
            snapshot.bytes_uploaded(),
            snapshot.size(),
            snapshot.state()
        );
        if snapshot.state().is_terminal() || progress.changed().await.is_err() {
            break;
        }
    }
}

fn enable_tracing() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
