/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;

use crate::config::{Config, DemoSessionConfig};
use clap::Parser;
use geoclue_broker::sources::static_source::StaticSource;
use geoclue_broker::{
    Broker, BrokerError, BrokerHandle, ProviderDescriptor, SessionEvent, SessionRequirements,
    StaticAuthorizer,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Runs the geolocation broker with one demo session")]
struct BrokerArgs {
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
    /// Print session events as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    info!("Started configurable-broker");

    let args = BrokerArgs::parse();
    let config = Config::load(&args.config)?;

    let authorizer = Arc::new(StaticAuthorizer::new(config.policy.clone()));
    let mut broker = Broker::new(config.broker.clone(), authorizer);

    if let Some(dir) = &config.descriptors_dir {
        let loaded = broker.load_descriptor_dir(dir)?;
        info!(dir = %dir.display(), providers = ?loaded, "loaded provider descriptors");
    }

    let known = broker.provider_names();
    for static_source in &config.static_sources {
        let source = Arc::new(StaticSource::new(
            static_source.provider.clone(),
            static_source.location(),
            static_source.level,
        ));
        if known.contains(&static_source.provider) {
            broker.attach_source(&static_source.provider, source)?;
        } else {
            // No descriptor on disk: register a plain one for the manual position.
            broker.add_provider(
                ProviderDescriptor::new(static_source.provider.clone()).with_accuracy(static_source.level),
                source,
            )?;
        }
    }
    info!(providers = ?broker.provider_names(), "providers ready");

    let handle = broker.handle();
    let runner = tokio::spawn(broker.run());

    let outcome = run_demo_session(&handle, &config.session, args.json).await;

    handle.shutdown();
    runner.await?;
    outcome.map_err(Into::into)
}

async fn run_demo_session(
    handle: &BrokerHandle,
    config: &DemoSessionConfig,
    json: bool,
) -> Result<(), BrokerError> {
    let mut session = handle.create_session(&config.peer).await?;
    session.set_desktop_id(&config.desktop_id).await?;
    session
        .set_requirements(SessionRequirements::default().with_accuracy(config.accuracy))
        .await?;
    session.set_thresholds(config.thresholds).await?;
    session.set_interfaces(config.interface_set()).await?;

    if let Err(err) = session.start().await {
        warn!(desktop_id = %config.desktop_id, err = %err, "demo session could not start");
        return Err(err);
    }

    let deadline = tokio::time::sleep(Duration::from_secs(config.run_for_s));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = session.recv_event() => match event {
                Ok(event) => print_event(&event, json),
                Err(_) => break,
            },
        }
    }

    let snapshot = session.snapshot().await?;
    if json {
        match serde_json::to_string(&snapshot) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(err = %err, "unable to encode session snapshot"),
        }
    } else {
        println!("{snapshot:#?}");
    }
    session.stop().await?;
    session.delete().await
}

fn print_event(event: &SessionEvent, json: bool) {
    if !json {
        println!("{event:?}");
        return;
    }
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(err = %err, "unable to encode session event"),
    }
}
