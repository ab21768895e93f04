//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Kioken server
//!
//! Accepts connections on 0.0.0.0:1234 and logs connection statistics once
//! per second until interrupted with Ctrl-C. Log filtering follows `RUST_LOG`.

use kioken_service::{ServerConfig, TcpServer, TracingSink};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::default();
    let server = TcpServer::new(config).await?;
    server.start(Some(Arc::new(TracingSink)))?;

    info!("Listening on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");

    server.shutdown().await?;

    Ok(())
}
