// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BlueZ adapter setup shared by both roles.

use anyhow::{Context, Result};
use bluer::Adapter;
use tracing::info;

/// Open a BlueZ session and return the powered default adapter.
///
/// Fails when BlueZ is not running or no adapter is present; the caller
/// cannot do anything useful without one.
pub async fn open_default_adapter() -> Result<Adapter> {
    // Create BlueZ session
    let session = bluer::Session::new()
        .await
        .context("Bluetooth is not available")?;
    info!("BlueZ session created");

    // Get the default adapter
    let adapter = session
        .default_adapter()
        .await
        .context("No Bluetooth adapter found")?;
    info!("Using Bluetooth adapter: {}", adapter.name());

    // Ensure adapter is powered on
    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    Ok(adapter)
}
