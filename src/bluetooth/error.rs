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

//! Errors reported by the BLE roles.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BleError {
    #[error("bluetooth stack error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("invalid advertising name {name:?}: {reason}")]
    InvalidAdvertisingName { name: String, reason: &'static str },

    #[error("no bluetooth device provided")]
    NoPeer,

    #[error("operation not allowed while {0}")]
    InvalidState(&'static str),

    #[error("service {0} not found on peer")]
    ServiceNotFound(uuid::Uuid),

    #[error("{0} characteristic is not bound")]
    CharacteristicNotBound(&'static str),

    #[error("not connected")]
    NotConnected,
}

pub type BleResult<T> = std::result::Result<T, BleError>;
