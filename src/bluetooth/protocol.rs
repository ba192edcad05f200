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

//! Two-byte command/response packet format.
//!
//! Every packet is `[data, footer]`. Commands carry the command code and the
//! fixed command marker; responses carry the LED state and the response type.
//! Decoding never fails structurally: anything unexpected is classified as an
//! application level error.

use std::fmt;

/// Length of every packet in both directions.
pub const TRANSMISSION_LENGTH: usize = 2;

/// Position of the command code / LED state.
pub const DATA_POSITION: usize = 0;

/// Position of the command marker / response type.
pub const FOOTER_POSITION: usize = 1;

/// Footer value that marks a packet as a command.
pub const COMMAND_FOOTER: u8 = 1;

/// Command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedCommand {
    On = 1,
    Off = 2,
}

impl LedCommand {
    /// Parse from a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::On),
            2 => Some(Self::Off),
            _ => None,
        }
    }

    /// Parse from user input ("on", "off", "1", "2").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "on" | "1" => Some(Self::On),
            "off" | "2" => Some(Self::Off),
            _ => None,
        }
    }

    /// The LED state this command produces.
    pub fn resulting_state(self) -> LedState {
        match self {
            Self::On => LedState::On,
            Self::Off => LedState::Off,
        }
    }
}

/// LED state as carried in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LedState {
    On = 1,
    Off = 2,
}

impl LedState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::On),
            2 => Some(Self::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    Error = 0,
    Confirmation = 1,
}

/// How an incoming command write was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFrame {
    /// A well-formed LED command.
    Command(LedCommand),
    /// Correct footer but the code is not a known command.
    UnknownCode(u8),
    /// Too short or the footer is not the command marker.
    NotACommand,
}

/// Result of decoding a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecode {
    /// Confirmation carrying a known LED state.
    State(LedState),
    /// Error response, wrong type byte, short packet or unknown state.
    Error,
}

/// Build the command packet for `command`.
pub fn encode_command(command: LedCommand) -> [u8; TRANSMISSION_LENGTH] {
    let mut packet = [0u8; TRANSMISSION_LENGTH];
    packet[DATA_POSITION] = command as u8;
    packet[FOOTER_POSITION] = COMMAND_FOOTER;
    packet
}

/// Classify an incoming command write.
pub fn classify_command(data: &[u8]) -> CommandFrame {
    if data.len() < TRANSMISSION_LENGTH || data[FOOTER_POSITION] != COMMAND_FOOTER {
        return CommandFrame::NotACommand;
    }

    let code = data[DATA_POSITION];
    match LedCommand::from_code(code) {
        Some(command) => CommandFrame::Command(command),
        None => CommandFrame::UnknownCode(code),
    }
}

/// Decode a command write, returning only dispatchable commands.
pub fn decode_command(data: &[u8]) -> Option<LedCommand> {
    match classify_command(data) {
        CommandFrame::Command(command) => Some(command),
        _ => None,
    }
}

/// Build a confirmation response for `state`.
pub fn encode_response(state: LedState) -> [u8; TRANSMISSION_LENGTH] {
    let mut packet = [0u8; TRANSMISSION_LENGTH];
    packet[DATA_POSITION] = state as u8;
    packet[FOOTER_POSITION] = ResponseType::Confirmation as u8;
    packet
}

/// Decode a response notification.
pub fn decode_response(data: &[u8]) -> ResponseDecode {
    if data.len() < TRANSMISSION_LENGTH
        || data[FOOTER_POSITION] != ResponseType::Confirmation as u8
    {
        return ResponseDecode::Error;
    }

    match LedState::from_code(data[DATA_POSITION]) {
        Some(state) => ResponseDecode::State(state),
        None => ResponseDecode::Error,
    }
}

/// Upper-case hex rendering of a packet for logs.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode_upper(data)
}
