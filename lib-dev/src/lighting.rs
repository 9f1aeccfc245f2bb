// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::error::{ModuleError, Result};
use crate::hid_commands::{CommandId, Response};
use crate::hid_device::{ControlDriver, ReportTransport};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lighting state as reported by the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightingState {
    pub effect: u8,
    pub speed: u8,
    pub brightness: u8,
    pub hue: u8,
    pub saturation: u8,
}

impl LightingState {
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 5 {
            return Err(ModuleError::ProtocolViolation(format!(
                "lighting state needs 5 bytes, got {}",
                buffer.len()
            )));
        }

        Ok(Self {
            effect: buffer[0],
            speed: buffer[1],
            brightness: buffer[2],
            hue: buffer[3],
            saturation: buffer[4],
        })
    }
}

impl fmt::Display for LightingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "effect: {}, speed: {}, brightness: {}, hue: {}, saturation: {}",
            self.effect, self.speed, self.brightness, self.hue, self.saturation
        )
    }
}

/// Lighting commands of the module.
///
/// Every setter waits for the module's acknowledgment, so consecutive
/// changes reach the module one at a time.
pub struct LightingClient<'a, T: ReportTransport> {
    driver: &'a ControlDriver<T>,
}

impl<'a, T: ReportTransport> LightingClient<'a, T> {
    pub fn new(driver: &'a ControlDriver<T>) -> Self {
        Self { driver }
    }

    pub async fn set_animation(&self, effect_id: u8) -> Result<Response> {
        self.driver
            .execute_command(CommandId::SetAnimation, &[effect_id])
            .await
    }

    pub async fn set_speed(&self, speed: u8) -> Result<Response> {
        self.driver.execute_command(CommandId::SetSpeed, &[speed]).await
    }

    pub async fn set_brightness(&self, brightness: u8) -> Result<Response> {
        self.driver
            .execute_command(CommandId::SetBrightness, &[brightness])
            .await
    }

    pub async fn set_color(&self, hue: u8, saturation: u8) -> Result<Response> {
        self.driver
            .execute_command(CommandId::SetColorHs, &[hue, saturation])
            .await
    }

    pub async fn get_lighting_state(&self) -> Result<LightingState> {
        let response = self
            .driver
            .execute_command(CommandId::GetLightingState, &[])
            .await?;
        debug!("Lighting state: {}, {:02x?}", response.status, response.payload);

        let state = LightingState::from_buffer(&response.payload)?;
        if !response.status.is_success() {
            return Err(ModuleError::DeviceError(response.status));
        }

        Ok(state)
    }
}
