// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::cdc::BulkChannel;
use crate::config::ProtocolTimings;
use crate::error::Result;
use crate::hid_commands::{CommandId, StatusCode};
use crate::hid_device::{ControlDriver, ReportTransport};
use crate::records::FileRecord;
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::sleep;

/// Filesystem commands of the module
pub struct FilesystemClient<'a, T: ReportTransport> {
    driver: &'a ControlDriver<T>,
    settle: Duration,
}

impl<'a, T: ReportTransport> FilesystemClient<'a, T> {
    pub fn new(driver: &'a ControlDriver<T>, timings: &ProtocolTimings) -> Self {
        Self {
            driver,
            settle: timings.ls_all_settle(),
        }
    }

    /// List the current directory, following pagination.
    ///
    /// A failure status ends the listing; entries collected up to that point
    /// are returned.
    pub async fn ls(&self) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut command = CommandId::Ls;

        loop {
            let response = self.driver.execute_command(command, &[]).await?;

            match response.status {
                StatusCode::Success | StatusCode::MoreEntries => {
                    parse_entries(&response.payload, &mut entries);
                }
                status => {
                    error!("{} failed with {}", command, status);
                    break;
                }
            }

            if response.status != StatusCode::MoreEntries {
                break;
            }

            debug!("More entries to fetch, sending {}", CommandId::LsNext);
            command = CommandId::LsNext;
        }

        Ok(entries)
    }

    /// Trigger a dump of every file over the bulk channel and collect it.
    ///
    /// The bulk channel must already be connected; otherwise nothing is
    /// received and the result is empty.
    pub async fn ls_all(&self, bulk: &BulkChannel) -> Result<Vec<FileRecord>> {
        self.driver.send_packet(CommandId::LsAll, &[]).await?;
        debug!("{} sent, waiting {:?} for the bulk session", CommandId::LsAll, self.settle);

        sleep(self.settle).await;

        if !bulk.is_connected().await {
            error!("Bulk channel is not connected, skipping file reception");
            return Ok(Vec::new());
        }

        let files = bulk.receive_files().await?;
        info!("Received {} files", files.len());
        Ok(files)
    }
}

/// Split a listing payload on NUL bytes, skipping empty names
fn parse_entries(payload: &[u8], entries: &mut Vec<String>) {
    let decoded = String::from_utf8_lossy(payload);
    entries.extend(
        decoded
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string),
    );
}
