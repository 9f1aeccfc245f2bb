// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod common;

use common::{init_logging, response, FakeTransport};
use std::time::Duration;
use toffee_module::{CommandId, ControlDriver, ModuleError, StatusCode, MAX_PAYLOAD_SIZE};

const TIMEOUT: Duration = Duration::from_millis(1500);

async fn open_driver(transport: FakeTransport) -> ControlDriver<FakeTransport> {
    init_logging();
    let driver = ControlDriver::new(transport, TIMEOUT);
    driver.open().await.unwrap();
    driver
}

#[tokio::test]
async fn test_send_packet_frames_payload() {
    let transport = FakeTransport::silent();
    let sent = transport.sent_log();
    let driver = open_driver(transport).await;

    for len in 0..=MAX_PAYLOAD_SIZE {
        let payload = vec![0xA5u8; len];
        driver.send_packet(CommandId::Write, &payload).await.unwrap();
    }

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), MAX_PAYLOAD_SIZE + 1);
    for (len, frame) in sent.iter().enumerate() {
        assert_eq!(frame.len(), 32);
        assert_eq!(frame[0], 0x09);
        assert_eq!(frame[1], 0x58);
        assert!(frame[6..6 + len].iter().all(|&b| b == 0xA5));
        assert!(frame[6 + len..].iter().all(|&b| b == 0));
    }
}

#[tokio::test]
async fn test_sequence_id_increments_from_zero() {
    let transport = FakeTransport::silent();
    let sent = transport.sent_log();
    let driver = open_driver(transport).await;

    assert_eq!(driver.sequence_id().await, 0);
    for _ in 0..5 {
        driver.send_packet(CommandId::Pwd, &[]).await.unwrap();
    }
    assert_eq!(driver.sequence_id().await, 5);

    let sent = sent.lock().unwrap();
    for (expected, frame) in sent.iter().enumerate() {
        let sequence = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
        assert_eq!(sequence, expected as u32);
    }
}

#[tokio::test]
async fn test_oversized_payload_is_not_sent() {
    let transport = FakeTransport::silent();
    let sent = transport.sent_log();
    let driver = open_driver(transport).await;

    let result = driver
        .send_packet(CommandId::Write, &[0u8; MAX_PAYLOAD_SIZE + 1])
        .await;

    assert!(matches!(result, Err(ModuleError::ProtocolViolation(_))));
    assert!(sent.lock().unwrap().is_empty());
    assert_eq!(driver.sequence_id().await, 0);
}

#[tokio::test]
async fn test_execute_command_returns_status_and_payload() {
    let driver = open_driver(FakeTransport::scripted(vec![response(0x00, &[1, 2, 3])])).await;

    let response = driver.execute_command(CommandId::Pwd, &[]).await.unwrap();

    assert_eq!(response.status, StatusCode::Success);
    assert_eq!(response.payload, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_execute_command_timeout_reports_invalid_command() {
    let driver = open_driver(FakeTransport::silent()).await;

    let response = driver.execute_command(CommandId::Pwd, &[]).await.unwrap();

    assert_eq!(response.status, StatusCode::InvalidCommand);
    assert!(response.payload.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_try_execute_command_propagates_timeout() {
    let driver = open_driver(FakeTransport::silent()).await;

    let result = driver.try_execute_command(CommandId::Pwd, &[]).await;

    match result {
        Err(ModuleError::Timeout(after)) => assert_eq!(after, TIMEOUT),
        other => panic!("Expected Timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_receive_packet_times_out() {
    let driver = open_driver(FakeTransport::silent()).await;

    let start = tokio::time::Instant::now();
    let result = driver.receive_packet(Duration::from_millis(200)).await;

    assert!(matches!(result, Err(ModuleError::Timeout(_))));
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_receive_packet_accepts_first_report() {
    let transport = FakeTransport::silent().with_stale(vec![0xE6, 9]);
    let driver = open_driver(transport).await;

    let report = driver.receive_packet(TIMEOUT).await.unwrap();

    assert_eq!(report, vec![0xE6, 9]);
}

#[tokio::test]
async fn test_execute_command_discards_stale_reports() {
    let transport = FakeTransport::scripted(vec![response(0x00, b"fresh")])
        .with_stale(vec![0xEF])
        .with_stale(vec![0xE1, 1]);
    let driver = open_driver(transport).await;

    let response = driver.execute_command(CommandId::Cat, &[]).await.unwrap();

    assert_eq!(response.status, StatusCode::Success);
    assert_eq!(response.payload, b"fresh".to_vec());
}

#[tokio::test]
async fn test_empty_reports_are_skipped() {
    let transport = FakeTransport::silent().with_stale(Vec::new()).with_stale(vec![0xEA]);
    let driver = open_driver(transport).await;

    let report = driver.receive_packet(TIMEOUT).await.unwrap();

    assert_eq!(report, vec![0xEA]);
}

#[tokio::test]
async fn test_open_failure_is_transport_unavailable() {
    let driver = ControlDriver::new(FakeTransport::unavailable(), TIMEOUT);

    assert!(matches!(
        driver.open().await,
        Err(ModuleError::TransportUnavailable(_))
    ));
    assert!(!driver.is_open().await);
}

#[tokio::test]
async fn test_send_on_closed_driver_fails() {
    let driver = ControlDriver::new(FakeTransport::silent(), TIMEOUT);

    let result = driver.send_packet(CommandId::Ls, &[]).await;

    assert!(matches!(result, Err(ModuleError::TransportUnavailable(_))));
    assert_eq!(driver.sequence_id().await, 0);
}

#[tokio::test]
async fn test_open_and_close_are_idempotent() {
    let driver = open_driver(FakeTransport::silent()).await;

    driver.open().await.unwrap();
    assert!(driver.is_open().await);

    driver.close().await;
    driver.close().await;
    assert!(!driver.is_open().await);
}

#[tokio::test]
async fn test_sequence_survives_reopen() {
    let driver = open_driver(FakeTransport::silent()).await;

    driver.send_packet(CommandId::Ls, &[]).await.unwrap();
    driver.close().await;
    driver.open().await.unwrap();
    driver.send_packet(CommandId::Ls, &[]).await.unwrap();

    assert_eq!(driver.sequence_id().await, 2);
}
