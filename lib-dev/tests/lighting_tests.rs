// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

mod common;

use common::{init_logging, response, FakeTransport};
use std::time::Duration;
use toffee_module::{ControlDriver, LightingClient, LightingState, ModuleError, StatusCode};

const TIMEOUT: Duration = Duration::from_millis(1500);

async fn open_driver(transport: FakeTransport) -> ControlDriver<FakeTransport> {
    init_logging();
    let driver = ControlDriver::new(transport, TIMEOUT);
    driver.open().await.unwrap();
    driver
}

#[tokio::test]
async fn test_setters_send_one_command_each() {
    let transport = FakeTransport::scripted(vec![
        response(0x00, &[]),
        response(0x00, &[]),
        response(0x00, &[]),
        response(0x00, &[]),
    ]);
    let sent = transport.sent_log();
    let driver = open_driver(transport).await;
    let lighting = LightingClient::new(&driver);

    lighting.set_animation(3).await.unwrap();
    lighting.set_speed(128).await.unwrap();
    lighting.set_brightness(255).await.unwrap();
    lighting.set_color(10, 200).await.unwrap();

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 4);
    assert_eq!(&sent[0][1..2], &[0x71]);
    assert_eq!(sent[0][6], 3);
    assert_eq!(&sent[1][1..2], &[0x72]);
    assert_eq!(sent[1][6], 128);
    assert_eq!(&sent[2][1..2], &[0x74]);
    assert_eq!(sent[2][6], 255);
    assert_eq!(&sent[3][1..2], &[0x75]);
    assert_eq!(&sent[3][6..8], &[10, 200]);
    assert!(sent[3][8..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_setter_returns_acknowledgment() {
    let driver = open_driver(FakeTransport::scripted(vec![response(0xEF, &[])])).await;
    let lighting = LightingClient::new(&driver);

    let ack = lighting.set_speed(1).await.unwrap();

    assert_eq!(ack.status, StatusCode::InvalidCommand);
}

#[tokio::test]
async fn test_get_lighting_state() {
    let driver = open_driver(FakeTransport::scripted(vec![response(0x00, &[4, 100, 200, 30, 40, 0, 0])])).await;
    let lighting = LightingClient::new(&driver);

    let state = lighting.get_lighting_state().await.unwrap();

    assert_eq!(
        state,
        LightingState {
            effect: 4,
            speed: 100,
            brightness: 200,
            hue: 30,
            saturation: 40,
        }
    );
    assert_eq!(
        format!("{}", state),
        "effect: 4, speed: 100, brightness: 200, hue: 30, saturation: 40"
    );
}

#[tokio::test]
async fn test_get_lighting_state_short_payload() {
    let driver = open_driver(FakeTransport::scripted(vec![response(0x00, &[1, 2, 3, 4])])).await;
    let lighting = LightingClient::new(&driver);

    assert!(matches!(
        lighting.get_lighting_state().await,
        Err(ModuleError::ProtocolViolation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_get_lighting_state_without_answer() {
    let driver = open_driver(FakeTransport::silent()).await;
    let lighting = LightingClient::new(&driver);

    assert!(matches!(
        lighting.get_lighting_state().await,
        Err(ModuleError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn test_get_lighting_state_device_error() {
    let driver = open_driver(FakeTransport::scripted(vec![response(0xEF, &[0, 0, 0, 0, 0])])).await;
    let lighting = LightingClient::new(&driver);

    match lighting.get_lighting_state().await {
        Err(ModuleError::DeviceError(status)) => assert_eq!(status, StatusCode::InvalidCommand),
        other => panic!("Expected DeviceError, got {:?}", other),
    }
}
