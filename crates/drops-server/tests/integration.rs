mod common;

use common::*;
use std::time::Duration;

#[tokio::test]
async fn blank_list() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(client.call("LIST").await, "LIST");
}

#[tokio::test]
async fn list_takes_no_arguments() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(client.call("LIST SOMETHING").await, "ERR");
}

#[tokio::test]
async fn register_then_list() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(client.call("LIST").await, "LIST water:source");
}

#[tokio::test]
async fn register_requires_type() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water").await, "ERR");
    assert_eq!(station.call("LIST").await, "LIST");
}

#[tokio::test]
async fn metric_requires_registration() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(client.call("METRIC test 10.000").await, "ERR");
    assert_eq!(client.call("DONE test n1").await, "ERR");
    assert_eq!(client.call("ERR test n1").await, "ERR");
}

#[tokio::test]
async fn metric_names_listed() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(station.call("METRIC level 91.120").await, "ACK");
    assert_eq!(station.call("METRICS water").await, "METRICS water level");
}

#[tokio::test]
async fn metric_requires_float() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(station.call("METRIC level something").await, "ERR");
}

#[tokio::test]
async fn metric_series_listed() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    for v in 1..=3 {
        assert_eq!(station.call(&format!("METRIC level {v}")).await, "ACK");
    }
    assert_eq!(
        station.call("METRICS water level").await,
        "METRICS water level 0:1.00 0:2.00 0:3.00"
    );
}

#[tokio::test]
async fn double_registration_fails() {
    let server = start_server().await;
    let mut first = TestClient::connect(&server.addr).await;
    let mut second = TestClient::connect(&server.addr).await;

    assert_eq!(first.call("REGISTER water source").await, "ACK");
    assert_eq!(second.call("REGISTER water barrel").await, "ERR");
    assert_eq!(second.call("LIST").await, "LIST water:source");
}

#[tokio::test]
async fn second_register_on_same_connection_fails() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(station.call("REGISTER porch light").await, "ERR");
    assert_eq!(station.call("LIST").await, "LIST water:source");
}

#[tokio::test]
async fn unknown_metric_fails() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(station.call("METRICS water level").await, "ERR");
}

#[tokio::test]
async fn max_metric_count() {
    let mut config = test_config();
    config.limits.max_metric_points = 4;
    let server = start_server_with(config).await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    for v in 1..=5 {
        assert_eq!(station.call(&format!("METRIC level {v}")).await, "ACK");
    }
    assert_eq!(
        station.call("METRICS water level").await,
        "METRICS water level 0:2.00 0:3.00 0:4.00 0:5.00"
    );
}

#[tokio::test]
async fn unknown_command_keeps_connection() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(client.call("DOODLE").await, "ERR UNRECOGNIZED CMD");
    assert_eq!(client.call("").await, "ERR UNRECOGNIZED CMD");
    assert_eq!(client.call("LIST").await, "LIST");
}

#[tokio::test]
async fn rpc_success() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(client.call("LIST").await, "LIST water:source");

    assert_eq!(client.call("RUN water test 1 on").await, "ACK");
    assert_eq!(station.recv().await, "RUN test 1 on");

    assert_eq!(station.call("DONE test 1 0").await, "ACK");
    assert_eq!(client.recv().await, "DONE water test 1 0");

    // The nonce was consumed.
    assert_eq!(station.call("DONE test 1 0").await, "ERR");
}

#[tokio::test]
async fn rpc_failure() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");

    assert_eq!(client.call("RUN water test 1").await, "ACK");
    assert_eq!(station.recv().await, "RUN test 1");

    assert_eq!(station.call("ERR test 1").await, "ACK");
    assert_eq!(client.recv().await, "ERR water test 1");
}

#[tokio::test]
async fn rpc_unknown_station() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(client.call("RUN porch test 1").await, "ERR");
}

#[tokio::test]
async fn rpc_nonce_in_use() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut first = TestClient::connect(&server.addr).await;
    let mut second = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(first.call("RUN water test 1").await, "ACK");
    assert_eq!(second.call("RUN water test 1").await, "ERR");
    assert_eq!(station.recv().await, "RUN test 1");
    assert!(station.is_silent(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn station_disconnect_fails_pending_runs() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(client.call("RUN water test 1").await, "ACK");
    assert_eq!(station.recv().await, "RUN test 1");

    drop(station);

    assert_eq!(client.recv().await, "ERR water test 1");
    server.wait_unregistered("water").await;
    assert_eq!(client.call("LIST").await, "LIST");
}

#[tokio::test]
async fn station_disconnect_leaves_runs_when_disabled() {
    let mut config = test_config();
    config.rpc.fail_pending_on_disconnect = false;
    let server = start_server_with(config).await;
    let mut station = TestClient::connect(&server.addr).await;
    let mut client = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    assert_eq!(client.call("RUN water test 1").await, "ACK");
    assert_eq!(station.recv().await, "RUN test 1");

    drop(station);
    server.wait_unregistered("water").await;

    assert!(client.is_silent(Duration::from_millis(200)).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runs_racing_station_disconnect_all_answered() {
    for _ in 0..10 {
        let server = start_server().await;
        let mut station = TestClient::connect(&server.addr).await;
        assert_eq!(station.call("REGISTER water source").await, "ACK");

        let mut clients = Vec::new();
        for i in 0..16 {
            clients.push((format!("n{i}"), TestClient::connect(&server.addr).await));
        }

        let mut tasks = Vec::new();
        for (nonce, mut client) in clients {
            tasks.push(tokio::spawn(async move {
                client.send(&format!("RUN water test {nonce}")).await;
                let first = client.recv().await;
                if first == "ERR" {
                    return;
                }
                // Either order: the sweep may beat the ACK onto the queue.
                let second = client.recv().await;
                let failed = format!("ERR water test {nonce}");
                assert!(
                    first == failed || second == failed,
                    "{nonce} answered {first:?} then {second:?}"
                );
            }));
        }
        drop(station);

        for task in tasks {
            task.await.unwrap();
        }
        server.wait_unregistered("water").await;
        assert_eq!(server.state.registry().stats().pending_runs, 0);
    }
}

#[tokio::test]
async fn name_reusable_after_disconnect() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    drop(station);
    server.wait_unregistered("water").await;

    let mut replacement = TestClient::connect(&server.addr).await;
    assert_eq!(replacement.call("REGISTER water barrel").await, "ACK");
}

#[tokio::test]
async fn invalid_utf8_keeps_connection() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");

    station.send_raw(b"METRIC lev\xffel 1.0\n").await;
    assert_eq!(station.recv().await, "ACK");
    station.send_raw(b"\xfeLIST\n").await;
    assert_eq!(station.recv().await, "ERR UNRECOGNIZED CMD");

    assert_eq!(station.call("LIST").await, "LIST water:source");
    assert!(server.state.registry().contains("water"));
}

#[tokio::test]
async fn crlf_and_split_writes() {
    let server = start_server().await;
    let mut client = TestClient::connect(&server.addr).await;

    client.send_raw(b"LI").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"ST\r\n").await;
    assert_eq!(client.recv().await, "LIST");
}

#[tokio::test]
async fn oversize_line_closes_connection() {
    let mut config = test_config();
    config.limits.max_line_length = 32;
    let server = start_server_with(config).await;
    let mut station = TestClient::connect(&server.addr).await;

    assert_eq!(station.call("REGISTER water source").await, "ACK");
    station.send(&format!("METRIC {} 1.0", "x".repeat(64))).await;

    station.expect_closed().await;
    server.wait_unregistered("water").await;
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let server = start_server().await;
    let mut station = TestClient::connect(&server.addr).await;
    assert_eq!(station.call("REGISTER water source").await, "ACK");

    server.shutdown.send(true).unwrap();

    station.expect_closed().await;
    server.wait_unregistered("water").await;
}
