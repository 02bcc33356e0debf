//! End-to-end tests: a real device connection over loopback TCP.

use bytes::BytesMut;
use holo_bridge::dispatch::{EVENT_STREAM, TRACKING_STREAM};
use holo_bridge::restart::{RestartPolicy, supervise};
use holo_bridge::{
    Bridge, BridgeError, BridgeMetrics, BridgeSettings, ByteCode, Frame, InletMap, OutletMap, codec::FrameCodec,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tokio_util::sync::CancellationToken;

fn wire(frames: &[(ByteCode, &str)]) -> Vec<u8> {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    for (byte_code, text) in frames {
        codec.encode(Frame::new(*byte_code, text.as_bytes().to_vec()), &mut buf).unwrap();
    }
    buf.to_vec()
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

async fn connect(port: u16) -> TcpStream {
    // The listener may still be coming up after a restart
    for _ in 0..200 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bridge never started listening on port {}", port);
}

fn local_settings(port: u16) -> BridgeSettings {
    BridgeSettings { host: "127.0.0.1".to_string(), port, ..BridgeSettings::default() }
}

#[tokio::test]
async fn device_feed_is_routed_to_both_outlets() {
    let _ = tracing_subscriber::fmt::try_init();
    let port = free_port();
    let settings = local_settings(port);
    let outlets = settings.build_outlets();
    let bridge = Arc::new(Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::new()).unwrap());
    let metrics = bridge.metrics();

    let mut tracking = outlets.iter().find(|o| o.key() == TRACKING_STREAM).unwrap().subscribe();
    let mut events = outlets.iter().find(|o| o.key() == EVENT_STREAM).unwrap().subscribe();

    let stop = CancellationToken::new();
    let server = {
        let bridge = Arc::clone(&bridge);
        let stop = stop.clone();
        tokio::spawn(async move { bridge.run_until(stop).await })
    };

    let bytes = wire(&[
        (ByteCode::Char, "Connected To Server"),
        (ByteCode::Short, "head;0.01,1.62,0.20"),
        (ByteCode::Short, "head;0.02,1.62,0.21"),
        (ByteCode::Char, "Grab; cube_1"),
    ]);

    let mut device = connect(port).await;
    // Trickle the feed one byte at a time to force fragmented reads
    for byte in &bytes {
        device.write_all(std::slice::from_ref(byte)).await.unwrap();
    }
    device.shutdown().await.unwrap();
    wait_for(|| metrics.sessions_closed() == 1).await;

    let tracking: Vec<_> = tracking.try_pull().into_iter().map(|s| s.value).collect();
    let events: Vec<_> = events.try_pull().into_iter().map(|s| s.value).collect();
    assert_eq!(tracking, vec!["head;0.01,1.62,0.20", "head;0.02,1.62,0.21"]);
    assert_eq!(events, vec!["Connected To Server", "Grab; cube_1"]);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.frames_decoded, 4);
    assert_eq!(snapshot.samples_dropped, 0);
    assert_eq!(snapshot.sessions_closed_clean, 1);

    stop.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn timestamps_are_monotonic_within_an_outlet() {
    let port = free_port();
    let settings = local_settings(port);
    let outlets = settings.build_outlets();
    let bridge = Arc::new(Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::new()).unwrap());
    let metrics = bridge.metrics();
    let mut tracking = outlets[0].subscribe();

    let stop = CancellationToken::new();
    let server = {
        let bridge = Arc::clone(&bridge);
        let stop = stop.clone();
        tokio::spawn(async move { bridge.run_until(stop).await })
    };

    let records: Vec<String> = (0..50).map(|i| format!("rhand;{},0,0", i)).collect();
    let frames: Vec<_> = records.iter().map(|r| (ByteCode::Short, r.as_str())).collect();
    let mut device = connect(port).await;
    device.write_all(&wire(&frames)).await.unwrap();
    device.shutdown().await.unwrap();
    wait_for(|| metrics.sessions_closed() == 1).await;

    let samples = tracking.try_pull();
    assert_eq!(samples.len(), 50);
    assert!(samples.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
    let values: Vec<_> = samples.into_iter().map(|s| s.value).collect();
    assert_eq!(values, records);

    stop.cancel();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn restart_after_fault_reuses_outlets_on_same_port() {
    let _ = tracing_subscriber::fmt::try_init();
    let port = free_port();
    let settings = local_settings(port);
    let outlets = settings.build_outlets();
    let metrics = Arc::new(BridgeMetrics::new());
    let bridge = Arc::new(
        Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::new())
            .unwrap()
            .with_metrics(Arc::clone(&metrics)),
    );

    // Subscribed once, before the first run; must see both runs' samples
    let mut events = outlets.iter().find(|o| o.key() == EVENT_STREAM).unwrap().subscribe();

    let stop = CancellationToken::new();
    let runs = Arc::new(AtomicU32::new(0));
    let restart = RestartPolicy::new(Duration::from_millis(10), Duration::from_millis(10));

    let supervisor = {
        let bridge = Arc::clone(&bridge);
        let metrics = Arc::clone(&metrics);
        let stop = stop.clone();
        let runs = Arc::clone(&runs);
        tokio::spawn(async move {
            supervise(restart, stop.clone(), &metrics, || {
                let bridge = Arc::clone(&bridge);
                let metrics = Arc::clone(&metrics);
                let stop = stop.clone();
                let run = runs.fetch_add(1, Ordering::SeqCst);
                async move {
                    if run == 0 {
                        // Serve one full session, then fail as if the loop crashed
                        let first = CancellationToken::new();
                        let watcher = {
                            let first = first.clone();
                            let metrics = Arc::clone(&metrics);
                            tokio::spawn(async move {
                                wait_for(|| metrics.sessions_closed() == 1).await;
                                first.cancel();
                            })
                        };
                        bridge.run_until(first).await?;
                        watcher.await.ok();
                        Err(BridgeError::supervisor_fault("injected failure after first session"))
                    } else {
                        bridge.run_until(stop).await
                    }
                }
            })
            .await
        })
    };

    let mut device = connect(port).await;
    device.write_all(&wire(&[(ByteCode::Char, "before restart")])).await.unwrap();
    device.shutdown().await.unwrap();
    drop(device);

    wait_for(|| metrics.snapshot().supervisor_faults == 1).await;

    let mut device = connect(port).await;
    device.write_all(&wire(&[(ByteCode::Char, "after restart")])).await.unwrap();
    device.shutdown().await.unwrap();
    wait_for(|| metrics.sessions_closed() == 2).await;

    let values: Vec<_> = events.try_pull().into_iter().map(|s| s.value).collect();
    assert_eq!(values, vec!["before restart", "after restart"]);
    assert_eq!(events.lagged(), 0);

    stop.cancel();
    let failures = supervisor.await.unwrap();
    assert_eq!(failures, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn inlet_samples_reach_the_device_over_tcp() {
    let port = free_port();
    let settings = BridgeSettings::from_yaml_str(&format!(
        "host: 127.0.0.1\nport: {}\nread_timeout_ms: 10\ninlets:\n  - name: goal_commands\n    byte_code: char\n",
        port
    ))
    .unwrap();
    let outlets = settings.build_outlets();
    let inlets = settings.build_inlets();
    let handle = inlets[0].handle();
    let bridge = Arc::new(
        Bridge::from_settings(&settings, OutletMap::from_outlets(&outlets), InletMap::from_channels(&inlets)).unwrap(),
    );

    let stop = CancellationToken::new();
    let server = {
        let bridge = Arc::clone(&bridge);
        let stop = stop.clone();
        tokio::spawn(async move { bridge.run_until(stop).await })
    };

    let mut device = connect(port).await;
    wait_for(|| bridge.metrics().snapshot().sessions_accepted == 1).await;
    assert!(handle.push("spawn;goal_7"));

    let mut codec = FrameCodec::new();
    let mut received = BytesMut::new();
    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = codec.decode(&mut received).unwrap() {
                break frame;
            }
            let mut chunk = [0u8; 64];
            let n = device.read(&mut chunk).await.unwrap();
            assert!(n > 0, "bridge closed the connection");
            received.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("inlet sample should arrive");

    assert_eq!(frame.byte_code, ByteCode::Char);
    assert_eq!(&frame.payload[..], b"spawn;goal_7");

    stop.cancel();
    server.await.unwrap().unwrap();
}
