use std::collections::HashMap;

use device_webcam_core::{
    AsyncValuesReceiver, CommandRequest, CommandValue, DriverError, DriverStatus, ProtocolDriver,
    ServiceConfig, WebcamDriver,
};
use device_webcam_redisedge::{InferenceError, MemoryConnector, RedisEdgeError};
use tempfile::TempDir;
use tokio::sync::mpsc;

const JPEG_FRAME: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0\x01\x01sample";

struct Harness {
    dir: TempDir,
    config: ServiceConfig,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let frame = dir.path().join("sample_dog_416.jpg");
        let model = dir.path().join("tiny-yolo-voc.pb");
        let script = dir.path().join("yolo-boxes.py");
        std::fs::write(&frame, JPEG_FRAME).expect("write frame");
        std::fs::write(&model, b"graph").expect("write model");
        std::fs::write(&script, b"def boxes(x): return x").expect("write script");

        let mut config = ServiceConfig::default();
        config.device.sample_image = frame;
        config.redisedge.model.path = model;
        config.redisedge.script.path = script;

        Self { dir, config }
    }

    async fn ready_driver(&self) -> (WebcamDriver<MemoryConnector>, AsyncValuesReceiver) {
        let driver =
            WebcamDriver::with_connector(self.config.clone(), MemoryConnector::with_stock_modules());
        let (tx, rx) = mpsc::channel(4);
        driver.initialize(tx).await.expect("initialize");
        (driver, rx)
    }
}

fn requests(names: &[&str]) -> Vec<CommandRequest> {
    names.iter().map(|name| CommandRequest::new(*name)).collect()
}

fn no_protocols() -> HashMap<String, HashMap<String, String>> {
    HashMap::new()
}

#[tokio::test]
async fn initialize_moves_driver_to_ready() {
    let harness = Harness::new();
    let connector = MemoryConnector::with_stock_modules();
    let driver = WebcamDriver::with_connector(harness.config.clone(), connector.clone());
    assert_eq!(driver.status(), DriverStatus::Uninitialized);

    let (tx, _rx) = mpsc::channel(1);
    driver.initialize(tx).await.expect("initialize");

    assert_eq!(driver.status(), DriverStatus::Ready);
    assert!(connector.contains_key("redisai:model:yolo"));
    assert!(connector.contains_key("redisai:script:yolo-boxes"));
}

#[tokio::test]
async fn failed_initialization_is_terminal() {
    let harness = Harness::new();
    let connector = MemoryConnector::new().with_module("rg", 300).with_module("ai", 200);
    let driver = WebcamDriver::with_connector(harness.config.clone(), connector);

    let (tx, _rx) = mpsc::channel(1);
    let err = driver.initialize(tx).await.expect_err("rg is too old");
    assert!(matches!(
        err,
        DriverError::Initialization(RedisEdgeError::Capability(_))
    ));
    assert!(matches!(driver.status(), DriverStatus::Failed(_)));

    let read = driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await;
    assert!(matches!(read, Err(DriverError::Failed(_))));

    let write = driver
        .handle_write_commands(
            "webcam",
            &no_protocols(),
            &requests(&["Fps"]),
            &[CommandValue::uint64("Fps", 0, 30)],
        )
        .await;
    assert!(matches!(write, Err(DriverError::Failed(_))));

    let (tx, _rx) = mpsc::channel(1);
    assert!(matches!(
        driver.initialize(tx).await,
        Err(DriverError::Failed(_))
    ));
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;

    let (tx, _rx2) = mpsc::channel(1);
    assert!(matches!(
        driver.initialize(tx).await,
        Err(DriverError::AlreadyInitialized)
    ));
    assert_eq!(driver.status(), DriverStatus::Ready);
}

#[tokio::test]
async fn reads_before_initialize_are_rejected() {
    let harness = Harness::new();
    let driver =
        WebcamDriver::with_connector(harness.config.clone(), MemoryConnector::with_stock_modules());

    let read = driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await;
    assert!(matches!(read, Err(DriverError::NotInitialized)));
}

#[tokio::test]
async fn read_request_count_must_be_one_or_three() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;

    for names in [
        vec![],
        vec!["Frame", "Hoomans"],
        vec!["Frame", "Hoomans", "Doggos", "Extra"],
    ] {
        let result = driver
            .handle_read_commands("webcam", &no_protocols(), &requests(&names))
            .await;
        match result {
            Err(err) => assert!(err.is_request_error(), "{} requests: {err}", names.len()),
            Ok(_) => panic!("{} requests should be rejected", names.len()),
        }
    }

    // Shape errors leave the driver usable.
    assert_eq!(driver.status(), DriverStatus::Ready);
}

#[tokio::test]
async fn frame_must_be_the_first_request() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;

    for names in [vec!["Hoomans"], vec!["Hoomans", "Frame", "Doggos"]] {
        let result = driver
            .handle_read_commands("webcam", &no_protocols(), &requests(&names))
            .await;
        assert!(matches!(result, Err(DriverError::RequestShape(ref msg)) if msg.contains("Frame")));
    }
}

#[tokio::test]
async fn single_request_returns_the_frame() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;

    let values = driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await
        .expect("read frame");

    assert_eq!(values.len(), 1);
    assert_eq!(values[0].device_resource_name, "Frame");
    let (media_type, data) = values[0].as_binary().expect("binary frame");
    assert_eq!(media_type, "image/jpeg");
    assert_eq!(data.as_ref(), JPEG_FRAME);
}

#[tokio::test]
async fn three_requests_share_one_capture_instant() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;

    let values = driver
        .handle_read_commands(
            "webcam",
            &no_protocols(),
            &requests(&["Frame", "Hoomans", "Doggos"]),
        )
        .await
        .expect("read frame and detections");

    assert_eq!(values.len(), 3);
    assert_eq!(values[1].device_resource_name, "Hoomans");
    assert_eq!(values[2].device_resource_name, "Doggos");
    assert_eq!(values[1].as_u64(), Some(0));
    assert_eq!(values[2].as_u64(), Some(0));
    assert!(values.iter().all(|value| value.origin == values[0].origin));
}

#[tokio::test]
async fn detections_fail_explicitly_without_placeholder() {
    let mut harness = Harness::new();
    harness.config.device.placeholder_detections = false;
    let (driver, _rx) = harness.ready_driver().await;

    let result = driver
        .handle_read_commands(
            "webcam",
            &no_protocols(),
            &requests(&["Frame", "Hoomans", "Doggos"]),
        )
        .await;
    assert!(matches!(
        result,
        Err(DriverError::Detection(InferenceError::NotImplemented))
    ));

    // Frame-only reads are unaffected.
    assert!(driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await
        .is_ok());
}

#[tokio::test]
async fn missing_sample_image_fails_the_read_only() {
    let mut harness = Harness::new();
    harness.config.device.sample_image = harness.dir.path().join("nope.jpg");
    let (driver, _rx) = harness.ready_driver().await;

    let result = driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await;
    assert!(matches!(result, Err(DriverError::Frame(_))));
    assert_eq!(driver.status(), DriverStatus::Ready);
}

#[tokio::test]
async fn writes_need_exactly_one_request_and_one_parameter() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;
    let param = CommandValue::bool("Streaming", 0, true);

    let cases: Vec<(Vec<CommandRequest>, Vec<CommandValue>)> = vec![
        (vec![], vec![param.clone()]),
        (requests(&["Streaming", "Fps"]), vec![param.clone()]),
        (requests(&["Streaming"]), vec![]),
        (requests(&["Streaming"]), vec![param.clone(), param.clone()]),
    ];
    for (reqs, params) in cases {
        let result = driver
            .handle_write_commands("webcam", &no_protocols(), &reqs, &params)
            .await;
        assert!(matches!(result, Err(DriverError::RequestShape(_))));
    }

    driver
        .handle_write_commands("webcam", &no_protocols(), &requests(&["Streaming"]), &[param])
        .await
        .expect("single write accepted");
    assert_eq!(driver.status(), DriverStatus::Ready);
}

#[tokio::test]
async fn stop_closes_pool_and_channel() {
    let harness = Harness::new();
    let (driver, mut rx) = harness.ready_driver().await;

    driver.stop(false).await.expect("stop");
    assert_eq!(driver.status(), DriverStatus::Stopped);
    assert!(rx.recv().await.is_none(), "async channel is closed");

    let read = driver
        .handle_read_commands("webcam", &no_protocols(), &requests(&["Frame"]))
        .await;
    assert!(matches!(read, Err(DriverError::Stopped)));
    assert!(matches!(driver.stop(true).await, Err(DriverError::Stopped)));
}

#[tokio::test]
async fn push_reading_delivers_async_values() {
    let harness = Harness::new();
    let (driver, mut rx) = harness.ready_driver().await;

    driver
        .push_reading("webcam", &requests(&["Frame", "Hoomans", "Doggos"]))
        .await
        .expect("push reading");

    let pushed = rx.recv().await.expect("async values");
    assert_eq!(pushed.device_name, "webcam");
    assert_eq!(pushed.command_values.len(), 3);
}

#[tokio::test]
async fn failed_initialization_closes_the_async_channel() {
    let harness = Harness::new();
    let connector = MemoryConnector::with_stock_modules().refuse_connections();
    let driver = WebcamDriver::with_connector(harness.config.clone(), connector);

    let (tx, mut rx) = mpsc::channel(1);
    assert!(driver.initialize(tx).await.is_err());
    assert!(rx.recv().await.is_none(), "async channel is closed");
}

#[tokio::test]
async fn stop_during_initialize_closes_the_async_channel() {
    let harness = Harness::new();
    let driver =
        WebcamDriver::with_connector(harness.config.clone(), MemoryConnector::with_stock_modules());

    let (tx, mut rx) = mpsc::channel(1);
    // Provisioning reads the model file, which yields before the edge is ready.
    let (initialized, stopped) = tokio::join!(driver.initialize(tx), driver.stop(false));

    assert!(stopped.is_ok());
    assert!(matches!(initialized, Ok(()) | Err(DriverError::Stopped)));
    assert_eq!(driver.status(), DriverStatus::Stopped);
    assert!(rx.recv().await.is_none(), "async channel is closed");
}

#[tokio::test]
async fn concurrent_reads_share_the_ready_driver() {
    let harness = Harness::new();
    let (driver, _rx) = harness.ready_driver().await;
    let frame_only = requests(&["Frame"]);
    let with_counts = requests(&["Frame", "Hoomans", "Doggos"]);

    let protocols = no_protocols();
    let (first, second) = tokio::join!(
        driver.handle_read_commands("webcam", &protocols, &frame_only),
        driver.handle_read_commands("webcam", &protocols, &with_counts),
    );

    assert_eq!(first.expect("frame read").len(), 1);
    assert_eq!(second.expect("frame and counts read").len(), 3);
    assert_eq!(driver.status(), DriverStatus::Ready);
}

#[tokio::test]
async fn preloaded_server_initializes_without_blob_files() {
    let harness = Harness::new();
    let mut config = ServiceConfig::default();
    config.device.sample_image = harness.config.device.sample_image.clone();
    let connector = MemoryConnector::preloaded(&config.redisedge);
    assert!(!config.redisedge.model.path.exists());

    let driver = WebcamDriver::with_connector(config, connector.clone());
    let (tx, _rx) = mpsc::channel(1);
    driver.initialize(tx).await.expect("initialize from preloaded keys");

    assert_eq!(connector.upload_count(), 0);
    let values = driver
        .handle_read_commands(
            "webcam",
            &no_protocols(),
            &requests(&["Frame", "Hoomans", "Doggos"]),
        )
        .await
        .expect("read");
    assert_eq!(values.len(), 3);
}
