use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use dart_vision::{
    Blackboard, CameraDescriptor, Class, ClassificationResult, ConfigRecord, MemoryBlackboard,
    Registries, TaskManager, TaskState,
    blackboard::{config_key, get_json, operator_key},
    dartboard::SEGMENTS,
    operators::CalibrationPoint,
};
use image::{Rgb, RgbImage};
use serde_json::json;
use video_ingest::{Frame, FrameSource, Replay};

const SIZE: u32 = 400;

fn black() -> Frame {
    Frame::from_rgb(RgbImage::new(SIZE, SIZE), 0)
}

fn white() -> Frame {
    Frame::from_rgb(RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255])), 0)
}

/// A thin vertical dart from (196..204, 60) down to y = 259.
fn dart() -> Frame {
    let image = RgbImage::from_fn(SIZE, SIZE, |x, y| {
        if (196..204).contains(&x) && (60..260).contains(&y) {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    });
    Frame::from_rgb(image, 0)
}

fn registries(frames: Vec<Frame>, looped: bool) -> Registries {
    let mut registries = Registries::default();
    registries.sources.register("Replay", move |_| {
        Ok(Box::new(Replay::new(frames.clone(), looped)) as Box<dyn FrameSource>)
    });
    registries
}

/// Calibration of a camera looking straight at the board, 1 px per mm, centred.
fn calibration() -> Vec<CalibrationPoint> {
    let model = dart_vision::DartboardModel;
    (0..SEGMENTS.len())
        .step_by(5)
        .map(|i| {
            let label = format!("{} | {}", SEGMENTS[i], SEGMENTS[(i + 1) % SEGMENTS.len()]);
            let [mx, my] = model.get_outer_point(&label).unwrap();
            CalibrationPoint {
                x: (200.0 + mx) / SIZE as f64,
                y: (200.0 - my) / SIZE as f64,
                label,
            }
        })
        .collect()
}

fn camera(calibrated: bool) -> CameraDescriptor {
    let points = if calibrated { calibration() } else { Vec::new() };
    serde_json::from_value(json!({
        "id": 1,
        "source": {"type": "Replay"},
        "op_configs": {"StandardProcedure": [{"name": "hand_cooldown", "type": "float", "value": 0.0}]},
        "calibration_points": points,
    }))
    .unwrap()
}

fn standard() -> serde_json::Value {
    json!({"type": "StandardProcedure"})
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

fn published(board: &dyn Blackboard) -> Option<ClassificationResult> {
    get_json(board, &operator_key("1", "ResultPublisher")).unwrap()
}

#[test]
fn a_hand_is_published_once_motion_is_consistent() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut frames = vec![black()];
    frames.extend(std::iter::repeat_with(white).take(5));
    let mut manager = TaskManager::new(board.clone(), registries(frames, false));

    let id = manager.start_pipeline(camera(false), &standard()).unwrap();
    let state = manager.wait(&id).unwrap();

    // The replay runs dry, which ends the pipeline like a camera fault.
    assert!(matches!(state, TaskState::Failed(_)), "{state:?}");
    assert!(!manager.is_camera_active("1"));
    assert_eq!(
        published(board.as_ref()),
        Some(ClassificationResult::bare(Class::Hand))
    );
    assert!(board.get(&operator_key("1", "MotionDetector")).unwrap().is_some());
}

#[test]
fn a_dart_is_located_and_scored() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut frames = vec![black()];
    frames.extend(std::iter::repeat_with(dart).take(5));
    let mut manager = TaskManager::new(board.clone(), registries(frames, false));

    let id = manager.start_pipeline(camera(true), &standard()).unwrap();
    manager.wait(&id);

    let result = published(board.as_ref()).expect("dart result");
    assert_eq!(result.class, Class::Dart);
    let throw = result.content.expect("scored dart");
    assert_eq!(throw.score, "S 3");
    assert_eq!(throw.value, 3);
    assert!(throw.point[0].abs() < 10.0, "{:?}", throw.point);
    assert!((throw.point[1] + 60.0).abs() < 10.0, "{:?}", throw.point);
    assert!(throw.confidence > 0.0 && throw.confidence <= 1.0);

    let warped = board.get(&operator_key("1", "HomographyWarper")).unwrap().unwrap();
    assert_eq!(&warped[..12], &[0, 0, 1, 194, 0, 0, 1, 194, 0, 0, 0, 3]);
}

#[test]
fn abort_stops_the_loop_and_nothing_is_published_after_teardown() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board.clone(), registries(vec![black()], true));

    let id = manager.start_pipeline(camera(false), &standard()).unwrap();
    let fps_key = operator_key("1", "FpsCalculator");
    assert!(wait_until(Duration::from_secs(5), || {
        board.get(&fps_key).unwrap().is_some()
    }));
    assert!(manager.is_camera_active("1"));

    // Starting again keeps the running pipeline.
    assert_eq!(manager.start_pipeline(camera(false), &standard()).unwrap(), id);

    assert!(manager.abort(&id));
    assert_eq!(manager.wait(&id), Some(TaskState::Aborted));
    assert!(!manager.is_camera_active("1"));

    board.delete(&fps_key).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(board.get(&fps_key).unwrap().is_none());
}

#[test]
fn pushed_configuration_is_validated_and_consumed() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board.clone(), registries(vec![black()], true));
    let id = manager.start_pipeline(camera(false), &standard()).unwrap();

    assert!(
        manager
            .push_config("1", "SizeClassifier", vec![ConfigRecord::float("hand_min", 2.0)])
            .is_err()
    );
    assert!(
        manager
            .push_config("1", "Tracker", vec![ConfigRecord::int("x", 1)])
            .is_err()
    );
    assert!(
        manager
            .push_config("9", "SizeClassifier", vec![ConfigRecord::float("hand_min", 0.5)])
            .is_err()
    );
    assert!(board.get(&config_key("1")).unwrap().is_none());

    manager
        .push_config("1", "SizeClassifier", vec![ConfigRecord::float("hand_min", 0.5)])
        .unwrap();
    manager
        .push_config("1", "StandardProcedure", vec![ConfigRecord::delete("hand_cooldown")])
        .unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        board.get(&config_key("1")).unwrap().is_none()
    }));

    manager.abort(&id);
    assert_eq!(manager.wait(&id), Some(TaskState::Aborted));
}

fn hand_then_dart(cooldown: f64) -> Option<ClassificationResult> {
    let board = Arc::new(MemoryBlackboard::new());
    let mut frames = vec![black()];
    frames.extend(std::iter::repeat_with(white).take(5));
    frames.extend(std::iter::repeat_with(black).take(5));
    frames.extend(std::iter::repeat_with(dart).take(5));
    let mut manager = TaskManager::new(board.clone(), registries(frames, false));

    let mut camera = camera(true);
    camera.op_configs.insert(
        "StandardProcedure".into(),
        vec![ConfigRecord::float("hand_cooldown", cooldown)],
    );
    let id = manager.start_pipeline(camera, &standard()).unwrap();
    manager.wait(&id);
    published(board.as_ref())
}

#[test]
fn the_hand_cooldown_reports_the_settling_board_as_none() {
    // Without a cooldown the hand leaving the board is itself a hand-sized change.
    assert_eq!(hand_then_dart(0.0), Some(ClassificationResult::bare(Class::Hand)));
    // With it, every frame rebases and the board reads as empty.
    assert_eq!(hand_then_dart(30.0), Some(ClassificationResult::bare(Class::None)));
}

#[test]
fn malformed_configuration_is_dropped_without_stopping_the_pipeline() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board.clone(), registries(vec![black()], true));
    let id = manager.start_pipeline(camera(false), &standard()).unwrap();
    let fps_key = operator_key("1", "FpsCalculator");
    assert!(wait_until(Duration::from_secs(5), || {
        board.get(&fps_key).unwrap().is_some()
    }));

    let payload = json!({
        "MotionDetector": [{"name": "threshold", "type": "integer", "value": 3}],
        "SizeClassifier": [{"name": "hand_min", "type": "float", "value": 0.4}]
    });
    for bytes in [serde_json::to_vec(&payload).unwrap(), b"not json".to_vec()] {
        board.set(&config_key("1"), bytes).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            board.get(&config_key("1")).unwrap().is_none()
        }));
    }

    thread::sleep(Duration::from_millis(100));
    assert_eq!(manager.status(&id), Some(TaskState::Running));
    assert!(manager.is_camera_active("1"));

    manager.abort(&id);
    assert_eq!(manager.wait(&id), Some(TaskState::Aborted));
}

#[test]
fn bad_initial_configuration_fails_the_task() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board.clone(), registries(vec![black()], true));
    let mut camera = camera(false);
    camera
        .op_configs
        .insert("MotionDetector".into(), vec![ConfigRecord::int("threshold", 999)]);

    let id = manager.start_pipeline(camera, &standard()).unwrap();
    assert!(matches!(manager.wait(&id), Some(TaskState::Failed(_))));
}

#[test]
fn unknown_sources_and_procedures_are_rejected() {
    let board = Arc::new(MemoryBlackboard::new());
    let mut manager = TaskManager::new(board, Registries::default());

    assert!(manager.start_pipeline(camera(false), &json!({"type": "Nope"})).is_err());

    // The source is only resolved on the pipeline thread.
    let id = manager.start_pipeline(camera(false), &standard()).unwrap();
    assert!(matches!(manager.wait(&id), Some(TaskState::Failed(_))));

    let schema = manager.config_schema(&json!({"type": "DebugRecorder"})).unwrap();
    assert!(schema.contains_key("FrameRecorder"));
    assert!(schema.contains_key("FrameGrabber"));
}
