use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use roitrack::config::{ObjectModelConfig, TrackerConfig};
use roitrack::{AdaptiveBgTracker, Detection, NoPosition, ObjectModel, Roi, Tracker};

const SIZE: u32 = 100;

fn frame(blobs: &[(i32, i32, u32, u8)]) -> RgbImage {
    let mut img = RgbImage::from_pixel(SIZE, SIZE, Rgb([200, 200, 200]));

    for &(x, y, side, grey) in blobs {
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(side, side), Rgb([grey; 3]));
    }

    img
}

fn mask() -> GrayImage {
    GrayImage::from_pixel(SIZE, SIZE, Luma([255]))
}

fn tracker_with(config: TrackerConfig, history_length: usize) -> AdaptiveBgTracker {
    let roi = Roi::full_frame(SIZE, SIZE).unwrap();
    let model = ObjectModel::shared(ObjectModelConfig {
        history_length,
        ..ObjectModelConfig::default()
    });

    AdaptiveBgTracker::new(&roi, config, model)
}

fn tracker(history_length: usize) -> AdaptiveBgTracker {
    tracker_with(TrackerConfig::default(), history_length)
}

#[test]
fn blob_on_second_frame_is_measured_from_origin() {
    let mut tracker = tracker(1000);

    let first = tracker.track(&frame(&[]), &mask(), 0).unwrap();
    assert!(first.point().is_none());

    let second = tracker
        .track(&frame(&[(45, 45, 11, 20)]), &mask(), 40)
        .unwrap();
    let point = second.into_point().expect("one data point on frame 2");

    assert_eq!((point.x, point.y), (50, 50));
    assert_eq!(point.xy_dist, 71);
}

#[test]
fn two_blobs_before_model_is_ready() {
    let mut tracker = tracker(1000);

    tracker.track(&frame(&[]), &mask(), 0).unwrap();
    let det = tracker
        .track(&frame(&[(10, 10, 8, 20), (70, 70, 8, 20)]), &mask(), 40)
        .unwrap();

    assert_eq!(det, Detection::NotDetected(NoPosition::ModelNotReady));
    assert_eq!(tracker.object_model().lock().len(), 0);
}

#[test]
fn going_back_in_time_is_a_hard_error() {
    let mut tracker = tracker(1000);

    tracker.track(&frame(&[]), &mask(), 1000).unwrap();
    let err = tracker.track(&frame(&[]), &mask(), 500).unwrap_err();

    assert!(err.is_timing());
}

#[test]
fn steady_blob_is_tracked_every_frame() {
    let mut tracker = tracker(10);

    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    for i in 1..40 {
        let x = 20 + i;
        let det = tracker
            .track(&frame(&[(x, 40, 10, 20)]), &mask(), i as i64 * 40)
            .unwrap();

        let point = det.into_point().expect("blob tracked");
        assert!((point.x - (x + 5)).abs() <= 1, "frame {}: x = {}", i, point.x);
        assert!((point.y - 45).abs() <= 1);
    }

    assert!(tracker.object_model().lock().is_ready());
}

#[test]
fn ambiguous_frame_picks_best_appearance_match() {
    let mut tracker = tracker(6);
    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    let history = [(9, 15), (10, 20), (11, 25)];
    for (i, &(side, grey)) in history.iter().cycle().take(6).enumerate() {
        let det = tracker
            .track(&frame(&[(20, 20, side, grey)]), &mask(), (i as i64 + 1) * 40)
            .unwrap();
        assert!(det.point().is_some(), "history frame {} not detected", i);
    }
    assert!(tracker.object_model().lock().is_ready());

    let half_life = tracker.background().half_life();
    let bg_under_animal = tracker.background().bg_img().unwrap()[[25, 25]];
    let det = tracker
        .track(&frame(&[(20, 20, 10, 20), (60, 60, 12, 60)]), &mask(), 7 * 40)
        .unwrap();

    let point = det.into_point().expect("best candidate chosen");
    assert!((24..=25).contains(&point.x));
    assert!((24..=25).contains(&point.y));
    assert!(tracker.background().half_life() < half_life);

    // ambiguous frames update the background everywhere, animal included
    assert!(tracker.background().bg_img().unwrap()[[25, 25]] > bg_under_animal + 0.5);
}

#[test]
fn animal_against_left_wall_is_tracked() {
    let mut tracker = tracker(1000);
    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    let det = tracker
        .track(&frame(&[(0, 40, 6, 20)]), &mask(), 40)
        .unwrap();

    let point = det.into_point().expect("blob touching x = 0 tracked");
    assert!((point.x - 3).abs() <= 1);
    assert!((point.y - 43).abs() <= 1);
}

#[test]
fn blob_unlike_the_animal_is_rejected() {
    let mut tracker = tracker(6);
    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    let history = [(6, 20), (7, 30)];
    for (i, &(side, grey)) in history.iter().cycle().take(6).enumerate() {
        let det = tracker
            .track(&frame(&[(20, 20, side, grey)]), &mask(), (i as i64 + 1) * 40)
            .unwrap();
        assert!(det.point().is_some(), "history frame {} not detected", i);
    }
    assert!(tracker.object_model().lock().is_ready());

    let half_life = tracker.background().half_life();
    let det = tracker
        .track(&frame(&[(20, 20, 16, 20)]), &mask(), 7 * 40)
        .unwrap();

    assert_eq!(det, Detection::NotDetected(NoPosition::AppearanceMismatch));
    assert!(tracker.background().half_life() < half_life);
    assert_eq!(tracker.background().last_t(), 7 * 40);
}

#[test]
fn single_pixel_blob_is_degenerate() {
    let mut tracker = tracker(1000);
    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    let det = tracker
        .track(&frame(&[(50, 50, 1, 20)]), &mask(), 40)
        .unwrap();

    assert_eq!(det, Detection::NotDetected(NoPosition::DegenerateContour));
    assert_eq!(tracker.object_model().lock().len(), 0);
}

#[test]
fn oversized_rectangle_is_rejected() {
    let config = TrackerConfig {
        max_size_ratio: 0.1,
        ..TrackerConfig::default()
    };
    let mut tracker = tracker_with(config, 1000);
    tracker.track(&frame(&[]), &mask(), 0).unwrap();

    let det = tracker
        .track(&frame(&[(30, 30, 14, 20)]), &mask(), 40)
        .unwrap();

    assert_eq!(det, Detection::NotDetected(NoPosition::ImplausibleSize));
    assert_eq!(tracker.object_model().lock().len(), 0);
    assert_eq!(tracker.background().last_t(), 40);
}
