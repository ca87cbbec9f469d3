use super::*;

fn tile(x: f64, y: f64) -> Rect {
    Rect::new(x, y, x + 100.0, y + 150.0)
}

#[test]
fn infers_inset_origin_and_pitch() {
    let boxes = [
        tile(236.0, 176.0),
        tile(16.0, 8.0),
        tile(126.0, 8.0),
        tile(236.0, 8.0),
        tile(16.0, 176.0),
        tile(126.0, 180.0),
    ];
    let m = infer_grid(&boxes, &GeometryOpts::default()).unwrap();
    assert_eq!(m.origin, Point::new(16.0, 8.0));
    assert_eq!(m.columns_per_row, 3);
    assert_eq!(m.column_width, 110.0);
    assert_eq!(m.row_height, 168.0);
}

#[test]
fn parked_boxes_are_not_evidence() {
    let boxes = [tile(-9999.0, -9999.0), tile(0.0, 0.0), tile(120.0, 0.0)];
    let m = infer_grid(&boxes, &GeometryOpts::default()).unwrap();
    assert_eq!(m.origin, Point::ZERO);
    assert_eq!(m.columns_per_row, 2);
    assert!(infer_grid(&[tile(-9999.0, -9999.0)], &GeometryOpts::default()).is_none());
    assert!(infer_grid(&[], &GeometryOpts::default()).is_none());
}

#[test]
fn single_item_falls_back_to_size_plus_gap() {
    let m = infer_grid(&[tile(4.0, 4.0)], &GeometryOpts::default()).unwrap();
    assert_eq!(m.columns_per_row, 1);
    assert_eq!(m.column_width, 124.0);
    assert_eq!(m.row_height, 174.0);
}

#[test]
fn row_delta_ignores_noise_between_pairs() {
    // Consecutive deltas are all under the noise floor; the pairwise one is not.
    let boxes = [tile(0.0, 0.0), tile(200.0, 8.0), tile(400.0, 16.0)];
    let opts = GeometryOpts::default();
    let m = infer_grid(&boxes, &opts).unwrap();
    assert_eq!(m.columns_per_row, 2);
    assert_eq!(m.row_height, 16.0);
}

#[test]
fn wobbling_first_row_keeps_left_to_right_pitch() {
    let boxes = [tile(0.0, 0.0), tile(110.0, 5.0), tile(220.0, 0.0)];
    let m = infer_grid(&boxes, &GeometryOpts::default()).unwrap();
    assert_eq!(m.columns_per_row, 3);
    assert_eq!(m.column_width, 110.0);
    assert_eq!(m.slot(2), Point::new(220.0, 0.0));
}

#[test]
fn slots_and_heights_are_gap_free() {
    let m = LayoutModel {
        origin: Point::new(10.0, 20.0),
        column_width: 100.0,
        row_height: 50.0,
        columns_per_row: 3,
    };
    assert_eq!(m.slot(0), Point::new(10.0, 20.0));
    assert_eq!(m.slot(4), Point::new(110.0, 70.0));
    assert_eq!(m.height_for(7), 150.0);
    assert_eq!(m.height_for(6), 100.0);
    assert_eq!(m.height_for(0), 0.0);
}

#[test]
fn list_model_uses_base_offset_and_buffer() {
    let opts = GeometryOpts::default();
    let l = infer_list(4.0, None, &opts);
    assert_eq!(l.row_height, 32.0);
    assert_eq!(l.slot_top(2), 68.0);
    assert_eq!(l.height_for(3, opts.list_safety_buffer_px), 4.0 + 96.0 + 24.0);
    assert_eq!(infer_list(0.0, Some(40.0), &opts).row_height, 40.0);
}
