//! Layer mutations, undo and change notification.

use std::sync::{Arc, Mutex};

use picman_core::{BaseType, Error, Format, Precision, Rect};
use picman_ops::{
    ColorFill, Drawable, DrawableEvent, Filter, Filterable, Invert, Layer, LayerMode, OpsError,
    SnapshotUndo, Viewable,
};
use picman_tiles::{Buffer, Context};

fn solid(ctx: &Context, w: u32, h: u32, format: Format, pixel: &[u8]) -> Buffer {
    let mut buffer = Buffer::new(ctx, w, h, format).unwrap();
    buffer.fill(pixel).unwrap();
    buffer
}

fn blue_layer(ctx: &Context, w: u32, h: u32) -> Layer {
    Layer::from_buffer("background", solid(ctx, w, h, Format::RGB_U8, &[0, 0, 255]))
}

fn drain(rx: &std::sync::mpsc::Receiver<DrawableEvent>) -> Vec<DrawableEvent> {
    rx.try_iter().collect()
}

#[test]
fn apply_buffer_pushes_undo_and_restores() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 100, 100);
    let original = layer.buffer().get_rect(layer.bounds()).unwrap();
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());

    let red = solid(&ctx, 40, 40, Format::RGB_U8, &[255, 0, 0]);
    layer
        .apply_buffer(&red, red.extent(), true, "Paint", 1.0, LayerMode::Normal, None, 10, 10)
        .unwrap();
    assert_eq!(layer.buffer().get_pixel(10, 10).unwrap(), vec![255, 0, 0]);
    assert_eq!(layer.buffer().get_pixel(50, 50).unwrap(), vec![0, 0, 255]);

    {
        let history = history.lock().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.steps()[0].rect, Rect::new(10, 10, 40, 40));
        assert_eq!(history.steps()[0].drawable, layer.id());
    }

    let desc = history.lock().unwrap().undo(&mut layer).unwrap();
    assert_eq!(desc.as_deref(), Some("Paint"));
    assert_eq!(layer.buffer().get_rect(layer.bounds()).unwrap(), original);
    assert!(history.lock().unwrap().is_empty());
}

#[test]
fn detached_layer_skips_undo() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 20, 20);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    assert!(layer.detach().is_some());

    let red = solid(&ctx, 5, 5, Format::RGB_U8, &[255, 0, 0]);
    layer
        .apply_buffer(&red, red.extent(), true, "Paint", 1.0, LayerMode::Normal, None, 0, 0)
        .unwrap();
    assert!(history.lock().unwrap().is_empty());
    assert_eq!(layer.buffer().get_pixel(0, 0).unwrap(), vec![255, 0, 0]);
}

#[test]
fn apply_buffer_opacity_zero_changes_nothing() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 30, 30);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    let rx = layer.subscribe();

    let red = solid(&ctx, 30, 30, Format::RGB_U8, &[255, 0, 0]);
    layer
        .apply_buffer(&red, red.extent(), true, "Paint", 0.0, LayerMode::Normal, None, 0, 0)
        .unwrap();
    assert_eq!(layer.buffer().get_pixel(3, 3).unwrap(), vec![0, 0, 255]);
    assert!(history.lock().unwrap().is_empty());
    assert!(drain(&rx).is_empty());
}

#[test]
fn apply_buffer_emits_update() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 50, 50);
    let rx = layer.subscribe();
    let red = solid(&ctx, 20, 20, Format::RGB_U8, &[255, 0, 0]);
    layer
        .apply_buffer(&red, red.extent(), false, "Paint", 1.0, LayerMode::Normal, None, 40, 40)
        .unwrap();
    assert_eq!(drain(&rx), vec![DrawableEvent::Update(Rect::new(40, 40, 10, 10))]);
}

#[test]
fn apply_buffer_with_base() {
    let ctx = Context::default();
    let mut layer = Layer::new(&ctx, "l", 16, 16, Format::RGB_U8).unwrap();
    let base = solid(&ctx, 16, 16, Format::RGB_U8, &[255, 255, 255]);
    let src = solid(&ctx, 16, 16, Format::RGB_U8, &[128, 128, 128]);
    layer
        .apply_buffer(&src, src.extent(), false, "Blend", 1.0, LayerMode::Multiply, Some(&base), 0, 0)
        .unwrap();
    assert_eq!(layer.buffer().get_pixel(8, 8).unwrap(), vec![128, 128, 128]);
}

#[test]
fn replace_buffer_with_mask() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 20, 20);
    let red = solid(&ctx, 20, 20, Format::RGB_U8, &[255, 0, 0]);
    let mask = solid(&ctx, 20, 20, Format::Y_U8, &[128]);

    layer
        .replace_buffer(&red, red.extent(), false, "Replace", 1.0, Some(&mask), mask.extent(), 0, 0)
        .unwrap();
    let px = layer.buffer().get_pixel(7, 7).unwrap();
    assert!((px[0] as i32 - 128).abs() <= 1, "{px:?}");
    assert_eq!(px[1], 0);
    assert!((px[2] as i32 - 127).abs() <= 1, "{px:?}");
}

#[test]
fn replace_buffer_mask_size_mismatch() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 20, 20);
    let red = solid(&ctx, 20, 20, Format::RGB_U8, &[255, 0, 0]);
    let mask = solid(&ctx, 10, 10, Format::Y_U8, &[255]);
    let err = layer
        .replace_buffer(&red, red.extent(), false, "Replace", 1.0, Some(&mask), mask.extent(), 0, 0)
        .unwrap_err();
    assert!(matches!(err, OpsError::Core(Error::SizeMismatch { .. })));
}

#[test]
fn failed_mutations_record_no_undo() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 40, 40);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    let before = layer.buffer().get_rect(layer.bounds()).unwrap();

    let red = solid(&ctx, 20, 20, Format::RGB_U8, &[255, 0, 0]);
    let mask = solid(&ctx, 10, 10, Format::Y_U8, &[255]);
    let err = layer
        .replace_buffer(&red, red.extent(), true, "Replace", 1.0, Some(&mask), Rect::from_size(20, 20), 0, 0)
        .unwrap_err();
    assert!(err.as_core().is_some_and(|e| e.is_bounds_error()));

    let base = solid(&ctx, 5, 5, Format::RGB_U8, &[255, 255, 255]);
    let err = layer
        .apply_buffer(&red, red.extent(), true, "Paint", 1.0, LayerMode::Normal, Some(&base), 0, 0)
        .unwrap_err();
    assert!(err.as_core().is_some_and(|e| e.is_bounds_error()));

    let err = layer
        .apply_buffer(&red, Rect::new(10, 10, 20, 20), true, "Paint", 1.0, LayerMode::Normal, None, 0, 0)
        .unwrap_err();
    assert!(err.as_core().is_some_and(|e| e.is_bounds_error()));

    assert!(history.lock().unwrap().is_empty());
    assert_eq!(layer.buffer().get_rect(layer.bounds()).unwrap(), before);
}

#[test]
fn apply_buffer_negative_offset() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 30, 30);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    let rx = layer.subscribe();

    let red = solid(&ctx, 10, 10, Format::RGB_U8, &[255, 0, 0]);
    layer
        .apply_buffer(&red, red.extent(), true, "Dab", 1.0, LayerMode::Normal, None, -5, 25)
        .unwrap();
    assert_eq!(layer.buffer().get_pixel(0, 25).unwrap(), vec![255, 0, 0]);
    assert_eq!(layer.buffer().get_pixel(4, 29).unwrap(), vec![255, 0, 0]);
    assert_eq!(layer.buffer().get_pixel(5, 25).unwrap(), vec![0, 0, 255]);
    assert_eq!(history.lock().unwrap().steps()[0].rect, Rect::new(0, 25, 5, 5));
    assert_eq!(drain(&rx), vec![DrawableEvent::Update(Rect::new(0, 25, 5, 5))]);

    history.lock().unwrap().undo(&mut layer).unwrap();
    assert_eq!(layer.buffer().get_pixel(0, 25).unwrap(), vec![0, 0, 255]);
}

#[test]
fn swap_pixels_exchanges() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 20, 20);
    let mut patch = solid(&ctx, 4, 4, Format::RGB_U8, &[1, 2, 3]);

    layer.swap_pixels(&mut patch, 8, 8).unwrap();
    assert_eq!(layer.buffer().get_pixel(8, 8).unwrap(), vec![1, 2, 3]);
    assert_eq!(layer.buffer().get_pixel(12, 12).unwrap(), vec![0, 0, 255]);
    assert_eq!(patch.get_pixel(0, 0).unwrap(), vec![0, 0, 255]);

    let mut wrong = solid(&ctx, 4, 4, Format::RGBA_U8, &[0, 0, 0, 0]);
    let err = layer.swap_pixels(&mut wrong, 0, 0).unwrap_err();
    assert!(err.as_core().is_some_and(|e| e.is_format_error()));

    let mut outside = solid(&ctx, 4, 4, Format::RGB_U8, &[0, 0, 0]);
    let err = layer.swap_pixels(&mut outside, 18, 18).unwrap_err();
    assert!(err.as_core().is_some_and(|e| e.is_bounds_error()));

    let err = layer.swap_pixels(&mut outside, -1, 0).unwrap_err();
    assert!(matches!(err, OpsError::InvalidParameter(_)));
}

#[test]
fn set_buffer_events_and_undo() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 10, 10);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    let rx = layer.subscribe();

    let replacement = Buffer::new(&ctx, 30, 5, Format::RGBA_FLOAT).unwrap();
    layer.set_buffer(true, "Resize", replacement, (3, 4)).unwrap();
    assert_eq!(layer.bounds(), Rect::new(0, 0, 30, 5));
    assert_eq!(layer.offset(), (3, 4));
    assert_eq!(
        drain(&rx),
        vec![
            DrawableEvent::BufferChanged,
            DrawableEvent::AlphaChanged,
            DrawableEvent::FormatChanged,
            DrawableEvent::Update(Rect::new(0, 0, 30, 5)),
        ]
    );

    history.lock().unwrap().undo(&mut layer).unwrap();
    assert_eq!(layer.format(), Format::RGB_U8);
    assert_eq!(layer.bounds(), Rect::new(0, 0, 10, 10));
    assert_eq!(layer.buffer().get_pixel(9, 9).unwrap(), vec![0, 0, 255]);
}

#[test]
fn convert_type_undo() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 12, 12);
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());

    layer.convert_type(BaseType::Gray, Precision::U16, true).unwrap();
    assert_eq!(layer.format().base_type(), BaseType::Gray);
    history.lock().unwrap().undo(&mut layer).unwrap();
    assert_eq!(layer.format(), Format::RGB_U8);
    assert_eq!(layer.buffer().get_pixel(0, 0).unwrap(), vec![0, 0, 255]);
}

#[test]
fn apply_filters_merges_and_detaches() {
    let ctx = Context::default();
    let mut layer = Layer::from_buffer("l", solid(&ctx, 40, 40, Format::RGB_U8, &[255, 0, 51]));
    let history = Arc::new(Mutex::new(SnapshotUndo::new()));
    layer.attach(history.clone());
    let rx = layer.subscribe();

    let mut fill = Filter::from_operation("fill", ColorFill::new([0.0, 1.0, 0.0, 1.0]));
    fill.set_region(Some(Rect::new(0, 0, 10, 10)));
    layer.filters_mut().push(Filter::from_operation("invert", Invert)).unwrap();
    layer.filters_mut().push_last(fill).unwrap();
    assert!(layer.has_filters());

    let changed = layer.apply_filters(true, "Merge Filters", None).unwrap();
    assert_eq!(changed, Some(Rect::new(0, 0, 40, 40)));
    assert!(!layer.has_filters());
    assert_eq!(layer.buffer().get_pixel(20, 20).unwrap(), vec![0, 255, 204]);
    assert_eq!(layer.buffer().get_pixel(5, 5).unwrap(), vec![0, 255, 0]);
    assert_eq!(history.lock().unwrap().len(), 1);
    assert_eq!(drain(&rx), vec![DrawableEvent::Update(Rect::new(0, 0, 40, 40))]);

    history.lock().unwrap().undo(&mut layer).unwrap();
    assert_eq!(layer.buffer().get_pixel(20, 20).unwrap(), vec![255, 0, 51]);
}

#[test]
fn dropped_observer_is_pruned() {
    let ctx = Context::default();
    let mut layer = blue_layer(&ctx, 8, 8);
    let kept = layer.subscribe();
    drop(layer.subscribe());
    layer.update(Rect::new(0, 0, 100, 100));
    assert_eq!(drain(&kept), vec![DrawableEvent::Update(Rect::new(0, 0, 8, 8))]);
}
