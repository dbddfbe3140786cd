//! Lockstep iteration over tiled buffers.

use picman_core::{Error, Format, Precision, Rect};
use picman_tiles::{Buffer, Context, CoreConfig, Progress, RegionIter};
use std::sync::{Arc, Mutex};

fn ctx(tile_size: u32) -> Context {
    Context::new(CoreConfig::default().with_tile_size(tile_size)).unwrap()
}

fn visit_order(iter: &mut RegionIter<'_>) -> Vec<Vec<(u32, u32, u32, u32)>> {
    let mut order = Vec::new();
    while let Some(step) = iter.next_step().unwrap() {
        order.push(step.spans.iter().map(|s| (s.x, s.y, s.width, s.height)).collect());
    }
    order
}

#[test]
fn full_buffer_visits_every_tile_once() {
    let ctx = ctx(64);
    for (w, h) in [(64, 64), (65, 64), (200, 130), (1, 1), (128, 300)] {
        let buf = Buffer::new(&ctx, w, h, Format::RGBA_U8).unwrap();
        let mut iter = RegionIter::new();
        iter.add_read(&buf, buf.extent()).unwrap();
        let steps = iter.for_each(|_| Ok(())).unwrap();
        assert_eq!(steps as u32, w.div_ceil(64) * h.div_ceil(64), "{w}x{h}");
    }
}

#[test]
fn lockstep_same_offsets_across_formats() {
    let ctx = ctx(32);
    let rect = Rect::new(5, 7, 90, 70);
    let a = Buffer::new(&ctx, 100, 80, Format::RGBA_U8).unwrap();
    let b = Buffer::new(&ctx, 100, 80, Format::Y_FLOAT).unwrap();
    let c = Buffer::new(&ctx, 100, 80, Format::RGB_U8.with_precision(Precision::Half)).unwrap();

    let mut iter = RegionIter::new();
    iter.add_read(&a, rect).unwrap();
    iter.add_read(&b, rect).unwrap();
    iter.add_read(&c, rect).unwrap();
    let order = visit_order(&mut iter);

    assert!(!order.is_empty());
    for spans in &order {
        assert!(spans.windows(2).all(|w| w[0] == w[1]));
    }
    let covered: u64 = order.iter().map(|s| s[0].2 as u64 * s[0].3 as u64).sum();
    assert_eq!(covered, rect.area());
}

#[test]
fn row_major_order() {
    let ctx = ctx(16);
    let buf = Buffer::new(&ctx, 48, 32, Format::Y_U8).unwrap();
    let mut iter = RegionIter::new();
    iter.add_read(&buf, buf.extent()).unwrap();
    let origins: Vec<(u32, u32)> = visit_order(&mut iter).iter().map(|s| (s[0].0, s[0].1)).collect();
    assert_eq!(
        origins,
        vec![(0, 0), (16, 0), (32, 0), (0, 16), (16, 16), (32, 16)]
    );
}

#[test]
fn different_tile_sizes_split_steps() {
    let ctx = ctx(16);
    let a = Buffer::with_tile_size(&ctx, 64, 64, Format::Y_U8, 16).unwrap();
    let b = Buffer::with_tile_size(&ctx, 64, 64, Format::Y_U8, 32).unwrap();
    let mut iter = RegionIter::new();
    iter.add_read(&a, Rect::new(0, 0, 48, 48)).unwrap();
    iter.add_read(&b, Rect::new(8, 8, 48, 48)).unwrap();
    while let Some(step) = iter.next_step().unwrap() {
        let sa = &step.spans[0];
        let sb = &step.spans[1];
        assert_eq!(sa.x / 16, (sa.x + sa.width - 1) / 16);
        assert_eq!(sb.x / 32, (sb.x + sb.width - 1) / 32);
        assert_eq!(sb.y / 32, (sb.y + sb.height - 1) / 32);
    }
}

#[test]
fn copy_between_regions() {
    let ctx = ctx(16);
    let mut src = Buffer::new(&ctx, 40, 40, Format::RGBA_U8).unwrap();
    for y in 0..40 {
        let row: Vec<u8> = (0..40u32).flat_map(|x| [x as u8, y as u8, 0, 255]).collect();
        src.set_row(0, y, 40, &row).unwrap();
    }
    let mut dst = Buffer::new(&ctx, 40, 40, Format::RGBA_U8).unwrap();
    {
        let mut iter = RegionIter::new();
        iter.add_read(&src, Rect::new(0, 0, 30, 30)).unwrap();
        iter.add_write(&mut dst, Rect::new(10, 10, 30, 30)).unwrap();
        while let Some(mut step) = iter.next_step().unwrap() {
            let (s, d) = step.pair_mut().unwrap();
            for (sr, dr) in s.rows().zip(d.rows_mut().unwrap()) {
                dr.copy_from_slice(sr);
            }
        }
    }
    assert_eq!(dst.get_pixel(10, 10).unwrap(), vec![0, 0, 0, 255]);
    assert_eq!(dst.get_pixel(39, 25).unwrap(), vec![29, 15, 0, 255]);
    assert_eq!(dst.get_pixel(9, 9).unwrap(), vec![0, 0, 0, 0]);
}

#[test]
fn mismatched_sizes_rejected() {
    let ctx = ctx(16);
    let a = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
    let mut b = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
    let mut iter = RegionIter::new();
    iter.add_read(&a, Rect::from_size(16, 16)).unwrap();
    let err = iter.add_write(&mut b, Rect::from_size(16, 8)).unwrap_err();
    assert!(matches!(
        err,
        Error::SizeMismatch {
            a_width: 16,
            a_height: 16,
            b_width: 16,
            b_height: 8
        }
    ));
}

#[test]
fn progress_reports_between_steps() {
    let ctx = ctx(16);
    let buf = Buffer::new(&ctx, 32, 32, Format::Y_U8).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress = Progress::with_callback(move |f| sink.lock().unwrap().push(f));
    let mut iter = RegionIter::new().with_progress(&progress);
    iter.add_read(&buf, buf.extent()).unwrap();
    assert_eq!(iter.for_each(|_| Ok(())).unwrap(), 4);
    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn cache_exhaustion_aborts_iteration() {
    let ctx = Context::new(CoreConfig::default().with_tile_size(16).with_cache_tiles(1)).unwrap();
    let a = Buffer::new(&ctx, 16, 16, Format::Y_U8).unwrap();
    let b = Buffer::new(&ctx, 16, 16, Format::Y_U8).unwrap();
    let mut iter = RegionIter::new();
    iter.add_read(&a, a.extent()).unwrap();
    iter.add_read(&b, b.extent()).unwrap();
    let err = iter.next_step().unwrap_err();
    assert!(err.is_cache_error());
    assert!(iter.next_step().unwrap().is_none());
    assert_eq!(ctx.cache().stats().unwrap().pinned, 0);
}
