//! Integration tests for the video pipeline
//!
//! These tests verify:
//! - Surface resizing and conversion rebuilds as the stream geometry changes
//! - Flush semantics
//! - Backpressure from the presentation context
//! - Lifecycle rules enforced by the renderer handle

use anyhow::Result;
use mirrorcast_integration_tests::{count_calls, picture_unit, PipelineFixture, ScriptedDecoder, SurfaceCall};
use mirrorcast_render::convert::Geometry;
use mirrorcast_render::decoder::DecoderState;
use mirrorcast_render::renderer::{Renderer, VideoRenderer};
use mirrorcast_render::utils::config::BackgroundMode;
use mirrorcast_render::{AccessUnit, RendererError, VideoHandle};
use std::time::{Duration, Instant};

fn submit_size(pipeline: &mut impl Renderer, width: u32, height: u32, pts: u64) -> Result<()> {
    let data = picture_unit(width, height);
    pipeline.submit(&AccessUnit::video(&data, pts, None))?;
    Ok(())
}

#[test]
fn test_resize_only_when_geometry_changes() -> Result<()> {
    let fixture = PipelineFixture {
        initial_size: Geometry::new(1280, 720),
        ..Default::default()
    };
    let (mut pipeline, log) = fixture.build(Box::new(ScriptedDecoder::new()))?;

    submit_size(&mut pipeline, 1280, 720, 0)?;
    assert_eq!(pipeline.conversion_rebuilds(), 1);
    submit_size(&mut pipeline, 1280, 720, 33_333)?;
    assert_eq!(pipeline.conversion_rebuilds(), 1);
    submit_size(&mut pipeline, 1920, 1080, 66_666)?;
    assert_eq!(pipeline.conversion_rebuilds(), 2);

    let resizes: Vec<_> = log
        .lock()
        .iter()
        .filter_map(|call| match call {
            SurfaceCall::Resize(size) => Some(*size),
            _ => None,
        })
        .collect();
    assert_eq!(resizes, vec![Geometry::new(1920, 1080)]);

    let uploads: Vec<_> = log
        .lock()
        .iter()
        .filter_map(|call| match call {
            SurfaceCall::Upload { frame, .. } => Some(*frame),
            _ => None,
        })
        .collect();
    assert_eq!(
        uploads,
        vec![
            Geometry::new(1280, 720),
            Geometry::new(1280, 720),
            Geometry::new(1920, 1080)
        ]
    );
    assert_eq!(pipeline.frames_presented(), 3);

    Ok(())
}

#[test]
fn test_surface_matches_frame_before_upload() -> Result<()> {
    let (mut pipeline, log) = PipelineFixture::default().build(Box::new(ScriptedDecoder::new()))?;

    for (index, (width, height)) in [(640, 360), (1280, 720), (1280, 720), (720, 1280)].into_iter().enumerate() {
        submit_size(&mut pipeline, width, height, index as u64)?;
    }

    for call in log.lock().iter() {
        if let SurfaceCall::Upload { frame, surface, .. } = call {
            assert_eq!(frame, surface, "upload into a surface of the wrong size");
        }
    }
    assert_eq!(count_calls(&log, |call| matches!(call, SurfaceCall::Resize(_))), 3);

    Ok(())
}

#[test]
fn test_flush_discards_undrained_units() -> Result<()> {
    let decoder = ScriptedDecoder::new().with_delay(5);
    let probe = decoder.probe();
    let (mut pipeline, log) = PipelineFixture::default().build(Box::new(decoder))?;

    for pts in 0..5 {
        submit_size(&mut pipeline, 320, 240, pts)?;
    }
    pipeline.flush()?;

    assert_eq!(pipeline.frames_presented(), 0);
    assert_eq!(count_calls(&log, |call| matches!(call, SurfaceCall::Present)), 0);
    assert_eq!(probe.flushes(), 1);
    assert_eq!(pipeline.state(), DecoderState::Ready);

    // Still usable right after the flush
    for pts in 5..11 {
        submit_size(&mut pipeline, 320, 240, pts)?;
    }
    assert_eq!(pipeline.frames_presented(), 1);

    Ok(())
}

#[test]
fn test_submit_blocks_until_presented() -> Result<()> {
    let fixture = PipelineFixture {
        present_delay: Duration::from_millis(60),
        ..Default::default()
    };
    let (mut pipeline, log) = fixture.build(Box::new(ScriptedDecoder::new()))?;
    pipeline.start()?;

    let started = Instant::now();
    submit_size(&mut pipeline, 160, 120, 0)?;
    assert!(started.elapsed() >= Duration::from_millis(60));

    // The present task finished before submit returned
    assert_eq!(log.lock().last(), Some(&SurfaceCall::Present));

    Ok(())
}

#[test]
fn test_start_is_idempotent() -> Result<()> {
    let (mut pipeline, log) = PipelineFixture::default().build(Box::new(ScriptedDecoder::new()))?;

    pipeline.start()?;
    pipeline.start()?;
    submit_size(&mut pipeline, 64, 64, 0)?;
    pipeline.start()?;

    assert_eq!(count_calls(&log, |call| *call == SurfaceCall::Clear), 1);
    assert_eq!(pipeline.frames_presented(), 1);

    Ok(())
}

#[test]
fn test_malformed_unit_is_skipped() -> Result<()> {
    let (mut pipeline, _log) = PipelineFixture::default().build(Box::new(ScriptedDecoder::new()))?;

    pipeline.submit(&AccessUnit::video(b"BAD", 0, None))?;
    submit_size(&mut pipeline, 64, 64, 1)?;

    assert_eq!(pipeline.frames_presented(), 1);
    Ok(())
}

#[test]
fn test_fatal_error_reopens_decoder() -> Result<()> {
    let decoder = ScriptedDecoder::new();
    let probe = decoder.probe();
    let (mut pipeline, _log) = PipelineFixture::default().build(Box::new(decoder))?;

    submit_size(&mut pipeline, 64, 64, 0)?;
    pipeline.submit(&AccessUnit::video(b"FAIL", 1, None))?;
    submit_size(&mut pipeline, 64, 64, 2)?;

    assert_eq!(probe.opens(), 2);
    assert_eq!(pipeline.decoder_reopens(), 1);
    assert_eq!(pipeline.frames_presented(), 2);
    assert_eq!(pipeline.conversion_rebuilds(), 2);

    Ok(())
}

#[test]
fn test_failed_reopen_closes_pipeline() -> Result<()> {
    let decoder = ScriptedDecoder::new().failing_reopen();
    let (mut pipeline, _log) = PipelineFixture::default().build(Box::new(decoder))?;

    assert!(pipeline.submit(&AccessUnit::video(b"FAIL", 0, None)).is_err());
    assert_eq!(pipeline.state(), DecoderState::Closed);

    let data = picture_unit(64, 64);
    let result = pipeline.submit(&AccessUnit::video(&data, 1, None));
    assert!(matches!(result, Err(RendererError::Decoder(_))));

    Ok(())
}

#[test]
fn test_background_follows_connections() -> Result<()> {
    let fixture = PipelineFixture {
        background: BackgroundMode::Off,
        ..Default::default()
    };
    let (mut pipeline, log) = fixture.build(Box::new(ScriptedDecoder::new()))?;

    // Counted before start, applied by start
    pipeline.notify_background_state(1)?;
    pipeline.start()?;
    pipeline.notify_background_state(-1)?;
    pipeline.notify_background_state(-1)?;
    pipeline.notify_background_state(1)?;

    assert_eq!(pipeline.connections(), 1);
    assert_eq!(
        *log.lock(),
        vec![SurfaceCall::Visible(false), SurfaceCall::Visible(true)]
    );

    Ok(())
}

#[test]
fn test_handle_rejects_use_after_destroy() -> Result<()> {
    let decoder = ScriptedDecoder::new();
    let probe = decoder.probe();
    let (pipeline, _log) = PipelineFixture::default().build(Box::new(decoder))?;
    let mut handle = VideoHandle::new(Box::new(pipeline));

    handle.start()?;
    handle.destroy()?;
    handle.destroy()?;
    assert_eq!(probe.closes(), 1);

    let data = picture_unit(64, 64);
    assert!(matches!(
        handle.submit(&AccessUnit::video(&data, 0, None)),
        Err(RendererError::Destroyed)
    ));
    assert!(matches!(handle.flush(), Err(RendererError::Destroyed)));
    assert!(matches!(
        handle.notify_background_state(1),
        Err(RendererError::Destroyed)
    ));

    Ok(())
}
