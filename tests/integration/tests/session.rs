//! Session and factory integration tests

use anyhow::Result;
use mirrorcast_integration_tests::{
    count_calls, picture_unit, DecoderProbe, MemorySink, PassthroughAudioDecoder, PipelineFixture, ScriptedDecoder,
    SurfaceCall,
};
use mirrorcast_render::present::{FrameCallback, PresentQueue, PresentTask, SurfaceEvent};
use mirrorcast_render::renderer::AudioPipeline;
use mirrorcast_render::utils::config::BackgroundMode;
use mirrorcast_render::{
    AudioBackend, AudioHandle, Backend, MirrorSession, RendererConfig, RendererError, RendererFactory, VideoBackend,
    VideoHandle,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn session_with_memory_sink(background: BackgroundMode) -> Result<(MirrorSession, MemorySink, Arc<DecoderProbe>)> {
    let fixture = PipelineFixture {
        background,
        ..Default::default()
    };
    let (pipeline, _log) = fixture.build(Box::new(ScriptedDecoder::new()))?;
    let video = VideoHandle::new(Box::new(pipeline));

    let sink = MemorySink::default();
    let decoder = PassthroughAudioDecoder::default();
    let probe = Arc::clone(&decoder.probe);
    let audio = AudioHandle::new(Box::new(AudioPipeline::new(
        AudioBackend::Null,
        Box::new(decoder),
        Box::new(sink.clone()),
    )));

    Ok((MirrorSession::new(video, Some(audio)), sink, probe))
}

#[test]
fn test_session_flow() -> Result<()> {
    let (session, sink, probe) = session_with_memory_sink(BackgroundMode::On)?;

    session.start()?;
    session.open_connection()?;
    assert!(sink.state.lock().playing);

    session.video_process(&picture_unit(320, 240), 0)?;
    session.audio_process(&[1, 2, 3], 0)?;
    assert_eq!(sink.state.lock().pcm.len(), 6);

    session.set_airplay_volume(0.0)?;
    assert_eq!(sink.state.lock().volume, 1.0);
    session.set_airplay_volume(-144.0)?;
    assert_eq!(sink.state.lock().volume, 0.0);

    session.audio_flush()?;
    {
        let state = sink.state.lock();
        assert!(state.pcm.is_empty());
        assert_eq!(state.clears, 1);
    }
    assert_eq!(probe.flushes(), 1);

    session.video_flush()?;
    session.close_connection()?;
    session.shutdown()?;

    assert!(!sink.state.lock().playing);
    assert_eq!(probe.closes(), 1);
    assert!(matches!(
        session.video_process(&picture_unit(320, 240), 1),
        Err(RendererError::Destroyed)
    ));
    // Audio is gone after shutdown and is silently ignored
    session.audio_process(&[4], 1)?;

    // A second shutdown changes nothing
    session.shutdown()?;
    assert_eq!(probe.closes(), 1);

    Ok(())
}

#[test]
fn test_session_without_audio() -> Result<()> {
    let (pipeline, log) = PipelineFixture::default().build(Box::new(ScriptedDecoder::new()))?;
    let session = MirrorSession::new(VideoHandle::new(Box::new(pipeline)), None);

    session.start()?;
    session.audio_process(&[1, 2], 0)?;
    session.audio_flush()?;
    session.set_airplay_volume(-10.0)?;
    session.video_process(&picture_unit(64, 48), 0)?;

    assert_eq!(count_calls(&log, |call| *call == SurfaceCall::Present), 1);
    Ok(())
}

#[test]
fn test_connections_drive_background() -> Result<()> {
    let fixture = PipelineFixture {
        background: BackgroundMode::On,
        ..Default::default()
    };
    let (pipeline, log) = fixture.build(Box::new(ScriptedDecoder::new()))?;
    let session = MirrorSession::new(VideoHandle::new(Box::new(pipeline)), None);

    session.start()?;
    session.open_connection()?;
    session.open_connection()?;
    session.close_connection()?;
    assert_eq!(count_calls(&log, |call| *call == SurfaceCall::Clear), 1);

    session.close_connection()?;
    assert_eq!(count_calls(&log, |call| *call == SurfaceCall::Clear), 2);

    // More disconnects than connects never go below zero
    session.close_connection()?;
    session.open_connection()?;
    session.close_connection()?;
    assert_eq!(count_calls(&log, |call| *call == SurfaceCall::Clear), 3);

    Ok(())
}

/// A display whose window never got a surface
struct ClosedDisplay;

impl PresentQueue for ClosedDisplay {
    fn post(&self, task: PresentTask) -> mirrorcast_render::Result<()> {
        drop(task);
        Ok(())
    }
}

#[test]
fn test_wgpu_needs_a_working_display() -> Result<()> {
    let factory = RendererFactory::new(RendererConfig::default()).with_display(Arc::new(ClosedDisplay));
    assert!(matches!(factory.create_video(), Err(RendererError::BackendUnavailable(_))));
    Ok(())
}

#[test]
fn test_factory_rejects_unusable_configurations() -> Result<()> {
    let mut config = RendererConfig::default();
    config.video.backend = "dispmanx".to_string();
    let result = RendererFactory::new(config.clone()).create_video();
    assert!(matches!(result, Err(RendererError::BackendUnavailable(_))));

    config.video.backend = "wgpu".to_string();
    let result = RendererFactory::new(config.clone()).create_video();
    assert!(matches!(result, Err(RendererError::BackendUnavailable(_))));

    config.video.backend = "callback".to_string();
    let result = RendererFactory::new(config).create_video();
    assert!(matches!(result, Err(RendererError::BackendUnavailable(_))));

    Ok(())
}

#[test]
fn test_factory_builds_null_audio() -> Result<()> {
    let mut config = RendererConfig::default();
    config.audio.device = "None".to_string();

    let mut audio = RendererFactory::new(config).create_audio()?;
    assert_eq!(audio.backend(), Backend::Audio(AudioBackend::Null));
    audio.start()?;
    audio.set_volume(0.25)?;
    assert_eq!(audio.volume()?, 0.25);
    audio.set_volume(f32::NAN)?;
    assert_eq!(audio.volume()?, 0.0);
    audio.destroy()?;
    assert!(audio.set_volume(1.0).is_err());

    Ok(())
}

#[test]
fn test_callback_backend_end_to_end() -> Result<()> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let callback: FrameCallback = Arc::new(move |event: SurfaceEvent<'_>| {
        let name = match event {
            SurfaceEvent::Resized(_) => "resized",
            SurfaceEvent::Frame(_) => "frame",
            SurfaceEvent::Idle => "idle",
            SurfaceEvent::Visibility(_) => "visibility",
        };
        seen.lock().push(name);
    });

    let mut config = RendererConfig::default();
    config.video.backend = "callback".to_string();
    config.audio.device = "none".to_string();
    let factory = RendererFactory::new(config).with_frame_callback(callback);

    let session = MirrorSession::from_factory(&factory)?;
    assert_eq!(*events.lock(), vec!["idle"]);

    // Not H.264 at all; the decoder drops it and stays usable
    session.open_connection()?;
    session.video_process(&[0, 0, 0, 1, 0x65, 0xff, 0x00, 0x13], 0)?;
    session.video_process(b"definitely not a bitstream", 33_333)?;
    session.video_flush()?;
    session.shutdown()?;

    assert!(!events.lock().contains(&"frame"));
    Ok(())
}

#[test]
fn test_factory_reports_backend() -> Result<()> {
    let callback: FrameCallback = Arc::new(|_event: SurfaceEvent<'_>| {});
    let mut config = RendererConfig::default();
    config.video.backend = "callback".to_string();

    let mut video = RendererFactory::new(config).with_frame_callback(callback).create_video()?;
    assert_eq!(video.backend(), Backend::Video(VideoBackend::Callback));
    video.destroy()?;
    assert!(video.is_destroyed());

    Ok(())
}
