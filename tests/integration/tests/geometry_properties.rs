//! Property tests for surface resizing over arbitrary geometry sequences

use mirrorcast_integration_tests::{count_calls, picture_unit, PipelineFixture, ScriptedDecoder, SurfaceCall};
use mirrorcast_render::renderer::Renderer;
use mirrorcast_render::AccessUnit;
use proptest::prelude::*;

fn geometry() -> impl Strategy<Value = (u32, u32)> {
    // Even sizes keep YUV420P chroma planes exact
    (1u32..=8, 1u32..=8).prop_map(|(w, h)| (w * 16, h * 16))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_resizes_follow_geometry_changes(sizes in prop::collection::vec(geometry(), 1..12)) {
        let (mut pipeline, log) = PipelineFixture::default()
            .build(Box::new(ScriptedDecoder::new()))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;

        for (pts, &(width, height)) in sizes.iter().enumerate() {
            let data = picture_unit(width, height);
            pipeline
                .submit(&AccessUnit::video(&data, pts as u64, None))
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
        }

        // The surface starts at 0x0, so the first picture always counts as a change
        let runs = 1 + sizes.windows(2).filter(|pair| pair[0] != pair[1]).count();

        prop_assert_eq!(count_calls(&log, |call| matches!(call, SurfaceCall::Resize(_))), runs);
        prop_assert_eq!(pipeline.conversion_rebuilds(), runs as u64);
        prop_assert_eq!(pipeline.frames_presented(), sizes.len() as u64);

        for call in log.lock().iter() {
            if let SurfaceCall::Upload { frame, surface, .. } = call {
                prop_assert_eq!(frame, surface);
            }
        }
    }
}
