use bytes::Bytes;
use proptest::prelude::*;
use vigil_eye::*;

proptest! {
    #[test]
    fn test_fit_within_never_exceeds_target(
        w in 1u32..2000,
        h in 1u32..2000,
        tw in 1u32..2000,
        th in 1u32..2000,
    ) {
        let (fw, fh) = fit_within(w, h, RenderSize { width: tw, height: th });
        prop_assert!(fw >= 1 && fw <= tw);
        prop_assert!(fh >= 1 && fh <= th);
        // One side touches the target
        prop_assert!(fw == tw || fh == th || (fw as i64 - tw as i64).abs() <= 1 || (fh as i64 - th as i64).abs() <= 1);
    }

    #[test]
    fn test_decode_accepts_only_exact_length(
        w in 1u32..32,
        h in 1u32..32,
        delta in -5i64..5,
    ) {
        let format = FrameFormat::rgb(w, h);
        let expected = (w * h * 3) as i64;
        let len = (expected + delta).max(0) as usize;
        let result = decode_frame(format, Bytes::from(vec![0u8; len]));
        if len as i64 == expected {
            prop_assert!(result.is_ok());
        } else {
            let is_decode_error = matches!(result, Err(VisionError::ProtocolDecode { .. }));
            prop_assert!(is_decode_error);
        }
    }

    #[test]
    fn test_scaled_frame_has_render_size(
        w in 1u32..24,
        h in 1u32..24,
        tw in 1u32..48,
        th in 1u32..48,
    ) {
        let frame = FrameBuffer::new(FrameFormat::rgb(w, h), vec![128u8; (w * h * 3) as usize]).unwrap();
        let scaled = scale_to_fit(&frame, RenderSize { width: tw, height: th }).unwrap();
        prop_assert_eq!(scaled.width(), tw);
        prop_assert_eq!(scaled.height(), th);
        prop_assert_eq!(scaled.data().len(), (tw * th * 3) as usize);
    }
}
