use super::*;

#[test]
fn ceiling_is_enforced_and_freed_on_drop() {
    let platform = GpuPlatform::new(2);
    let a = platform.create_context().unwrap();
    let b = platform.create_context().unwrap();
    assert_eq!(platform.live_contexts(), 2);
    assert!(matches!(
        platform.create_context(),
        Err(EngineError::ResourceExhausted(_))
    ));

    drop(a);
    assert_eq!(platform.live_contexts(), 1);
    let c = platform.create_context().unwrap();
    assert_ne!(b.id(), c.id());
}

#[test]
fn revoked_context_reports_lost_and_frees_slot() {
    let platform = GpuPlatform::new(1);
    let mut ctx = platform.create_context().unwrap();
    let tex = ctx.create_texture(Size::new(2, 2)).unwrap();
    assert!(ctx.has_texture(tex));

    assert!(platform.revoke(ctx.id()));
    assert!(ctx.is_lost());
    assert!(!ctx.has_texture(tex));
    assert!(matches!(
        ctx.read_pixels(tex),
        Err(EngineError::ContextInvalidated(_))
    ));
    assert_eq!(platform.live_contexts(), 0);
    assert!(platform.create_context().is_ok());
}

#[test]
fn texel_addressing_is_bottom_up() {
    let platform = GpuPlatform::default();
    let mut ctx = platform.create_context().unwrap();
    let tex = ctx.create_texture(Size::new(2, 2)).unwrap();
    let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
    ctx.write_texel(tex, 1, 0, red).unwrap();

    let rows = ctx.read_pixels(tex).unwrap();
    assert_eq!(&rows[4..8], &[255, 0, 0, 255]);
    assert_eq!(ctx.read_texel(tex, 1, 0).unwrap(), red);
    assert!(ctx.read_texel(tex, 2, 0).is_err());
}

#[test]
fn pool_hooks_follow_context_liveness() {
    let platform = GpuPlatform::new(4);
    let mut ctx = platform.create_context().unwrap();
    ctx.resize_drawing_buffer(Size::new(64, 64)).unwrap();

    assert!(ctx.freeze());
    assert_eq!(ctx.drawing_buffer(), Size::new(1, 1));
    assert!(ctx.defrost());

    platform.revoke(ctx.id());
    assert!(!ctx.defrost());
    assert!(!ctx.freeze());

    let mut other = platform.create_context().unwrap();
    other.dispose();
    assert!(other.is_lost());
    assert_eq!(other.drawing_buffer(), Size::new(0, 0));
    assert_eq!(platform.live_contexts(), 0);
}
