use super::*;
use crate::{
    backend::gpu::GpuPlatform,
    resource::pool::{ResourceState, RetentionPolicy},
};

fn gpu(max_live: usize) -> GpuPool {
    GpuPool::new(GpuPlatform::new(max_live), RetentionPolicy::KeepMaximum)
}

fn engine(ns: Namespace) -> EngineRoot {
    EngineRoot::new(ns, EngineConfig::default(), gpu(4))
}

fn blue() -> Rgba8Premul {
    Rgba8Premul::from_straight_rgba(0, 0, 255, 255)
}

#[test]
fn create_image_allocates_fresh_handles_lazily() {
    let mut root = engine(Namespace::Browser);
    root.create_image_with_handle("img-1", Size::new(2, 2))
        .unwrap();
    let a = root.create_image(Size::new(2, 2)).unwrap();
    let b = root.create_image(Size::new(2, 2)).unwrap();
    assert_eq!(a, "img-0");
    assert_eq!(b, "img-2");
    assert_eq!(root.handles(), vec!["img-0", "img-1", "img-2"]);
    assert!(root.image(&a).unwrap().materialized_kinds().is_empty());
}

#[test]
fn oversized_or_empty_images_are_rejected_before_registration() {
    let mut cfg = EngineConfig::default();
    cfg.max_image_size = Size::new(100, 100);
    let mut root = EngineRoot::new(Namespace::Browser, cfg, gpu(16));
    for size in [Size::new(0, 50), Size::new(101, 1), Size::new(1, 0)] {
        assert!(matches!(
            root.create_image_with_handle("x", size),
            Err(EngineError::Dimension(_))
        ));
    }
    assert!(root.handles().is_empty());
    assert!(root.create_image_with_handle("x", Size::new(100, 100)).is_ok());
}

#[test]
fn handle_collision_keeps_original() {
    let mut root = engine(Namespace::Node);
    root.create_image_with_handle("img1", Size::new(2, 2))
        .unwrap();
    root.fill_image("img1", blue()).unwrap();
    let err = root
        .create_image_with_handle("img1", Size::new(9, 9))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Protocol(ProtocolError::HandleCollision(_))
    ));
    assert_eq!(root.image("img1").unwrap().size(), Size::new(2, 2));
    assert_eq!(root.pixel("img1", 1, 1).unwrap(), blue());
}

#[test]
fn release_image_parks_and_restores_content() {
    let mut root = engine(Namespace::Browser);
    let h = root.create_image(Size::new(3, 3)).unwrap();
    root.fill_image(&h, blue()).unwrap();

    root.release_image(&h, ReleaseFlags::ReleaseOwnOnly)
        .unwrap();
    root.release_image(&h, ReleaseFlags::ReleaseRecursive)
        .unwrap();
    let img = root.image(&h).unwrap();
    assert!(img.materialized_kinds().is_empty());
    assert!(img.has_pixel_snapshot());
    assert_eq!(root.pixel(&h, 2, 2).unwrap(), blue());

    let (image, env) = root.image_env(&h).unwrap();
    image.set_pixel(env, 0, 0, Rgba8Premul::transparent()).unwrap();
    assert!(!image.has_pixel_snapshot());
    assert_eq!(image.get_pixel(env, 1, 1).unwrap(), blue());
    assert_eq!(
        image.get_pixel(env, 0, 0).unwrap(),
        Rgba8Premul::transparent()
    );
}

#[test]
fn move_and_copy_across_kinds() {
    let mut root = engine(Namespace::Browser);
    let a = root.create_image(Size::new(4, 2)).unwrap();
    let b = root.create_image(Size::new(4, 2)).unwrap();
    root.fill_image(&a, blue()).unwrap();

    assert_eq!(
        root.move_image(&a, SurfaceKind::Gpu).unwrap(),
        CopyPath::PixelBuffer
    );
    let img = root.image(&a).unwrap();
    assert_eq!(img.primary_kind(), SurfaceKind::Gpu);
    assert_eq!(img.materialized_kinds(), vec![SurfaceKind::Gpu]);

    assert_eq!(root.copy_image(&b, &a).unwrap(), CopyPath::PixelBuffer);
    assert_eq!(root.pixel(&b, 3, 1).unwrap(), blue());

    assert_eq!(
        root.move_image(&b, SurfaceKind::Offscreen).unwrap(),
        CopyPath::Direct
    );
    assert_eq!(root.pixel(&b, 0, 0).unwrap(), blue());
    assert!(matches!(
        root.copy_image(&a, &a),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        root.copy_image(&a, "missing"),
        Err(EngineError::Protocol(ProtocolError::UnknownHandle(_)))
    ));
}

#[test]
fn png_round_trip_through_scratch_pool() {
    let mut root = engine(Namespace::Node);
    let a = root.create_image(Size::new(3, 2)).unwrap();
    root.fill_image(&a, blue()).unwrap();
    let png = pollster::block_on(root.encode_png(&a)).unwrap();

    let b = root.create_image(Size::new(3, 2)).unwrap();
    pollster::block_on(root.load_encoded(&b, &png)).unwrap();
    assert_eq!(root.read_pixels(&b).unwrap(), root.read_pixels(&a).unwrap());

    let stats = root.metrics().scratch_pool;
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 1);

    let c = root.create_image(Size::new(5, 5)).unwrap();
    assert!(matches!(
        pollster::block_on(root.load_encoded(&c, &png)),
        Err(EngineError::Dimension(_))
    ));
}

#[test]
fn root_release_own_only_parks_gpu_content_before_dropping_the_context() {
    let mut root = engine(Namespace::Browser);
    let a = root.create_image(Size::new(2, 2)).unwrap();
    let cpu = root.create_image(Size::new(2, 2)).unwrap();
    root.move_image(&a, SurfaceKind::Gpu).unwrap();
    root.fill_image(&a, blue()).unwrap();
    root.fill_image(&cpu, blue()).unwrap();
    assert_eq!(root.metrics().gpu_pool.idle, 1);

    root.release_resources((), ReleaseFlags::ReleaseOwnOnly)
        .unwrap();
    let m = root.metrics();
    assert_eq!(m.gpu_pool.live, 0);
    assert_eq!(m.gpu_context, None);
    assert_eq!(m.platform_live_contexts, 0);
    assert_eq!(m.materialized[&SurfaceKind::Gpu], 0);
    assert_eq!(m.materialized[&SurfaceKind::Raster], 1);
    assert_eq!(m.pixel_snapshots, 1);

    assert_eq!(root.pixel(&a, 0, 0).unwrap(), blue());
    assert_eq!(root.pixel(&cpu, 1, 1).unwrap(), blue());
    assert_eq!(root.read_pixels(&a).unwrap(), PixelBuffer::solid(Size::new(2, 2), blue()));
}

#[test]
fn root_release_recursive_parks_every_image() {
    let mut root = engine(Namespace::Browser);
    let a = root.create_image(Size::new(2, 2)).unwrap();
    root.move_image(&a, SurfaceKind::Gpu).unwrap();
    root.fill_image(&a, blue()).unwrap();
    root.release_resources((), ReleaseFlags::ReleaseRecursive)
        .unwrap();
    let m = root.metrics();
    assert_eq!(m.materialized[&SurfaceKind::Gpu], 0);
    assert_eq!(m.pixel_snapshots, 1);
    assert_eq!(root.pixel(&a, 1, 1).unwrap(), blue());
}

#[test]
fn dispose_is_terminal() {
    let mut root = engine(Namespace::Browser);
    let a = root.create_image(Size::new(2, 2)).unwrap();
    root.move_image(&a, SurfaceKind::Gpu).unwrap();
    root.fill_image(&a, blue()).unwrap();
    let platform = root.backends().platform().clone();
    assert_eq!(platform.live_contexts(), 1);

    root.dispose().unwrap();
    assert!(root.is_disposed());
    assert_eq!(platform.live_contexts(), 0);
    assert_eq!(root.metrics().images_disposed, 1);
    assert!(matches!(root.dispose(), Err(EngineError::InvalidState(_))));
    assert!(matches!(
        root.create_image(Size::new(1, 1)),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        root.release_resources((), ReleaseFlags::ReleaseOwnOnly),
        Err(EngineError::InvalidState(_))
    ));
}

#[test]
fn disposed_image_handle_stays_taken() {
    let mut root = engine(Namespace::Node);
    let a = root.create_image(Size::new(2, 2)).unwrap();
    root.dispose_image(&a).unwrap();
    assert!(root.handles().is_empty());
    assert!(root.image(&a).unwrap().is_disposed());
    assert_eq!(root.metrics().live_images, 0);
    assert_eq!(root.metrics().images_disposed, 1);

    assert!(matches!(
        root.dispose_image(&a),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        root.fill_image(&a, blue()),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        root.release_image(&a, ReleaseFlags::ReleaseOwnOnly),
        Err(EngineError::InvalidState(_))
    ));
    assert!(matches!(
        root.create_image_with_handle(&a, Size::new(1, 1)),
        Err(EngineError::Protocol(ProtocolError::HandleCollision(_)))
    ));
    assert_eq!(root.metrics().images_disposed, 1);
    assert_ne!(root.create_image(Size::new(1, 1)).unwrap(), a);
}

#[test]
fn image_release_skips_snapshot_when_context_is_gone() {
    let shared = gpu(1);
    let mut a = EngineRoot::new(Namespace::Browser, EngineConfig::default(), shared.clone());
    let mut b = EngineRoot::new(Namespace::Browser, EngineConfig::default(), shared.clone());
    let ha = a.create_image(Size::new(2, 2)).unwrap();
    let hb = b.create_image(Size::new(2, 2)).unwrap();
    a.move_image(&ha, SurfaceKind::Gpu).unwrap();
    a.fill_image(&ha, blue()).unwrap();

    // a's context is revoked, and b's active lease holds the only slot.
    shared.platform().revoke_all();
    b.move_image(&hb, SurfaceKind::Gpu).unwrap();
    let platform = shared.platform().clone();
    let (image, env) = b.image_env(&hb).unwrap();
    let lease = env.lease_gpu().unwrap();
    assert_eq!(platform.live_contexts(), 1);

    a.release_image(&ha, ReleaseFlags::ReleaseRecursive).unwrap();
    a.release_resources((), ReleaseFlags::ReleaseOwnOnly).unwrap();
    let img = a.image(&ha).unwrap();
    assert!(img.materialized_kinds().is_empty());
    assert!(!img.has_pixel_snapshot());
    assert_eq!(platform.created_total(), 2);

    env.return_gpu(lease);
    assert!(image.get_pixel(env, 0, 0).is_ok());
}

#[test]
fn engines_recycle_each_others_idle_contexts_at_the_ceiling() {
    let shared = gpu(2);
    let mut engines: Vec<EngineRoot> = (0..3)
        .map(|_| EngineRoot::new(Namespace::Browser, EngineConfig::default(), shared.clone()))
        .collect();
    let handles: Vec<String> = engines
        .iter_mut()
        .map(|e| e.create_image(Size::new(2, 2)).unwrap())
        .collect();
    for (engine, h) in engines.iter_mut().zip(&handles) {
        engine.move_image(h, SurfaceKind::Gpu).unwrap();
        engine.fill_image(h, blue()).unwrap();
    }

    let platform = shared.platform();
    assert_eq!(platform.live_contexts(), 2);
    assert_eq!(platform.created_total(), 3);
    // Engine 0's context was least recently used and got recycled for engine 2.
    assert_eq!(engines[0].metrics().gpu_context, None);
    assert_eq!(
        engines[2].metrics().gpu_context,
        Some(ResourceState::Frozen)
    );
    assert_eq!(shared.stats().evicted, 1);
    assert_eq!(
        shared.idle_keys(),
        vec![
            engines[1].backends().gpu_key().to_string(),
            engines[2].backends().gpu_key().to_string(),
        ]
    );
    assert_eq!(engines[2].pixel(&handles[2], 1, 1).unwrap(), blue());
}

#[test]
fn bounded_gpu_retention_disposes_idle_context() {
    let shared = GpuPool::new(GpuPlatform::new(1), RetentionPolicy::BoundedLru { capacity: 0 });
    let mut root = EngineRoot::new(Namespace::Browser, EngineConfig::default(), shared);
    let a = root.create_image(Size::new(1, 1)).unwrap();
    root.move_image(&a, SurfaceKind::Gpu).unwrap();
    assert_eq!(root.backends().platform().live_contexts(), 0);
    assert_eq!(root.metrics().gpu_pool.evicted, 1);
}

#[test]
fn config_from_json() {
    let cfg = EngineConfig::from_json(
        r#"{"max_image_size": {"width": 10, "height": 20}, "scratch_retention": "keep_maximum"}"#,
    )
    .unwrap();
    assert_eq!(cfg.max_image_size, Size::new(10, 20));
    assert_eq!(cfg.scratch_retention, RetentionPolicy::KeepMaximum);
    assert_eq!(
        EngineConfig::from_json("{}").unwrap(),
        EngineConfig::default()
    );
    assert!(matches!(
        EngineConfig::from_json("{\"max_image_size\": 3}"),
        Err(EngineError::Serde(_))
    ));
}
