// The WGSL kernel on a real adapter against the host raymarcher on the CPU
// backend. Skipped when no adapter is available.

#[cfg(feature = "gpu")]
mod golden {
    use compute::BackendSelection;
    use glam::{Quat, Vec3};
    use render::{Camera, FrameBaker, RenderConfig, RenderContext, StaticScene};
    use std::path::PathBuf;
    use volumes::Volume;

    fn bake(backend: BackendSelection, scene: &StaticScene, camera: &Camera) -> Option<Vec<u8>> {
        let config = RenderConfig {
            resolution: (160, 120),
            kernel_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kernels"),
            backend,
            ..RenderConfig::default()
        };
        let context = RenderContext::initialize(config).ok()?;
        let mut baker = FrameBaker::new(context, Box::new(scene.clone()));
        let frame = baker.bake(camera);
        assert!(frame.is_ok(), "{:?}", frame.failure);
        Some(frame.image.into_raw())
    }

    #[test]
    fn wgpu_matches_host_raymarcher() {
        let scene = StaticScene::new(vec![
            Volume::cuboid(Vec3::ZERO, Vec3::ONE)
                .unwrap()
                .with_rotation(Quat::from_rotation_y(0.4))
                .unwrap(),
            Volume::sphere(Vec3::new(1.5, 0.5, 1.0), 1.0).unwrap(),
        ]);
        let camera = Camera::looking_at(Vec3::new(0.5, 1.0, -5.0), Vec3::ZERO);

        let Some(gpu) = bake(BackendSelection::Gpu, &scene, &camera) else {
            eprintln!("no wgpu adapter, skipping");
            return;
        };
        let cpu = bake(BackendSelection::Cpu, &scene, &camera).unwrap();
        assert_eq!(gpu.len(), cpu.len());

        // Float differences may flip a few silhouette pixels and move
        // channels by a step or two.
        let pixels = cpu.len() / 4;
        let differing = cpu
            .chunks_exact(4)
            .zip(gpu.chunks_exact(4))
            .filter(|(c, g)| c.iter().zip(g.iter()).any(|(a, b)| a.abs_diff(*b) > 2))
            .count();
        assert!(
            differing * 100 <= pixels,
            "{differing} of {pixels} pixels differ"
        );
    }
}
