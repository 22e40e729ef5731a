//! Procedural scene models for both labs.
//!
//! Every model here is assembled from the [`MeshData`] primitives so the
//! programs run without external asset files. Lab 5 models can be replaced
//! by STL files through [`AppConfig`](crate::AppConfig).

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::device::Device;
use crate::mesh::{MeshData, Transform};
use crate::model::{Material, Model, ModelError};
use crate::render_graph::TextureSource;

/// Material slot of the landing pad's monitor screen.
pub const SCREEN_MATERIAL: usize = 2;

fn block(position: Vec3, size: Vec3) -> MeshData {
    MeshData::cube().transformed(Transform::new().position(position).scale(size).matrix())
}

fn rgb(r: f32, g: f32, b: f32) -> Vec4 {
    Vec4::new(r, g, b, 1.0)
}

/// A grid of building blocks with open streets along both axes.
pub fn city<D: Device>(device: &mut D) -> Result<Model, ModelError> {
    let (low, tall) = city_lots();
    Model::builder("city")
        .material(Material::new("concrete", rgb(0.7, 0.7, 0.68)))
        .material(Material::new("glass", rgb(0.45, 0.55, 0.65)))
        .part(low, 0)
        .part(tall, 1)
        .build(device)
}

/// Low and tall buildings, split by material.
fn city_lots() -> (MeshData, MeshData) {
    let mut low = MeshData::default();
    let mut tall = MeshData::default();

    for i in -3i32..=3 {
        for j in -3i32..=3 {
            if i == 0 || j == 0 {
                continue;
            }
            // Deterministic height variation per lot.
            let hash = ((i * 73 + j * 151).rem_euclid(7)) as f32;
            let height = 3.0 + hash * 2.0;
            let center = Vec3::new(i as f32 * 12.0, height * 0.5 - 0.5, j as f32 * 12.0);
            let lot = block(center, Vec3::new(8.0, height, 8.0));
            if height > 9.0 {
                tall.merge(&lot);
            } else {
                low.merge(&lot);
            }
        }
    }
    (low, tall)
}

pub fn ground<D: Device>(device: &mut D) -> Result<Model, ModelError> {
    Model::builder("ground")
        .material(Material::new("asphalt", rgb(0.3, 0.3, 0.3)))
        .part(MeshData::plane(100.0), 0)
        .build(device)
}

/// A car facing +Z with its wheels resting on y = 0.
pub fn car<D: Device>(device: &mut D) -> Result<Model, ModelError> {
    let body = block(Vec3::new(0.0, 0.6, 0.0), Vec3::new(1.8, 0.6, 4.0));
    let cabin = block(Vec3::new(0.0, 1.2, -0.3), Vec3::new(1.6, 0.6, 2.0));

    let mut wheels = MeshData::default();
    for x in [-0.9, 0.9] {
        for z in [-1.3, 1.3] {
            wheels.merge(&block(Vec3::new(x, 0.35, z), Vec3::new(0.3, 0.7, 0.7)));
        }
    }

    Model::builder("car")
        .material(Material::new("paint", rgb(0.8, 0.1, 0.1)))
        .material(Material::new("window", rgb(0.2, 0.25, 0.35)))
        .material(Material::new("tyre", rgb(0.05, 0.05, 0.05)))
        .part(body, 0)
        .part(cabin, 1)
        .part(wheels, 2)
        .build(device)
}

/// The landing pad with a monitor facing the main camera.
///
/// The monitor's screen sits on [`SCREEN_MATERIAL`] and emits `screen`.
pub fn landing_pad<D: Device>(device: &mut D, screen: TextureSource) -> Result<Model, ModelError> {
    let deck = block(Vec3::new(0.0, -1.0, 0.0), Vec3::new(60.0, 2.0, 60.0));

    let mut pillars = MeshData::default();
    for x in [-27.0, 27.0] {
        for z in [-27.0, 27.0] {
            pillars.merge(&block(Vec3::new(x, -21.0, z), Vec3::new(4.0, 40.0, 4.0)));
        }
    }

    // Turned to face (-1, 0, 1), toward the main camera.
    let facing = Quat::from_rotation_y(-std::f32::consts::FRAC_PI_4);
    let monitor_at = Vec3::new(18.0, 10.0, -18.0);
    let housing = MeshData::cube().transformed(
        Transform::new()
            .position(monitor_at)
            .rotation(facing)
            .scale(Vec3::new(26.0, 15.5, 1.0))
            .matrix(),
    );
    let mut stand = block(Vec3::new(18.0, 1.0, -18.0), Vec3::new(2.0, 4.0, 2.0));
    stand.merge(&block(monitor_at - Vec3::Y * 6.0, Vec3::new(1.0, 6.0, 1.0)));
    let panel = MeshData::plane(1.0).transformed(
        Transform::new()
            .position(monitor_at + facing * Vec3::new(0.0, 0.0, 0.55))
            .rotation(facing * Quat::from_rotation_x(std::f32::consts::FRAC_PI_2))
            .scale(Vec3::new(24.0, 1.0, 13.5))
            .matrix(),
    );
    stand.merge(&housing);

    Model::builder("landing pad")
        .material(Material::new("deck", rgb(0.55, 0.55, 0.6)))
        .material(Material::new("metal", rgb(0.25, 0.25, 0.28)))
        .material(
            Material::new("screen", Vec4::new(0.0, 0.0, 0.0, 1.0)).emission_texture(screen),
        )
        .part(deck, 0)
        .part(pillars, 1)
        .part(stand, 1)
        .part(panel, SCREEN_MATERIAL)
        .build(device)
}

/// A small fighter pointing along +Z, centered on its fuselage.
pub fn fighter<D: Device>(device: &mut D) -> Result<Model, ModelError> {
    let mut hull = block(Vec3::ZERO, Vec3::new(2.5, 2.0, 14.0));
    hull.merge(&block(Vec3::new(0.0, 0.0, 7.5), Vec3::new(1.5, 1.2, 2.0)));
    hull.merge(&block(Vec3::new(0.0, 2.0, -5.0), Vec3::new(0.4, 3.0, 3.0)));

    let mut wings = block(Vec3::new(0.0, -0.2, -1.5), Vec3::new(16.0, 0.3, 4.0));
    wings.merge(&block(Vec3::new(0.0, 0.0, -6.0), Vec3::new(7.0, 0.25, 2.0)));

    let canopy = MeshData::sphere(16, 8).transformed(
        Transform::new()
            .position(Vec3::new(0.0, 1.1, 3.0))
            .scale(Vec3::new(1.6, 1.2, 3.5))
            .matrix(),
    );

    let mut engines = MeshData::default();
    for x in [-1.8, 1.8] {
        engines.merge(&block(Vec3::new(x, -0.3, -5.5), Vec3::new(1.2, 1.2, 4.0)));
    }

    Model::builder("fighter")
        .material(Material::new("hull", rgb(0.6, 0.62, 0.65)))
        .material(Material::new("canopy", rgb(0.1, 0.15, 0.25)))
        .material(Material::new("engine", rgb(0.15, 0.15, 0.15)).emissive(Vec3::new(1.0, 0.4, 0.1)))
        .part(hull, 0)
        .part(wings, 0)
        .part(canopy, 1)
        .part(engines, 2)
        .build(device)
}

/// A round camera head with its lens on +Z, one unit across.
pub fn camera_body<D: Device>(device: &mut D) -> Result<Model, ModelError> {
    let shell = MeshData::sphere(24, 12);
    let mut lens_ring = block(Vec3::new(0.0, 0.0, 0.45), Vec3::new(0.35, 0.35, 0.15));
    lens_ring.merge(&block(Vec3::new(0.0, 0.32, 0.0), Vec3::new(0.12, 0.2, 0.12)));
    let lens = MeshData::sphere(12, 6).transformed(Mat4::from_scale_rotation_translation(
        Vec3::new(0.25, 0.25, 0.1),
        Quat::IDENTITY,
        Vec3::new(0.0, 0.0, 0.53),
    ));

    Model::builder("camera body")
        .material(Material::new("shell", rgb(0.85, 0.85, 0.88)))
        .material(Material::new("trim", rgb(0.2, 0.2, 0.22)))
        .material(Material::new("lens", rgb(0.0, 0.1, 0.4)).emissive(Vec3::new(0.2, 0.5, 1.0)))
        .part(shell, 0)
        .part(lens_ring, 1)
        .part(lens, 2)
        .build(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording_device::RecordingDevice;
    use crate::render_graph::FramebufferSlot;

    #[test]
    fn screen_material_samples_the_given_source() {
        let mut device = RecordingDevice::new();
        let source = TextureSource::Color(FramebufferSlot(0));
        let pad = landing_pad(&mut device, source).unwrap();
        assert_eq!(pad.materials()[SCREEN_MATERIAL].emission_texture, Some(source));
        assert!(pad.parts().iter().any(|p| p.material == SCREEN_MATERIAL));
    }

    #[test]
    fn city_keeps_streets_clear() {
        let (low, tall) = city_lots();
        assert!(!low.is_empty() && !tall.is_empty());
        for v in low.vertices.iter().chain(&tall.vertices) {
            let [x, _, z] = v.position;
            assert!(x.abs() >= 8.0 - 1e-4, "building on the x = 0 street at {x}");
            assert!(z.abs() >= 8.0 - 1e-4, "building on the z = 0 street at {z}");
        }

        let mut device = RecordingDevice::new();
        assert_eq!(city(&mut device).unwrap().parts().len(), 2);
    }

    #[test]
    fn every_asset_builds() {
        let mut device = RecordingDevice::new();
        assert!(ground(&mut device).is_ok());
        assert!(car(&mut device).is_ok());
        assert!(fighter(&mut device).is_ok());
        assert!(camera_body(&mut device).is_ok());
    }
}
