//! Superposition properties of composite lenses.

use approx::assert_relative_eq;
use gravlens_compute::CpuBackend;
use gravlens_core::fields::evaluate_components;
use gravlens_core::imports::ImportRegistry;
use gravlens_core::{CompositeLens, Deflector, LensComponent, LensFields, LensParams};
use gravlens_cosmology::units::arcsec_to_rad;
use gravlens_geometry::PixelGrid;
use ndarray::Axis;

const D_D: f64 = 1259.08;

fn components() -> Vec<LensComponent> {
    vec![
        LensComponent::new(LensParams::Plummer {
            mass: 5e13,
            angular_width: 3.0,
        })
        .with_translation(4.0, -2.0),
        LensComponent::new(LensParams::Nsie {
            velocity_dispersion: 230.0,
            ellipticity: 0.35,
            angular_core_radius: 0.4,
        })
        .with_translation(-1.5, 1.0)
        .with_angle(30.0)
        .with_strength(0.8),
        LensComponent::new(LensParams::MassSheet { density: 0.7 }),
    ]
}

fn sample_points() -> Vec<[f64; 2]> {
    [[0.3, 0.7], [-5.0, 2.5], [8.0, -8.0], [-1.2, -3.3]]
        .iter()
        .map(|p| [arcsec_to_rad(p[0]), arcsec_to_rad(p[1])])
        .collect()
}

#[test]
fn test_order_invariance() {
    let imports = ImportRegistry::default();
    let forward = CompositeLens::from_components(&components(), D_D, &imports).unwrap();
    let mut reversed_components = components();
    reversed_components.reverse();
    let reversed = CompositeLens::from_components(&reversed_components, D_D, &imports).unwrap();

    for theta in sample_points() {
        let a = forward.alpha(theta);
        let b = reversed.alpha(theta);
        assert_relative_eq!(a[0], b[0], max_relative = 1e-9);
        assert_relative_eq!(a[1], b[1], max_relative = 1e-9);

        let da = forward.derivatives(theta);
        let db = reversed.derivatives(theta);
        assert_relative_eq!(da.xx, db.xx, max_relative = 1e-9);
        assert_relative_eq!(da.yy, db.yy, max_relative = 1e-9);
        assert_relative_eq!(da.xy, db.xy, max_relative = 1e-9);
    }
}

#[test]
fn test_superposition_linearity() {
    let imports = ImportRegistry::default();
    let all = CompositeLens::from_components(&components(), D_D, &imports).unwrap();
    let singles: Vec<CompositeLens> = components()
        .into_iter()
        .map(|c| CompositeLens::from_components(&[c], D_D, &imports).unwrap())
        .collect();

    for theta in sample_points() {
        let total = all.alpha(theta);
        let summed = singles.iter().fold([0.0, 0.0], |acc, lens| {
            let a = lens.alpha(theta);
            [acc[0] + a[0], acc[1] + a[1]]
        });
        assert_relative_eq!(total[0], summed[0], max_relative = 1e-9);
        assert_relative_eq!(total[1], summed[1], max_relative = 1e-9);
    }
}

#[test]
fn test_component_fields_sum_to_composite() {
    let backend = CpuBackend::with_threads(2).unwrap();
    let grid = PixelGrid::new(24, 12.0).unwrap();
    let lens =
        CompositeLens::from_components(&components(), D_D, &ImportRegistry::default()).unwrap();

    let composite = LensFields::evaluate(&backend, &lens, grid).unwrap();
    let parts = evaluate_components(&backend, &lens, grid).unwrap();
    assert_eq!(parts.len(), 3);

    let alpha_sum = parts.alpha.sum_axis(Axis(0));
    let derivative_sum = parts.derivatives.sum_axis(Axis(0));
    for (sum, whole) in alpha_sum.iter().zip(composite.alpha.iter()) {
        assert!((sum - whole).abs() <= 1e-4 * (1.0 + whole.abs()));
    }
    for (sum, whole) in derivative_sum.iter().zip(composite.derivatives.iter()) {
        assert!((sum - whole).abs() <= 1e-4 * (1.0 + whole.abs()));
    }
}
