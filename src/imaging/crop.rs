//! Crop planning around a face.
//!
//! 1. Expand the face box by the margin ratio on every side.
//! 2. Grow the shorter side until the box is a whole number of aspect units
//!    (3:4 for 360×480), keeping the face center.
//! 3. Translate the box back inside the frame.
//! 4. Only if the frame is smaller than the box, shrink it to the largest
//!    whole-unit box that fits and flag the plan as approximated.
//!
//! The no-face fallback box is already aspect-correct and skips step 1.

use super::calculations::{
    Region, aspect_unit, clamp_span, expand_by_margin, max_units, units_to_cover,
};
use super::params::CropParams;
use crate::error::ItemError;
use crate::types::{CropPlan, CropRect, FaceBox, OutputSize};

/// Which box a crop is planned around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropAnchor {
    Face(FaceBox),
    /// No face: a centered box covering `fallback_fraction` of the largest
    /// target-aspect region of the frame. No margin is added on top;
    /// `fallback_fraction` already sizes the whole crop, margin included.
    Fallback,
}

/// Plan the crop rectangle for a `frame_w x frame_h` frame.
pub fn plan_crop(
    frame: (u32, u32),
    anchor: CropAnchor,
    params: &CropParams,
) -> Result<CropPlan, ItemError> {
    let unit = aspect_unit(params.output.width, params.output.height);
    let fit = max_units(frame, unit);
    if fit == 0 {
        return Err(ItemError::CorruptArtifact(format!(
            "frame {}x{} is smaller than one {}:{} crop unit",
            frame.0, frame.1, unit.0, unit.1
        )));
    }

    let region = match anchor {
        CropAnchor::Face(face) => expand_by_margin(face_region(&face), params.margin_ratio),
        CropAnchor::Fallback => face_region(&fallback_face_box(frame, params)),
    };

    let wanted = units_to_cover(region, unit);
    let (units, approximated) = if wanted > fit {
        (fit, true)
    } else {
        (wanted, false)
    };

    let width = unit.0 * units;
    let height = unit.1 * units;
    let rect = CropRect {
        x: clamp_span(region.center_x, width, frame.0),
        y: clamp_span(region.center_y, height, frame.1),
        width,
        height,
    };
    Ok(CropPlan {
        rect,
        output: params.output,
        approximated,
    })
}

fn face_region(face: &FaceBox) -> Region {
    let (center_x, center_y) = face.center();
    Region {
        center_x,
        center_y,
        width: face.width,
        height: face.height,
    }
}

/// Centered fallback box: `fallback_fraction` of the largest whole-unit
/// target-aspect box that fits the frame, never smaller than one unit.
pub fn fallback_face_box(frame: (u32, u32), params: &CropParams) -> FaceBox {
    let unit = aspect_unit(params.output.width, params.output.height);
    let fit = max_units(frame, unit);
    let units = ((f64::from(fit) * params.fallback_fraction).floor() as u32).clamp(1, fit.max(1));
    let width = f64::from(unit.0 * units);
    let height = f64::from(unit.1 * units);
    FaceBox::new(
        (f64::from(frame.0) - width) / 2.0,
        (f64::from(frame.1) - height) / 2.0,
        width,
        height,
        0.0,
    )
}

/// Whether `plan` keeps the exact output aspect ratio.
pub fn preserves_aspect(plan: &CropPlan) -> bool {
    let OutputSize { width, height } = plan.output;
    u64::from(plan.rect.width) * u64::from(height) == u64::from(plan.rect.height) * u64::from(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(margin: f64) -> CropParams {
        CropParams {
            margin_ratio: margin,
            fallback_fraction: 0.8,
            output: OutputSize::default(),
        }
    }

    fn inside(plan: &CropPlan, frame: (u32, u32)) -> bool {
        plan.rect.x + plan.rect.width <= frame.0 && plan.rect.y + plan.rect.height <= frame.1
    }

    // =========================================================================
    // Face-anchored plans
    // =========================================================================

    #[test]
    fn centered_face_gets_margin_and_aspect() {
        // 100x100 face at (450, 450); margin 0.5 -> 200x200 around center 500,500.
        let face = FaceBox::new(450.0, 450.0, 100.0, 100.0, 0.9);
        let plan = plan_crop((1000, 1000), CropAnchor::Face(face), &params(0.5)).unwrap();
        // Height 200 needs 50 units of 4; width 200 needs 67 units of 3.
        assert_eq!(plan.rect.width, 201);
        assert_eq!(plan.rect.height, 268);
        assert_eq!(plan.rect.x, 400);
        assert_eq!(plan.rect.y, 366);
        assert!(!plan.approximated);
        assert!(preserves_aspect(&plan));
    }

    #[test]
    fn face_near_edge_is_translated_not_shrunk() {
        let face = FaceBox::new(0.0, 0.0, 60.0, 80.0, 0.9);
        let plan = plan_crop((600, 800), CropAnchor::Face(face), &params(0.6)).unwrap();
        assert_eq!((plan.rect.x, plan.rect.y), (0, 0));
        assert!(plan.rect.width >= 60 * 22 / 10);
        assert!(!plan.approximated);
        assert!(inside(&plan, (600, 800)));
    }

    #[test]
    fn face_at_far_edge_is_translated_inward() {
        let face = FaceBox::new(540.0, 720.0, 60.0, 80.0, 0.9);
        let plan = plan_crop((600, 800), CropAnchor::Face(face), &params(0.6)).unwrap();
        assert_eq!(plan.rect.x + plan.rect.width, 600);
        assert_eq!(plan.rect.y + plan.rect.height, 800);
        assert!(!plan.approximated);
    }

    #[test]
    fn oversized_box_is_shrunk_and_flagged() {
        // Face almost as tall as the frame: the margin cannot fit.
        let face = FaceBox::new(100.0, 50.0, 200.0, 300.0, 0.9);
        let plan = plan_crop((400, 400), CropAnchor::Face(face), &params(0.6)).unwrap();
        assert!(plan.approximated);
        assert_eq!((plan.rect.width, plan.rect.height), (300, 400));
        assert!(inside(&plan, (400, 400)));
        assert!(preserves_aspect(&plan));
    }

    #[test]
    fn face_partially_outside_frame_still_fits() {
        let face = FaceBox::new(-30.0, -30.0, 50.0, 50.0, 0.9);
        let plan = plan_crop((300, 400), CropAnchor::Face(face), &params(0.6)).unwrap();
        assert!(inside(&plan, (300, 400)));
        assert!(preserves_aspect(&plan));
    }

    #[test]
    fn plans_always_inside_and_exact_aspect() {
        let frames = [(360, 480), (1000, 300), (301, 401), (3, 4), (4000, 3000)];
        let boxes = [
            (0.0, 0.0, 10.0, 10.0),
            (0.5, 0.5, 1.0, 1.0),
            (0.9, 0.1, 0.2, 0.7),
            (0.2, 0.2, 0.6, 0.6),
        ];
        for &(fw, fh) in &frames {
            for &(bx, by, bw, bh) in &boxes {
                let face = FaceBox::new(
                    bx * f64::from(fw),
                    by * f64::from(fh),
                    bw * f64::from(fw),
                    bh * f64::from(fh),
                    0.9,
                );
                for margin in [0.0, 0.6, 2.0] {
                    let plan =
                        plan_crop((fw, fh), CropAnchor::Face(face), &params(margin)).unwrap();
                    assert!(inside(&plan, (fw, fh)), "{plan:?} in {fw}x{fh}");
                    assert!(preserves_aspect(&plan), "{plan:?}");
                    assert!(plan.rect.width > 0);
                }
            }
        }
    }

    #[test]
    fn other_output_sizes_use_their_own_ratio() {
        let params = CropParams {
            output: OutputSize {
                width: 600,
                height: 600,
            },
            ..params(0.2)
        };
        let face = FaceBox::new(100.0, 100.0, 50.0, 80.0, 0.9);
        let plan = plan_crop((500, 500), CropAnchor::Face(face), &params).unwrap();
        assert_eq!(plan.rect.width, plan.rect.height);
    }

    // =========================================================================
    // Fallback
    // =========================================================================

    #[test]
    fn fallback_box_is_centered_fraction() {
        let plan = plan_crop((600, 800), CropAnchor::Fallback, &params(0.6)).unwrap();
        // 200 units fit; 80% is 160 units = 480x640.
        assert_eq!((plan.rect.width, plan.rect.height), (480, 640));
        assert_eq!((plan.rect.x, plan.rect.y), (60, 80));
        assert!(!plan.approximated);
    }

    #[test]
    fn fallback_ignores_margin_ratio() {
        let plain = plan_crop((600, 800), CropAnchor::Fallback, &params(0.0)).unwrap();
        let wide = plan_crop((600, 800), CropAnchor::Fallback, &params(2.0)).unwrap();
        assert_eq!(plain, wide);
        assert_eq!((wide.rect.width, wide.rect.height), (480, 640));
    }

    #[test]
    fn fallback_on_landscape_frame_never_flags() {
        let plan = plan_crop((1600, 900), CropAnchor::Fallback, &params(0.6)).unwrap();
        assert!(!plan.approximated);
        assert!(inside(&plan, (1600, 900)));
        assert_eq!(plan.rect.x + plan.rect.width / 2, 800);
    }

    #[test]
    fn fallback_on_tiny_frame_uses_one_unit() {
        let plan = plan_crop((3, 4), CropAnchor::Fallback, &params(0.6)).unwrap();
        assert_eq!((plan.rect.width, plan.rect.height), (3, 4));
    }

    #[test]
    fn frame_smaller_than_one_unit_is_corrupt() {
        let err = plan_crop((2, 100), CropAnchor::Fallback, &params(0.6)).unwrap_err();
        assert!(matches!(err, ItemError::CorruptArtifact(_)));
    }
}
