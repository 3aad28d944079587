// src/ops.rs
//
// User-facing pass selection and adjustment parameters.
// These are cheap to create and store - the pixel work happens in the engine.

use crate::engine::transform::{
    BrightnessContrast, EdgeFilter, Normalize, Transform, BRIGHTNESS_RANGE, CONTRAST_RANGE,
};
use crate::error::IpsError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Brightness/contrast parameter block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adjustment {
    /// Additive offset (-100 to 100)
    pub brightness: f32,
    /// Multiplicative gain (0.1 to 5.0)
    pub contrast: f32,
}

impl Default for Adjustment {
    /// The fixed adjustment the viewer applies: contrast 2, brightness 50.
    fn default() -> Self {
        Self {
            brightness: 50.0,
            contrast: 2.0,
        }
    }
}

impl Adjustment {
    pub const IDENTITY: Self = Self {
        brightness: 0.0,
        contrast: 1.0,
    };

    pub fn new(brightness: f32, contrast: f32) -> Self {
        Self {
            brightness,
            contrast,
        }
    }

    pub fn validate(&self) -> Result<(), IpsError> {
        check_range("brightness", self.brightness, BRIGHTNESS_RANGE)?;
        check_range("contrast", self.contrast, CONTRAST_RANGE)
    }
}

fn check_range(name: &'static str, value: f32, (lo, hi): (f32, f32)) -> Result<(), IpsError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(IpsError::invalid_argument(
            name,
            value.to_string(),
            format!("must be within [{lo}, {hi}]"),
        ))
    }
}

/// Pass kinds selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformKind {
    BrightnessContrast,
    Normalize,
    Edge,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrightnessContrast => "brightness-contrast",
            Self::Normalize => "normalize",
            Self::Edge => "edge",
        }
    }

    /// Build the transform for this pass; only brightness/contrast uses `adjustment`.
    pub fn into_transform(self, adjustment: Adjustment) -> Arc<dyn Transform> {
        match self {
            Self::BrightnessContrast => Arc::new(BrightnessContrast::new(
                adjustment.brightness,
                adjustment.contrast,
            )),
            Self::Normalize => Arc::new(Normalize),
            Self::Edge => Arc::new(EdgeFilter),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = IpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "brightness-contrast" | "bc" => Ok(Self::BrightnessContrast),
            "normalize" | "stretch" => Ok(Self::Normalize),
            "edge" | "sobel" => Ok(Self::Edge),
            other => Err(IpsError::invalid_argument(
                "pass",
                other.to_string(),
                "expected brightness-contrast, normalize or edge",
            )),
        }
    }
}

// =============================================================================
// ANIMATION - bounce brightness and contrast between their limits
// =============================================================================

/// Frame rate the per-frame steps are expressed at.
const REFERENCE_FPS: f32 = 60.0;

/// Animates an adjustment back and forth across the valid ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustmentAnimator {
    current: Adjustment,
    brightness_step: f32,
    contrast_step: f32,
}

impl Default for AdjustmentAnimator {
    fn default() -> Self {
        Self::new(Adjustment::IDENTITY)
    }
}

impl AdjustmentAnimator {
    /// Start from `start`, moving brightness by 1 and contrast by 0.01 per reference frame.
    pub fn new(start: Adjustment) -> Self {
        Self {
            current: start,
            brightness_step: 1.0,
            contrast_step: 0.01,
        }
    }

    pub fn current(&self) -> Adjustment {
        self.current
    }

    /// Advance by `dt` seconds and return the new adjustment.
    pub fn advance(&mut self, dt: f32) -> Adjustment {
        let scale = (dt * REFERENCE_FPS).max(0.0);
        bounce(
            &mut self.current.brightness,
            &mut self.brightness_step,
            scale,
            BRIGHTNESS_RANGE,
        );
        bounce(
            &mut self.current.contrast,
            &mut self.contrast_step,
            scale,
            CONTRAST_RANGE,
        );
        self.current
    }
}

fn bounce(value: &mut f32, step: &mut f32, scale: f32, (lo, hi): (f32, f32)) {
    let next = *value + *step * scale;
    if next > hi {
        *value = hi - (next - hi).min(hi - lo);
        *step = -step.abs();
    } else if next < lo {
        *value = lo + (lo - next).min(hi - lo);
        *step = step.abs();
    } else {
        *value = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_kind_parse() {
        assert_eq!(
            "brightness-contrast".parse::<TransformKind>().unwrap(),
            TransformKind::BrightnessContrast
        );
        assert_eq!("SOBEL".parse::<TransformKind>().unwrap(), TransformKind::Edge);
        assert_eq!(
            "normalize".parse::<TransformKind>().unwrap(),
            TransformKind::Normalize
        );
        assert!("blur".parse::<TransformKind>().is_err());
        assert_eq!(TransformKind::Edge.to_string(), "edge");
    }

    #[test]
    fn test_into_transform_names() {
        let adj = Adjustment::default();
        assert_eq!(
            TransformKind::BrightnessContrast.into_transform(adj).name(),
            "brightness_contrast"
        );
        assert_eq!(TransformKind::Normalize.into_transform(adj).name(), "normalize");
        assert_eq!(TransformKind::Edge.into_transform(adj).name(), "edge");
    }

    #[test]
    fn test_adjustment_validate() {
        assert!(Adjustment::default().validate().is_ok());
        assert!(Adjustment::IDENTITY.validate().is_ok());
        assert!(Adjustment::new(150.0, 1.0).validate().is_err());
        assert!(Adjustment::new(0.0, 0.05).validate().is_err());
        assert!(Adjustment::new(f32::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn test_animator_stays_in_range() {
        let mut animator = AdjustmentAnimator::default();
        let first = animator.advance(1.0 / 60.0);
        assert!((first.brightness - 1.0).abs() < 1e-4);
        assert!((first.contrast - 1.01).abs() < 1e-4);
        for _ in 0..10_000 {
            animator.advance(1.0 / 30.0).validate().unwrap();
        }
    }

    #[test]
    fn test_animator_bounces_at_limit() {
        let mut animator = AdjustmentAnimator::new(Adjustment::new(99.5, 1.0));
        let next = animator.advance(1.0 / 60.0);
        assert!((next.brightness - 99.5).abs() < 1e-4);
        let after = animator.advance(1.0 / 60.0);
        assert!(after.brightness < next.brightness);
    }
}
