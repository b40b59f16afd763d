//! 5-point face landmarks used for pose gating.
//!
//! Point order: left eye, right eye, nose, left mouth corner, right mouth corner.

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(|(x, _)| *x > 0.0)
    }

    /// How much the face is turned: 0.0 = frontal, 1.0 = full profile.
    ///
    /// Measures nose offset from eye midpoint relative to eye span.
    /// Returns 0.0 when required landmarks are not visible.
    pub fn profile_ratio(&self) -> f64 {
        let nose = self.points[NOSE];
        let left_eye = self.points[LEFT_EYE];
        let right_eye = self.points[RIGHT_EYE];

        if nose.0 <= 0.0 || left_eye.0 <= 0.0 || right_eye.0 <= 0.0 {
            return 0.0;
        }

        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        let eye_span = (right_eye.0 - left_eye.0).abs();

        if eye_span <= 0.0 {
            return 0.0;
        }

        ((nose.0 - eye_mid_x).abs() / eye_span).min(1.0)
    }

    /// In-plane head tilt in degrees, from the line between the eyes.
    ///
    /// Positive when the right eye sits lower than the left. Returns 0.0
    /// when either eye is not visible.
    pub fn roll_degrees(&self) -> f64 {
        let left_eye = self.points[LEFT_EYE];
        let right_eye = self.points[RIGHT_EYE];

        if left_eye.0 <= 0.0 || right_eye.0 <= 0.0 {
            return 0.0;
        }

        let dx = right_eye.0 - left_eye.0;
        let dy = right_eye.1 - left_eye.1;
        if dx == 0.0 && dy == 0.0 {
            return 0.0;
        }
        dy.atan2(dx).to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn frontal_landmarks() -> FaceLandmarks {
        FaceLandmarks::new([
            (440.0, 350.0), // left_eye
            (560.0, 350.0), // right_eye
            (500.0, 420.0), // nose (centered)
            (460.0, 470.0), // left_mouth
            (540.0, 470.0), // right_mouth
        ])
    }

    // ── has_visible ─────────────────────────────────────────────────

    #[test]
    fn test_has_visible_all_visible() {
        assert!(frontal_landmarks().has_visible());
    }

    #[test]
    fn test_has_visible_none_visible() {
        let lm = FaceLandmarks::new([(0.0, 0.0); 5]);
        assert!(!lm.has_visible());
    }

    // ── profile_ratio ───────────────────────────────────────────────

    #[test]
    fn test_profile_ratio_frontal() {
        assert_relative_eq!(frontal_landmarks().profile_ratio(), 0.0, epsilon = 0.01);
    }

    #[test]
    fn test_profile_ratio_turned() {
        let lm = FaceLandmarks::new([
            (120.0, 350.0),
            (180.0, 350.0),
            (100.0, 420.0), // nose left of both eyes
            (130.0, 470.0),
            (170.0, 470.0),
        ]);
        // |100 - 150| / 60
        assert_relative_eq!(lm.profile_ratio(), 50.0 / 60.0, epsilon = 0.01);
    }

    #[test]
    fn test_profile_ratio_clamped_to_one() {
        let lm = FaceLandmarks::new([
            (100.0, 100.0),
            (110.0, 100.0),
            (200.0, 100.0),
            (100.0, 100.0),
            (100.0, 100.0),
        ]);
        assert_relative_eq!(lm.profile_ratio(), 1.0);
    }

    #[rstest]
    #[case::nose_invisible([(100.0, 100.0), (200.0, 100.0), (0.0, 0.0), (100.0, 100.0), (100.0, 100.0)])]
    #[case::left_eye_invisible([(0.0, 0.0), (200.0, 100.0), (150.0, 100.0), (100.0, 100.0), (100.0, 100.0)])]
    #[case::same_eye_x([(100.0, 100.0), (100.0, 100.0), (150.0, 100.0), (100.0, 100.0), (100.0, 100.0)])]
    fn test_profile_ratio_degenerate_returns_zero(#[case] pts: [(f64, f64); 5]) {
        assert_relative_eq!(FaceLandmarks::new(pts).profile_ratio(), 0.0);
    }

    // ── roll_degrees ────────────────────────────────────────────────

    #[test]
    fn test_roll_level_eyes() {
        assert_relative_eq!(frontal_landmarks().roll_degrees(), 0.0);
    }

    #[rstest]
    #[case::tilted_down((100.0, 100.0), (200.0, 200.0), 45.0)]
    #[case::tilted_up((100.0, 200.0), (200.0, 100.0), -45.0)]
    #[case::invisible_eye((0.0, 0.0), (200.0, 100.0), 0.0)]
    fn test_roll(#[case] left: (f64, f64), #[case] right: (f64, f64), #[case] expected: f64) {
        let lm = FaceLandmarks::new([left, right, (150.0, 150.0), (0.0, 0.0), (0.0, 0.0)]);
        assert_relative_eq!(lm.roll_degrees(), expected, epsilon = 1e-9);
    }
}
