// SPDX-License-Identifier: MIT
//! # Scan Regions
//!
//! A [`Region`] is a rectangle given by its four edges, measured either in
//! percent of the visible video area or in video-intrinsic pixels.

use crate::error::GeometryError;
use crate::fit::Rect;

/// Rectangle measured in percent of the visible area or in pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub is_measured_in_percentage: bool,
}

impl Default for Region {
    /// The whole visible area.
    fn default() -> Self {
        Self::full()
    }
}

impl Region {
    /// Region measured in percent of the visible area.
    pub fn percent(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            is_measured_in_percentage: true,
        }
    }

    /// Region measured in pixels.
    pub fn pixels(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            is_measured_in_percentage: false,
        }
    }

    /// 0% to 100% on both axes.
    pub fn full() -> Self {
        Self::percent(0.0, 0.0, 100.0, 100.0)
    }

    /// Zero-area pixel region returned by mappings that have no visible area.
    pub fn empty() -> Self {
        Self::pixels(0.0, 0.0, 0.0, 0.0)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Same edges as a `Rect`.
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.width(), self.height())
    }

    /// Check the edge invariants: finite, non-negative, `left < right`,
    /// `top < bottom`, and within `[0, 100]` for percentage regions.
    pub fn validate(&self) -> Result<(), GeometryError> {
        self.check_edges(false)
    }

    /// Like [`Region::validate`] but lets edges fall outside the frame, for
    /// pixel rectangles that may extend past the visible area.
    pub fn validate_unbounded(&self) -> Result<(), GeometryError> {
        self.check_edges(true)
    }

    fn check_edges(&self, unbounded: bool) -> Result<(), GeometryError> {
        let edges = [
            ("left", self.left),
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
        ];
        for (edge, value) in edges {
            if !value.is_finite() {
                return Err(GeometryError::NonFiniteEdge { edge, value });
            }
            if unbounded {
                continue;
            }
            if value < 0.0 {
                return Err(GeometryError::NegativeEdge { edge, value });
            }
            if self.is_measured_in_percentage && value > 100.0 {
                return Err(GeometryError::PercentOutOfRange { edge, value });
            }
        }
        if self.left >= self.right {
            return Err(GeometryError::DegenerateAxis {
                axis: "horizontal",
                start: self.left,
                end: self.right,
            });
        }
        if self.top >= self.bottom {
            return Err(GeometryError::DegenerateAxis {
                axis: "vertical",
                start: self.top,
                end: self.bottom,
            });
        }
        Ok(())
    }

    /// Edge-wise comparison within `tolerance`; the measurement unit must match.
    pub fn approx_eq(&self, other: &Region, tolerance: f64) -> bool {
        self.is_measured_in_percentage == other.is_measured_in_percentage
            && (self.left - other.left).abs() <= tolerance
            && (self.top - other.top).abs() <= tolerance
            && (self.right - other.right).abs() <= tolerance
            && (self.bottom - other.bottom).abs() <= tolerance
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = if self.is_measured_in_percentage { "%" } else { "px" };
        write!(
            f,
            "[{}{u}, {}{u}] → [{}{u}, {}{u}]",
            self.left,
            self.top,
            self.right,
            self.bottom,
            u = unit
        )
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    /// Parse `left,top,right,bottom` with an optional `px` or `%` suffix on the
    /// whole string (percent when omitted), e.g. `10,20,90,80` or `0,0,640,480px`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (body, percent) = if let Some(body) = s.strip_suffix("px") {
            (body, false)
        } else if let Some(body) = s.strip_suffix('%') {
            (body, true)
        } else {
            (s, true)
        };
        let values: Vec<f64> = body
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Invalid region '{}': {}", s, e))?;
        if values.len() != 4 {
            return Err(format!(
                "Invalid region '{}': expected left,top,right,bottom",
                s
            ));
        }
        let region = if percent {
            Region::percent(values[0], values[1], values[2], values[3])
        } else {
            Region::pixels(values[0], values[1], values[2], values[3])
        };
        Ok(region)
    }
}
