// SPDX-License-Identifier: MIT
//! Geometry validation errors.

/// Reasons a size, rectangle or region was rejected.
///
/// Geometry is never clamped into range: a bad value is reported so the
/// layout bug that produced it stays visible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// A width/height was negative or not finite.
    InvalidDimensions { what: &'static str, w: f64, h: f64 },
    /// A region edge was NaN or infinite.
    NonFiniteEdge { edge: &'static str, value: f64 },
    /// A region edge was below zero.
    NegativeEdge { edge: &'static str, value: f64 },
    /// `start >= end` on one axis (zero width/height or reversed edges).
    DegenerateAxis { axis: &'static str, start: f64, end: f64 },
    /// A percentage edge fell outside `[0, 100]`.
    PercentOutOfRange { edge: &'static str, value: f64 },
    /// A container origin coordinate was not finite.
    InvalidOrigin { x: f64, y: f64 },
}

impl GeometryError {
    /// Short machine-friendly name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            GeometryError::InvalidDimensions { .. } => "invalid_dimensions",
            GeometryError::NonFiniteEdge { .. } => "non_finite_edge",
            GeometryError::NegativeEdge { .. } => "negative_edge",
            GeometryError::DegenerateAxis { .. } => "degenerate_axis",
            GeometryError::PercentOutOfRange { .. } => "percent_out_of_range",
            GeometryError::InvalidOrigin { .. } => "invalid_origin",
        }
    }
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryError::InvalidDimensions { what, w, h } => {
                write!(f, "Invalid {} dimensions {}x{}", what, w, h)
            }
            GeometryError::NonFiniteEdge { edge, value } => {
                write!(f, "Region edge '{}' is not finite ({})", edge, value)
            }
            GeometryError::NegativeEdge { edge, value } => {
                write!(f, "Region edge '{}' is negative ({})", edge, value)
            }
            GeometryError::DegenerateAxis { axis, start, end } => write!(
                f,
                "Region is degenerate on the {} axis ({} >= {})",
                axis, start, end
            ),
            GeometryError::PercentOutOfRange { edge, value } => write!(
                f,
                "Percentage edge '{}' must be within [0, 100] (got {})",
                edge, value
            ),
            GeometryError::InvalidOrigin { x, y } => {
                write!(f, "Container origin ({}, {}) is not finite", x, y)
            }
        }
    }
}

impl std::error::Error for GeometryError {}
