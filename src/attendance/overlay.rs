//! Recognition overlay
//!
//! Turns the latest recognition into draw primitives for a surface layered
//! over the video. The service returns no face coordinates, so the box is a
//! fixed placeholder region rather than a localization.

use crate::capture::Resolution;
use crate::recognition::{RecognitionKind, RecognitionResult};
use serde::{Deserialize, Serialize};

const BOX_WIDTH_RATIO: f64 = 0.4;
const BOX_HEIGHT_RATIO: f64 = 0.5;
const BOX_LIFT_RATIO: f64 = 0.05;
const LABEL_HEIGHT: f64 = 100.0;
const TEXT_INSET: f64 = 10.0;

const STROKE_COLOR: &str = "#10b981";
const STROKE_WIDTH: f64 = 4.0;
const LABEL_FILL: &str = "rgba(16, 185, 129, 0.9)";
const TEXT_COLOR: &str = "white";
const TITLE_FONT: &str = "bold 20px Arial";
const BODY_FONT: &str = "16px Arial";

/// Axis-aligned rectangle in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One drawing instruction, executed in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawCommand {
    /// Wipe the whole surface
    Clear { width: f64, height: f64 },
    StrokeRect {
        rect: Rect,
        color: String,
        line_width: f64,
    },
    FillRect { rect: Rect, color: String },
    /// Left-aligned text with its baseline at `y`
    Text {
        text: String,
        x: f64,
        y: f64,
        font: String,
        color: String,
    },
}

/// Stateless renderer for the recognition overlay
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    /// Face placeholder: 40% x 50% of the frame, centred, lifted by 5% of the height
    pub fn face_box(frame: Resolution) -> Rect {
        let (w, h) = (frame.width as f64, frame.height as f64);
        let width = w * BOX_WIDTH_RATIO;
        let height = h * BOX_HEIGHT_RATIO;
        Rect {
            x: (w - width) / 2.0,
            y: (h - height) / 2.0 - h * BOX_LIFT_RATIO,
            width,
            height,
        }
    }

    /// Primitives for the full overlay, starting with a clear
    pub fn draw(&self, frame: Resolution, result: &RecognitionResult) -> Vec<DrawCommand> {
        let face = Self::face_box(frame);
        let label = Rect {
            x: face.x,
            y: face.y - LABEL_HEIGHT,
            width: face.width,
            height: LABEL_HEIGHT,
        };
        let text_x = face.x + TEXT_INSET;
        let text = |text: String, offset: f64, font: &str| DrawCommand::Text {
            text,
            x: text_x,
            y: label.y + offset,
            font: font.to_string(),
            color: TEXT_COLOR.to_string(),
        };

        let last_line = match &result.kind {
            RecognitionKind::SelfCheck {
                role: Some(role), ..
            } => format!("Role: {role}"),
            _ => format!("Status: {}", result.status()),
        };

        vec![
            DrawCommand::Clear {
                width: frame.width as f64,
                height: frame.height as f64,
            },
            DrawCommand::StrokeRect {
                rect: face,
                color: STROKE_COLOR.to_string(),
                line_width: STROKE_WIDTH,
            },
            DrawCommand::FillRect {
                rect: label,
                color: LABEL_FILL.to_string(),
            },
            text(result.display_name.clone(), 25.0, TITLE_FONT),
            text(
                result.identity_id.clone().unwrap_or_else(|| "N/A".to_string()),
                50.0,
                BODY_FONT,
            ),
            text(
                format!("Confidence: {}", result.confidence_percent()),
                72.0,
                BODY_FONT,
            ),
            text(last_line, 94.0, BODY_FONT),
        ]
    }
}

/// The most recent overlay kept by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub frame: Resolution,
    pub commands: Vec<DrawCommand>,
}
