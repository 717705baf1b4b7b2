//! Face-recognition service boundary
//!
//! The remote engine is opaque: an image goes in, an identity with a
//! confidence comes out. This module owns the HTTP exchange and the
//! normalization of its replies.

pub mod client;
pub mod types;

pub use client::{RecognitionClient, RecognitionService};
pub use types::{
    format_confidence, RecognitionContext, RecognitionError, RecognitionKind,
    RecognitionOutcome, RecognitionResult, ServerSession,
};
