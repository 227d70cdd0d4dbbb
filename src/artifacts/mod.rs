//! Artifact removal on raw multichannel windows.
//!
//! - [`Asr`]: Artifact Subspace Reconstruction

pub mod asr;

pub use asr::Asr;
