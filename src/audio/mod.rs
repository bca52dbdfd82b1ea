//! Audio input: wire-chunk decoding and device capture.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod decode;
pub mod source;
