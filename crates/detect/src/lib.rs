//! Error signature detection.
//!
//! A [`PatternLibrary`] holds named [`Signature`]s; the [`Detector`] matches
//! them against an artifact and, when a JavaScript runtime is available,
//! trial-runs the inline scripts in a [`Sandbox`] to catch errors that only
//! show up at load time.

#![warn(missing_docs)]

pub mod detector;
pub mod error;
pub mod library;
pub mod sandbox;
pub mod signature;

pub use detector::{Detector, DetectorConfig};
pub use error::{PatternError, Result};
pub use library::{default_signatures, PatternLibrary};
pub use sandbox::{
    translate_error, NoopSandbox, ProcessSandbox, RuntimeError, Sandbox, SandboxConfig,
    SandboxOutcome,
};
pub use signature::{
    CustomMatcher, MatchContext, MatchHit, Matcher, Scope, Signature, SignatureBuilder,
    SignatureSpec,
};
