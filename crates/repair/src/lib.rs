//! Automatic repair of detected findings.
//!
//! A [`RepairEngine`] maps finding kinds to [`Transformation`]s, applies
//! them one at a time and reverts any fix that makes the artifact worse.

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod transform;

pub use engine::{FixOutcome, RepairEngine};
pub use error::{RepairError, Result};
pub use transform::{
    default_transformations, AddDoctype, AddLangAttribute, AddViewportMeta, BalanceBraces,
    CloseScriptTag, GuardSensorAccess, InsertSdkInit, Transformation, UpgradeScriptSrc,
};
