//! Rule catalog and validator.
//!
//! The [`Validator`] runs every category of a [`RuleCatalog`] over an artifact,
//! scores each category with a [`ScoringPolicy`] and combines them into a
//! [`ValidationReport`](artguard_core::ValidationReport).

#![warn(missing_docs)]

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod rule;
pub mod scoring;
pub mod validator;

pub use catalog::RuleCatalog;
pub use error::{QualityError, Result};
pub use rule::{CategoryCheck, FnRule, RuleContext};
pub use scoring::{ScoringPolicy, SeverityWeights};
pub use validator::{panic_message, Validator};
