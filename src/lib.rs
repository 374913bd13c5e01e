//! Onboarding intake: client-side workflow for new-hire onboarding.

pub mod config;
pub mod error;
pub mod onboarding;
