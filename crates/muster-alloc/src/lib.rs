#![deny(warnings)]

//! Allocation engine: composition optimum, rally and formation builders.
//!
//! This crate provides:
//! - The closed-form damage-maximizing composition and its projection onto
//!   [`CompositionBounds::STANDARD`](muster_core::CompositionBounds::STANDARD)
//! - Damage evaluation and simplex sampling of the damage model
//! - Rally allocation from a target composition, consuming stock
//! - Round-robin packing of the remaining stock into equal-capacity formations

pub mod formation;
pub mod fractions;
pub mod rally;

pub use formation::{build_formations, fill_round_robin, FormationPlan};
pub use fractions::{
    enforce_bounds, enforce_bounds_with, optimal_for_weights, optimal_fractions,
    relative_damage, sample_simplex, DamageWeights, SimplexSample,
};
pub use rally::{apportion_with_caps, build_rally, build_rally_for, build_rally_proportional};
