#![allow(missing_docs)]

pub mod bounds;
pub mod error;
pub mod genetic;
pub mod metric;
pub mod mse;
pub mod mutual_information;
pub mod particle_swarm;
pub mod pipeline;
pub mod random;
pub mod solution;
pub mod utils;

pub const IS_DEBUG: bool = false;
