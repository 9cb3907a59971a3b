#![allow(missing_docs)]

pub mod error;
pub mod image_transformation;
pub mod montage;
pub mod resample;
pub mod similarity;
