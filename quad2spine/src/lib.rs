//! Converter from quad sprite-animation documents to Spine 3.8 skeleton JSON.
//!
//! The crate is I/O-free apart from what an [`ImageSlicer`] does. Reading files, decoding
//! textures and writing images live in `quad2spine-cli`.

#![forbid(unsafe_code)]

mod assemble;
mod combine;
mod convert;
mod error;
mod geometry;
mod json;
mod model;
mod pool;
mod spine;
mod version;

pub mod math;

pub use assemble::*;
pub use combine::*;
pub use convert::*;
pub use error::*;
pub use model::*;
pub use pool::*;
pub use spine::*;
pub use version::*;

#[cfg(test)]
mod test_support;



#[cfg(test)]
mod model_tests;


#[cfg(test)]
mod combine_tests;
