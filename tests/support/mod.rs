#![allow(dead_code)]

mod client;
mod harness;

pub use client::*;
pub use harness::*;
